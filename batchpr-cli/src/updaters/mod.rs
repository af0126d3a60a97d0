//! Updaters selectable from the run configuration.

mod codeowners;
mod replace;

pub use codeowners::CodeOwnersUpdater;
pub use replace::ReplaceTextUpdater;
