//! Error types for batchpr-runner.

use batchpr_forge::ForgeError;
use thiserror::Error;

/// Errors that end a whole run. Per-project failures never surface here;
/// they are recorded in the run state instead.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The batch was started without a project source or without an updater.
    #[error("missing configuration: no {0} configured")]
    MissingConfiguration(&'static str),

    /// A project source failed; projects already started were finished.
    #[error("project discovery failed: {0}")]
    Discovery(#[source] ForgeError),
}
