//! batchpr core library: domain types, run-state persistence, errors.
//!
//! - [`types`]: newtypes and change/changelist values
//! - [`error`]: [`ValidationError`], [`RunStateError`]
//! - [`run_state`]: the resumable per-project run-state store

pub mod error;
pub mod run_state;
pub mod types;

pub use error::{RunStateError, ValidationError};
pub use run_state::{ProjectRecord, RunStateStore};
pub use types::{BranchName, ChangeDescription, ChangelistInformation, ProjectId};
