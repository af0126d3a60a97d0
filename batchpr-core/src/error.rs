//! Error types for batchpr-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ProjectId;

/// Rejected construction of a domain value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("branch name must not be empty")]
    EmptyBranchName,

    #[error("change title must not be empty")]
    EmptyTitle,
}

/// All errors that can arise from run-state operations.
#[derive(Debug, Error)]
pub enum RunStateError {
    /// I/O failure while persisting or reading the state file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (save path).
    #[error("run-state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error on an explicit read, with the file path.
    #[error("failed to parse run state at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `update_project` was called for an id that was never registered.
    #[error("project '{0}' is not registered in the run state")]
    NotRegistered(ProjectId),
}

/// Convenience constructor for [`RunStateError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RunStateError {
    RunStateError::Io {
        path: path.into(),
        source,
    }
}
