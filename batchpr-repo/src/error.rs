//! Error types for batchpr-repo.

use std::path::PathBuf;

use thiserror::Error;

use crate::encoding::EncodingError;

/// Errors from file operations on a [`crate::LocalRepository`].
#[derive(Debug, Error)]
pub enum RepoError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested path is absolute or climbs out of the repository root.
    #[error("path '{path}' is outside the repository")]
    PathOutsideRepository { path: PathBuf },

    /// Text could not be decoded or re-encoded.
    #[error("encoding error at {path}: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: EncodingError,
    },

    /// A caller-supplied transform failed; nothing was written.
    #[error("failed to transform {path}: {source}")]
    Transform {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("directory walk error: {0}")]
    Walk(#[from] ignore::Error),
}

/// Failure of a `git` subcommand.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` executable could not be started.
    #[error("failed to spawn git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `git` exited with a non-zero status. `output` holds stdout then stderr.
    #[error("git command '{command}' failed ({status}):\n{output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    /// Cancellation was observed before the subcommand started.
    #[error("git command '{command}' not started: run cancelled")]
    Cancelled { command: String },
}

/// Convenience constructor for [`RepoError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RepoError {
    RepoError::Io {
        path: path.into(),
        source,
    }
}
