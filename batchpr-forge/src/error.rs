//! Error types for batchpr-forge.

use batchpr_repo::{GitError, RepoError};
use thiserror::Error;

/// All errors that can arise while discovering projects or producing a
/// changelist.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// A provider API answered with a non-success status.
    #[error("{method} {url} failed with HTTP {status}: {message}")]
    Api {
        status: u16,
        method: String,
        url: String,
        message: String,
    },

    /// The provider refused to create a resource because an equivalent one
    /// already exists (for example an open pull request for the same branches).
    #[error("{method} {url} conflicted with HTTP {status}: {message}")]
    Conflict {
        status: u16,
        method: String,
        url: String,
        message: String,
    },

    /// Transport-level HTTP failure or an undecodable response body.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    /// An external credential helper could not produce a token.
    #[error("credential helper '{helper}' failed: {message}")]
    Credential { helper: String, message: String },

    /// Cancellation was observed before a provider call.
    #[error("operation cancelled")]
    Cancelled,
}

impl ForgeError {
    /// True for provider-reported duplicate/conflict responses.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ForgeError::Conflict { .. })
    }

    /// HTTP status of a provider response, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ForgeError::Api { status, .. } | ForgeError::Conflict { status, .. } => Some(*status),
            ForgeError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
