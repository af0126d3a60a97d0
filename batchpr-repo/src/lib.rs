//! Repository handle and git command wrapper.
//!
//! - [`repository`]: scoped file access inside a scratch checkout
//! - [`encoding`]: byte-order-mark detection and text re-encoding
//! - [`git`]: `git` subprocess wrapper used by every changelist
//!
//! All git operations shell out to the system `git` binary through
//! [`tokio::process::Command`].

pub mod encoding;
pub mod error;
pub mod git;
pub mod repository;

pub use encoding::{EncodingError, TextEncoding};
pub use error::{GitError, RepoError};
pub use git::{Git, GitConfig};
pub use repository::{GlobOptions, LocalRepository};
