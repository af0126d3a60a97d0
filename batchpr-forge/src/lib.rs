//! Projects and the changelist protocol.
//!
//! - [`project`]: [`Project`] identity and the [`ChangelistBackend`] trait
//! - [`changelist`]: branch resolution, commit, push, and pull request dedupe
//! - [`options`]: [`ProjectUpdaterOptions`]
//! - [`github`], [`azure`], [`local`]: backends
//! - [`source`]: composable project providers and filters
//! - [`credentials`]: token lookup for the hosted backends

pub mod azure;
pub mod changelist;
pub mod credentials;
pub mod error;
pub mod github;
mod http;
pub mod local;
pub mod options;
pub mod project;
pub mod source;

pub use azure::{AzureDevOpsClient, AzureDevOpsProject};
pub use changelist::{create_changelist, open_pull_request, CreateChangelistRequest};
pub use error::ForgeError;
pub use github::{GitHubClient, GitHubProject};
pub use local::LocalProject;
pub use options::{BranchNameFn, ProjectUpdaterOptions};
pub use project::{ChangelistBackend, Project, ProjectAttributes, PullRequest, Visibility};
pub use source::{ProjectFilter, ProjectProvider, ProjectSources, ProjectStream};
