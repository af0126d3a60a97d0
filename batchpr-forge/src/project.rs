//! Projects: a repository with a remote identity and a changelist backend.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use batchpr_core::{ChangeDescription, ProjectId};
use batchpr_repo::Git;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ForgeError;

/// Git config key hosted backends use to authenticate clone and push.
pub const EXTRA_HEADER: &str = "http.extraheader";

/// Repository visibility as reported by the hosting provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Internal,
}

impl Visibility {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "internal" => Some(Visibility::Internal),
            _ => None,
        }
    }
}

/// Provider metadata consulted by project filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectAttributes {
    pub owner: Option<String>,
    pub archived: bool,
    pub fork: bool,
    pub disabled: bool,
    pub visibility: Option<Visibility>,
}

/// A pull request to open from `source_branch` into `target_branch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest<'a> {
    pub source_branch: &'a str,
    pub target_branch: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
}

impl<'a> PullRequest<'a> {
    pub fn new(source_branch: &'a str, target_branch: &'a str, change: &'a ChangeDescription) -> Self {
        Self {
            source_branch,
            target_branch,
            title: change.title(),
            description: change.description(),
        }
    }
}

/// Provider-specific half of the changelist protocol.
///
/// Implementations supply where to clone from and how to open a pull request;
/// [`crate::create_changelist`] owns everything else.
#[async_trait]
pub trait ChangelistBackend: Send + Sync {
    /// Remote handed to `git clone`.
    fn clone_source(&self) -> &str;

    /// Clone the repository into `destination`.
    async fn clone_repository(
        &self,
        git: &Git,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ForgeError> {
        git.clone_repository(self.clone_source(), destination, cancel)
            .await?;
        Ok(())
    }

    /// Try to open a pull request and return its review URL.
    ///
    /// A duplicate must be reported as [`ForgeError::Conflict`] so the caller
    /// can look up the existing one.
    async fn create_pull_request(
        &self,
        request: &PullRequest<'_>,
    ) -> Result<Option<String>, ForgeError>;

    /// Review URL of the first open pull request for the same branch pair.
    async fn find_open_pull_request(
        &self,
        request: &PullRequest<'_>,
    ) -> Result<Option<String>, ForgeError>;
}

/// A repository the batch can update. Equality and hashing use `id` only.
#[derive(Clone)]
pub struct Project {
    id: ProjectId,
    name: String,
    attributes: ProjectAttributes,
    backend: Arc<dyn ChangelistBackend>,
}

impl Project {
    pub fn new(
        id: impl Into<ProjectId>,
        name: impl Into<String>,
        backend: Arc<dyn ChangelistBackend>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            attributes: ProjectAttributes::default(),
            backend,
        }
    }

    pub fn with_attributes(mut self, attributes: ProjectAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &ProjectAttributes {
        &self.attributes
    }

    pub fn backend(&self) -> &dyn ChangelistBackend {
        self.backend.as_ref()
    }

    /// Clone this project into `destination`.
    pub async fn clone_repository(
        &self,
        git: &Git,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ForgeError> {
        self.backend.as_ref().clone_repository(git, destination, cancel).await
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            self.id.fmt(f)
        } else {
            f.write_str(&self.name)
        }
    }
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Project {}

impl Hash for Project {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalProject;

    #[test]
    fn equality_ignores_name_and_backend() {
        let a = LocalProject::project("/srv/git/a");
        let b = Project::new(a.id().clone(), "renamed", Arc::new(LocalProject::new("/elsewhere")));
        assert_eq!(a, b);
    }

    #[test]
    fn display_falls_back_to_id() {
        let backend: Arc<dyn ChangelistBackend> = Arc::new(LocalProject::new("/x"));
        let named = Project::new("local:/x", "x", backend.clone());
        assert_eq!(named.to_string(), "x");
        let unnamed = Project::new("local:/x", "", backend);
        assert_eq!(unnamed.to_string(), "local:/x");
    }

    #[tokio::test]
    async fn clone_repository_goes_through_the_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("source.git");
        let status = std::process::Command::new("git")
            .args(["init", "--bare", "--quiet"])
            .arg(&source)
            .status()
            .unwrap();
        assert!(status.success());

        let project = LocalProject::project(&source);
        let destination = dir.path().join("checkout");
        project
            .clone_repository(&Git::default(), &destination, &CancellationToken::new())
            .await
            .unwrap();
        assert!(destination.join(".git").is_dir());
    }

    #[test]
    fn visibility_parse_is_case_insensitive() {
        assert_eq!(Visibility::parse("Private"), Some(Visibility::Private));
        assert_eq!(Visibility::parse("secret"), None);
    }
}
