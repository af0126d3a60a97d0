//! Repositories on the local filesystem. Changes are pushed straight to the
//! source repository; pull requests are never opened.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ForgeError;
use crate::project::{ChangelistBackend, Project, PullRequest};

#[derive(Debug, Clone)]
pub struct LocalProject {
    path: PathBuf,
    clone_source: String,
}

impl LocalProject {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let clone_source = path.to_string_lossy().into_owned();
        Self { path, clone_source }
    }

    /// A [`Project`] with id `local:{path}` named after the last path
    /// component.
    pub fn project(path: impl Into<PathBuf>) -> Project {
        let backend = Self::new(path);
        let id = format!("local:{}", backend.path.display());
        let name = backend
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Project::new(id, name, Arc::new(backend))
    }
}

#[async_trait]
impl ChangelistBackend for LocalProject {
    fn clone_source(&self) -> &str {
        &self.clone_source
    }

    async fn create_pull_request(
        &self,
        _request: &PullRequest<'_>,
    ) -> Result<Option<String>, ForgeError> {
        Ok(None)
    }

    async fn find_open_pull_request(
        &self,
        _request: &PullRequest<'_>,
    ) -> Result<Option<String>, ForgeError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_identity_from_path() {
        let project = LocalProject::project("/srv/git/tool");
        assert_eq!(project.id().as_str(), "local:/srv/git/tool");
        assert_eq!(project.name(), "tool");
        assert_eq!(project.backend().clone_source(), "/srv/git/tool");
    }
}
