//! The changelist protocol shared by every backend.
//!
//! 1. Read the current branch.
//! 2. Resolve the target branch: explicit override, else the options'
//!    branch-name function, else the current branch.
//! 3. Commit everything and push to the target branch.
//! 4. When the target differs from the current branch, open a pull request
//!    from the target into the current branch, reusing an existing open one
//!    when the provider reports a duplicate.

use batchpr_core::{BranchName, ChangeDescription, ChangelistInformation};
use batchpr_repo::LocalRepository;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ForgeError;
use crate::options::ProjectUpdaterOptions;
use crate::project::{ChangelistBackend, Project, PullRequest};

/// Everything needed to turn one [`ChangeDescription`] into a changelist.
pub struct CreateChangelistRequest<'a> {
    pub project: &'a Project,
    pub repository: &'a LocalRepository,
    pub change: &'a ChangeDescription,
    pub options: &'a ProjectUpdaterOptions,
    pub cancel: &'a CancellationToken,
}

impl CreateChangelistRequest<'_> {
    /// Explicit branch override first, then the options' naming function.
    pub fn resolve_branch_name(&self) -> Option<BranchName> {
        self.change
            .branch_name()
            .cloned()
            .or_else(|| (self.options.branch_name)(self))
    }
}

/// Commit, push, and open a pull request when one is needed.
pub async fn create_changelist(
    request: &CreateChangelistRequest<'_>,
) -> Result<ChangelistInformation, ForgeError> {
    let git = request.options.git();
    let root = request.repository.root_path();
    let cancel = request.cancel;

    let current = git.current_branch_name(root, cancel).await?;
    let branch = request
        .resolve_branch_name()
        .map(String::from)
        .unwrap_or_else(|| current.clone());

    let commit_id = git
        .commit(root, &request.change.commit_message(), cancel)
        .await?;
    git.push(root, &branch, request.options.force_push, cancel)
        .await?;
    info!(%commit_id, %branch, "pushed changelist");

    let review_url = if branch != current {
        let pull_request = PullRequest::new(&branch, &current, request.change);
        open_pull_request(request.project.backend(), &pull_request, cancel).await?
    } else {
        debug!(%branch, "committed on the current branch; no pull request");
        None
    };

    Ok(ChangelistInformation::new(commit_id, review_url))
}

/// Create the pull request, or locate the open one a previous run created.
pub async fn open_pull_request(
    backend: &dyn ChangelistBackend,
    pull_request: &PullRequest<'_>,
    cancel: &CancellationToken,
) -> Result<Option<String>, ForgeError> {
    if cancel.is_cancelled() {
        return Err(ForgeError::Cancelled);
    }
    match backend.create_pull_request(pull_request).await {
        Ok(url) => Ok(url),
        Err(err) if err.is_conflict() => {
            warn!(
                source_branch = pull_request.source_branch,
                target_branch = pull_request.target_branch,
                error = %err,
                "pull request already exists; looking it up",
            );
            if cancel.is_cancelled() {
                return Err(ForgeError::Cancelled);
            }
            match backend.find_open_pull_request(pull_request).await? {
                Some(url) => Ok(Some(url)),
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}
