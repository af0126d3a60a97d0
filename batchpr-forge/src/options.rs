//! Per-run changelist options.

use std::fmt;
use std::sync::Arc;

use batchpr_core::BranchName;
use batchpr_repo::{Git, GitConfig};

use crate::changelist::CreateChangelistRequest;

/// Chooses the branch a changelist is pushed to. `None` commits on the
/// current branch.
pub type BranchNameFn =
    Arc<dyn Fn(&CreateChangelistRequest<'_>) -> Option<BranchName> + Send + Sync>;

/// Options shared by every changelist of a run.
#[derive(Clone)]
pub struct ProjectUpdaterOptions {
    /// Push with `--force`.
    pub force_push: bool,
    pub branch_name: BranchNameFn,
    /// Passed as `-c key=value` to every git invocation, in order.
    pub additional_git_configurations: Vec<GitConfig>,
}

impl Default for ProjectUpdaterOptions {
    fn default() -> Self {
        Self {
            force_push: false,
            branch_name: Arc::new(slugified_title),
            additional_git_configurations: Vec::new(),
        }
    }
}

impl ProjectUpdaterOptions {
    /// Push every changelist to `branch`.
    pub fn with_fixed_branch_name(mut self, branch: BranchName) -> Self {
        self.branch_name = Arc::new(move |_: &CreateChangelistRequest<'_>| Some(branch.clone()));
        self
    }

    /// Commit on the checked-out branch and never open pull requests.
    pub fn with_current_branch(mut self) -> Self {
        self.branch_name = Arc::new(|_: &CreateChangelistRequest<'_>| None);
        self
    }

    pub fn with_git_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_git_configurations
            .push((key.into(), value.into()));
        self
    }

    /// Git runner carrying the configured overrides.
    pub fn git(&self) -> Git {
        Git::new(self.additional_git_configurations.iter().cloned())
    }
}

impl fmt::Debug for ProjectUpdaterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectUpdaterOptions")
            .field("force_push", &self.force_push)
            .field(
                "additional_git_configurations",
                &self.additional_git_configurations,
            )
            .finish_non_exhaustive()
    }
}

/// Default branch naming: the slugified change title.
pub fn slugified_title(request: &CreateChangelistRequest<'_>) -> Option<BranchName> {
    BranchName::slugify(request.change.title())
}
