//! The update-routine contract.

use async_trait::async_trait;
use batchpr_core::ChangeDescription;
use batchpr_forge::{Project, ProjectUpdaterOptions};
use batchpr_repo::LocalRepository;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// What an updater sees for one project.
pub struct ProjectUpdaterContext<'a> {
    /// Checkout to edit. Empty when the updater does not clone.
    pub repository: &'a LocalRepository,
    pub project: &'a Project,
    pub options: &'a ProjectUpdaterOptions,
    /// The project's `project{id, name}` span; events logged inside it carry
    /// the project identity.
    pub span: &'a Span,
    pub cancel: &'a CancellationToken,
}

/// Decides what, if anything, to change in one repository.
#[async_trait]
pub trait ProjectUpdater: Send + Sync {
    /// Edit the checkout and describe the change, or return `None` when the
    /// repository already looks right.
    async fn update(
        &self,
        context: &ProjectUpdaterContext<'_>,
    ) -> anyhow::Result<Option<ChangeDescription>>;

    /// Whether the batch clones the repository before calling
    /// [`ProjectUpdater::update`].
    fn clones_repository(&self) -> bool {
        true
    }
}
