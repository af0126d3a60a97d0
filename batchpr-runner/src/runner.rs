//! Batch orchestrator.
//!
//! Pulls projects from a [`ProjectSources`] stream, drops duplicate ids, stops
//! after `maximum_projects`, and runs each remaining project through its own
//! pipeline on a bounded set of workers:
//!
//! ```text
//! processed? -> skip
//! register -> rate limit -> scratch dir -> clone -> update -> changelist
//! -> record outcome -> remove scratch dir
//! ```
//!
//! A failure inside one pipeline is recorded in the run state for that
//! project and never stops the others.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use batchpr_core::{ChangelistInformation, ProjectId, RunStateStore};
use batchpr_forge::{create_changelist, CreateChangelistRequest, Project, ProjectSources, ProjectUpdaterOptions};
use batchpr_repo::LocalRepository;
use futures::{FutureExt, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::error::RunnerError;
use crate::rate_limit::{NoRateLimiter, RateLimiter};
use crate::updater::{ProjectUpdater, ProjectUpdaterContext};

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Run-wide settings.
#[derive(Clone)]
pub struct BatchOptions {
    /// Number of projects processed at the same time. Zero is treated as one.
    pub degree_of_parallelism: usize,
    /// Stop after this many distinct projects.
    pub maximum_projects: Option<usize>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// Open each review URL with the system browser.
    pub open_review_url_in_browser: bool,
    pub updater_options: ProjectUpdaterOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            degree_of_parallelism: 1,
            maximum_projects: None,
            rate_limiter: Arc::new(NoRateLimiter),
            open_review_url_in_browser: false,
            updater_options: ProjectUpdaterOptions::default(),
        }
    }
}

/// How one project's pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOutcome {
    /// Already processed by an earlier run.
    Skipped,
    /// The updater found nothing to change.
    Unchanged,
    Changelist,
    Failed,
    /// Cancellation stopped the pipeline; the project stays unprocessed.
    Cancelled,
}

/// Outcome counts of one [`BatchProjectUpdater::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Projects that reached a terminal record in this run.
    pub processed: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub changelists: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Projects yielded more than once by the sources.
    pub duplicates: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: ProjectOutcome) {
        match outcome {
            ProjectOutcome::Skipped => self.skipped += 1,
            ProjectOutcome::Unchanged => {
                self.processed += 1;
                self.unchanged += 1;
            }
            ProjectOutcome::Changelist => {
                self.processed += 1;
                self.changelists += 1;
            }
            ProjectOutcome::Failed => {
                self.processed += 1;
                self.failed += 1;
            }
            ProjectOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Applies one [`ProjectUpdater`] to every project of a set of sources.
pub struct BatchProjectUpdater {
    sources: ProjectSources,
    updater: Option<Arc<dyn ProjectUpdater>>,
    store: Arc<RunStateStore>,
    options: BatchOptions,
}

impl BatchProjectUpdater {
    pub fn new(store: Arc<RunStateStore>, options: BatchOptions) -> Self {
        Self {
            sources: ProjectSources::new(),
            updater: None,
            store,
            options,
        }
    }

    pub fn with_sources(mut self, sources: ProjectSources) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_updater(mut self, updater: Arc<dyn ProjectUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }

    /// Process every project once.
    ///
    /// Returns after every started pipeline has finished. Cancellation stops
    /// new projects from starting.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, RunnerError> {
        if self.sources.is_empty() {
            return Err(RunnerError::MissingConfiguration("project source"));
        }
        let updater = self
            .updater
            .clone()
            .ok_or(RunnerError::MissingConfiguration("updater"))?;

        let worker = Arc::new(Worker {
            store: self.store.clone(),
            updater,
            rate_limiter: self.options.rate_limiter.clone(),
            options: self.options.updater_options.clone(),
            open_review_url: self.options.open_review_url_in_browser,
            cancel: cancel.clone(),
        });

        let parallelism = self.options.degree_of_parallelism.max(1);
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let mut workers: JoinSet<ProjectOutcome> = JoinSet::new();
        let mut seen: HashSet<ProjectId> = HashSet::new();
        let mut summary = RunSummary::default();
        let mut discovery_error = None;
        let mut projects = self.sources.stream();

        info!(parallelism, maximum = ?self.options.maximum_projects, "batch started");

        loop {
            if cancel.is_cancelled() {
                info!("cancellation requested; no new projects will start");
                break;
            }
            if self
                .options
                .maximum_projects
                .is_some_and(|max| seen.len() >= max)
            {
                info!(count = seen.len(), "reached the maximum number of projects");
                break;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => continue,
            };
            let next = tokio::select! {
                next = projects.next() => next,
                _ = cancel.cancelled() => continue,
            };

            let project = match next {
                None => break,
                Some(Err(err)) => {
                    error!(error = %err, "project discovery failed");
                    discovery_error = Some(err);
                    break;
                }
                Some(Ok(project)) => project,
            };
            if !seen.insert(project.id().clone()) {
                debug!(project_id = %project.id(), "duplicate project ignored");
                summary.duplicates += 1;
                continue;
            }

            let worker = worker.clone();
            workers.spawn(async move {
                let _permit = permit;
                worker.process(project).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(err) => {
                    error!(error = %err, "project worker aborted");
                    summary.record(ProjectOutcome::Failed);
                }
            }
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            unchanged = summary.unchanged,
            changelists = summary.changelists,
            failed = summary.failed,
            "batch finished",
        );

        match discovery_error {
            Some(err) => Err(RunnerError::Discovery(err)),
            None => Ok(summary),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-project pipeline
// ---------------------------------------------------------------------------

struct Worker {
    store: Arc<RunStateStore>,
    updater: Arc<dyn ProjectUpdater>,
    rate_limiter: Arc<dyn RateLimiter>,
    options: ProjectUpdaterOptions,
    open_review_url: bool,
    cancel: CancellationToken,
}

impl Worker {
    async fn process(&self, project: Project) -> ProjectOutcome {
        let span = info_span!("project", id = %project.id(), name = %project.name());
        self.process_in_span(&project, &span)
            .instrument(span.clone())
            .await
    }

    async fn process_in_span(&self, project: &Project, span: &Span) -> ProjectOutcome {
        let id = project.id();
        if self.store.is_processed(id).await {
            info!("already processed; skipping");
            return ProjectOutcome::Skipped;
        }
        if let Err(err) = self.store.add_project(id).await {
            error!(error = %err, "failed to register project in the run state");
            return ProjectOutcome::Failed;
        }

        self.rate_limiter.wait(&self.cancel).await;
        if self.cancel.is_cancelled() {
            return ProjectOutcome::Cancelled;
        }

        let result = AssertUnwindSafe(self.pipeline(project, span))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow!("updater panicked: {}", panic_message(panic.as_ref())))
            });

        match result {
            Ok(None) => {
                info!("no changes needed");
                self.record(id, None, None).await;
                self.rate_limiter.update_completed(None);
                ProjectOutcome::Unchanged
            }
            Ok(Some(changelist)) => {
                info!(
                    commit_id = %changelist.commit_id,
                    review_url = changelist.review_url.as_deref().unwrap_or(""),
                    "changelist created",
                );
                self.record(id, Some(&changelist), None).await;
                if self.open_review_url {
                    if let Some(url) = &changelist.review_url {
                        open_in_browser(url.clone()).await;
                    }
                }
                self.rate_limiter.update_completed(Some(&changelist));
                ProjectOutcome::Changelist
            }
            Err(_) if self.cancel.is_cancelled() => {
                warn!("pipeline interrupted by cancellation; project left unprocessed");
                ProjectOutcome::Cancelled
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(error = %message, "project failed");
                self.record(id, None, Some(message)).await;
                ProjectOutcome::Failed
            }
        }
    }

    /// Scratch directory lifetime wraps clone, update, and changelist.
    async fn pipeline(
        &self,
        project: &Project,
        span: &Span,
    ) -> anyhow::Result<Option<ChangelistInformation>> {
        let repository = LocalRepository::create_scratch().context("failed to create scratch directory")?;
        let result = self.update(&repository, project, span).await;
        if let Err(err) = repository.close().await {
            warn!(error = %err, "failed to remove scratch directory");
        }
        result
    }

    async fn update(
        &self,
        repository: &LocalRepository,
        project: &Project,
        span: &Span,
    ) -> anyhow::Result<Option<ChangelistInformation>> {
        if self.updater.clones_repository() {
            debug!(source = project.backend().clone_source(), "cloning");
            project
                .clone_repository(&self.options.git(), repository.root_path(), &self.cancel)
                .await
                .context("clone failed")?;
        }

        let context = ProjectUpdaterContext {
            repository,
            project,
            options: &self.options,
            span,
            cancel: &self.cancel,
        };
        let Some(change) = self.updater.update(&context).await? else {
            return Ok(None);
        };

        let request = CreateChangelistRequest {
            project,
            repository,
            change: &change,
            options: &self.options,
            cancel: &self.cancel,
        };
        let changelist = create_changelist(&request)
            .await
            .context("failed to create changelist")?;
        Ok(Some(changelist))
    }

    async fn record(
        &self,
        id: &ProjectId,
        result: Option<&ChangelistInformation>,
        error_message: Option<String>,
    ) {
        if let Err(err) = self.store.update_project(id, result, error_message).await {
            error!(error = %err, "failed to record project outcome");
        }
    }
}

async fn open_in_browser(url: String) {
    let opened = tokio::task::spawn_blocking(move || open::that(&url)).await;
    match opened {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "failed to open review URL"),
        Err(err) => warn!(error = %err, "failed to open review URL"),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_terminal_outcomes_as_processed() {
        let mut summary = RunSummary::default();
        for outcome in [
            ProjectOutcome::Skipped,
            ProjectOutcome::Unchanged,
            ProjectOutcome::Changelist,
            ProjectOutcome::Failed,
            ProjectOutcome::Cancelled,
        ] {
            summary.record(outcome);
        }
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.cancelled, 1);
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }

    #[tokio::test]
    async fn missing_configuration_fails_before_any_work() {
        let store = Arc::new(RunStateStore::in_memory());
        let batch = BatchProjectUpdater::new(store, BatchOptions::default());
        let err = batch.run(&CancellationToken::new()).await.unwrap_err();
        assert!(
            matches!(err, RunnerError::MissingConfiguration("project source")),
            "got: {err}"
        );

        let store = Arc::new(RunStateStore::in_memory());
        let batch = BatchProjectUpdater::new(store, BatchOptions::default())
            .with_sources(ProjectSources::new().add_local_repository("/srv/git/a"));
        let err = batch.run(&CancellationToken::new()).await.unwrap_err();
        assert!(
            matches!(err, RunnerError::MissingConfiguration("updater")),
            "got: {err}"
        );
    }
}
