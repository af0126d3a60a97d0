//! Run-state store: resumable per-project bookkeeping for a batch run.
//!
//! Persists a single JSON document:
//!
//! ```text
//! { "projects": [ { "project_id": "github:1", "is_processed": true, ... } ] }
//! ```
//!
//! Every mutation rewrites the whole document through the `.tmp` + rename
//! pattern, so a crash mid-save leaves the previous state file intact.
//! A single async mutex serializes every read and mutation together with the
//! file rewrite that follows it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{io_err, RunStateError};
use crate::types::{ChangelistInformation, ProjectId};

/// One entry per unique project id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: ProjectId,
    #[serde(default)]
    pub is_processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProjectRecord {
    fn unprocessed(project_id: ProjectId) -> Self {
        Self {
            project_id,
            is_processed: false,
            error_message: None,
            commit_id: None,
            review_url: None,
            finished_at: None,
        }
    }

    /// True when the record ended with an error.
    pub fn is_failed(&self) -> bool {
        self.error_message.as_deref().is_some_and(|m| !m.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RunStateFile {
    #[serde(default)]
    projects: Vec<ProjectRecord>,
}

#[derive(Serialize)]
struct RunStateFileRef<'a> {
    projects: &'a [ProjectRecord],
}

/// Durable, concurrency-safe table of per-project outcomes.
#[derive(Debug)]
pub struct RunStateStore {
    path: Option<PathBuf>,
    projects: Mutex<Vec<ProjectRecord>>,
}

impl RunStateStore {
    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            projects: Mutex::new(Vec::new()),
        }
    }

    /// Load the store backed by `path`.
    ///
    /// Any read or parse failure, including a missing file, starts from an
    /// empty table. Use [`RunStateStore::read_records`] to surface those
    /// failures instead.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let projects = match read_state(&path).await {
            Ok(state) => state.projects,
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    "starting from empty run state",
                );
                Vec::new()
            }
        };
        Self {
            path: Some(path),
            projects: Mutex::new(projects),
        }
    }

    /// Strictly read the records stored at `path`.
    pub async fn read_records(path: &Path) -> Result<Vec<ProjectRecord>, RunStateError> {
        Ok(read_state(path).await?.projects)
    }

    /// Register `project_id` as unprocessed. No-op if already present.
    pub async fn add_project(&self, project_id: &ProjectId) -> Result<(), RunStateError> {
        let mut projects = self.projects.lock().await;
        if projects.iter().any(|p| &p.project_id == project_id) {
            return Ok(());
        }
        projects.push(ProjectRecord::unprocessed(project_id.clone()));
        self.save(&projects).await
    }

    /// True iff a record exists for `project_id` and it is processed.
    pub async fn is_processed(&self, project_id: &ProjectId) -> bool {
        let projects = self.projects.lock().await;
        projects
            .iter()
            .any(|p| p.is_processed && &p.project_id == project_id)
    }

    /// Move the record for `project_id` to its terminal state.
    ///
    /// Records `result` on success or `error_message` on failure. The record
    /// must have been registered with [`RunStateStore::add_project`].
    pub async fn update_project(
        &self,
        project_id: &ProjectId,
        result: Option<&ChangelistInformation>,
        error_message: Option<String>,
    ) -> Result<(), RunStateError> {
        let mut projects = self.projects.lock().await;
        let record = projects
            .iter_mut()
            .find(|p| &p.project_id == project_id)
            .ok_or_else(|| RunStateError::NotRegistered(project_id.clone()))?;

        record.is_processed = true;
        record.error_message = error_message;
        record.commit_id = result.map(|r| r.commit_id.clone());
        record.review_url = result.and_then(|r| r.review_url.clone());
        record.finished_at = Some(Utc::now());

        self.save(&projects).await
    }

    /// Every non-empty error message, in registration order.
    pub async fn get_all_errors(&self) -> Vec<String> {
        let projects = self.projects.lock().await;
        projects
            .iter()
            .filter_map(|p| p.error_message.clone())
            .filter(|m| !m.is_empty())
            .collect()
    }

    /// Snapshot of every record.
    pub async fn records(&self) -> Vec<ProjectRecord> {
        self.projects.lock().await.clone()
    }

    async fn save(&self, projects: &[ProjectRecord]) -> Result<(), RunStateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_err(dir, e))?;
        }

        let json = serde_json::to_vec_pretty(&RunStateFileRef { projects })?;
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(path, e));
        }
        Ok(())
    }
}

async fn read_state(path: &Path) -> Result<RunStateFile, RunStateError> {
    let contents = tokio::fs::read(path).await.map_err(|e| io_err(path, e))?;
    serde_json::from_slice(&contents).map_err(|source| RunStateError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// `<path>.tmp`, next to the state file so the rename stays on one filesystem.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
