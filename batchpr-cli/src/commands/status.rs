//! `batchpr status`: per-project outcomes recorded in a run-state file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use batchpr_core::{ProjectRecord, RunStateStore};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Arguments for `batchpr status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Run-state file written by `batchpr run`.
    #[arg(long)]
    pub state: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub async fn run(self) -> Result<()> {
        let records = RunStateStore::read_records(&self.state)
            .await
            .with_context(|| format!("failed to read run state {}", self.state.display()))?;
        let summary = StatusSummary::from_records(&records);

        if self.json {
            let payload = StatusJson {
                summary,
                projects: &records,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&records, &summary);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
struct StatusSummary {
    projects: usize,
    processed: usize,
    changelists: usize,
    failed: usize,
    pending: usize,
}

impl StatusSummary {
    fn from_records(records: &[ProjectRecord]) -> Self {
        let mut summary = Self {
            projects: records.len(),
            ..Self::default()
        };
        for record in records {
            match record_status(record) {
                RecordStatus::Pending => summary.pending += 1,
                RecordStatus::Failed => {
                    summary.processed += 1;
                    summary.failed += 1;
                }
                RecordStatus::Changelist => {
                    summary.processed += 1;
                    summary.changelists += 1;
                }
                RecordStatus::Unchanged => summary.processed += 1,
            }
        }
        summary
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    summary: StatusSummary,
    projects: &'a [ProjectRecord],
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "review")]
    review: String,
    #[tabled(rename = "error")]
    error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordStatus {
    Pending,
    Unchanged,
    Changelist,
    Failed,
}

fn record_status(record: &ProjectRecord) -> RecordStatus {
    if !record.is_processed {
        RecordStatus::Pending
    } else if record.is_failed() {
        RecordStatus::Failed
    } else if record.commit_id.is_some() {
        RecordStatus::Changelist
    } else {
        RecordStatus::Unchanged
    }
}

fn status_label(status: RecordStatus) -> String {
    match status {
        RecordStatus::Pending => "PENDING".bright_black().bold().to_string(),
        RecordStatus::Unchanged => "UNCHANGED".normal().to_string(),
        RecordStatus::Changelist => "CHANGELIST".green().bold().to_string(),
        RecordStatus::Failed => "FAILED".red().bold().to_string(),
    }
}

fn print_table(records: &[ProjectRecord], summary: &StatusSummary) {
    println!(
        "batchpr v{} | {} projects | {} changelists | {} failed | {} pending",
        env!("CARGO_PKG_VERSION"),
        summary.projects,
        summary.changelists,
        summary.failed,
        summary.pending,
    );
    if records.is_empty() {
        println!("No projects recorded.");
        return;
    }

    let rows: Vec<StatusTableRow> = records
        .iter()
        .map(|record| StatusTableRow {
            project: record.project_id.to_string(),
            status: status_label(record_status(record)),
            commit: record
                .commit_id
                .as_deref()
                .map(short_commit)
                .unwrap_or_default()
                .to_string(),
            review: record.review_url.clone().unwrap_or_default(),
            error: record
                .error_message
                .as_deref()
                .map(first_line)
                .unwrap_or_default()
                .to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn short_commit(commit: &str) -> &str {
    commit.get(..10).unwrap_or(commit)
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}
