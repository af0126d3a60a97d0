//! `batchpr errors`: every error recorded in a run-state file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use batchpr_core::RunStateStore;
use clap::Args;
use colored::Colorize;

/// Arguments for `batchpr errors`.
#[derive(Args, Debug)]
pub struct ErrorsArgs {
    /// Run-state file written by `batchpr run`.
    #[arg(long)]
    pub state: PathBuf,
}

impl ErrorsArgs {
    /// Exits non-zero when any error is recorded.
    pub async fn run(self) -> Result<ExitCode> {
        let records = RunStateStore::read_records(&self.state)
            .await
            .with_context(|| format!("failed to read run state {}", self.state.display()))?;

        let failed: Vec<_> = records.iter().filter(|r| r.is_failed()).collect();
        if failed.is_empty() {
            println!("No errors recorded.");
            return Ok(ExitCode::SUCCESS);
        }

        for record in &failed {
            let message = record.error_message.as_deref().unwrap_or_default();
            println!("{} {}", "✗".red().bold(), record.project_id.to_string().bold());
            for line in message.lines() {
                println!("    {line}");
            }
        }
        println!("{} project(s) failed.", failed.len());
        Ok(ExitCode::FAILURE)
    }
}
