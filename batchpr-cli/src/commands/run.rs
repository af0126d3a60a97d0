//! `batchpr run`: apply the configured updater to every configured project.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use batchpr_core::RunStateStore;
use batchpr_runner::{BatchProjectUpdater, RunSummary};
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::RunConfig;

/// Arguments for `batchpr run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML run configuration.
    #[arg(long, short)]
    pub config: PathBuf,

    /// Override the configured number of concurrent projects.
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Override the configured maximum number of projects.
    #[arg(long)]
    pub max_projects: Option<usize>,
}

impl RunArgs {
    pub async fn run(self) -> Result<ExitCode> {
        let config = RunConfig::load(&self.config)?;
        let base = config_dir(&self.config);
        let base = std::fs::canonicalize(base)
            .with_context(|| format!("failed to resolve {}", base.display()))?;
        let base = base.as_path();

        let mut options = config.batch_options()?;
        if let Some(parallelism) = self.parallelism {
            options.degree_of_parallelism = parallelism;
        }
        if self.max_projects.is_some() {
            options.maximum_projects = self.max_projects;
        }

        let sources = config.sources(base).await?;
        let updater = config.updater()?;
        let state_path = config.state_path(base);
        let store = Arc::new(RunStateStore::load(&state_path).await);

        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_interrupt(cancel.clone()));

        let summary = BatchProjectUpdater::new(store.clone(), options)
            .with_sources(sources)
            .with_updater(updater)
            .run(&cancel)
            .await
            .context("batch run failed")?;

        print_summary(&summary, &state_path);

        let errors = store.get_all_errors().await;
        if errors.is_empty() {
            return Ok(ExitCode::SUCCESS);
        }
        eprintln!(
            "{} {} project(s) recorded errors. Run `batchpr errors --state {}` for details.",
            "✗".red().bold(),
            errors.len(),
            state_path.display()
        );
        Ok(ExitCode::FAILURE)
    }
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received; waiting for started projects to finish");
        cancel.cancel();
    }
}

fn config_dir(config: &Path) -> &Path {
    config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

fn print_summary(summary: &RunSummary, state_path: &Path) {
    println!(
        "{} {} processed | {} changelists | {} unchanged | {} failed | {} skipped",
        "✓".green().bold(),
        summary.processed,
        summary.changelists.to_string().green(),
        summary.unchanged,
        if summary.failed > 0 {
            summary.failed.to_string().red().to_string()
        } else {
            summary.failed.to_string()
        },
        summary.skipped,
    );
    if summary.cancelled > 0 {
        println!(
            "{} {} project(s) interrupted; rerun to resume.",
            "!".yellow().bold(),
            summary.cancelled
        );
    }
    println!("State: {}", state_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_file_name_resolves_against_current_dir() {
        assert_eq!(config_dir(Path::new("run.yaml")), Path::new("."));
        assert_eq!(config_dir(Path::new("cfg/run.yaml")), Path::new("cfg"));
    }
}
