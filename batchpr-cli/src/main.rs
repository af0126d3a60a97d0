//! batchpr: apply one automated change to many repositories.
//!
//! # Usage
//!
//! ```text
//! batchpr run --config <file> [--parallelism N] [--max-projects N]
//! batchpr status --state <file> [--json]
//! batchpr errors --state <file>
//! ```
//!
//! Logs go to stderr. `RUST_LOG` controls the filter (default `info`);
//! `--log-json` switches to JSON lines.

mod commands;
mod config;
mod updaters;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{errors::ErrorsArgs, run::RunArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "batchpr",
    version,
    about = "Apply an automated change to many repositories and open pull requests",
    long_about = None,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the configured updater over every configured project.
    Run(RunArgs),

    /// Show the per-project outcomes recorded in a run-state file.
    Status(StatusArgs),

    /// Print every error recorded in a run-state file.
    Errors(ErrorsArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run(args) => args.run().await,
        Commands::Status(args) => args.run().await.map(|()| ExitCode::SUCCESS),
        Commands::Errors(args) => args.run().await,
    }
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
