//! Batch execution: apply one updater to many projects.
//!
//! - [`updater`]: the [`ProjectUpdater`] contract
//! - [`runner`]: [`BatchProjectUpdater`], the bounded worker pool
//! - [`rate_limit`]: throttles between project starts
//! - [`error`]: [`RunnerError`]

pub mod error;
pub mod rate_limit;
pub mod runner;
pub mod updater;

pub use error::RunnerError;
pub use rate_limit::{FixedDelayRateLimiter, NoRateLimiter, RateLimiter};
pub use runner::{BatchOptions, BatchProjectUpdater, ProjectOutcome, RunSummary};
pub use updater::{ProjectUpdater, ProjectUpdaterContext};
