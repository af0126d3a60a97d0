//! Throttles gating how fast projects start.

use std::time::Duration;

use async_trait::async_trait;
use batchpr_core::ChangelistInformation;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared across workers; implementations must be internally synchronized.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Suspend until the next project may start. Returns early on cancellation.
    async fn wait(&self, cancel: &CancellationToken);

    /// Called after a project finished with a changelist (`Some`) or without
    /// changes (`None`). Must not block.
    fn update_completed(&self, result: Option<&ChangelistInformation>);
}

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRateLimiter;

#[async_trait]
impl RateLimiter for NoRateLimiter {
    async fn wait(&self, _cancel: &CancellationToken) {}

    fn update_completed(&self, _result: Option<&ChangelistInformation>) {}
}

/// At most one project start per `interval`, across all workers.
#[derive(Debug)]
pub struct FixedDelayRateLimiter {
    interval: Duration,
    next_start: Mutex<Option<Instant>>,
}

impl FixedDelayRateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_start: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RateLimiter for FixedDelayRateLimiter {
    async fn wait(&self, cancel: &CancellationToken) {
        let start = {
            let mut next = self.next_start.lock().await;
            let now = Instant::now();
            let start = next.map_or(now, |n| n.max(now));
            *next = Some(start + self.interval);
            start
        };
        tokio::select! {
            _ = tokio::time::sleep_until(start) => {}
            _ = cancel.cancelled() => {}
        }
    }

    fn update_completed(&self, _result: Option<&ChangelistInformation>) {}
}
