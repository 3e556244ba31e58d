//! Bounded waits used by transport sessions

use crate::error::{DynSecError, WaitStage};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// A bounded wait for one stage of a transport session.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    stage: WaitStage,
    duration: Duration,
}

impl TimeoutPolicy {
    /// Create a timeout policy. Panics if duration is zero or `Duration::MAX`.
    pub fn new(stage: WaitStage, duration: Duration) -> Self {
        assert!(
            duration > Duration::ZERO && duration < Duration::MAX,
            "timeout duration must be non-zero and finite",
        );
        Self { stage, duration }
    }

    /// Inspect the configured timeout duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Stage this policy bounds.
    pub fn stage(&self) -> WaitStage {
        self.stage
    }

    /// Run `operation`, mapping expiry to `DynSecError::Timeout`.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, DynSecError>
    where
        Fut: Future<Output = Result<T, DynSecError>>,
        Op: FnOnce() -> Fut,
    {
        let start = Instant::now();

        match tokio::time::timeout(self.duration, operation()).await {
            Ok(result) => result,
            Err(_) => Err(DynSecError::Timeout {
                stage: self.stage,
                elapsed: start.elapsed(),
                limit: self.duration,
            }),
        }
    }
}
