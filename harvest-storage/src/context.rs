//! Per-operation deadline and cancellation.

use std::future::{pending, Future};
use std::time::Duration;

use harvest_core::{HarvestError, HarvestResult};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Deadline and cancellation signal carried by every I/O-bound operation.
///
/// Cancellation is a `watch` channel whose value flips to `true`; a dropped
/// sender never cancels. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl OpContext {
    /// No deadline, no cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Attach a cancellation signal.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` without one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fail fast if the operation should not start.
    pub fn check(&self, operation: &str) -> HarvestResult<()> {
        if self.is_cancelled() {
            return Err(HarvestError::Cancelled {
                operation: operation.to_string(),
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(HarvestError::DeadlineExceeded {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Drive `work` to completion unless the context is cancelled or its
    /// deadline passes first; `work` is dropped in that case.
    pub async fn run<F, T>(&self, operation: &str, work: F) -> HarvestResult<T>
    where
        F: Future<Output = HarvestResult<T>>,
    {
        self.check(operation)?;
        self.race(operation, work).await
    }

    /// Like [`OpContext::run`] without the up-front [`OpContext::check`].
    ///
    /// An interruption returned from here means `work` had started and was
    /// abandoned part way. A write it had already sent may still be applied
    /// by the store.
    pub async fn race<F, T>(&self, operation: &str, work: F) -> HarvestResult<T>
    where
        F: Future<Output = HarvestResult<T>>,
    {
        let cancelled = wait_cancelled(self.cancel.clone());
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            result = work => result,
            _ = cancelled => Err(HarvestError::Cancelled {
                operation: operation.to_string(),
            }),
            _ = expired => Err(HarvestError::DeadlineExceeded {
                operation: operation.to_string(),
            }),
        }
    }
}

async fn wait_cancelled(cancel: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel else {
        return pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return pending().await;
        }
    }
}
