/*!
 * Per-run mutable state shared by the dispatch loop and item workers.
 */

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::profile::ProviderProfile;

/// Limits and cancellation of one queue run.
///
/// `concurrency_limit` only decreases and `dispatch_delay` only increases
/// for the lifetime of the instance; every run gets a fresh one.
#[derive(Debug)]
pub struct QueueRunState {
    concurrency_limit: AtomicUsize,
    dispatch_delay_ms: AtomicU64,
    cancel: CancellationToken,
}

/// Copy of the run limits at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStateSnapshot {
    pub concurrency_limit: usize,
    pub dispatch_delay: Duration,
    pub cancelled: bool,
}

impl QueueRunState {
    pub fn new(profile: &ProviderProfile) -> Self {
        Self::with_cancel_token(profile, CancellationToken::new())
    }

    /// State whose cancellation is driven by an existing token
    pub fn with_cancel_token(profile: &ProviderProfile, cancel: CancellationToken) -> Self {
        Self {
            concurrency_limit: AtomicUsize::new(profile.max_concurrent_requests.max(1)),
            dispatch_delay_ms: AtomicU64::new(profile.dispatch_delay.as_millis() as u64),
            cancel,
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit.load(Ordering::SeqCst)
    }

    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms.load(Ordering::SeqCst))
    }

    /// Tighten the limits. Looser values than the current ones are ignored.
    pub fn throttle(&self, concurrency_limit: usize, dispatch_delay: Duration) -> RunStateSnapshot {
        self.concurrency_limit.fetch_min(concurrency_limit.max(1), Ordering::SeqCst);
        self.dispatch_delay_ms.fetch_max(dispatch_delay.as_millis() as u64, Ordering::SeqCst);
        self.snapshot()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Sleep for `duration`; returns false if the run was cancelled first
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.cancel.cancelled() => false,
        }
    }

    pub fn snapshot(&self) -> RunStateSnapshot {
        RunStateSnapshot {
            concurrency_limit: self.concurrency_limit(),
            dispatch_delay: self.dispatch_delay(),
            cancelled: self.is_cancelled(),
        }
    }
}
