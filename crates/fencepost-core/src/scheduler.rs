//! Deferred, cancellable work.
//!
//! The presence engine schedules its auto-logout through [`Scheduler`] so the
//! timer can be driven by a paused Tokio clock in tests.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Work run once when a deferral elapses.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs a task after a delay unless cancelled first.
///
/// Implementations must not run the task on the calling thread before
/// `schedule_after` returns, even for a zero delay.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `task` once after `delay`.
    fn schedule_after(&self, delay: Duration, task: Task) -> CancelToken;
}

/// Cancels a scheduled task.
///
/// Cancellation is idempotent and has no effect once the task has started.
pub struct CancelToken {
    settled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl CancelToken {
    /// A token not yet attached to any task.
    #[must_use]
    pub fn new() -> Self {
        Self {
            settled: Arc::new(AtomicBool::new(false)),
            abort: None,
        }
    }

    /// Claim the right to run. Returns `false` if already cancelled or run.
    ///
    /// Scheduler implementations call this immediately before running the task.
    #[must_use]
    pub fn claim(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }

    /// A handle sharing this token's state, for the scheduler side.
    #[must_use]
    pub fn share(&self) -> Self {
        Self {
            settled: Arc::clone(&self.settled),
            abort: None,
        }
    }

    /// Attach the handle of the task backing this token.
    #[must_use]
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Prevent the task from running if it has not started.
    pub fn cancel(&self) {
        if !self.settled.swap(true, Ordering::AcqRel) {
            if let Some(abort) = &self.abort {
                abort.abort();
            }
        }
    }

    /// Whether the task was cancelled or has already been claimed to run.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("settled", &self.is_settled())
            .finish_non_exhaustive()
    }
}

/// [`Scheduler`] backed by Tokio timers.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Schedule onto the given runtime.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedule onto the runtime this is called from, if any.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) -> CancelToken {
        let token = CancelToken::new();
        let guard = token.share();

        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if guard.claim() {
                task();
            }
        });

        token.with_abort(join.abort_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_once_after_delay() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let token = scheduler.schedule_after(Duration::from_secs(300), counting_task(&fired));

        tokio::time::advance(Duration::from_secs(299)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(token.is_settled());

        // Cancelling after the fact is a no-op.
        token.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_runs() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let token = scheduler.schedule_after(Duration::from_secs(10), counting_task(&fired));
        token.cancel();
        token.cancel();

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let token = CancelToken::new();
        let shared = token.share();
        assert!(shared.claim());
        assert!(!token.claim());
        assert!(token.is_settled());
    }

    #[test]
    fn test_no_runtime_outside_tokio() {
        assert!(TokioScheduler::try_current().is_none());
    }
}
