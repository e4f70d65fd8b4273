//! Cooperative deferral on the ambient tokio runtime.
//!
//! Deferred steps are spawned as tasks, so they run on the next turn of the
//! executor instead of growing the current call stack. Driven by a
//! current-thread runtime this never executes two steps in parallel.

use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Runs `task` on the next turn of the executor.
///
/// Without a runtime the task runs inline.
pub(crate) fn defer<F>(task: F)
where
    F: FnOnce() + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { task() });
        }
        Err(_) => {
            debug!("No tokio runtime available, running deferred step inline");
            task();
        }
    }
}

/// Runs `task` once `delay` has elapsed. Scheduled tasks cannot be cancelled.
///
/// Without a runtime the delay is skipped and the task runs inline.
pub(crate) fn defer_after<F>(delay: Duration, task: F)
where
    F: FnOnce() + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            });
        }
        Err(_) => {
            warn!(
                delay_ms = delay.as_millis() as u64,
                "No tokio runtime available, retrying without delay"
            );
            task();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_defer_without_runtime_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        defer(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_defer_runs_on_next_turn() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        defer(move || flag.store(true, Ordering::SeqCst));
        assert!(!ran.load(Ordering::SeqCst));

        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_after_waits_for_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        defer_after(Duration::from_secs(5), move || flag.store(true, Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!ran.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
