//! Periodic background tasks.
//!
//! Safety: each `PeriodicTask` spawns exactly one thread that is shut down
//! when the task is dropped, preventing thread leaks. The wait between ticks
//! goes through a `CancelToken`, so stopping is prompt rather than waiting
//! out the period.

use spectrod_traits::CancelToken;
use std::time::Duration;

pub struct PeriodicTask {
    cancel: CancelToken,
    join_handle: Option<std::thread::JoinHandle<()>>,
    name: &'static str,
}

impl PeriodicTask {
    /// Run `tick` every `period` until it returns `false` or the task is
    /// stopped. The first tick fires after one period, not immediately.
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let cancel = CancelToken::new();
        let cancel_clone = cancel.clone();
        let join_handle = std::thread::spawn(move || {
            loop {
                if cancel_clone.wait_timeout(period) {
                    tracing::debug!(task = name, "periodic task received shutdown signal");
                    break;
                }
                if !tick() {
                    tracing::debug!(task = name, "periodic task finished itself");
                    break;
                }
            }
            tracing::trace!(task = name, "periodic task exiting cleanly");
        });
        Self {
            cancel,
            join_handle: Some(join_handle),
            name,
        }
    }

    /// Signal shutdown and join. Also runs on drop; explicit calls make the
    /// teardown order visible at the call site.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!(task = self.name, "periodic task joined"),
                Err(e) => {
                    tracing::warn!(task = self.name, ?e, "periodic task panicked during shutdown");
                }
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[test]
    fn ticks_repeatedly_until_stopped() {
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        let mut task = PeriodicTask::spawn("test-tick", Duration::from_millis(5), move || {
            hits_clone.fetch_add(1, Ordering::Relaxed);
            true
        });
        std::thread::sleep(Duration::from_millis(60));
        task.stop();
        let seen = hits.load(Ordering::Relaxed);
        assert!(seen >= 2, "expected several ticks, saw {seen}");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::Relaxed), seen, "ticks after stop");
    }

    #[test]
    fn callback_false_ends_the_task() {
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = hits.clone();
        let _task = PeriodicTask::spawn("one-shot", Duration::from_millis(2), move || {
            hits_clone.fetch_add(1, Ordering::Relaxed);
            false
        });
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn stop_returns_well_before_the_period_elapses() {
        let mut task = PeriodicTask::spawn("slow", Duration::from_secs(30), || true);
        let started = Instant::now();
        task.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
