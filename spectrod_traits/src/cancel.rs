//! Cancellation token shared between the capture loop and command handlers.
//!
//! A `CancelToken` is cloned into every blocking wait so that `deactivate`,
//! `reset`, and process shutdown can make a pending `wait_for_frame` return
//! promptly instead of waiting for a frame that will never arrive.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the cancellation signal and wake every waiter.
    pub fn cancel(&self) {
        if let Ok(mut flag) = self.inner.cancelled.lock() {
            *flag = true;
        }
        self.inner.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner
            .cancelled
            .lock()
            .map(|g| *g)
            .unwrap_or(true)
    }

    /// Re-arm the token for a fresh capture cycle.
    pub fn reset(&self) {
        if let Ok(mut flag) = self.inner.cancelled.lock() {
            *flag = false;
        }
    }

    /// Sleep up to `timeout`, returning early if cancelled. Returns `true`
    /// when the token is cancelled. A poisoned lock reads as cancelled so
    /// waiters never spin on a broken token.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Ok(mut flag) = self.inner.cancelled.lock() else {
            return true;
        };
        // Condvar waits can wake spuriously; re-check with a deadline.
        let deadline = std::time::Instant::now() + timeout;
        while !*flag {
            let now = std::time::Instant::now();
            let Some(remaining) = deadline.checked_duration_since(now) else {
                return false;
            };
            match self.inner.cond.wait_timeout(flag, remaining) {
                Ok((g, wait)) => {
                    flag = g;
                    if wait.timed_out() && !*flag {
                        return false;
                    }
                }
                Err(_) => return true,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn uncancelled_wait_times_out() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn cancel_wakes_waiter_promptly() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(10));
        token.cancel();
        let start = Instant::now();
        assert!(handle.join().unwrap_or(false));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn reset_rearms_token() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!token.is_cancelled());
    }
}
