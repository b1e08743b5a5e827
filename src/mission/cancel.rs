use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::MissionError;

#[derive(Default)]
struct CancelInner {
    cancelled: Mutex<bool>,
    changed: Condvar,
}

/// Cooperative stop request for one mission run. Phases check it at every
/// point where they block.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    pub fn check(&self) -> Result<(), MissionError> {
        if self.is_cancelled() {
            Err(MissionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns false if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self.inner.changed.wait_until(&mut cancelled, deadline).timed_out() {
                return !*cancelled;
            }
        }
        false
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            self.inner.changed.wait(&mut cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn sleep_runs_to_completion_when_not_cancelled() {
        let cancel = CancelToken::new();
        assert!(cancel.sleep(Duration::from_millis(5)));
        assert!(cancel.check().is_ok());
    }

    #[test]
    fn cancel_cuts_sleep_short() {
        let cancel = CancelToken::new();
        let sleeper = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                let started = Instant::now();
                (cancel.sleep(Duration::from_secs(30)), started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        cancel.cancel();

        let (completed, slept) = sleeper.join().unwrap();
        assert!(!completed);
        assert!(slept < Duration::from_secs(10));
        assert!(matches!(cancel.check(), Err(MissionError::Cancelled)));
    }

    #[test]
    fn wait_returns_once_cancelled() {
        let cancel = CancelToken::new();
        let waiter = {
            let cancel = cancel.clone();
            thread::spawn(move || cancel.wait())
        };
        cancel.cancel();
        waiter.join().unwrap();
        assert!(!cancel.sleep(Duration::from_secs(1)));
    }
}
