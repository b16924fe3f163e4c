//! Cooperative cancellation for the cell workers.
//!
//! A single [`ShutdownSignal`] is shared by every worker of one run. Workers
//! sleep on its condition variable, so cancelling wakes all of them at once
//! instead of waiting out their delays. [`LiveWorkers`] counts workers that have
//! not exited yet and lets the controller wait for them with a deadline.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Returned by [`ShutdownSignal::sleep`] when the run was cancelled.
/// This is how a worker learns it must exit; it is never shown to the user.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cancellation observed")]
pub struct CancellationObserved;

#[derive(Debug, Default)]
pub struct ShutdownSignal {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A worker that panicked while holding the lock leaves plain data behind.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation and wakes every sleeper.
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn cancel(&self) -> bool {
        let mut cancelled = lock(&self.cancelled);
        if *cancelled {
            return false;
        }
        *cancelled = true;
        self.wake.notify_all();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.cancelled)
    }

    /// Sleeps for `duration` unless cancelled first.
    pub fn sleep(&self, duration: Duration) -> Result<(), CancellationObserved> {
        let guard = lock(&self.cancelled);
        let (guard, _timeout) = self
            .wake
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        if *guard {
            Err(CancellationObserved)
        } else {
            Ok(())
        }
    }
}

/// Number of workers that have been registered and have not exited yet.
#[derive(Debug, Default)]
pub struct LiveWorkers {
    count: Mutex<usize>,
    drained: Condvar,
}

/// Held by one worker for its whole life. Dropping it, on a normal return
/// or while unwinding from a panic, marks the worker as gone.
#[derive(Debug)]
pub struct LiveGuard {
    live: Arc<LiveWorkers>,
}

impl LiveWorkers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers one more worker.
    pub fn enter(self: &Arc<Self>) -> LiveGuard {
        *lock(&self.count) += 1;
        LiveGuard { live: Arc::clone(self) }
    }

    pub fn count(&self) -> usize {
        *lock(&self.count)
    }

    /// Waits until every worker has exited or `timeout` elapses.
    /// Returns how many workers are still alive.
    pub fn wait_drained(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut count = lock(&self.count);
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            count = self
                .drained
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *count
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut count = lock(&self.live.count);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.live.drained.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sleep_completes_without_cancel() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        assert_eq!(signal.sleep(Duration::from_millis(20)), Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_sleepers_early() {
        let signal = Arc::new(ShutdownSignal::new());
        let sleepers: Vec<_> = (0..8)
            .map(|_| {
                let signal = Arc::clone(&signal);
                thread::spawn(move || {
                    let start = Instant::now();
                    let result = signal.sleep(Duration::from_secs(30));
                    (result, start.elapsed())
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert!(signal.cancel());

        for sleeper in sleepers {
            let (result, elapsed) = sleeper.join().unwrap();
            assert_eq!(result, Err(CancellationObserved));
            assert!(elapsed < Duration::from_secs(10));
        }
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let signal = ShutdownSignal::new();
        assert!(signal.cancel());
        assert!(!signal.cancel());
        assert!(signal.is_cancelled());
        // Already cancelled: no waiting at all
        assert_eq!(signal.sleep(Duration::from_secs(30)), Err(CancellationObserved));
    }

    #[test]
    fn test_live_workers_drain() {
        let live = LiveWorkers::new();
        let guards: Vec<_> = (0..3).map(|_| live.enter()).collect();
        assert_eq!(live.count(), 3);
        assert_eq!(live.wait_drained(Duration::from_millis(10)), 3);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(guards);
        });
        assert_eq!(live.wait_drained(Duration::from_secs(10)), 0);
        handle.join().unwrap();
    }

    #[test]
    fn test_guard_released_on_panic() {
        let live = LiveWorkers::new();
        let guard = live.enter();
        let result = thread::spawn(move || {
            let _guard = guard;
            panic!("worker failure");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(live.count(), 0);
    }
}
