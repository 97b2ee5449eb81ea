//! Monotonic epoch wait/notify primitive used by the scheduler and by the slot
//! state machine's `wait()`.
//!
//! The critical property: `wait(epoch)` re-checks the epoch *after* acquiring
//! the same mutex `notify_*` holds while bumping it, so a notify that lands
//! between the caller's lock-free epoch snapshot and the call to `wait` is
//! never lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct EventCount {
    epoch: AtomicU64,
    gate: Mutex<()>,
    condvar: Condvar,
}

impl EventCount {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            gate: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Snapshot the current epoch. Pair with `wait` to detect intervening notifies.
    #[inline]
    pub fn load(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Block until the epoch differs from `observed`, or until woken spuriously
    /// (callers loop on their own predicate, matching the scheduler's usage).
    pub fn wait(&self, observed: u64) {
        let mut guard = self.gate.lock();
        if self.epoch.load(Ordering::Acquire) != observed {
            return;
        }
        self.condvar.wait(&mut guard);
    }

    /// As `wait`, but gives up after `timeout` and returns whether it was woken.
    pub fn wait_timeout(&self, observed: u64, timeout: Duration) -> bool {
        let mut guard = self.gate.lock();
        if self.epoch.load(Ordering::Acquire) != observed {
            return true;
        }
        !self.condvar.wait_for(&mut guard, timeout).timed_out()
    }

    pub fn notify_one(&self) {
        let _guard = self.gate.lock();
        self.epoch.fetch_add(1, Ordering::Release);
        self.condvar.notify_one();
    }

    pub fn notify_all(&self) {
        let _guard = self.gate.lock();
        self.epoch.fetch_add(1, Ordering::Release);
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_returns_immediately_if_epoch_already_advanced() {
        let ec = EventCount::new();
        let observed = ec.load();
        ec.notify_one();
        // epoch has moved on, wait must return promptly
        ec.wait_timeout(observed, Duration::from_millis(50));
    }

    #[test]
    fn notify_wakes_a_waiting_thread() {
        let ec = Arc::new(EventCount::new());
        let observed = ec.load();
        let waiter = {
            let ec = Arc::clone(&ec);
            thread::spawn(move || {
                ec.wait(observed);
            })
        };
        thread::sleep(Duration::from_millis(20));
        ec.notify_all();
        waiter.join().unwrap();
    }

    #[test]
    fn wait_timeout_expires_without_notify() {
        let ec = EventCount::new();
        let observed = ec.load();
        assert!(!ec.wait_timeout(observed, Duration::from_millis(20)));
    }
}
