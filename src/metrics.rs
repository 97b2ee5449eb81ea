//! Atomic counters for the scheduler and ring buffers, and a plain-data
//! snapshot of them. Authored fresh: the teacher's own `metrics.rs` predates
//! the atomic-counter calls its `ring.rs` makes and does not match them, so
//! it is not a usable template verbatim, only for the general idiom (plain
//! `u64` counters, a `Default`-derived snapshot struct).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    tasks_pushed: AtomicU64,
    tasks_executed: AtomicU64,
    steals_attempted: AtomicU64,
    steals_succeeded: AtomicU64,
    worker_parks: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tasks_pushed: u64,
    pub tasks_executed: u64,
    pub steals_attempted: u64,
    pub steals_succeeded: u64,
    pub worker_parks: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_tasks_pushed(&self, n: u64) {
        self.tasks_pushed.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_tasks_executed(&self, n: u64) {
        self.tasks_executed.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_steal_attempt(&self, succeeded: bool) {
        self.steals_attempted.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.steals_succeeded.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_worker_park(&self) {
        self.worker_parks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_pushed: self.tasks_pushed.load(Ordering::Relaxed),
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            steals_attempted: self.steals_attempted.load(Ordering::Relaxed),
            steals_succeeded: self.steals_succeeded.load(Ordering::Relaxed),
            worker_parks: self.worker_parks.load(Ordering::Relaxed),
        }
    }
}
