//! Shared (`ActivityStats`) and thread-local (`WorkerStats`) bookkeeping for
//! the work-stealing scheduler's exploit/explore/wait phases.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::event_count::EventCount;
use crate::metrics::Metrics;

/// State shared by every worker in a pool: the wake/sleep event-count, the
/// two counters whose transitions govern thief persistence (I1) and
/// wake-on-transition (I2), the stop flag, and the pool's shared metrics
/// block (recorded only when `metrics_enabled` is set, since even an
/// uncontended atomic increment isn't free on the hottest paths).
#[derive(Debug, Default)]
pub struct ActivityStats {
    events: EventCount,
    actives: AtomicUsize,
    thieves: AtomicUsize,
    stops: AtomicBool,
    metrics: Metrics,
    metrics_enabled: bool,
}

impl ActivityStats {
    pub fn new(metrics_enabled: bool) -> Self {
        Self { metrics_enabled, ..Self::default() }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }

    pub fn actives(&self) -> usize {
        self.actives.load(Ordering::Acquire)
    }

    pub fn thieves(&self) -> usize {
        self.thieves.load(Ordering::Acquire)
    }

    pub fn is_stopping(&self) -> bool {
        self.stops.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.stops.store(true, Ordering::Release);
        self.events.notify_all();
    }

    pub(crate) fn events(&self) -> &EventCount {
        &self.events
    }

    pub(crate) fn inc_actives(&self) -> usize {
        self.actives.fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn dec_actives(&self) -> usize {
        self.actives.fetch_sub(1, Ordering::AcqRel)
    }

    pub(crate) fn inc_thieves(&self) -> usize {
        self.thieves.fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn dec_thieves(&self) -> usize {
        self.thieves.fetch_sub(1, Ordering::AcqRel)
    }

    /// Undoes a tentative decrement: I1 requires at least one thief persist
    /// while any worker is active.
    pub(crate) fn restore_thief(&self) {
        self.thieves.fetch_add(1, Ordering::AcqRel);
    }
}

/// Per-worker explore-phase bookkeeping. Thread-local by construction (each
/// worker owns its own `WorkerStats`); never shared, never synchronized.
#[derive(Debug, Clone, Copy)]
pub struct WorkerStats {
    pub steal_bound: u32,
    pub yield_bound: u32,
    pub failed_steals: u32,
    pub yields: u32,
}

impl WorkerStats {
    pub fn new(worker_count: usize) -> Self {
        Self {
            steal_bound: 2 * (worker_count as u32 + 1),
            yield_bound: 100,
            failed_steals: 0,
            yields: 0,
        }
    }

    pub(crate) fn reset_explore(&mut self) {
        self.failed_steals = 0;
        self.yields = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_worker_stats_scale_with_pool_size() {
        let stats = WorkerStats::new(7);
        assert_eq!(stats.steal_bound, 16);
        assert_eq!(stats.yield_bound, 100);
    }

    #[test]
    fn metrics_enabled_flag_is_carried_and_metrics_accessible() {
        let enabled = ActivityStats::new(true);
        assert!(enabled.metrics_enabled());
        enabled.metrics().add_tasks_pushed(1);
        assert_eq!(enabled.metrics().snapshot().tasks_pushed, 1);

        let disabled = ActivityStats::new(false);
        assert!(!disabled.metrics_enabled());
    }

    #[test]
    fn restore_thief_undoes_a_decrement() {
        let stats = ActivityStats::new(false);
        stats.inc_thieves();
        assert_eq!(stats.dec_thieves(), 1);
        assert_eq!(stats.thieves(), 0);
        stats.restore_thief();
        assert_eq!(stats.thieves(), 1);
    }
}
