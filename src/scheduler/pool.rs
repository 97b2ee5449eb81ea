//! A fixed-size pool of work-stealing worker threads (C8), wiring together
//! `ActivityStats`, a shared master queue, and one local deque per worker.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use super::stats::{ActivityStats, WorkerStats};
use super::worker::worker_loop;
use crate::affinity;
use crate::error::PoolError;
use crate::function::TaskCell;
use crate::metrics::MetricsSnapshot;
use crate::ring::{ExecutionPolicy, RingBuffer};
use crate::rng::Xoshiro256ss;
use crate::token::Token;

/// `NL` is the capacity of each worker's private local deque; `NM` is the
/// capacity of the shared master queue that producers push onto.
pub struct Pool<const NL: usize, const NM: usize> {
    stats: Arc<ActivityStats>,
    master: Arc<RingBuffer<TaskCell, NM>>,
    locals: Vec<Arc<RingBuffer<TaskCell, NL>>>,
    workers: Vec<JoinHandle<()>>,
}

impl<const NL: usize, const NM: usize> Pool<NL, NM> {
    pub fn try_new(worker_count: usize, enable_affinity: bool, enable_metrics: bool) -> Result<Self, PoolError> {
        if worker_count == 0 {
            return Err(PoolError::ZeroWorkers);
        }

        let stats = Arc::new(ActivityStats::new(enable_metrics));
        let master: Arc<RingBuffer<TaskCell, NM>> = Arc::new(RingBuffer::new(ExecutionPolicy::Parallel));
        let locals: Vec<Arc<RingBuffer<TaskCell, NL>>> = (0..worker_count)
            .map(|_| Arc::new(RingBuffer::new(ExecutionPolicy::Parallel)))
            .collect();

        let mut workers = Vec::with_capacity(worker_count);
        for idx in 0..worker_count {
            let stats = Arc::clone(&stats);
            let master = Arc::clone(&master);
            let local = Arc::clone(&locals[idx]);
            let all_locals = locals.clone();

            let handle = std::thread::Builder::new()
                .name(format!("threadring-worker-{idx}"))
                .spawn(move || {
                    if enable_affinity {
                        if let Err(err) = affinity::pin_to_core(idx) {
                            warn!(core = idx, error = %err, "failed to pin worker thread to core");
                        }
                    }

                    let siblings: Vec<&RingBuffer<TaskCell, NL>> = all_locals
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != idx)
                        .map(|(_, ring)| ring.as_ref())
                        .collect();

                    let mut worker_stats = WorkerStats::new(all_locals.len());
                    let mut rng = Xoshiro256ss::new(0x9E37_79B9_7F4A_7C15 ^ idx as u64);
                    worker_loop(&stats, &mut worker_stats, &local, &master, &siblings, &mut rng);
                })
                .map_err(PoolError::SpawnFailed)?;
            workers.push(handle);
        }

        info!(worker_count, "scheduler pool started");
        Ok(Self { stats, master, locals, workers })
    }

    /// Pushes a callable onto the shared master queue, waking a thief if
    /// the pool is currently fully idle.
    pub fn submit<F>(&self, f: F) -> Token
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.master.push_fn(f);
        if self.stats.metrics_enabled() {
            self.stats.metrics().add_tasks_pushed(1);
        }
        self.stats.events().notify_all();
        token
    }

    /// As `submit`, rebinding an existing token instead of allocating one.
    pub fn submit_with<F>(&self, token: &Token, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.master.push_fn_with(token, f);
        if self.stats.metrics_enabled() {
            self.stats.metrics().add_tasks_pushed(1);
        }
        self.stats.events().notify_all();
    }

    pub fn worker_count(&self) -> usize {
        self.locals.len()
    }

    pub fn stats(&self) -> &ActivityStats {
        &self.stats
    }

    /// A point-in-time copy of this pool's metrics, zeroed throughout if
    /// the pool was constructed with `enable_metrics: false`.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.stats.metrics().snapshot()
    }
}

impl<const NL: usize, const NM: usize> Drop for Pool<NL, NM> {
    fn drop(&mut self) {
        info!("scheduler pool stop requested");
        self.stats.request_stop();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        info!("scheduler pool: all workers joined");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn zero_workers_is_rejected() {
        let pool: Result<Pool<64, 64>, _> = Pool::try_new(0, false, false);
        assert!(matches!(pool, Err(PoolError::ZeroWorkers)));
    }

    #[test]
    fn submitted_tasks_complete_and_actives_settle_to_zero() {
        let pool: Pool<64, 1024> = Pool::try_new(4, false, false).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tokens = Vec::new();
        for _ in 0..2000 {
            let c = Arc::clone(&counter);
            tokens.push(pool.submit(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for token in &tokens {
            token.wait();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2000);
    }

    #[test]
    fn metrics_are_recorded_when_enabled() {
        let pool: Pool<64, 1024> = Pool::try_new(2, false, true).unwrap();
        let mut tokens = Vec::new();
        for _ in 0..500 {
            tokens.push(pool.submit(|| {}));
        }
        for token in &tokens {
            token.wait();
        }
        let snapshot = pool.metrics();
        assert_eq!(snapshot.tasks_pushed, 500);
        assert_eq!(snapshot.tasks_executed, 500);
    }

    #[test]
    fn metrics_stay_zero_when_disabled() {
        let pool: Pool<64, 1024> = Pool::try_new(2, false, false).unwrap();
        let token = pool.submit(|| {});
        token.wait();
        let snapshot = pool.metrics();
        assert_eq!(snapshot.tasks_pushed, 0);
        assert_eq!(snapshot.tasks_executed, 0);
    }
}
