//! The three-phase worker loop: exploit the local deque, explore by
//! stealing, or wait on the shared event-count. Implements only the
//! published `exploit_task`/`explore_task`/`wait_for_task` form; the
//! alternative hand-rolled state-machine variant is intentionally not
//! ported (see `DESIGN.md`).

use std::time::Duration;

use tracing::trace;

use super::stats::{ActivityStats, WorkerStats};
use crate::function::TaskCell;
use crate::ring::RingBuffer;
use crate::rng::{bounded, Xoshiro256ss};

/// How long a worker blocks on the event-count between retries of
/// `wait_for_task`'s outer loop. Bounded so a `request_stop()` racing with a
/// worker already inside `wait` is noticed promptly rather than left parked.
const WAIT_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    HaveTask,
    Stop,
}

/// Phase 1: drain the local deque LIFO, tracking active/thief transitions.
///
/// Precondition: the local deque already holds at least one task (the one
/// that `wait_for_task` just stole into it).
pub fn exploit_task<const NL: usize>(stats: &ActivityStats, local: &RingBuffer<TaskCell, NL>) {
    let prev_actives = stats.inc_actives();
    if prev_actives == 0 && stats.thieves() == 0 {
        trace!("exploit: waking a thief on 0->1 actives transition");
        stats.events().notify_one();
    }

    let mut ran = 0u64;
    while local.try_pop_back_and_invoke() {
        ran += 1;
    }
    if stats.metrics_enabled() && ran > 0 {
        stats.metrics().add_tasks_executed(ran);
    }

    stats.dec_actives();
}

/// Phase 2: try to steal a task into `local`, first from the master queue,
/// then from a random sibling. Returns `true` on success.
pub fn explore_task<const NL: usize, const NM: usize>(
    stats: &ActivityStats,
    worker: &mut WorkerStats,
    local: &RingBuffer<TaskCell, NL>,
    master: &RingBuffer<TaskCell, NM>,
    siblings: &[&RingBuffer<TaskCell, NL>],
    rng: &mut Xoshiro256ss,
) -> bool {
    worker.reset_explore();
    loop {
        let stole_from_master = master.try_steal_into(local);
        if stats.metrics_enabled() {
            stats.metrics().add_steal_attempt(stole_from_master);
        }
        if stole_from_master {
            return true;
        }
        if !siblings.is_empty() {
            let victim = bounded(rng, 0, siblings.len() as u64 - 1) as usize;
            let stole_from_sibling = siblings[victim].try_steal_into(local);
            if stats.metrics_enabled() {
                stats.metrics().add_steal_attempt(stole_from_sibling);
            }
            if stole_from_sibling {
                return true;
            }
        }

        worker.failed_steals += 1;
        if worker.failed_steals >= worker.steal_bound {
            std::thread::yield_now();
            worker.failed_steals = 0;
            worker.yields += 1;
            if worker.yields >= worker.yield_bound {
                return false;
            }
        }
    }
}

/// Phase 3: having failed to find work, park or keep probing per I1/I2/I3.
pub fn wait_for_task<const NL: usize, const NM: usize>(
    stats: &ActivityStats,
    worker: &mut WorkerStats,
    local: &RingBuffer<TaskCell, NL>,
    master: &RingBuffer<TaskCell, NM>,
    siblings: &[&RingBuffer<TaskCell, NL>],
    rng: &mut Xoshiro256ss,
) -> WaitOutcome {
    loop {
        stats.inc_thieves();
        loop {
            if explore_task(stats, worker, local, master, siblings, rng) {
                if stats.dec_thieves() == 1 {
                    stats.events().notify_one();
                }
                return WaitOutcome::HaveTask;
            }

            // I3: snapshot the epoch only after exploration failed, and
            // before the master-queue check below, so any task committed
            // after this point is guaranteed to bump the epoch.
            let epoch = stats.events().load();

            if !master.is_empty() && master.try_steal_into(local) {
                if stats.dec_thieves() == 1 {
                    stats.events().notify_one();
                }
                return WaitOutcome::HaveTask;
            }

            if stats.is_stopping() {
                stats.events().notify_all();
                stats.dec_thieves();
                return WaitOutcome::Stop;
            }

            let prev_thieves = stats.dec_thieves();
            if prev_thieves == 1 && stats.actives() > 0 {
                // I1: the last thief must persist while anyone is active.
                stats.restore_thief();
                continue;
            }

            if stats.metrics_enabled() {
                stats.metrics().add_worker_park();
            }
            stats.events().wait_timeout(epoch, WAIT_TIMEOUT);
            break;
        }
    }
}

/// `stolen = nil; forever { if !wait_for_task(stolen) break; exploit(stolen); }`
pub fn worker_loop<const NL: usize, const NM: usize>(
    stats: &ActivityStats,
    worker: &mut WorkerStats,
    local: &RingBuffer<TaskCell, NL>,
    master: &RingBuffer<TaskCell, NM>,
    siblings: &[&RingBuffer<TaskCell, NL>],
    rng: &mut Xoshiro256ss,
) {
    loop {
        match wait_for_task(stats, worker, local, master, siblings, rng) {
            WaitOutcome::HaveTask => exploit_task(stats, local),
            WaitOutcome::Stop => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::ExecutionPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn explore_steals_from_master_when_siblings_empty() {
        let stats = ActivityStats::new(true);
        let master: RingBuffer<TaskCell, 8> = RingBuffer::new(ExecutionPolicy::Parallel);
        let local: RingBuffer<TaskCell, 8> = RingBuffer::new(ExecutionPolicy::Parallel);
        let ran = std::sync::Arc::new(AtomicUsize::new(0));
        let r = std::sync::Arc::clone(&ran);
        master.push_fn(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });

        let mut worker = WorkerStats::new(1);
        let mut rng = Xoshiro256ss::new(1);
        assert!(explore_task(&stats, &mut worker, &local, &master, &[], &mut rng));
        assert!(local.try_pop_back_and_invoke());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(stats.metrics().snapshot().steals_succeeded, 1);
    }

    #[test]
    fn explore_gives_up_after_yield_bound() {
        let stats = ActivityStats::new(false);
        let master: RingBuffer<TaskCell, 8> = RingBuffer::new(ExecutionPolicy::Parallel);
        let local: RingBuffer<TaskCell, 8> = RingBuffer::new(ExecutionPolicy::Parallel);
        let mut worker = WorkerStats::new(1);
        worker.yield_bound = 1;
        worker.steal_bound = 1;
        let mut rng = Xoshiro256ss::new(2);
        assert!(!explore_task(&stats, &mut worker, &local, &master, &[], &mut rng));
    }

    #[test]
    fn wait_for_task_returns_stop_when_requested() {
        let stats = ActivityStats::new(false);
        let master: RingBuffer<TaskCell, 8> = RingBuffer::new(ExecutionPolicy::Parallel);
        let local: RingBuffer<TaskCell, 8> = RingBuffer::new(ExecutionPolicy::Parallel);
        let mut worker = WorkerStats::new(1);
        worker.yield_bound = 1;
        worker.steal_bound = 1;
        let mut rng = Xoshiro256ss::new(3);
        stats.request_stop();
        let outcome = wait_for_task(&stats, &mut worker, &local, &master, &[], &mut rng);
        assert_eq!(outcome, WaitOutcome::Stop);
        assert_eq!(stats.thieves(), 0);
    }

    #[test]
    fn wait_for_task_finds_a_task_committed_after_it_starts_waiting() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let stats = Arc::new(ActivityStats::new(false));
        let master: Arc<RingBuffer<TaskCell, 8>> = Arc::new(RingBuffer::new(ExecutionPolicy::Parallel));
        let local: Arc<RingBuffer<TaskCell, 8>> = Arc::new(RingBuffer::new(ExecutionPolicy::Parallel));

        let master_producer = Arc::clone(&master);
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            master_producer.push_fn(|| {});
        });

        let mut worker = WorkerStats::new(1);
        worker.yield_bound = 2;
        worker.steal_bound = 1;
        let mut rng = Xoshiro256ss::new(4);
        let outcome = wait_for_task(&stats, &mut worker, &local, &master, &[], &mut rng);
        assert_eq!(outcome, WaitOutcome::HaveTask);
        producer.join().unwrap();
    }

    #[test]
    fn exploit_drains_local_deque_and_restores_actives() {
        let stats = ActivityStats::new(true);
        let local: RingBuffer<TaskCell, 8> = RingBuffer::new(ExecutionPolicy::Parallel);
        let ran = std::sync::Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let r = std::sync::Arc::clone(&ran);
            local.push_fn(move || {
                r.fetch_add(1, Ordering::SeqCst);
            });
        }
        exploit_task(&stats, &local);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(stats.actives(), 0);
        assert_eq!(stats.metrics().snapshot().tasks_executed, 3);
    }
}
