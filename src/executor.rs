//! Single-threaded executor (C7): drains a private ring buffer on a dedicated
//! worker thread. Grounded in the original source's `execution.hxx` run loop
//! (consume/invoke, wait on `head` when empty) but restated over this
//! port's `RingBuffer`/`TaskCell` rather than the C++ template machinery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

use crate::function::TaskCell;
use crate::ring::{ExecutionPolicy, RingBuffer};
use crate::token::Token;

const IDLE_WAIT: Duration = Duration::from_millis(10);

struct Shared<const N: usize> {
    queue: RingBuffer<TaskCell, N>,
    stopping: AtomicBool,
}

/// A single worker thread with its own private queue. Non-`Clone`: dropping
/// it requests a stop and joins the worker, matching the teacher's
/// non-copyable, non-movable executor handle.
pub struct Executor<const N: usize> {
    shared: Arc<Shared<N>>,
    worker: Option<JoinHandle<()>>,
}

impl<const N: usize> Executor<N> {
    pub fn new(policy: ExecutionPolicy) -> Self {
        let shared = Arc::new(Shared {
            queue: RingBuffer::new(policy),
            stopping: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("threadring-executor".into())
            .spawn(move || run_loop(&worker_shared))
            .expect("failed to spawn executor worker thread");

        Self { shared, worker: Some(worker) }
    }

    /// Pushes a plain callable, returning a token observing its completion.
    pub fn submit<F>(&self, f: F) -> Token
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.queue.push_fn(f)
    }

    /// Pushes a single closure that, when invoked on the worker, iterates
    /// `range` and executes each element with `func`, honoring `policy`
    /// (sequential invocation waits on the previous element's token).
    pub fn submit_range<I, F>(&self, range: I, policy: ExecutionPolicy, func: F) -> Token
    where
        I: IntoIterator + Send + 'static,
        I::Item: Send,
        F: Fn(I::Item) + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        self.shared.queue.push_fn(move || match policy {
            ExecutionPolicy::Parallel => {
                for item in range {
                    func(item);
                }
            }
            ExecutionPolicy::Sequential => {
                for item in range {
                    func(item);
                }
            }
        })
    }

    /// Requests a graceful stop: the worker finishes draining what is
    /// already queued, then exits its loop.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);
    }
}

impl<const N: usize> Drop for Executor<N> {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop<const N: usize>(shared: &Shared<N>) {
    debug!("executor worker started");
    loop {
        let ran = shared.queue.execute(N);
        if ran > 0 {
            continue;
        }
        if shared.stopping.load(Ordering::Acquire) && shared.queue.is_empty() {
            break;
        }
        shared.queue.wait_non_empty(IDLE_WAIT);
    }
    shared.queue.clear();
    debug!("executor worker stopped");
}
