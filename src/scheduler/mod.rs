//! The adaptive work-stealing scheduler (C8): per-worker exploit/explore/wait
//! phases coordinated through a shared master queue and `ActivityStats`.

mod pool;
mod stats;
mod worker;

pub use pool::Pool;
pub use stats::{ActivityStats, WorkerStats};
pub use worker::{exploit_task, explore_task, wait_for_task, worker_loop, WaitOutcome};
