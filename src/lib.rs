//! threadring - a lock-free MPMC ring buffer and an adaptive work-stealing
//! task scheduler built on top of it.
//!
//! Each slot in a [`RingBuffer`] cycles through `empty -> claimed -> active
//! -> empty`, handed off between exactly one producer and one consumer at a
//! time via a compact atomic bitfield ([`slot::SlotState`]). Three
//! monotonically increasing indices (`tail <= head <= next`) give O(1) MPMC
//! push and wait-free FIFO drain without a global lock.
//!
//! The [`scheduler`] module layers an adaptive work-stealing pool on top:
//! each worker owns a private local deque and cooperates with its siblings
//! through a shared master queue and an event-count, exploiting its own
//! queue LIFO and exploring by stealing FIFO from others.
//!
//! # Example
//!
//! ```
//! use threadring::{spawn, ExecutionPolicy, RingBuffer};
//!
//! let token = spawn(|| {
//!     println!("ran on the default pool");
//! });
//! token.wait();
//!
//! let ring: RingBuffer<u64, 16> = RingBuffer::new(ExecutionPolicy::Parallel);
//! ring.push(42);
//! assert_eq!(ring.size(), 1);
//! ```

pub mod affinity;
mod backoff;
mod config;
mod error;
mod event_count;
mod executor;
mod facade;
mod function;
mod invariants;
mod metrics;
mod ring;
pub mod rng;
mod scheduler;
mod slot;
mod token;

pub use backoff::Backoff;
pub use config::Config;
pub use error::{AffinityError, ConfigError, PoolError, RingError};
pub use executor::Executor;
pub use facade::{run_range, spawn, spawn_repeat, spawn_with_token};
pub use function::TaskCell;
pub use metrics::{Metrics, MetricsSnapshot};
pub use ring::{ExecutionPolicy, RingBuffer, RingIter};
pub use scheduler::{ActivityStats, Pool, WaitOutcome, WorkerStats};
pub use token::{Token, TokenGroup};
