//! Error hierarchy for the small number of fallible, non-hot-path
//! operations. Follows the teacher's `ChannelError` pattern: plain
//! `thiserror` derives, no dynamic boxing, nothing on the push/consume hot
//! paths (those are infallible by design; see `SPEC_FULL.md` §7).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("ring buffer capacity must be greater than 1, got {capacity}")]
    CapacityTooSmall { capacity: usize },
    #[error("ring buffer capacity must be a power of two, got {capacity}")]
    CapacityNotPowerOfTwo { capacity: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("ring_bits must be in [1, 20], got {ring_bits}")]
    InvalidRingBits { ring_bits: u8 },
    #[error("worker_count must be at least 1")]
    ZeroWorkers,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool requires at least one worker")]
    ZeroWorkers,
    #[error("failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("failed to pin thread to core {core_id}: {source}")]
pub struct AffinityError {
    pub core_id: usize,
    #[source]
    pub source: std::io::Error,
}
