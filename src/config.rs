//! Crate-wide configuration knobs, following the teacher's `Config::new`
//! const-fn-with-bounds-assertions pattern.

use crate::error::ConfigError;

/// Tunables shared by the ring buffers and the scheduler built on top of
/// them.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// `log2` of the ring capacity (`capacity = 1 << ring_bits`).
    pub ring_bits: u8,
    /// Number of scheduler worker threads.
    pub worker_count: usize,
    /// Whether to collect `Metrics` counters (they're cheap, but some
    /// deployments disable even an uncontended atomic increment).
    pub enable_metrics: bool,
    /// Whether workers attempt to pin themselves to a CPU core at startup.
    pub enable_affinity: bool,
}

impl Config {
    /// Panics if `ring_bits` is out of `[1, 20]` or `worker_count` is 0.
    /// Evaluable at compile time, matching the teacher's `Config::new`.
    pub const fn new(ring_bits: u8, worker_count: usize, enable_metrics: bool) -> Self {
        assert!(ring_bits >= 1 && ring_bits <= 20, "ring_bits must be in [1, 20]");
        assert!(worker_count >= 1, "worker_count must be at least 1");
        Self {
            ring_bits,
            worker_count,
            enable_metrics,
            enable_affinity: false,
        }
    }

    /// Fallible counterpart for call sites that need a `Result` instead of a
    /// panic (e.g. configuration loaded from user input).
    pub fn try_new(ring_bits: u8, worker_count: usize, enable_metrics: bool) -> Result<Self, ConfigError> {
        if !(1..=20).contains(&ring_bits) {
            return Err(ConfigError::InvalidRingBits { ring_bits });
        }
        if worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(Self {
            ring_bits,
            worker_count,
            enable_metrics,
            enable_affinity: false,
        })
    }

    pub const fn with_affinity(mut self, enable: bool) -> Self {
        self.enable_affinity = enable;
        self
    }

    pub const fn capacity(&self) -> usize {
        1usize << self.ring_bits
    }

    /// Small ring, few workers, tuned for minimal per-task latency.
    pub const fn low_latency() -> Self {
        Self::new(12, 4, false)
    }

    /// Large ring, many workers, tuned for sustained throughput.
    pub const fn high_throughput() -> Self {
        Self::new(18, 16, false)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(16, 8, false)
    }
}
