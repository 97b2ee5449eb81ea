//! Thread-to-core pinning. Linux-only via `libc::sched_setaffinity`; a no-op
//! everywhere else since the scheduler treats affinity as a best-effort
//! throughput knob, never a correctness requirement.

use crate::error::AffinityError;

/// Pins the calling thread to a single CPU core. `core_id` is a plain index
/// into the host's online CPUs (0-based).
#[cfg(target_os = "linux")]
pub fn pin_to_core(core_id: usize) -> Result<(), AffinityError> {
    use std::mem::{size_of, zeroed};

    // SAFETY: `cpu_set_t` is a plain-old-data struct; zero-initializing it
    // is well defined and matches `CPU_ZERO`.
    let mut set: libc::cpu_set_t = unsafe { zeroed() };

    // SAFETY: `core_id` is bounds-checked against `CPU_SETSIZE` by `CPU_SET`
    // itself (it silently no-ops past that, which `sched_setaffinity` then
    // reports as EINVAL), and `set` is a valid, live `cpu_set_t`.
    unsafe {
        libc::CPU_SET(core_id, &mut set);
    }

    // SAFETY: `pid = 0` targets the calling thread, `set` is correctly
    // sized and initialized above.
    let rc = unsafe { libc::sched_setaffinity(0, size_of::<libc::cpu_set_t>(), &set) };

    if rc != 0 {
        return Err(AffinityError {
            core_id,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_core(_core_id: usize) -> Result<(), AffinityError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinning_to_core_zero_does_not_error() {
        assert!(pin_to_core(0).is_ok());
    }
}
