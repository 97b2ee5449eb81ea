//! Debug assertion macros for the ring buffer and slot state machine.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`); zero overhead in
//! release builds.

// =============================================================================
// Bounded count: (next - tail) <= capacity
// =============================================================================

/// Assert the number of slots claimed-but-not-yet-consumed never exceeds capacity.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

// =============================================================================
// Index ordering: tail <= head <= next
// =============================================================================

/// Assert `tail <= head` (head never advances past tail going the other way).
macro_rules! debug_assert_tail_not_past_head {
    ($tail:expr, $head:expr) => {
        debug_assert!(
            $tail <= $head,
            "tail {} advanced past head {}",
            $tail,
            $head
        )
    };
}

/// Assert `head <= next`.
macro_rules! debug_assert_head_not_past_next {
    ($head:expr, $next:expr) => {
        debug_assert!(
            $head <= $next,
            "head {} advanced past next {}",
            $head,
            $next
        )
    };
}

// =============================================================================
// Monotonic progress of an index
// =============================================================================

/// Assert that an index only increases (wrapping u64 arithmetic aside).
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Slot state preconditions
// =============================================================================

/// Assert a slot is `claimed` before `assign` constructs the payload into it.
macro_rules! debug_assert_slot_claimed {
    ($state:expr) => {
        debug_assert_eq!(
            $state,
            $crate::slot::SlotBits::Claimed,
            "assign() called on a slot that was not claimed"
        )
    };
}

/// Assert a slot is `active` before `release` destroys the payload.
macro_rules! debug_assert_slot_active {
    ($state:expr) => {
        debug_assert_eq!(
            $state,
            $crate::slot::SlotBits::Active,
            "release() called on a slot that was not active"
        )
    };
}

// =============================================================================
// Per-producer FIFO ordering (consumption count tracking)
// =============================================================================

/// Assert per-producer consumption counts never move backwards.
macro_rules! debug_assert_fifo_count {
    ($producer_id:expr, $old_count:expr, $new_count:expr) => {
        debug_assert!(
            $new_count >= $old_count,
            "producer {} consumption count went from {} to {}",
            $producer_id,
            $old_count,
            $new_count
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_fifo_count;
pub(crate) use debug_assert_head_not_past_next;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_slot_active;
pub(crate) use debug_assert_slot_claimed;
pub(crate) use debug_assert_tail_not_past_head;
