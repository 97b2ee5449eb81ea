//! The per-slot ownership protocol: an atomic state bitfield ([`SlotState`],
//! C2) and the slot itself ([`Slot<T>`], C3) that pairs that state with
//! cache-line-aligned storage for one value.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_utils::CachePadded;

use crate::backoff::Backoff;
use crate::event_count::EventCount;
use crate::invariants::{debug_assert_slot_active, debug_assert_slot_claimed};

/// The three meaningful bit patterns of a slot's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotBits {
    Empty = 0,
    Claimed = 1,
    Active = 2,
}

impl SlotBits {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SlotBits::Empty,
            1 => SlotBits::Claimed,
            2 => SlotBits::Active,
            _ => unreachable!("slot state bitfield holds only 0, 1 or 2"),
        }
    }
}

/// Atomic state field plus the wait/notify mechanism a [`crate::token::Token`]
/// rebinds to. Bundled into one object (rather than two pointers living in
/// the token) so a token's single `AtomicPtr<SlotState>` is always internally
/// consistent.
#[derive(Debug, Default)]
pub struct SlotState {
    bits: AtomicU8,
    events: EventCount,
}

impl SlotState {
    pub fn new() -> Self {
        Self {
            bits: AtomicU8::new(SlotBits::Empty as u8),
            events: EventCount::new(),
        }
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> SlotBits {
        SlotBits::from_u8(self.bits.load(order))
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.load(Ordering::Acquire), SlotBits::Active)
    }

    /// Spin-CAS from `Empty` to `Claimed`. Release on success, relaxed on a
    /// failed retry; backs off between attempts.
    pub fn acquire(&self) {
        let mut backoff = Backoff::new();
        loop {
            match self.bits.compare_exchange_weak(
                SlotBits::Empty as u8,
                SlotBits::Claimed as u8,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// Blocks until the slot has left `Claimed` (been reset back to `Empty`
    /// from a previous occupant's release), then claims it. Used when a
    /// producer's claimed index wraps onto a slot that is still `Active`.
    pub fn wait_until_empty_then_claim(&self) {
        loop {
            let epoch = self.events.load();
            match self.load(Ordering::Acquire) {
                SlotBits::Empty => {
                    if self
                        .bits
                        .compare_exchange(
                            SlotBits::Empty as u8,
                            SlotBits::Claimed as u8,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => self.events.wait(epoch),
            }
        }
    }

    /// Transition `Claimed -> Active` with release order. Intentionally does
    /// not notify: waiters observe this edge only indirectly, by later
    /// waiting for `Active -> Empty`.
    pub fn activate(&self) {
        debug_assert_slot_claimed!(self.load(Ordering::Acquire));
        self.bits.store(SlotBits::Active as u8, Ordering::Release);
    }

    /// Blocks until the state leaves `Active`.
    pub fn wait(&self) {
        loop {
            let epoch = self.events.load();
            if !self.is_active() {
                return;
            }
            self.events.wait(epoch);
        }
    }

    /// Transition `Active -> Empty` with release order, waking all waiters.
    pub fn release(&self) {
        debug_assert_slot_active!(self.load(Ordering::Acquire));
        self.bits.store(SlotBits::Empty as u8, Ordering::Release);
        self.events.notify_all();
    }
}

/// One ring buffer element: cache-line-aligned state plus storage for a
/// single `T`, transferred between exactly one producer and one consumer at
/// a time.
pub struct Slot<T> {
    state: CachePadded<SlotState>,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: access to `value` is mediated entirely by `state`'s acquire/release
// protocol, which hands off exclusive ownership between threads.
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self {
            state: CachePadded::new(SlotState::new()),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[inline]
    pub fn state(&self) -> &SlotState {
        &self.state
    }

    /// Claim this slot (`Empty -> Claimed`), spinning if it is occupied.
    pub fn acquire(&self) {
        self.state.acquire();
    }

    /// Precondition: this slot is `Claimed` by the calling thread. Writes
    /// `value` into the slot's storage and publishes `Active`.
    ///
    /// # Safety
    /// The caller must hold exclusive claim on this slot (via `acquire` or
    /// `wait_until_empty_then_claim`).
    pub unsafe fn assign(&self, value: T) {
        (*self.value.get()).write(value);
        self.state.activate();
    }

    /// Blocks until the slot leaves `Active`.
    pub fn wait(&self) {
        self.state.wait();
    }

    /// Precondition: this slot is `Active`. Provides mutable access to the
    /// stored value without taking it, for in-place invocation.
    ///
    /// # Safety
    /// The caller must be the sole owner of this `Active` slot.
    #[inline]
    pub unsafe fn value_mut(&self) -> &mut T {
        (*self.value.get()).assume_init_mut()
    }

    /// Precondition: this slot is `Active`. Drops the stored value in place,
    /// then releases the slot (`Active -> Empty`, notifying all waiters).
    ///
    /// # Safety
    /// The caller must be the sole owner of this `Active` slot and must not
    /// use the stored value again afterward.
    pub unsafe fn release_drop(&self) {
        ptr::drop_in_place((*self.value.get()).as_mut_ptr());
        self.state.release();
    }

    /// Precondition: this slot is `Active`. Moves the stored value out and
    /// releases the slot.
    ///
    /// # Safety
    /// Same as `release_drop`.
    pub unsafe fn take(&self) -> T {
        let v = (*self.value.get()).assume_init_read();
        self.state.release();
        v
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}
