//! The masked ring iterator ([`RingIter`], C4) and the lock-free MPMC ring
//! buffer itself ([`RingBuffer`], C5).

use std::ops::{Add, AddAssign, Index, Sub, SubAssign};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::backoff::Backoff;
use crate::error::RingError;
use crate::event_count::EventCount;
use crate::function::TaskCell;
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_monotonic, debug_assert_tail_not_past_head,
};
use crate::slot::Slot;
use crate::token::Token;

/// How a drained range is dispatched by `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// Invoke slots strictly in commit order, waiting for each predecessor
    /// to finish before starting the next.
    Sequential,
    /// Invoke slots without waiting on a predecessor. A single `execute`
    /// call fans the drained range out across a scoped thread pool so
    /// invocations genuinely run concurrently, in addition to whatever
    /// concurrency already comes from multiple threads independently
    /// calling `consume`/`execute` on the same ring (as the scheduler's
    /// workers do).
    Parallel,
}

/// A read-only cursor over a logical index range `[start, end)` of a ring
/// buffer, masked into the underlying slot array. Logical indices order
/// correctly across wrap-around even though the physical slot they address
/// repeats every `N`.
pub struct RingIter<'a, T, const N: usize> {
    ring: &'a RingBuffer<T, N>,
    index: u64,
    end: u64,
}

impl<'a, T, const N: usize> RingIter<'a, T, N> {
    fn new(ring: &'a RingBuffer<T, N>, index: u64, end: u64) -> Self {
        Self { ring, index, end }
    }

    /// The logical index this cursor currently points at.
    pub fn position(&self) -> u64 {
        self.index
    }

    /// Remaining slots in the range.
    pub fn len(&self) -> usize {
        self.end.wrapping_sub(self.index) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.index == self.end
    }

    /// Accesses the slot at the current position without advancing.
    ///
    /// # Safety
    /// The caller must know the range `[start, end)` this cursor was built
    /// from is still exclusively owned (true immediately after `consume`).
    unsafe fn slot(&self) -> &'a Slot<T> {
        self.ring.slot_at(self.index)
    }

    /// Advances and returns the slot that was at the previous position.
    ///
    /// # Safety
    /// As `slot`.
    pub unsafe fn next_slot(&mut self) -> Option<&'a Slot<T>> {
        if self.index == self.end {
            return None;
        }
        let slot = self.ring.slot_at(self.index);
        self.index = self.index.wrapping_add(1);
        Some(slot)
    }
}

// Manual `Clone`/`Copy` rather than `#[derive]`, which would otherwise add a
// spurious `T: Clone`/`T: Copy` bound even though `T` is only ever reached
// through a shared reference here.
impl<'a, T, const N: usize> Clone for RingIter<'a, T, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T, const N: usize> Copy for RingIter<'a, T, N> {}

/// Advances the cursor by `rhs` logical positions, returning a new cursor.
impl<'a, T, const N: usize> Add<u64> for RingIter<'a, T, N> {
    type Output = Self;
    fn add(self, rhs: u64) -> Self {
        Self { ring: self.ring, index: self.index.wrapping_add(rhs), end: self.end }
    }
}

/// Moves the cursor back by `rhs` logical positions, returning a new cursor.
impl<'a, T, const N: usize> Sub<u64> for RingIter<'a, T, N> {
    type Output = Self;
    fn sub(self, rhs: u64) -> Self {
        Self { ring: self.ring, index: self.index.wrapping_sub(rhs), end: self.end }
    }
}

impl<'a, T, const N: usize> AddAssign<u64> for RingIter<'a, T, N> {
    fn add_assign(&mut self, rhs: u64) {
        self.index = self.index.wrapping_add(rhs);
    }
}

impl<'a, T, const N: usize> SubAssign<u64> for RingIter<'a, T, N> {
    fn sub_assign(&mut self, rhs: u64) {
        self.index = self.index.wrapping_sub(rhs);
    }
}

/// Subtracting two cursors over the same ring yields their signed logical
/// distance.
impl<'a, T, const N: usize> Sub for RingIter<'a, T, N> {
    type Output = i64;
    fn sub(self, rhs: Self) -> i64 {
        self.index.wrapping_sub(rhs.index) as i64
    }
}

/// `iter[k]` addresses the slot `k` logical positions ahead of the cursor,
/// masked into the physical slot array, without advancing the cursor.
impl<'a, T, const N: usize> Index<u64> for RingIter<'a, T, N> {
    type Output = Slot<T>;
    fn index(&self, k: u64) -> &Slot<T> {
        // SAFETY: returning a slot reference is itself safe; the unsafe
        // preconditions live on `Slot`'s value-access methods, not here.
        unsafe { self.ring.slot_at(self.index.wrapping_add(k)) }
    }
}

/// Equality compares physical position (the masked slot address), not the
/// logical index, matching the source's iterator contract.
impl<'a, T, const N: usize> PartialEq for RingIter<'a, T, N> {
    fn eq(&self, other: &Self) -> bool {
        self.ring.mask(self.index) == other.ring.mask(other.index)
    }
}

impl<'a, T, const N: usize> Eq for RingIter<'a, T, N> {}

/// The central lock-free MPMC queue: `N` cache-line-aligned slots addressed
/// through three monotonically increasing counters `tail <= head <= next`.
pub struct RingBuffer<T, const N: usize> {
    tail: CachePadded<AtomicU64>,
    head: CachePadded<AtomicU64>,
    next: CachePadded<AtomicU64>,
    head_events: CachePadded<EventCount>,
    policy: ExecutionPolicy,
    slots: Box<[CachePadded<Slot<T>>]>,
}

// SAFETY: all slot contents are moved between threads strictly through the
// acquire/claim/release protocol in `Slot`/`SlotState`.
unsafe impl<T: Send, const N: usize> Send for RingBuffer<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for RingBuffer<T, N> {}

impl<T, const N: usize> RingBuffer<T, N> {
    /// Panics if `N` is not a power of two greater than 1. See `try_new` for
    /// a fallible counterpart.
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self::try_new(policy).expect("invalid ring buffer capacity")
    }

    /// Fallible counterpart to `new`: returns `RingError` instead of
    /// panicking when `N` is zero, one, or not a power of two.
    pub fn try_new(policy: ExecutionPolicy) -> Result<Self, RingError> {
        if N <= 1 {
            return Err(RingError::CapacityTooSmall { capacity: N });
        }
        if !N.is_power_of_two() {
            return Err(RingError::CapacityNotPowerOfTwo { capacity: N });
        }

        let slots = (0..N).map(|_| CachePadded::new(Slot::new())).collect::<Vec<_>>();
        Ok(Self {
            tail: CachePadded::new(AtomicU64::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
            next: CachePadded::new(AtomicU64::new(0)),
            head_events: CachePadded::new(EventCount::new()),
            policy,
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline]
    fn mask(&self, index: u64) -> usize {
        (index & (N as u64 - 1)) as usize
    }

    /// # Safety
    /// `index` must lie within a range the caller exclusively owns.
    unsafe fn slot_at(&self, index: u64) -> &Slot<T> {
        &*self.slots[self.mask(index)]
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Matches the source's `max_size()`: one less than capacity, since a
    /// fully-occupied ring (`next - tail == N`) is the back-pressure point
    /// rather than a usable size.
    pub fn max_size(&self) -> usize {
        N - 1
    }

    pub fn size(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        let next = self.next.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        next.wrapping_sub(tail) >= N as u64
    }

    /// Pushes `value`, returning a fresh token bound to its slot.
    pub fn push(&self, value: T) -> Token {
        let token = Token::unbound();
        self.push_with(&token, value);
        token
    }

    /// Pushes `value`, rebinding the caller's existing token to the new slot
    /// instead of allocating one. Used by self-requeuing tasks.
    pub fn push_with(&self, token: &Token, value: T) {
        // 1. Claim.
        let slot_index = self.next.fetch_add(1, Ordering::Relaxed);
        // SAFETY: `slot_index` was just uniquely claimed via fetch_add; no
        // other producer will claim the same index.
        let slot = unsafe { self.slot_at(slot_index) };

        // 2. Wait-for-empty, then claim the slot's state.
        slot.state().wait_until_empty_then_claim();

        // 3. Full check: don't commit until there is room for this slot.
        let mut backoff = Backoff::new();
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let occupied_after = slot_index.wrapping_add(1).wrapping_sub(tail);
            debug_assert_bounded_count!(occupied_after, N as u64);
            if occupied_after <= N as u64 {
                break;
            }
            backoff.snooze();
        }

        // 4. Assign and bind the token.
        // SAFETY: this slot was just claimed by this thread in step 2.
        unsafe { slot.assign(value) };
        token.rebind(slot.state());

        // 5. Commit: advance head past this slot, retrying until any
        // predecessor with a smaller claimed index has committed first.
        let mut backoff = Backoff::new();
        loop {
            match self.head.compare_exchange_weak(
                slot_index,
                slot_index.wrapping_add(1),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(_) => backoff.snooze(),
            }
        }
        debug_assert_monotonic!("head", slot_index, slot_index.wrapping_add(1));
        self.head_events.notify_one();
    }

    /// Transfers ownership of up to `max` committed slots to the caller,
    /// advancing `tail`. Wait-free; never blocks.
    pub fn consume(&self, max: usize) -> (RingIter<'_, T, N>, RingIter<'_, T, N>) {
        let mut backoff = Backoff::new();
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Acquire);
            let avail = head.wrapping_sub(tail);
            let take = (max as u64).min(avail);
            let end = tail.wrapping_add(take);
            debug_assert_tail_not_past_head!(tail, end);
            if self
                .tail
                .compare_exchange_weak(tail, end, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return (RingIter::new(self, tail, end), RingIter::new(self, end, end));
            }
            backoff.snooze();
        }
    }

    /// A non-consuming snapshot of `[tail, head)`, for inspection only.
    pub fn peek(&self, max: usize) -> RingIter<'_, T, N> {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        let end = tail.wrapping_add((max as u64).min(head.wrapping_sub(tail)));
        RingIter::new(self, tail, end)
    }

    /// Blocks the calling thread until the ring is non-empty or `timeout`
    /// elapses, whichever comes first. Used by executors/schedulers that
    /// would otherwise busy-poll an empty queue.
    pub fn wait_non_empty(&self, timeout: std::time::Duration) {
        if !self.is_empty() {
            return;
        }
        let epoch = self.head_events.load();
        if !self.is_empty() {
            return;
        }
        self.head_events.wait_timeout(epoch, timeout);
    }

    /// Consumes everything and drops each value in place without running
    /// any invocation semantics. Used for shutdown.
    pub fn clear(&self) {
        let (mut it, _end) = self.consume(N);
        // SAFETY: this range was just exclusively taken by `consume`.
        while let Some(slot) = unsafe { it.next_slot() } {
            unsafe { slot.release_drop() };
        }
    }
}

impl<const N: usize> RingBuffer<TaskCell, N> {
    /// Constructs a `TaskCell` in place from `f` and pushes it.
    pub fn push_fn<F>(&self, f: F) -> Token
    where
        F: FnOnce() + Send + 'static,
    {
        let mut cell = TaskCell::empty();
        cell.emplace(f);
        self.push(cell)
    }

    /// As `push_fn`, rebinding an existing token instead of allocating one.
    pub fn push_fn_with<F>(&self, token: &Token, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut cell = TaskCell::empty();
        cell.emplace(f);
        self.push_with(token, cell);
    }

    /// Consumes up to `max` tasks and invokes each, following this ring's
    /// `ExecutionPolicy`. Returns the number of tasks run.
    pub fn execute(&self, max: usize) -> usize {
        let (mut it, _end) = self.consume(max);
        let total = it.len();
        if total == 0 {
            return 0;
        }

        match self.policy {
            ExecutionPolicy::Parallel => {
                let thread_count = std::thread::available_parallelism()
                    .map(std::num::NonZeroUsize::get)
                    .unwrap_or(1)
                    .min(total);

                if thread_count <= 1 {
                    // SAFETY: range exclusively owned by this consumer.
                    while let Some(slot) = unsafe { it.next_slot() } {
                        unsafe {
                            slot.value_mut().invoke();
                            slot.release_drop();
                        }
                    }
                } else {
                    // Collect the disjoint slot references up front so each
                    // scoped thread below touches only its own chunk.
                    let mut slots = Vec::with_capacity(total);
                    // SAFETY: range exclusively owned by this consumer.
                    while let Some(slot) = unsafe { it.next_slot() } {
                        slots.push(slot);
                    }
                    let chunk_size = (total + thread_count - 1) / thread_count;
                    std::thread::scope(|scope| {
                        for chunk in slots.chunks(chunk_size) {
                            scope.spawn(move || {
                                for slot in chunk {
                                    unsafe {
                                        slot.value_mut().invoke();
                                        slot.release_drop();
                                    }
                                }
                            });
                        }
                    });
                }
            }
            ExecutionPolicy::Sequential => {
                // SAFETY: range exclusively owned by this consumer.
                while let Some(slot) = unsafe { it.next_slot() } {
                    // `next_slot` already advanced the cursor past the slot
                    // it returned, so the slot just taken is `it.position() - 1`
                    // and its predecessor is one before that.
                    let predecessor = it.position().wrapping_sub(2);
                    // SAFETY: any index is safe to peek at: a slot outside
                    // the live range is simply `Empty`, and `wait` returns
                    // immediately on an `Empty` slot.
                    unsafe { self.slot_at(predecessor) }.wait();
                    unsafe {
                        slot.value_mut().invoke();
                        slot.release_drop();
                    }
                }
            }
        }
        total
    }

    /// Pops and invokes a single task from the back of this ring (LIFO),
    /// used by the scheduler's local-deque exploit phase. Returns `false`
    /// if the ring was empty.
    pub fn try_pop_back_and_invoke(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        if head == tail {
            return false;
        }
        let candidate = head.wrapping_sub(1);
        if self
            .head
            .compare_exchange(head, candidate, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        // SAFETY: we just won exclusive rights to `candidate` by CAS'ing
        // `head` down past it; no consumer can `consume()` a slot at or
        // past the current head, and no other popper can win the same CAS.
        let slot = unsafe { self.slot_at(candidate) };
        unsafe {
            slot.value_mut().invoke();
            slot.release_drop();
        }
        true
    }

    /// Steals a single task from the front of this ring (FIFO) into the
    /// caller's local deque. Returns `false` if empty.
    pub fn try_steal_into<const M: usize>(&self, local: &RingBuffer<TaskCell, M>) -> bool {
        let (mut it, _end) = self.consume(1);
        if it.is_empty() {
            return false;
        }
        // SAFETY: exclusively owned by this consumer.
        let slot = unsafe { it.next_slot() }.expect("checked non-empty above");
        let task = unsafe { slot.take() };
        local.push(task);
        true
    }
}
