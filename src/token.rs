//! Observer handles onto a slot's state ([`Token`], C6) and aggregates of
//! them ([`TokenGroup`]).

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::slot::SlotState;

/// A move-only observer of a single slot's lifecycle. Holds exactly one
/// atomic pointer to the observed [`SlotState`], which is why rebinding the
/// token to a different slot (as `spawn_repeat` does) can never be observed
/// half-updated by a concurrent `wait`.
pub struct Token {
    cancelled: AtomicBool,
    state: AtomicPtr<SlotState>,
}

// SAFETY: all access to `state` goes through atomic operations on the raw
// pointer; the pointee is only ever read through `SlotState`'s own atomics.
unsafe impl Send for Token {}
unsafe impl Sync for Token {}

impl Token {
    /// A token not yet bound to any slot. `done()` on it is trivially true.
    pub fn unbound() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            state: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub(crate) fn bound_to(state: &SlotState) -> Self {
        let token = Self::unbound();
        token.rebind(state);
        token
    }

    /// Points this token at a (possibly different) slot's state. Used at
    /// push time and by self-requeuing tasks.
    pub fn rebind(&self, state: &SlotState) {
        self.state
            .store((state as *const SlotState).cast_mut(), Ordering::Release);
    }

    /// True once the observed slot has left `Active` (or nothing was ever
    /// bound).
    pub fn done(&self) -> bool {
        let ptr = self.state.load(Ordering::Acquire);
        if ptr.is_null() {
            return true;
        }
        // SAFETY: the pointee outlives every token that can observe it: the
        // ring never frees slot storage while the ring itself is alive.
        !unsafe { &*ptr }.is_active()
    }

    /// Sets the cancellation flag. Observed cooperatively by callables that
    /// take the token as an argument; does not affect the slot itself.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Blocks until the observed slot leaves `Active`. If the token is
    /// rebound to a new slot while this call is sleeping (a self-requeuing
    /// task rebinding before its own invocation returns), re-observes the
    /// new target instead of returning early.
    pub fn wait(&self) {
        loop {
            let observed = self.state.load(Ordering::Acquire);
            if observed.is_null() {
                return;
            }
            // SAFETY: see `done`.
            unsafe { &*observed }.wait();

            let current = self.state.load(Ordering::Acquire);
            if current == observed {
                return;
            }
            // Rebound mid-wait: loop and wait on the new target.
        }
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::unbound()
    }
}

/// An aggregate of tokens with conjunctive `done`/`wait` semantics: `wait`
/// returns only once every member token is done.
#[derive(Default)]
pub struct TokenGroup {
    tokens: Vec<Token>,
}

impl TokenGroup {
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { tokens: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn done(&self) -> bool {
        self.tokens.iter().all(Token::done)
    }

    pub fn cancel(&self) {
        for token in &self.tokens {
            token.cancel();
        }
    }

    /// Waits on every member token in sequence (not concurrently) until all
    /// are done.
    pub fn wait(&self) {
        for token in &self.tokens {
            token.wait();
        }
    }
}
