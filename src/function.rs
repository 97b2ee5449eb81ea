//! Type-erased, inline-storage callable buffer (`TaskCell`).
//!
//! Mirrors the "tagged struct + dispatcher function pointers" strategy: a
//! closure that fits within [`INLINE_CAP`] bytes is stored in place and
//! invoked through a monomorphized trampoline; anything larger spills to a
//! heap-boxed `FnOnce`. Either way the cell owns the callable's lifetime and
//! runs its destructor if it is dropped without being invoked.

use std::mem::{self, MaybeUninit};

/// Bytes available for inline storage before a closure spills to the heap.
/// Large enough for a handful of captured pointers/indices without forcing
/// an allocation on the common path.
const INLINE_CAP: usize = 48;

#[repr(align(8))]
struct Storage([u8; INLINE_CAP]);

enum Payload {
    Empty,
    Inline {
        invoke: unsafe fn(*mut u8),
        drop_in_place: unsafe fn(*mut u8),
        storage: MaybeUninit<Storage>,
    },
    Spilled(Box<dyn FnOnce() + Send + 'static>),
}

/// A move-only, type-erased, zero-argument invocable.
pub struct TaskCell {
    payload: Payload,
}

impl TaskCell {
    #[inline]
    pub fn empty() -> Self {
        Self { payload: Payload::Empty }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self.payload, Payload::Empty)
    }

    /// Stores `f`, destroying whatever was previously held.
    pub fn emplace<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.reset();

        if mem::size_of::<F>() <= INLINE_CAP && mem::align_of::<F>() <= mem::align_of::<Storage>()
        {
            unsafe fn invoke_trampoline<F: FnOnce()>(ptr: *mut u8) {
                let f = ptr.cast::<F>().read();
                f();
            }
            unsafe fn drop_trampoline<F>(ptr: *mut u8) {
                std::ptr::drop_in_place(ptr.cast::<F>());
            }

            let mut storage = MaybeUninit::<Storage>::uninit();
            // SAFETY: size/align were just checked against `Storage`.
            unsafe {
                storage.as_mut_ptr().cast::<F>().write(f);
            }
            self.payload = Payload::Inline {
                invoke: invoke_trampoline::<F>,
                drop_in_place: drop_trampoline::<F>,
                storage,
            };
        } else {
            self.payload = Payload::Spilled(Box::new(f));
        }
    }

    /// Runs the stored invocable, leaving the cell empty. Debug-asserts if
    /// the cell was empty; a release build would simply be a no-op.
    pub fn invoke(&mut self) {
        match mem::replace(&mut self.payload, Payload::Empty) {
            Payload::Empty => debug_assert!(false, "invoke() called on an empty TaskCell"),
            Payload::Inline { invoke, mut storage, .. } => {
                // SAFETY: `storage` holds a live `F` written by `emplace`,
                // and `invoke` is `F`'s monomorphized trampoline.
                unsafe { invoke(storage.as_mut_ptr().cast::<u8>()) }
            }
            Payload::Spilled(f) => f(),
        }
    }

    /// Destroys the stored callable (if any) without invoking it.
    pub fn reset(&mut self) {
        match mem::replace(&mut self.payload, Payload::Empty) {
            Payload::Empty | Payload::Spilled(_) => {}
            Payload::Inline { drop_in_place, mut storage, .. } => {
                // SAFETY: as above, but we run the destructor instead.
                unsafe { drop_in_place(storage.as_mut_ptr().cast::<u8>()) }
            }
        }
    }
}

impl Drop for TaskCell {
    fn drop(&mut self) {
        self.reset();
    }
}

// SAFETY: the stored callable is always `Send`, enforced by the `emplace` bound.
unsafe impl Send for TaskCell {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn inline_closure_runs() {
        let flag = Arc::new(AtomicUsize::new(0));
        let mut cell = TaskCell::empty();
        let f = Arc::clone(&flag);
        cell.emplace(move || {
            f.store(1, Ordering::SeqCst);
        });
        assert!(!cell.is_empty());
        cell.invoke();
        assert_eq!(flag.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spilled_closure_runs() {
        let data = [0u64; 32]; // larger than INLINE_CAP
        let flag = Arc::new(AtomicUsize::new(0));
        let mut cell = TaskCell::empty();
        let f = Arc::clone(&flag);
        cell.emplace(move || {
            let sum: u64 = data.iter().sum();
            f.store(sum as usize + 1, Ordering::SeqCst);
        });
        cell.invoke();
        assert_eq!(flag.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_drops_without_invoking() {
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let counter = DropCounter(Arc::clone(&drops));
        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked_clone = Arc::clone(&invoked);

        let mut cell = TaskCell::empty();
        cell.emplace(move || {
            let _keep_alive = &counter;
            invoked_clone.fetch_add(1, Ordering::SeqCst);
        });
        cell.reset();

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(cell.is_empty());
    }

    #[test]
    fn emplace_overwrites_previous_without_invoking_it() {
        let first_invoked = Arc::new(AtomicUsize::new(0));
        let second_invoked = Arc::new(AtomicUsize::new(0));

        let mut cell = TaskCell::empty();
        let f1 = Arc::clone(&first_invoked);
        cell.emplace(move || {
            f1.fetch_add(1, Ordering::SeqCst);
        });

        let f2 = Arc::clone(&second_invoked);
        cell.emplace(move || {
            f2.fetch_add(1, Ordering::SeqCst);
        });

        cell.invoke();
        assert_eq!(first_invoked.load(Ordering::SeqCst), 0);
        assert_eq!(second_invoked.load(Ordering::SeqCst), 1);
    }
}
