use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

use crate::spinlock::SpinLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Empty,
    Ready,
}

/// A cell initialized exactly once, then shared read-only.
///
/// The kernel page table, the superblock, and the device switch use this:
/// written during boot, read forever after.
#[derive(Debug)]
pub struct OnceLock<T> {
    state: SpinLock<State>,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> OnceLock<T> {
    pub const fn new() -> Self {
        Self {
            state: SpinLock::new(State::Empty, "once"),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Stores the value produced by `f`. A second call is a no-op; the
    /// first value wins.
    pub fn init_with<F>(&self, f: F)
    where
        F: FnOnce() -> T,
    {
        let mut state = self.state.lock();
        if *state == State::Empty {
            unsafe { (*self.value.get()).write(f()) };
            *state = State::Ready;
        }
    }

    pub fn get(&self) -> Option<&T> {
        if *self.state.lock() == State::Ready {
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Like `get`, but panics with `what` when nothing was stored yet.
    pub fn expect(&self, what: &str) -> &T {
        match self.get() {
            Some(v) => v,
            None => panic!("uninitialized: {}", what),
        }
    }
}

impl<T> Drop for OnceLock<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == State::Ready {
            unsafe { self.value.get_mut().assume_init_drop() }
        }
    }
}

impl<T> Default for OnceLock<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: readers on any thread get &T, so T must be Sync; init_with can
// move a T in from any thread, so T must be Send.
unsafe impl<T: Sync + Send> Sync for OnceLock<T> {}
unsafe impl<T: Send> Send for OnceLock<T> {}
