use core::cell::UnsafeCell;
use core::fmt;
use core::hint;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::cpu::{self, Cpu, IntrGuard};

/// Mutual exclusion spin lock.
///
/// The owner field does double duty: null means unlocked, otherwise it
/// names the holding CPU so double-acquire and stray release are caught.
/// Interrupts are pushed off for as long as a guard is alive, so a lock
/// holder can never be preempted into code that takes the same lock.
pub struct SpinLock<T> {
    name: &'static str,
    owner: AtomicPtr<Cpu>,
    value: UnsafeCell<T>,
}

// Safety: the UnsafeCell is only reachable through a guard or an exclusive
// reference, so sharing the lock is fine whenever the inner type can move
// between threads.
unsafe impl<T: Send> Sync for SpinLock<T> {}

pub struct SpinLockGuard<'a, T: 'a> {
    lock: &'a SpinLock<T>,
    _intr: IntrGuard,
}

unsafe impl<T: Sync> Sync for SpinLockGuard<'_, T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T, name: &'static str) -> Self {
        Self {
            name,
            owner: AtomicPtr::new(ptr::null_mut()),
            value: UnsafeCell::new(value),
        }
    }

    /// Is this lock held by the current CPU?
    ///
    /// # Safety
    /// Interrupts must be disabled, or the answer may describe a CPU the
    /// caller has since migrated away from.
    unsafe fn holding(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == unsafe { cpu::current_raw() }
    }

    /// Spins until the lock is free, then takes it.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let intr = cpu::push_off();

        unsafe {
            assert!(!self.holding(), "acquire {}", self.name);
        }

        loop {
            if self
                .owner
                .compare_exchange(
                    ptr::null_mut(),
                    unsafe { cpu::current_raw() },
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return SpinLockGuard {
                    lock: self,
                    _intr: intr,
                };
            }

            hint::spin_loop();
        }
    }

    /// Releases `guard` and hands back the lock it came from, so callers
    /// like `sleep` can re-lock the same condition later.
    pub fn unlock(guard: SpinLockGuard<'_, T>) -> &SpinLock<T> {
        let lock = guard.lock;
        drop(guard);
        lock
    }

    /// Releases the lock without a guard in hand.
    ///
    /// # Safety
    /// The lock must be held by this CPU with a guard whose drop will never
    /// run in this context. The one user is `fork_ret`, which inherits the
    /// process lock from the scheduler's stack frame.
    pub unsafe fn force_unlock(&self) {
        unsafe {
            assert!(self.holding(), "force unlock {}", self.name);
        }
        self.owner.store(ptr::null_mut(), Ordering::Release);
        cpu::pop_off();
    }

    /// Reaches the data without locking.
    ///
    /// # Safety
    /// Only for paths that tolerate races by design: the panicked console
    /// and the Ctrl-P process dump.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut_unchecked(&self) -> &mut T {
        unsafe { &mut *self.value.get() }
    }

    /// An exclusive borrow proves no guard exists, so the data is free.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // Safety: the guard's IntrGuard keeps interrupts off.
        unsafe {
            assert!(self.lock.holding(), "release {}", self.lock.name);
        }
        self.lock.owner.store(ptr::null_mut(), Ordering::Release);
        // _intr drops next and pops the interrupt nest.
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the data is not peeked at; that would need the lock
        f.debug_struct("SpinLock")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}
