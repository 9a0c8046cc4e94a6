use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use crate::proc::{self, Chan, Pid};
use crate::spinlock::SpinLock;

/// State of a sleep lock, itself guarded by a spin lock.
#[derive(Debug)]
struct SleepLockState {
    locked: bool,
    /// who holds it, for debugging
    holder: Option<Pid>,
}

/// A lock for long holds: waiters sleep instead of spinning, and
/// interrupts stay enabled while it is held. Inodes and buffers use
/// these, since disk waits are long and holders block.
#[derive(Debug)]
pub struct SleepLock<T> {
    state: SpinLock<SleepLockState>,
    value: UnsafeCell<T>,
}

pub struct SleepLockGuard<'a, T: 'a> {
    lock: &'a SleepLock<T>,
}

impl<T> SleepLock<T> {
    pub const fn new(value: T, name: &'static str) -> Self {
        Self {
            state: SpinLock::new(
                SleepLockState {
                    locked: false,
                    holder: None,
                },
                name,
            ),
            value: UnsafeCell::new(value),
        }
    }

    /// Sleeps until the lock is free, then takes it.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut state = self.state.lock();

        while state.locked {
            state = proc::sleep(Chan::Lock(self as *const _ as usize), state);
        }

        state.locked = true;
        state.holder = Some(proc::current().pid());

        SleepLockGuard { lock: self }
    }

    /// Does the current process hold this lock?
    pub fn holding(&self) -> bool {
        let state = self.state.lock();
        state.locked && state.holder == Some(proc::current().pid())
    }

    /// Reaches the data without locking.
    ///
    /// # Safety
    /// The caller must otherwise guarantee exclusive access, e.g. during
    /// setup of a freshly claimed cache slot.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut_unchecked(&self) -> &mut T {
        unsafe { &mut *self.value.get() }
    }
}

impl<'a, T: 'a> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock();
        state.locked = false;
        state.holder = None;
        proc::wakeup(Chan::Lock(self.lock as *const _ as usize));
    }
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

// Safety: same reasoning as SpinLock; access is serialized by the guard.
unsafe impl<T: Send> Sync for SleepLock<T> {}
unsafe impl<T: Send> Send for SleepLock<T> {}
