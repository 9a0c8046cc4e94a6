use core::cell::UnsafeCell;

use crate::param::NCPU;
use crate::proc::Proc;
use crate::riscv::{interrupts, registers::tp};
use crate::swtch::Context;

pub static CPUS: Cpus = Cpus::new();

/// Per-hart state.
pub struct Cpu {
    /// The process running on this hart, if any.
    pub proc: Option<&'static Proc>,
    /// The scheduler's saved registers; `sched` switches here.
    pub context: Context,
    /// Depth of `push_off` nesting.
    pub noff: isize,
    /// Were interrupts enabled before the outermost `push_off`?
    pub intr_on_entry: bool,
}

impl Cpu {
    const fn new() -> Self {
        Self {
            proc: None,
            context: Context::new(),
            noff: 0,
            intr_on_entry: false,
        }
    }
}

pub struct Cpus([UnsafeCell<Cpu>; NCPU]);

// Safety: each hart only touches its own slot, found through tp with
// interrupts disabled.
unsafe impl Sync for Cpus {}

impl Cpus {
    const fn new() -> Self {
        Self([const { UnsafeCell::new(Cpu::new()) }; NCPU])
    }
}

/// This hart's id, as stashed in tp by `start`.
///
/// # Safety
/// Call with interrupts disabled; a timer interrupt could otherwise move
/// the caller to another hart between the read and its use.
#[inline]
pub unsafe fn id() -> usize {
    unsafe { tp::read() }
}

/// This hart's `Cpu` record.
///
/// # Safety
/// Same contract as [`id`]; asserts interrupts really are off.
pub unsafe fn current() -> &'static mut Cpu {
    assert!(!interrupts::get(), "cpu::current interruptible");
    unsafe { &mut *CPUS.0[id()].get() }
}

/// Raw pointer form of [`current`], for lock-ownership bookkeeping.
///
/// # Safety
/// Interrupts must be disabled.
pub unsafe fn current_raw() -> *mut Cpu {
    unsafe { CPUS.0[id()].get() }
}

/// Witness that interrupts are pushed off on this hart.
/// Dropping it pops the nest and may re-enable interrupts.
#[derive(Debug)]
pub struct IntrGuard;

impl Drop for IntrGuard {
    fn drop(&mut self) {
        pop_off();
    }
}

/// Disables interrupts and deepens the per-hart nest.
///
/// The enable state seen by the *outermost* push is remembered so the
/// matching final pop can restore it; nested pushes leave it alone.
pub fn push_off() -> IntrGuard {
    let was_on = interrupts::get();
    interrupts::disable();

    // Safety: interrupts are now off.
    let cpu = unsafe { current() };
    if cpu.noff == 0 {
        cpu.intr_on_entry = was_on;
    }
    cpu.noff += 1;

    IntrGuard
}

/// Undoes one `push_off`, restoring interrupts when the nest empties.
pub(crate) fn pop_off() {
    assert!(!interrupts::get(), "pop_off - interruptible");

    // Safety: interrupts are off, just asserted.
    let cpu = unsafe { current() };
    assert!(cpu.noff >= 1, "pop_off");

    cpu.noff -= 1;
    if cpu.noff == 0 && cpu.intr_on_entry {
        interrupts::enable();
    }
}

/// The process running on this hart, if any.
pub fn current_proc() -> Option<&'static Proc> {
    let _intr = push_off();
    unsafe { current().proc }
}
