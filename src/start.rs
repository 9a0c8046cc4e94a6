use core::arch::asm;

use crate::param::NCPU;
use crate::riscv::registers::*;

#[repr(C, align(16))]
pub struct BootStack([u8; 4096 * NCPU]);

/// One boot stack slice per hart, used from `_entry` until the scheduler
/// takes over on per-process kernel stacks.
pub static mut BOOT_STACK: BootStack = BootStack([0; 4096 * NCPU]);

unsafe extern "C" {
    fn main() -> !;
}

/// Arranges for supervisor-mode timer interrupts via the sstc extension.
unsafe fn timer_init() {
    unsafe {
        // machine-level enable for the supervisor timer
        mie::write(mie::read() | mie::STIE);

        // turn on sstc, so stimecmp exists
        menvcfg::write(menvcfg::read() | (1 << 63));

        // let supervisor mode read time and write stimecmp
        mcounteren::write(mcounteren::read() | 2);

        // schedule the first tick
        stimecmp::write(time::read() + 1_000_000);
    }
}

/// Machine-mode setup, run by every hart right out of `_entry`. Ends
/// with an `mret` into supervisor-mode `main`.
///
/// # Safety
/// Reached only from `_entry`.
pub unsafe extern "C" fn start() -> ! {
    unsafe {
        // mret should land in supervisor mode, at main
        mstatus::set_mpp_supervisor();
        mepc::write(main as *const () as usize);

        // paging off in supervisor mode until vm::init_hart
        satp::write(0);

        // push all interrupts and exceptions down to supervisor mode
        medeleg::write(0xffff);
        mideleg::write(0xffff);
        sie::write(sie::read() | sie::SEIE | sie::STIE | sie::SSIE);

        // let supervisor mode at all of physical memory
        pmpaddr0::write(0x3fffffffffffff);
        pmpcfg0::write(0xf);

        timer_init();

        // each hart keeps its id in tp
        tp::write(mhartid::read());

        asm!("mret", options(noreturn));
    }
}
