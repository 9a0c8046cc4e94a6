//! RISC-V platform-level interrupt controller.
//! https://github.com/riscv/riscv-plic-spec/blob/master/riscv-plic.adoc

use crate::cpu;
use crate::memlayout::{PLIC, PLIC_SCLAIM, PLIC_SENABLE, PLIC_SPRIORITY, UART0_IRQ};

/// Asks the PLIC which interrupt this hart should serve. 0 means none.
pub fn claim() -> u32 {
    let _intr = cpu::push_off();

    // Safety: interrupts are off, so the hart id is stable.
    unsafe {
        let hart = cpu::id();
        core::ptr::read_volatile(PLIC_SCLAIM(hart) as *const u32)
    }
}

/// Tells the PLIC this hart has served `irq`.
pub fn complete(irq: u32) {
    let _intr = cpu::push_off();

    // Safety: interrupts are off, so the hart id is stable.
    unsafe {
        let hart = cpu::id();
        core::ptr::write_volatile(PLIC_SCLAIM(hart) as *mut u32, irq);
    }
}

/// Gives the wired IRQs a non-zero priority (zero means disabled).
///
/// # Safety
/// Once, at boot, on the boot hart.
pub unsafe fn init() {
    unsafe {
        core::ptr::write_volatile((PLIC + UART0_IRQ * 4) as *mut u32, 1);
    }
}

/// Enables the wired IRQs for this hart's S-mode and opens its threshold.
///
/// # Safety
/// Once per hart, during boot.
pub unsafe fn init_hart() {
    let _intr = cpu::push_off();

    unsafe {
        let hart = cpu::id();
        core::ptr::write_volatile(PLIC_SENABLE(hart) as *mut u32, 1 << UART0_IRQ);
        core::ptr::write_volatile(PLIC_SPRIORITY(hart) as *mut u32, 0);
    }
}
