use crate::cpu;
use crate::kernelvec::kernelvec;
use crate::memlayout::{TRAMPOLINE, UART0_IRQ};
use crate::plic;
use crate::println;
use crate::proc::{self, Chan};
use crate::riscv::{
    PGSIZE, interrupts,
    registers::{satp, scause, sepc, sstatus, stimecmp, stval, stvec, time, tp},
};
use crate::spinlock::SpinLock;
use crate::syscall::syscall;
use crate::trampoline::{trampoline, userret, uservec};
use crate::uart;

/// The global time counter, in timer interrupts on hart 0. Sleepers on
/// `Chan::Ticks` are woken at every increment.
pub static TICKS: SpinLock<usize> = SpinLock::new(0, "ticks");

/// Cycles between timer interrupts; about a tenth of a second on qemu.
const TIMER_INTERVAL: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntrKind {
    Device,
    Timer,
}

/// Classifies and handles a device or timer interrupt; None when the
/// cause was not an interrupt this kernel understands.
fn dev_intr(cause: usize) -> Option<IntrKind> {
    const INTERRUPT: usize = 1 << (usize::BITS as usize - 1);
    const SUPERVISOR_TIMER: usize = INTERRUPT | 5;
    const SUPERVISOR_EXTERNAL: usize = INTERRUPT | 9;

    match cause {
        SUPERVISOR_EXTERNAL => {
            // ask the PLIC which device wants service
            let irq = plic::claim();

            match irq as usize {
                UART0_IRQ => uart::intr(),
                0 => {}
                _ => println!("unexpected interrupt irq={}", irq),
            }

            if irq != 0 {
                plic::complete(irq);
            }

            Some(IntrKind::Device)
        }

        SUPERVISOR_TIMER => {
            clock_intr();
            Some(IntrKind::Timer)
        }

        _ => None,
    }
}

/// Timer interrupt: hart 0 owns the tick counter; every hart reprograms
/// its own next deadline.
fn clock_intr() {
    let _intr = cpu::push_off();

    if unsafe { cpu::id() } == 0 {
        let mut ticks = TICKS.lock();
        *ticks += 1;
        proc::wakeup(Chan::Ticks);
    }

    // also clears the pending timer interrupt
    unsafe { stimecmp::write(time::read() + TIMER_INTERVAL) };
}

/// Handles an exception, syscall, or interrupt arriving from user mode.
/// The trampoline's uservec jumps here with the kernel page table already
/// installed.
///
/// # Safety
/// Reached only through uservec.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn user_trap() -> ! {
    unsafe {
        assert!(
            sstatus::read() & sstatus::SPP == 0,
            "user_trap: not from user mode"
        );

        // we are in the kernel now; traps go to kernel_trap
        stvec::write(kernelvec as *const () as usize);

        let proc = proc::current();
        // Safety: we are the current process.
        let local = proc.local_mut();

        // Save the user pc now: a yield below could let another hart
        // enter user space and clobber sepc.
        local.trapframe_mut().epc = sepc::read();

        let cause = scause::read();
        let mut kind = None;

        const ECALL_FROM_U: usize = 8;

        if cause == ECALL_FROM_U {
            // system call
            if proc.killed() {
                proc::exit(-1);
            }

            // sepc pointed at the ecall; resume after it
            local.trapframe_mut().epc += 4;

            // done reading sepc/scause/sstatus, so interrupts may land
            interrupts::enable();

            syscall(local.trapframe_mut());
        } else {
            kind = dev_intr(cause);

            if kind.is_none() {
                let mut shared = proc.shared.lock();
                println!(
                    "user_trap: unexpected scause={:#x} pid={} sepc={:#x} stval={:#x}",
                    cause,
                    shared.pid.as_usize(),
                    sepc::read(),
                    stval::read(),
                );
                shared.killed = true;
            }
        }

        if proc.killed() {
            proc::exit(-1);
        }

        // timer interrupts mean our slice is up
        if kind == Some(IntrKind::Timer) {
            proc::yield_now();
        }

        user_trap_ret();
    }
}

/// Returns to user space through the trampoline.
///
/// # Safety
/// Caller must be a process on its way out of the kernel.
pub unsafe fn user_trap_ret() -> ! {
    let proc = proc::current();

    // Traps must not land on kernel_trap once stvec points into the
    // trampoline, so close the window now.
    interrupts::disable();

    unsafe {
        let base = trampoline as *const () as usize;
        stvec::write(TRAMPOLINE + (uservec as *const () as usize - base));

        // what uservec needs on the next trap
        // Safety: we are the current process.
        let local = proc.local_mut();
        let kernel_sp = local.kstack.add(PGSIZE).as_usize();
        let tf = local.trapframe_mut();
        tf.kernel_satp = satp::read();
        tf.kernel_sp = kernel_sp;
        tf.kernel_trap = user_trap as *const () as usize;
        tf.kernel_hartid = tp::read();

        // sret should enter user mode with interrupts on
        let mut status = sstatus::read();
        status &= !sstatus::SPP;
        status |= sstatus::SPIE;
        sstatus::write(status);

        sepc::write(tf.epc);

        let user_satp = local.space_mut().root_satp();

        // jump to userret in the trampoline, which switches page tables
        // and restores user registers
        let jump: extern "C" fn(usize) -> ! = core::mem::transmute(
            TRAMPOLINE + (userret as *const () as usize - base),
        );
        jump(user_satp);
    }
}

/// Traps taken in supervisor mode arrive here from kernelvec.
///
/// sepc and sstatus are saved and restored by hand because a timer
/// interrupt may yield into another process, which will trap and
/// overwrite them before control comes back.
///
/// # Safety
/// Reached only through kernelvec.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kernel_trap() {
    unsafe {
        let saved_sepc = sepc::read();
        let saved_sstatus = sstatus::read();

        assert!(
            saved_sstatus & sstatus::SPP != 0,
            "kernel_trap: not from supervisor mode"
        );
        assert!(!interrupts::get(), "kernel_trap: interrupts enabled");

        let cause = scause::read();
        let kind = dev_intr(cause);
        if kind.is_none() {
            // an exception inside the kernel is fatal
            println!(
                "scause={:#x} sepc={:#x} stval={:#x}",
                cause,
                saved_sepc,
                stval::read()
            );
            panic!("kernel_trap");
        }

        if kind == Some(IntrKind::Timer) && proc::current_opt().is_some() {
            proc::yield_now();
        }

        // the yield may have trapped elsewhere; restore for sret
        sepc::write(saved_sepc);
        sstatus::write(saved_sstatus);
    }
}

/// Points this hart's trap vector at the kernel handler.
///
/// # Safety
/// Once per hart during boot.
pub unsafe fn init_hart() {
    unsafe { stvec::write(kernelvec as *const () as usize) };
}
