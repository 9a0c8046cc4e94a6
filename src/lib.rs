#![no_std]
#![feature(allocator_api)]
#![feature(alloc_error_handler)]
#![feature(fn_align)]
#![cfg_attr(test, feature(custom_test_frameworks))]
#![cfg_attr(test, test_runner(crate::test_framework::runner))]
#![cfg_attr(test, reexport_test_harness_main = "test_main")]

extern crate alloc;

pub mod printf;

pub mod buf;
pub mod console;
pub mod cpu;
pub mod entry;
pub mod error;
pub mod exec;
pub mod file;
pub mod fs;
pub mod kalloc;
pub mod kernelvec;
pub mod log;
pub mod memlayout;
pub mod param;
pub mod pipe;
pub mod plic;
pub mod proc;
pub mod ramdisk;
pub mod riscv;
pub mod sleeplock;
pub mod spinlock;
pub mod start;
pub mod swtch;
pub mod sync;
pub mod syscall;
pub mod sysfile;
pub mod sysproc;
#[cfg(test)]
pub mod test_framework;
pub mod trampoline;
pub mod trap;
pub mod uart;
pub mod vm;

use core::sync::atomic::{AtomicBool, Ordering};

static STARTED: AtomicBool = AtomicBool::new(false);

/// Supervisor-mode entry for every hart, from `start`'s mret. Hart 0
/// builds the world and flips the barrier; the rest wait, then install
/// their own paging, trap vector, and interrupt routing. Everyone ends
/// up in the scheduler.
pub fn kmain() -> ! {
    if unsafe { cpu::id() } == 0 {
        unsafe {
            console::init();

            println!();
            println!("minnow booting");
            println!();

            kalloc::init();
            vm::init();
            vm::init_hart();
            proc::init();
            trap::init_hart();
            plic::init();
            plic::init_hart();

            proc::user_init();
        }

        println!("hart 0 running");

        #[cfg(test)]
        test_main();

        STARTED.store(true, Ordering::SeqCst);
    } else {
        while !STARTED.load(Ordering::SeqCst) {
            core::hint::spin_loop();
        }

        println!("hart {} running", unsafe { cpu::id() });

        unsafe {
            vm::init_hart();
            trap::init_hart();
            plic::init_hart();
        }
    }

    unsafe { proc::scheduler() }
}

/// Entry symbol for the test build of the library; the normal kernel
/// binary provides its own in main.rs.
#[cfg(test)]
#[unsafe(export_name = "main")]
extern "C" fn test_kernel_main() -> ! {
    kmain()
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    test_framework::panic_handler(info)
}
