//! Physical memory layout for qemu's -machine virt, from qemu's
//! hw/riscv/virt.c:
//!
//! 00001000 -- boot ROM, provided by qemu
//! 02000000 -- CLINT
//! 0C000000 -- PLIC
//! 10000000 -- uart0
//! 80000000 -- boot ROM jumps here in machine mode; the kernel is loaded here
//!
//! The kernel carves up RAM thus:
//! 80000000 -- kernel text and data
//! end      -- fixed-size heap for small kernel objects, then the page pool
//! RAMDISK  -- the file system image, placed by the qemu loader
//! PHYSTOP  -- end of RAM used by the kernel

use crate::riscv::{MAXVA, PGSIZE};

pub const UART0: usize = 0x1000_0000;
pub const UART0_IRQ: usize = 10;

pub const PLIC: usize = 0x0c00_0000;

#[allow(non_snake_case)]
pub const fn PLIC_SENABLE(hart: usize) -> usize {
    PLIC + 0x2080 + hart * 0x100
}

#[allow(non_snake_case)]
pub const fn PLIC_SPRIORITY(hart: usize) -> usize {
    PLIC + 0x20_1000 + hart * 0x2000
}

#[allow(non_snake_case)]
pub const fn PLIC_SCLAIM(hart: usize) -> usize {
    PLIC + 0x20_1004 + hart * 0x2000
}

pub const KERNBASE: usize = 0x8000_0000;
pub const PHYSTOP: usize = KERNBASE + 128 * 1024 * 1024;

/// Bytes reserved after the kernel image for the small-object heap.
/// Pages for user memory and page tables come from the page pool instead.
pub const HEAPSIZE: usize = 1024 * 1024;

/// The file system image lives in the top 4 MiB of RAM, loaded there by
/// qemu's generic loader before the kernel boots.
pub const RAMDISK: usize = PHYSTOP - 4 * 1024 * 1024;

/// The trampoline page occupies the highest virtual address in both kernel
/// and user address spaces.
pub const TRAMPOLINE: usize = MAXVA - PGSIZE;

/// The trap frame sits just under the trampoline in every user space.
pub const TRAPFRAME: usize = TRAMPOLINE - PGSIZE;

/// Kernel stack for process slot `i`: high in the kernel address space,
/// with an unmapped guard page below each stack.
pub const fn kstack(i: usize) -> usize {
    TRAMPOLINE - (i + 1) * 2 * PGSIZE
}
