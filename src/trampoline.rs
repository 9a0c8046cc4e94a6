//! User/supervisor crossing code.
//!
//! The page holding these routines is mapped at the same virtual address
//! (TRAMPOLINE) in the kernel and in every user space, so the code keeps
//! running across the satp switch. kernel.ld places `trampsec` on its own
//! page and checks it fits in one.

use core::arch::naked_asm;

use crate::memlayout::TRAPFRAME;

/// Marker for the start of the trampoline page; address arithmetic in
/// `user_trap_ret` is relative to this symbol.
#[unsafe(naked)]
#[unsafe(no_mangle)]
#[unsafe(link_section = "trampsec")]
#[rustc_align(4)]
pub unsafe extern "C" fn trampoline() {
    naked_asm!("unimp");
}

/// Traps from user space land here, in supervisor mode but still on the
/// user page table. Saves every user register into the trap frame (mapped
/// at TRAPFRAME in all user spaces), installs the kernel's satp, stack and
/// hart id from the fields `user_trap_ret` primed, and jumps to
/// `user_trap`.
#[unsafe(naked)]
#[unsafe(no_mangle)]
#[unsafe(link_section = "trampsec")]
#[rustc_align(4)]
pub unsafe extern "C" fn uservec() -> ! {
    naked_asm!(
        // sscratch buffers user a0 so a0 can address the trap frame
        "csrw sscratch, a0",
        "li a0, {tf}",
        //
        "sd ra, 40(a0)",
        "sd sp, 48(a0)",
        "sd gp, 56(a0)",
        "sd tp, 64(a0)",
        "sd t0, 72(a0)",
        "sd t1, 80(a0)",
        "sd t2, 88(a0)",
        "sd s0, 96(a0)",
        "sd s1, 104(a0)",
        "sd a1, 120(a0)",
        "sd a2, 128(a0)",
        "sd a3, 136(a0)",
        "sd a4, 144(a0)",
        "sd a5, 152(a0)",
        "sd a6, 160(a0)",
        "sd a7, 168(a0)",
        "sd s2, 176(a0)",
        "sd s3, 184(a0)",
        "sd s4, 192(a0)",
        "sd s5, 200(a0)",
        "sd s6, 208(a0)",
        "sd s7, 216(a0)",
        "sd s8, 224(a0)",
        "sd s9, 232(a0)",
        "sd s10, 240(a0)",
        "sd s11, 248(a0)",
        "sd t3, 256(a0)",
        "sd t4, 264(a0)",
        "sd t5, 272(a0)",
        "sd t6, 280(a0)",
        //
        // the stashed user a0
        "csrr t0, sscratch",
        "sd t0, 112(a0)",
        //
        // kernel stack, hart id, handler, page table
        "ld sp, 8(a0)",
        "ld tp, 32(a0)",
        "ld t0, 16(a0)",
        "ld t1, 0(a0)",
        //
        // finish pending loads/stores under the user table, switch to the
        // kernel table, drop its stale entries
        "sfence.vma zero, zero",
        "csrw satp, t1",
        "sfence.vma zero, zero",
        //
        // user_trap(), which does not return here
        "jr t0",
        tf = const TRAPFRAME,
    );
}

/// The tail of `user_trap_ret`: switches to the user page table (passed in
/// a0 as a satp value), restores every user register from the trap frame,
/// and sret's to user mode. sstatus and sepc were set up by the caller.
#[unsafe(naked)]
#[unsafe(no_mangle)]
#[unsafe(link_section = "trampsec")]
#[rustc_align(4)]
pub unsafe extern "C" fn userret(user_satp: usize) -> ! {
    naked_asm!(
        "sfence.vma zero, zero",
        "csrw satp, a0",
        "sfence.vma zero, zero",
        //
        "li a0, {tf}",
        //
        "ld ra, 40(a0)",
        "ld sp, 48(a0)",
        "ld gp, 56(a0)",
        "ld tp, 64(a0)",
        "ld t0, 72(a0)",
        "ld t1, 80(a0)",
        "ld t2, 88(a0)",
        "ld s0, 96(a0)",
        "ld s1, 104(a0)",
        "ld a1, 120(a0)",
        "ld a2, 128(a0)",
        "ld a3, 136(a0)",
        "ld a4, 144(a0)",
        "ld a5, 152(a0)",
        "ld a6, 160(a0)",
        "ld a7, 168(a0)",
        "ld s2, 176(a0)",
        "ld s3, 184(a0)",
        "ld s4, 192(a0)",
        "ld s5, 200(a0)",
        "ld s6, 208(a0)",
        "ld s7, 216(a0)",
        "ld s8, 224(a0)",
        "ld s9, 232(a0)",
        "ld s10, 240(a0)",
        "ld s11, 248(a0)",
        "ld t3, 256(a0)",
        "ld t4, 264(a0)",
        "ld t5, 272(a0)",
        "ld t6, 280(a0)",
        //
        "ld a0, 112(a0)",
        //
        "sret",
        tf = const TRAPFRAME,
    );
}
