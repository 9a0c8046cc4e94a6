use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{KernelError, Result};
use crate::fs::{Inode, InodeData, Path};
use crate::log::Operation;
use crate::param::{MAXARG, USERSTACK};
use crate::proc;
use crate::riscv::{PGSIZE, PTE_W, PTE_X, pg_round_up};
use crate::sleeplock::SleepLockGuard;
use crate::vm::{UserVm, VirtAddr};

const ELF_MAGIC: u32 = 0x464c457f; // "\x7FELF", little endian

/// ELF64 file header, just the fields the loader reads.
#[repr(C)]
struct ElfHeader {
    magic: u32,
    elf: [u8; 12],
    kind: u16,
    machine: u16,
    version: u32,
    entry: u64,
    phoff: u64,
    shoff: u64,
    flags: u32,
    ehsize: u16,
    phentsize: u16,
    phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

/// ELF64 program header.
#[repr(C)]
struct ProgHeader {
    kind: u32,
    flags: u32,
    offset: u64,
    vaddr: u64,
    paddr: u64,
    filesz: u64,
    memsz: u64,
    align: u64,
}

const PT_LOAD: u32 = 1;
const PF_X: u32 = 0x1;
const PF_W: u32 = 0x2;

impl ProgHeader {
    fn pte_perm(&self) -> usize {
        let mut perm = 0;
        if self.flags & PF_X != 0 {
            perm |= PTE_X;
        }
        if self.flags & PF_W != 0 {
            perm |= PTE_W;
        }
        perm
    }
}

fn read_struct<T>(
    inode: &Inode,
    data: &mut SleepLockGuard<'_, InodeData>,
    off: u32,
) -> Result<T> {
    let mut value = core::mem::MaybeUninit::<T>::uninit();
    let bytes = unsafe {
        core::slice::from_raw_parts_mut(value.as_mut_ptr() as *mut u8, size_of::<T>())
    };
    if inode.read_kernel(data, off, bytes)? as usize != size_of::<T>() {
        return Err(KernelError::BadExecutable);
    }
    Ok(unsafe { value.assume_init() })
}

/// Copies one PT_LOAD segment's file bytes into an already-mapped span of
/// `space`. `va` must be page-aligned.
fn load_segment(
    space: &mut UserVm,
    inode: &Inode,
    data: &mut SleepLockGuard<'_, InodeData>,
    va: usize,
    offset: u32,
    filesz: usize,
) -> Result<()> {
    for i in (0..filesz).step_by(PGSIZE) {
        let pa = space
            .translate(VirtAddr(va + i))
            .expect("load_segment: segment mapped");
        let n = (filesz - i).min(PGSIZE);

        let dst = unsafe { core::slice::from_raw_parts_mut(pa.as_usize() as *mut u8, n) };
        if inode.read_kernel(data, offset + i as u32, dst)? as usize != n {
            return Err(KernelError::BadExecutable);
        }
    }

    Ok(())
}

/// Builds a fresh image from the ELF file: program segments mapped and
/// loaded, nothing else. Returns the image, its size, and the entry pc.
fn load_image(path: &Path<'_>) -> Result<(UserVm, usize, u64)> {
    let _op = Operation::begin();

    let inode = path.resolve()?;
    let mut data = inode.lock();

    let result = (|| {
        let elf: ElfHeader = read_struct(&inode, &mut data, 0)?;
        if elf.magic != ELF_MAGIC {
            return Err(KernelError::BadExecutable);
        }

        let mut space = proc::current().build_space()?;
        let mut size = 0;

        for i in 0..elf.phnum {
            let off = elf.phoff as u32 + i as u32 * size_of::<ProgHeader>() as u32;
            let ph: ProgHeader = match read_struct(&inode, &mut data, off) {
                Ok(ph) => ph,
                Err(e) => {
                    space.release(size);
                    return Err(e);
                }
            };

            if ph.kind != PT_LOAD {
                continue;
            }
            if ph.memsz < ph.filesz
                || ph.vaddr.checked_add(ph.memsz).is_none()
                || ph.vaddr as usize % PGSIZE != 0
            {
                space.release(size);
                return Err(KernelError::BadExecutable);
            }

            size = match space.grow(size, (ph.vaddr + ph.memsz) as usize, ph.pte_perm()) {
                Ok(s) => s,
                Err(e) => {
                    space.release(size);
                    return Err(e);
                }
            };

            if let Err(e) = load_segment(
                &mut space,
                &inode,
                &mut data,
                ph.vaddr as usize,
                ph.offset as u32,
                ph.filesz as usize,
            ) {
                space.release(size);
                return Err(e);
            }
        }

        Ok((space, size, elf.entry))
    })();

    inode.unlock_put(data);
    result
}

/// Replaces the current process image with the program at `path`.
/// Returns argc, which lands in a0 and becomes main's first argument.
pub fn exec(path: &Path<'_>, argv: &[String]) -> Result<usize> {
    if argv.len() > MAXARG {
        return Err(KernelError::BadArgument);
    }

    let (mut space, mut size, entry) = load_image(path)?;

    // The user stack sits above the image at the next page boundary:
    // one inaccessible guard page, then USERSTACK pages.
    size = pg_round_up(size);
    size = match space.grow(size, size + (USERSTACK + 1) * PGSIZE, PTE_W) {
        Ok(s) => s,
        Err(e) => {
            space.release(size);
            return Err(e);
        }
    };
    if space
        .clear_user(VirtAddr(size - (USERSTACK + 1) * PGSIZE))
        .is_err()
    {
        space.release(size);
        return Err(KernelError::BadAddress);
    }

    let mut sp = size;
    let stack_base = sp - USERSTACK * PGSIZE;

    // argument strings first, highest to lowest
    let mut arg_ptrs: Vec<u64> = Vec::with_capacity(argv.len() + 1);
    for arg in argv {
        sp -= arg.len() + 1; // with NUL
        sp -= sp % 16; // riscv sp alignment
        if sp < stack_base {
            space.release(size);
            return Err(KernelError::BadArgument);
        }

        let copied = space
            .copy_out(VirtAddr(sp), arg.as_bytes())
            .and_then(|_| space.copy_out(VirtAddr(sp + arg.len()), &[0u8]));
        if copied.is_err() {
            space.release(size);
            return Err(KernelError::BadAddress);
        }

        arg_ptrs.push(sp as u64);
    }
    arg_ptrs.push(0);

    // then the argv array itself
    sp -= arg_ptrs.len() * size_of::<u64>();
    sp -= sp % 16;
    let ptr_bytes = unsafe {
        core::slice::from_raw_parts(
            arg_ptrs.as_ptr() as *const u8,
            arg_ptrs.len() * size_of::<u64>(),
        )
    };
    if sp < stack_base || space.copy_out(VirtAddr(sp), ptr_bytes).is_err() {
        space.release(size);
        return Err(KernelError::BadAddress);
    }

    // Safety: we are the current process.
    let local = unsafe { proc::current().local_mut() };

    // keep the basename for the debug listing
    local.name.clear();
    local
        .name
        .push_str(path.as_str().rsplit('/').next().unwrap_or(path.as_str()));

    // commit to the new image
    let old_size = local.size;
    let old_space = local.space.replace(space).expect("exec: no old image");
    local.size = size;

    let tf = local.trapframe_mut();
    tf.epc = entry as usize; // user pc: the ELF entry point
    tf.sp = sp;
    tf.a1 = sp; // argv, main's second argument

    old_space.release(old_size);

    Ok(argv.len()) // argc, via a0
}
