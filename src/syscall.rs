use alloc::string::String;

use crate::error::{KernelError, Result};
use crate::file::File;
use crate::param::NOFILE;
use crate::println;
use crate::proc::{self, TrapFrame};
use crate::sysfile::*;
use crate::sysproc::*;
use crate::vm::VirtAddr;

/// System call numbers, as user space loads them into a7.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sys {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Pipe = 4,
    Read = 5,
    Kill = 6,
    Exec = 7,
    Fstat = 8,
    Chdir = 9,
    Dup = 10,
    Getpid = 11,
    Sbrk = 12,
    Sleep = 13,
    Uptime = 14,
    Open = 15,
    Write = 16,
    Mknod = 17,
    Unlink = 18,
    Link = 19,
    Mkdir = 20,
    Close = 21,
}

impl TryFrom<usize> for Sys {
    type Error = KernelError;

    fn try_from(n: usize) -> Result<Self> {
        Ok(match n {
            1 => Sys::Fork,
            2 => Sys::Exit,
            3 => Sys::Wait,
            4 => Sys::Pipe,
            5 => Sys::Read,
            6 => Sys::Kill,
            7 => Sys::Exec,
            8 => Sys::Fstat,
            9 => Sys::Chdir,
            10 => Sys::Dup,
            11 => Sys::Getpid,
            12 => Sys::Sbrk,
            13 => Sys::Sleep,
            14 => Sys::Uptime,
            15 => Sys::Open,
            16 => Sys::Write,
            17 => Sys::Mknod,
            18 => Sys::Unlink,
            19 => Sys::Link,
            20 => Sys::Mkdir,
            21 => Sys::Close,
            _ => return Err(KernelError::BadArgument),
        })
    }
}

/// Typed access to the six syscall argument registers, plus the fetch
/// helpers that chase user pointers through the page table.
pub struct SyscallArgs<'a> {
    tf: &'a TrapFrame,
}

impl<'a> SyscallArgs<'a> {
    fn new(tf: &'a TrapFrame) -> Self {
        Self { tf }
    }

    /// Argument `n` as the raw register value.
    pub fn raw(&self, n: usize) -> usize {
        match n {
            0 => self.tf.a0,
            1 => self.tf.a1,
            2 => self.tf.a2,
            3 => self.tf.a3,
            4 => self.tf.a4,
            5 => self.tf.a5,
            _ => panic!("syscall argument index {}", n),
        }
    }

    pub fn int(&self, n: usize) -> isize {
        self.raw(n) as isize
    }

    /// Argument `n` as a user virtual address. Not validated here; the
    /// copy routines check when it is used.
    pub fn addr(&self, n: usize) -> VirtAddr {
        VirtAddr(self.raw(n))
    }

    /// Argument `n` as an open file descriptor of the current process.
    pub fn file(&self, n: usize) -> Result<(usize, File)> {
        let fd = self.raw(n);
        if fd >= NOFILE {
            return Err(KernelError::BadFileDescriptor);
        }

        match &proc::current().local().files[fd] {
            Some(file) => Ok((fd, file.clone())),
            None => Err(KernelError::BadFileDescriptor),
        }
    }

    /// NUL-terminated string at the user address in argument `n`.
    pub fn str_arg(&self, n: usize, max: usize) -> Result<String> {
        fetch_str(self.addr(n), max)
    }
}

/// NUL-terminated string at user address `va`.
pub fn fetch_str(va: VirtAddr, max: usize) -> Result<String> {
    // Safety: we are the current process.
    let local = unsafe { proc::current().local_mut() };
    local.space_mut().copy_in_str(va, max)
}

/// A usize at user address `va`.
pub fn fetch_addr(va: VirtAddr) -> Result<usize> {
    let mut bytes = [0u8; size_of::<usize>()];
    proc::copy_in_user(&mut bytes, va)?;
    Ok(usize::from_le_bytes(bytes))
}

/// Decodes and runs the system call named in a7, leaving the result in
/// a0. Failures become -1; user space never sees kernel error values.
pub fn syscall(tf: &mut TrapFrame) {
    let args = SyscallArgs::new(tf);

    let result = match Sys::try_from(tf.a7) {
        Ok(sys) => match sys {
            Sys::Fork => sys_fork(&args),
            Sys::Exit => sys_exit(&args),
            Sys::Wait => sys_wait(&args),
            Sys::Pipe => sys_pipe(&args),
            Sys::Read => sys_read(&args),
            Sys::Kill => sys_kill(&args),
            Sys::Exec => sys_exec(&args),
            Sys::Fstat => sys_fstat(&args),
            Sys::Chdir => sys_chdir(&args),
            Sys::Dup => sys_dup(&args),
            Sys::Getpid => sys_getpid(&args),
            Sys::Sbrk => sys_sbrk(&args),
            Sys::Sleep => sys_sleep(&args),
            Sys::Uptime => sys_uptime(&args),
            Sys::Open => sys_open(&args),
            Sys::Write => sys_write(&args),
            Sys::Mknod => sys_mknod(&args),
            Sys::Unlink => sys_unlink(&args),
            Sys::Link => sys_link(&args),
            Sys::Mkdir => sys_mkdir(&args),
            Sys::Close => sys_close(&args),
        },
        Err(_) => {
            let proc = proc::current();
            println!(
                "{} {}: unknown syscall {}",
                proc.pid().as_usize(),
                proc.local().name,
                tf.a7
            );
            Err(KernelError::BadArgument)
        }
    };

    tf.a0 = match result {
        Ok(v) => v,
        Err(_) => usize::MAX, // -1
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn syscall_numbers_round_trip() {
        for n in 1..=21usize {
            let sys = Sys::try_from(n).unwrap();
            assert_eq!(sys as usize, n);
        }
        assert!(Sys::try_from(0).is_err());
        assert!(Sys::try_from(22).is_err());
    }
}
