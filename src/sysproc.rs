use crate::error::{KernelError, Result};
use crate::proc::{self, Chan, Pid};
use crate::syscall::SyscallArgs;
use crate::trap::TICKS;

pub fn sys_fork(_args: &SyscallArgs) -> Result<usize> {
    proc::fork().map(Pid::as_usize)
}

pub fn sys_exit(args: &SyscallArgs) -> ! {
    proc::exit(args.int(0) as i32)
}

pub fn sys_wait(args: &SyscallArgs) -> Result<usize> {
    proc::wait(args.addr(0)).map(Pid::as_usize)
}

pub fn sys_kill(args: &SyscallArgs) -> Result<usize> {
    proc::kill(Pid::from(args.raw(0)))?;
    Ok(0)
}

pub fn sys_getpid(_args: &SyscallArgs) -> Result<usize> {
    Ok(proc::current().pid().as_usize())
}

/// Grows or shrinks user memory; the return value is the old size, so
/// user code learns where the new region starts.
pub fn sys_sbrk(args: &SyscallArgs) -> Result<usize> {
    let n = args.int(0);
    let old_size = proc::current().local().size;
    proc::grow(n)?;
    Ok(old_size)
}

/// Sleeps for the requested number of clock ticks, or until killed.
pub fn sys_sleep(args: &SyscallArgs) -> Result<usize> {
    let n = args.int(0).max(0) as usize;

    let mut ticks = TICKS.lock();
    let start = *ticks;

    while *ticks - start < n {
        if proc::current().killed() {
            return Err(KernelError::Killed);
        }
        ticks = proc::sleep(Chan::Ticks, ticks);
    }

    Ok(0)
}

pub fn sys_uptime(_args: &SyscallArgs) -> Result<usize> {
    Ok(*TICKS.lock())
}
