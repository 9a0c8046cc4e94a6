//! Open files: a reference-counted handle over an inode, a pipe end, or
//! a device, plus the flat device-switch table.

use alloc::sync::Arc;

use crate::error::{KernelError, Result};
use crate::fs::{Inode, InodeKind, Stat};
use crate::log::Operation;
use crate::param::{MAXOPBLOCKS, NDEV};
use crate::pipe::Pipe;
use crate::proc::{self, Addr};
use crate::sleeplock::SleepLock;
use crate::sync::OnceLock;
use crate::vm::VirtAddr;

pub const O_RDONLY: usize = 0x000;
pub const O_WRONLY: usize = 0x001;
pub const O_RDWR: usize = 0x002;
pub const O_CREATE: usize = 0x200;
pub const O_TRUNC: usize = 0x400;

/// Read/write entry points for a character device, indexed by major
/// number. Dispatch is flat and table-driven.
#[derive(Clone, Copy)]
pub struct Device {
    pub read: fn(dst: Addr, n: usize) -> Result<usize>,
    pub write: fn(src: Addr, n: usize) -> Result<usize>,
}

/// The console's major number.
pub const CONSOLE: u16 = 1;

static DEVICES: [OnceLock<Device>; NDEV] = [const { OnceLock::new() }; NDEV];

/// Installs a driver at `major`. Drivers call this at boot.
pub fn register_device(major: u16, dev: Device) {
    DEVICES[major as usize].init_with(|| dev);
}

fn device(major: u16) -> Result<&'static Device> {
    if major as usize >= NDEV {
        return Err(KernelError::NoDevice);
    }
    DEVICES[major as usize].get().ok_or(KernelError::NoDevice)
}

enum FileKind {
    /// a regular file or directory, with a read/write offset
    Node { inode: Inode, off: SleepLock<u32> },
    /// one end of a pipe
    Pipe { pipe: Arc<Pipe>, write_end: bool },
    /// a device file; reads and writes go through the device switch
    Device { inode: Inode, major: u16 },
}

struct FileInner {
    kind: FileKind,
    readable: bool,
    writable: bool,
}

impl Drop for FileInner {
    fn drop(&mut self) {
        // the last handle is gone; release what the file held
        match &mut self.kind {
            FileKind::Node { inode, .. } | FileKind::Device { inode, .. } => {
                let _op = Operation::begin();
                // Safety: dropping, so the field is never touched again.
                let inode = unsafe { core::ptr::read(inode) };
                inode.put();
            }
            FileKind::Pipe { pipe, write_end } => pipe.close(*write_end),
        }
    }
}

/// A process's handle on an open file. `clone` is `dup`: handles share
/// one offset and one reference on the underlying object, which is
/// released when the last clone drops.
#[derive(Clone)]
pub struct File {
    inner: Arc<FileInner>,
}

impl File {
    pub fn new_node(inode: Inode, readable: bool, writable: bool) -> Result<Self> {
        Ok(Self {
            inner: Arc::try_new(FileInner {
                kind: FileKind::Node {
                    inode,
                    off: SleepLock::new(0, "file"),
                },
                readable,
                writable,
            })
            .map_err(|_| KernelError::OutOfMemory)?,
        })
    }

    pub fn new_device(inode: Inode, major: u16, readable: bool, writable: bool) -> Result<Self> {
        Ok(Self {
            inner: Arc::try_new(FileInner {
                kind: FileKind::Device { inode, major },
                readable,
                writable,
            })
            .map_err(|_| KernelError::OutOfMemory)?,
        })
    }

    pub fn new_pipe_end(pipe: Arc<Pipe>, write_end: bool) -> Result<Self> {
        Ok(Self {
            inner: Arc::try_new(FileInner {
                kind: FileKind::Pipe {
                    pipe: Arc::clone(&pipe),
                    write_end,
                },
                readable: !write_end,
                writable: write_end,
            })
            .map_err(|_| KernelError::OutOfMemory)?,
        })
    }

    /// Copies file metadata out to `addr` in user space.
    pub fn stat(&self, addr: VirtAddr) -> Result<()> {
        match &self.inner.kind {
            FileKind::Node { inode, .. } | FileKind::Device { inode, .. } => {
                let data = inode.lock();
                let stat = inode.stat(&data);
                inode.unlock(data);

                let bytes = unsafe {
                    core::slice::from_raw_parts(
                        &stat as *const Stat as *const u8,
                        size_of::<Stat>(),
                    )
                };
                proc::copy_out_user(bytes, addr)
            }
            FileKind::Pipe { .. } => Err(KernelError::BadArgument),
        }
    }

    /// Reads up to `n` bytes into user memory at `addr`, advancing the
    /// offset for inode-backed files.
    pub fn read(&self, addr: VirtAddr, n: usize) -> Result<usize> {
        if !self.inner.readable {
            return Err(KernelError::BadFileDescriptor);
        }

        match &self.inner.kind {
            FileKind::Node { inode, off } => {
                let mut off = off.lock();
                let mut data = inode.lock();
                let read = inode.read(&mut data, *off, Addr::User(addr), n as u32);
                if let Ok(read) = read {
                    *off += read;
                }
                inode.unlock(data);
                read.map(|r| r as usize)
            }
            FileKind::Pipe { pipe, .. } => pipe.read(addr, n),
            FileKind::Device { major, .. } => (device(*major)?.read)(Addr::User(addr), n),
        }
    }

    /// Writes `n` bytes from user memory at `addr`.
    pub fn write(&self, addr: VirtAddr, n: usize) -> Result<usize> {
        if !self.inner.writable {
            return Err(KernelError::BadFileDescriptor);
        }

        match &self.inner.kind {
            FileKind::Node { inode, off } => {
                // Split big writes so one transaction never overflows the
                // log: count the inode, the indirect block, the bitmap
                // block, and two blocks of slop for unaligned ends.
                let max = (MAXOPBLOCKS - 4) / 2 * crate::fs::BSIZE;

                let mut off = off.lock();
                let mut written = 0;
                while written < n {
                    let chunk = (n - written).min(max);

                    let _op = Operation::begin();
                    let mut data = inode.lock();
                    let result = inode.write(
                        &mut data,
                        *off,
                        Addr::User(addr.add(written)),
                        chunk as u32,
                    );
                    if let Ok(w) = result {
                        *off += w;
                    }
                    inode.unlock(data);
                    drop(_op);

                    match result {
                        Ok(w) if w as usize == chunk => written += chunk,
                        _ => return Err(KernelError::BadAddress),
                    }
                }

                Ok(n)
            }
            FileKind::Pipe { pipe, .. } => pipe.write(addr, n),
            FileKind::Device { major, .. } => (device(*major)?.write)(Addr::User(addr), n),
        }
    }

    /// The inode behind this file, for callers that need more than
    /// read/write; None for pipes.
    pub fn inode(&self) -> Option<&Inode> {
        match &self.inner.kind {
            FileKind::Node { inode, .. } | FileKind::Device { inode, .. } => Some(inode),
            FileKind::Pipe { .. } => None,
        }
    }
}

/// Opens the inode at `path` according to the O_* flags in `mode`.
pub fn open(path: &str, mode: usize) -> Result<File> {
    let path = crate::fs::Path::new(path);
    let _op = Operation::begin();

    let (inode, mut data) = if mode & O_CREATE != 0 {
        Inode::create(&path, InodeKind::File, 0, 0)?
    } else {
        let inode = path.resolve()?;
        let data = inode.lock();

        // directories only open read-only
        if data.kind == InodeKind::Directory && mode != O_RDONLY {
            inode.unlock_put(data);
            return Err(KernelError::BadArgument);
        }

        (inode, data)
    };

    let readable = mode & O_WRONLY == 0;
    let writable = mode & O_WRONLY != 0 || mode & O_RDWR != 0;

    let file = match data.kind {
        InodeKind::Device => {
            let major = data.major;
            File::new_device(inode.dup(), major, readable, writable)
        }
        _ => File::new_node(inode.dup(), readable, writable),
    };

    let file = match file {
        Ok(f) => f,
        Err(e) => {
            inode.unlock_put(data);
            return Err(e);
        }
    };

    if mode & O_TRUNC != 0 && data.kind == InodeKind::File {
        inode.truncate(&mut data);
    }

    inode.unlock_put(data);
    Ok(file)
}
