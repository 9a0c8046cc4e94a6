use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{KernelError, Result};
use crate::exec::exec;
use crate::file::{self, File};
use crate::fs::{Inode, InodeKind, Path, dir_is_empty, dir_link, dir_lookup};
use crate::log::Operation;
use crate::param::{MAXARG, MAXPATH};
use crate::pipe::Pipe;
use crate::proc;
use crate::syscall::{SyscallArgs, fetch_addr, fetch_str};

/// Hands `file` to the lowest free descriptor of the current process.
fn fd_alloc(file: File) -> Result<usize> {
    // Safety: we are the current process.
    let local = unsafe { proc::current().local_mut() };

    for (fd, slot) in local.files.iter_mut().enumerate() {
        if slot.is_none() {
            *slot = Some(file);
            return Ok(fd);
        }
    }

    Err(KernelError::TooManyFiles)
}

pub fn sys_open(args: &SyscallArgs) -> Result<usize> {
    let path = args.str_arg(0, MAXPATH)?;
    let mode = args.raw(1);

    let file = file::open(&path, mode)?;
    fd_alloc(file)
}

pub fn sys_close(args: &SyscallArgs) -> Result<usize> {
    let (fd, _file) = args.file(0)?;

    // Safety: we are the current process.
    let local = unsafe { proc::current().local_mut() };
    local.files[fd] = None;

    Ok(0)
}

pub fn sys_read(args: &SyscallArgs) -> Result<usize> {
    let (_, file) = args.file(0)?;
    let addr = args.addr(1);
    let n = args.raw(2);
    file.read(addr, n)
}

pub fn sys_write(args: &SyscallArgs) -> Result<usize> {
    let (_, file) = args.file(0)?;
    let addr = args.addr(1);
    let n = args.raw(2);
    file.write(addr, n)
}

pub fn sys_dup(args: &SyscallArgs) -> Result<usize> {
    let (_, file) = args.file(0)?;
    fd_alloc(file)
}

pub fn sys_fstat(args: &SyscallArgs) -> Result<usize> {
    let (_, file) = args.file(0)?;
    file.stat(args.addr(1))?;
    Ok(0)
}

/// Creates a pipe and returns its two descriptors through the user
/// pointer in a0, read end first, as two little-endian i32s.
pub fn sys_pipe(args: &SyscallArgs) -> Result<usize> {
    let fd_array = args.addr(0);

    let (read_end, write_end) = Pipe::new_pair()?;

    let rfd = fd_alloc(read_end)?;
    let wfd = match fd_alloc(write_end) {
        Ok(fd) => fd,
        Err(e) => {
            // Safety: we are the current process.
            unsafe { proc::current().local_mut() }.files[rfd] = None;
            return Err(e);
        }
    };

    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&(rfd as i32).to_le_bytes());
    bytes[4..].copy_from_slice(&(wfd as i32).to_le_bytes());

    if proc::copy_out_user(&bytes, fd_array).is_err() {
        // Safety: we are the current process.
        let local = unsafe { proc::current().local_mut() };
        local.files[rfd] = None;
        local.files[wfd] = None;
        return Err(KernelError::BadAddress);
    }

    Ok(0)
}

pub fn sys_exec(args: &SyscallArgs) -> Result<usize> {
    let path = args.str_arg(0, MAXPATH)?;
    let argv_base = args.addr(1);

    let mut argv: Vec<String> = Vec::new();
    for i in 0..=MAXARG {
        if i == MAXARG {
            return Err(KernelError::BadArgument);
        }

        let ptr = fetch_addr(argv_base.add(i * size_of::<usize>()))?;
        if ptr == 0 {
            break;
        }

        argv.push(fetch_str(ptr.into(), MAXPATH)?);
    }

    exec(&Path::new(&path), &argv)
}

pub fn sys_chdir(args: &SyscallArgs) -> Result<usize> {
    let path = args.str_arg(0, MAXPATH)?;

    let _op = Operation::begin();

    let inode = Path::new(&path).resolve()?;
    let data = inode.lock();
    if data.kind != InodeKind::Directory {
        inode.unlock_put(data);
        return Err(KernelError::NotADirectory);
    }
    inode.unlock(data);

    // Safety: we are the current process.
    let local = unsafe { proc::current().local_mut() };
    if let Some(old) = local.cwd.replace(inode) {
        old.put();
    }

    Ok(0)
}

pub fn sys_mkdir(args: &SyscallArgs) -> Result<usize> {
    let path = args.str_arg(0, MAXPATH)?;

    let _op = Operation::begin();
    let (inode, data) = Inode::create(&Path::new(&path), InodeKind::Directory, 0, 0)?;
    inode.unlock_put(data);

    Ok(0)
}

pub fn sys_mknod(args: &SyscallArgs) -> Result<usize> {
    let path = args.str_arg(0, MAXPATH)?;
    let major = args.raw(1) as u16;
    let minor = args.raw(2) as u16;

    let _op = Operation::begin();
    let (inode, data) = Inode::create(&Path::new(&path), InodeKind::Device, major, minor)?;
    inode.unlock_put(data);

    Ok(0)
}

pub fn sys_link(args: &SyscallArgs) -> Result<usize> {
    let old = args.str_arg(0, MAXPATH)?;
    let new = args.str_arg(1, MAXPATH)?;

    let _op = Operation::begin();

    let old_inode = Path::new(&old).resolve()?;
    let mut old_data = old_inode.lock();

    if old_data.kind == InodeKind::Directory {
        old_inode.unlock_put(old_data);
        return Err(KernelError::BadArgument);
    }

    old_data.nlink += 1;
    old_inode.update(&old_data);
    old_inode.unlock(old_data);

    // from here failures must undo the link count
    let linked = (|| {
        let (parent, name) = Path::new(&new).resolve_parent()?;

        if parent.dev != old_inode.dev {
            parent.put();
            return Err(KernelError::CrossDevice);
        }

        let mut parent_data = parent.lock();
        let result = dir_link(&parent, &mut parent_data, name, old_inode.inum);
        parent.unlock_put(parent_data);
        result
    })();

    if linked.is_err() {
        let mut old_data = old_inode.lock();
        old_data.nlink -= 1;
        old_inode.update(&old_data);
        old_inode.unlock(old_data);
    }

    old_inode.put();
    linked.map(|_| 0)
}

pub fn sys_unlink(args: &SyscallArgs) -> Result<usize> {
    let path = args.str_arg(0, MAXPATH)?;

    let _op = Operation::begin();

    let (parent, name) = Path::new(&path).resolve_parent()?;
    let mut parent_data = parent.lock();

    // "." and ".." are structural; refuse
    if name == "." || name == ".." {
        parent.unlock_put(parent_data);
        return Err(KernelError::BadArgument);
    }

    let (off, inode) = match dir_lookup(&parent, &mut parent_data, name) {
        Ok(found) => found,
        Err(e) => {
            parent.unlock_put(parent_data);
            return Err(e);
        }
    };

    let mut data = inode.lock();
    assert!(data.nlink >= 1, "unlink: nlink < 1");

    if data.kind == InodeKind::Directory && !dir_is_empty(&inode, &mut data) {
        inode.unlock_put(data);
        parent.unlock_put(parent_data);
        return Err(KernelError::DirectoryNotEmpty);
    }

    // blank the directory entry
    let hole = crate::fs::DirEntry::empty();
    let written = parent.write(
        &mut parent_data,
        off,
        proc::Addr::Kernel(hole.as_bytes().as_ptr() as usize),
        crate::fs::DirEntry::SIZE as u32,
    );
    assert!(
        matches!(written, Ok(n) if n as usize == crate::fs::DirEntry::SIZE),
        "unlink: entry write"
    );

    if data.kind == InodeKind::Directory {
        // the victim's ".." no longer references the parent
        parent_data.nlink -= 1;
        parent.update(&parent_data);
    }
    parent.unlock_put(parent_data);

    data.nlink -= 1;
    inode.update(&data);
    inode.unlock_put(data);

    Ok(0)
}
