//! On-disk file system: superblock, block and inode allocators, the
//! inode cache, directories, and path lookup.
//!
//! Disk layout (matching the mkfs tool):
//! [ boot block | superblock | log | inode blocks | free bit map | data ]
//!
//! Every call that mutates disk state must run inside a log
//! [`Operation`](crate::log::Operation).

use core::mem;
use core::ptr;

use crate::buf::{BCACHE, Buf};
use crate::error::{KernelError, Result};
use crate::log;
use crate::param::{NINODE, ROOTDEV};
use crate::println;
use crate::proc::{self, Addr};
use crate::sleeplock::{SleepLock, SleepLockGuard};
use crate::spinlock::SpinLock;
use crate::sync::OnceLock;

pub const FSMAGIC: u32 = 0x10203040;
/// root directory's inode number
pub const ROOTINO: u32 = 1;
/// block size in bytes
pub const BSIZE: usize = 1024;
/// direct block addresses per inode
pub const NDIRECT: usize = 12;
/// block addresses in the single indirect block
pub const NINDIRECT: usize = BSIZE / size_of::<u32>();
/// largest file, in blocks
pub const MAXFILE: usize = NDIRECT + NINDIRECT;
/// inodes per disk block
pub const IPB: u32 = (BSIZE / size_of::<DiskInode>()) as u32;
/// bitmap bits per disk block
pub const BPB: u32 = (BSIZE * 8) as u32;
/// bytes in a directory entry name
pub const DIRSIZE: usize = 14;

pub static SB: OnceLock<SuperBlock> = OnceLock::new();

/// On-disk superblock, read once at boot.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct SuperBlock {
    /// must be FSMAGIC
    pub magic: u32,
    /// image size in blocks
    pub size: u32,
    /// number of data blocks
    pub nblocks: u32,
    /// number of inodes
    pub ninodes: u32,
    /// number of log blocks
    pub nlog: u32,
    /// first log block
    pub logstart: u32,
    /// first inode block
    pub inodestart: u32,
    /// first free-map block
    pub bmapstart: u32,
}

/// Reads the superblock and brings up the log. Runs in the first
/// process's context (the log recovery sleeps), not during early boot.
pub fn init(dev: u32) {
    let sb = {
        let buf = BCACHE.read(dev, 1);
        unsafe { ptr::read_unaligned(buf.data().bytes().as_ptr() as *const SuperBlock) }
    };

    assert_eq!(sb.magic, FSMAGIC, "invalid file system");

    log::init(dev, &sb);
    SB.init_with(|| sb);

    println!("fs: ready");
}

/// Zeroes a disk block, in the current transaction.
fn bzero(dev: u32, blockno: u32) {
    let mut buf = BCACHE.read(dev, blockno);
    buf.data_mut().bytes_mut().fill(0);
    log::write(&buf);
}

/// Allocates a zeroed data block via the free bitmap.
fn balloc(dev: u32) -> Result<u32> {
    let sb = SB.expect("superblock");

    for base in (0..sb.size).step_by(BPB as usize) {
        let mut buf = BCACHE.read(dev, sb.bmapstart + base / BPB);

        for bi in 0..BPB {
            if base + bi >= sb.size {
                break;
            }

            let mask = 1u8 << (bi % 8);
            if buf.data().bytes()[bi as usize / 8] & mask == 0 {
                buf.data_mut().bytes_mut()[bi as usize / 8] |= mask;
                log::write(&buf);
                drop(buf);

                bzero(dev, base + bi);
                return Ok(base + bi);
            }
        }
    }

    println!("balloc: out of blocks");
    Err(KernelError::OutOfBlocks)
}

/// Returns a data block to the free bitmap.
fn bfree(dev: u32, blockno: u32) {
    let sb = SB.expect("superblock");

    let mut buf = BCACHE.read(dev, sb.bmapstart + blockno / BPB);
    let bi = blockno % BPB;
    let mask = 1u8 << (bi % 8);

    assert!(
        buf.data().bytes()[bi as usize / 8] & mask != 0,
        "bfree: freeing free block"
    );
    buf.data_mut().bytes_mut()[bi as usize / 8] &= !mask;
    log::write(&buf);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum InodeKind {
    Free = 0,
    Directory = 1,
    File = 2,
    Device = 3,
}

impl From<u16> for InodeKind {
    fn from(v: u16) -> Self {
        match v {
            1 => InodeKind::Directory,
            2 => InodeKind::File,
            3 => InodeKind::Device,
            _ => InodeKind::Free,
        }
    }
}

/// On-disk inode.
#[repr(C)]
pub struct DiskInode {
    /// file kind, as a raw InodeKind
    pub kind: u16,
    /// major device number (Device kind only)
    pub major: u16,
    pub minor: u16,
    /// directory entries pointing here
    pub nlink: u16,
    /// file size in bytes
    pub size: u32,
    /// direct blocks, then one indirect
    pub addrs: [u32; NDIRECT + 1],
}

impl DiskInode {
    /// The on-disk inode `inum` inside `buf`, which must be the inode
    /// block holding it.
    unsafe fn in_buf(buf: &mut Buf, inum: u32) -> &'static mut Self {
        unsafe {
            &mut *(buf
                .data_mut()
                .bytes_mut()
                .as_mut_ptr()
                .add((inum % IPB) as usize * size_of::<DiskInode>()) as *mut DiskInode)
        }
    }
}

/// What fstat hands to user space.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub dev: u32,
    pub ino: u32,
    pub kind: u16,
    pub nlink: u16,
    pub size: u64,
}

/// Cached inode body, under the inode's sleep lock.
pub struct InodeData {
    /// read from disk yet?
    valid: bool,
    pub kind: InodeKind,
    pub major: u16,
    pub minor: u16,
    pub nlink: u16,
    pub size: u32,
    addrs: [u32; NDIRECT + 1],
}

struct InodeMeta {
    dev: u32,
    inum: u32,
    refcnt: u32,
}

static ITABLE: InodeTable = InodeTable::new();

struct InodeTable {
    meta: SpinLock<[InodeMeta; NINODE]>,
    data: [SleepLock<InodeData>; NINODE],
}

impl InodeTable {
    const fn new() -> Self {
        Self {
            meta: SpinLock::new(
                [const {
                    InodeMeta {
                        dev: 0,
                        inum: 0,
                        refcnt: 0,
                    }
                }; NINODE],
                "itable",
            ),
            data: [const {
                SleepLock::new(
                    InodeData {
                        valid: false,
                        kind: InodeKind::Free,
                        major: 0,
                        minor: 0,
                        nlink: 0,
                        size: 0,
                        addrs: [0; NDIRECT + 1],
                    },
                    "inode",
                )
            }; NINODE],
        }
    }
}

/// Reference-counted handle on a cached inode. Clone-by-`dup`, release
/// with `put`; lock the contents with `lock` before reading fields.
#[derive(Debug, PartialEq, Eq)]
pub struct Inode {
    id: usize,
    pub dev: u32,
    pub inum: u32,
}

impl Inode {
    /// Finds or creates a cache entry for (`dev`, `inum`) without locking
    /// it or touching the disk.
    pub fn get(dev: u32, inum: u32) -> Result<Self> {
        let mut meta = ITABLE.meta.lock();

        let mut empty = None;
        for (id, slot) in meta.iter_mut().enumerate() {
            if slot.refcnt > 0 && slot.dev == dev && slot.inum == inum {
                slot.refcnt += 1;
                return Ok(Self { id, dev, inum });
            }
            if empty.is_none() && slot.refcnt == 0 {
                empty = Some(id);
            }
        }

        let Some(id) = empty else {
            println!("inode table full");
            return Err(KernelError::TooManyFiles);
        };

        let slot = &mut meta[id];
        slot.dev = dev;
        slot.inum = inum;
        slot.refcnt = 1;

        // Safety: refcnt was 0, nobody else holds this slot.
        unsafe { ITABLE.data[id].get_mut_unchecked() }.valid = false;

        Ok(Self { id, dev, inum })
    }

    /// Allocates a free on-disk inode with the given kind.
    pub fn alloc(dev: u32, kind: InodeKind) -> Result<Self> {
        let sb = SB.expect("superblock");

        for inum in 1..sb.ninodes {
            let mut buf = BCACHE.read(dev, sb.inodestart + inum / IPB);
            let dinode = unsafe { DiskInode::in_buf(&mut buf, inum) };

            if InodeKind::from(dinode.kind) == InodeKind::Free {
                // claim it; the rest of the body is stale and will be
                // filled in under the inode lock
                unsafe {
                    ptr::write_bytes(dinode as *mut DiskInode as *mut u8, 0, size_of::<DiskInode>())
                };
                dinode.kind = kind as u16;
                log::write(&buf);
                drop(buf);
                return Self::get(dev, inum);
            }
        }

        println!("ialloc: no inodes");
        Err(KernelError::OutOfInodes)
    }

    /// Another reference to the same inode.
    pub fn dup(&self) -> Self {
        ITABLE.meta.lock()[self.id].refcnt += 1;
        Self {
            id: self.id,
            dev: self.dev,
            inum: self.inum,
        }
    }

    /// Locks the inode, reading it from disk on first touch.
    pub fn lock(&self) -> SleepLockGuard<'static, InodeData> {
        let sb = SB.expect("superblock");

        let mut data = ITABLE.data[self.id].lock();

        if !data.valid {
            let mut buf = BCACHE.read(self.dev, sb.inodestart + self.inum / IPB);
            let dinode = unsafe { DiskInode::in_buf(&mut buf, self.inum) };

            data.kind = InodeKind::from(dinode.kind);
            data.major = dinode.major;
            data.minor = dinode.minor;
            data.nlink = dinode.nlink;
            data.size = dinode.size;
            data.addrs = dinode.addrs;
            drop(buf);

            data.valid = true;
            assert_ne!(data.kind, InodeKind::Free, "ilock: free inode");
        }

        data
    }

    pub fn unlock(&self, guard: SleepLockGuard<'static, InodeData>) {
        drop(guard);
    }

    /// Writes the cached body back to the disk inode. Required after any
    /// change to fields that live on disk; must be in a transaction.
    pub fn update(&self, data: &SleepLockGuard<'_, InodeData>) {
        let sb = SB.expect("superblock");

        let mut buf = BCACHE.read(self.dev, sb.inodestart + self.inum / IPB);
        let dinode = unsafe { DiskInode::in_buf(&mut buf, self.inum) };

        dinode.kind = data.kind as u16;
        dinode.major = data.major;
        dinode.minor = data.minor;
        dinode.nlink = data.nlink;
        dinode.size = data.size;
        dinode.addrs = data.addrs;

        log::write(&buf);
    }

    /// Drops this reference. The last reference to an unlinked inode
    /// truncates and frees it on disk, so callers must be inside a
    /// transaction.
    pub fn put(self) {
        let mut meta = ITABLE.meta.lock();

        if meta[self.id].refcnt == 1 {
            // refcnt 1 means nobody else holds the sleep lock, so taking
            // it here cannot block despite the spinlock being held
            let mut data = ITABLE.data[self.id].lock();

            if data.valid && data.nlink == 0 {
                // no links and no other references: free it on disk,
                // without the table lock across the disk traffic
                drop(meta);

                self.truncate(&mut data);
                data.kind = InodeKind::Free;
                self.update(&data);
                data.valid = false;
                drop(data);

                meta = ITABLE.meta.lock();
            }
        }

        meta[self.id].refcnt -= 1;
    }

    /// `unlock` then `put`, the common exit path.
    pub fn unlock_put(self, guard: SleepLockGuard<'static, InodeData>) {
        drop(guard);
        self.put();
    }

    /// Frees every data block, leaving a zero-length file.
    pub fn truncate(&self, data: &mut SleepLockGuard<'_, InodeData>) {
        for i in 0..NDIRECT {
            if data.addrs[i] != 0 {
                bfree(self.dev, data.addrs[i]);
                data.addrs[i] = 0;
            }
        }

        if data.addrs[NDIRECT] != 0 {
            {
                let buf = BCACHE.read(self.dev, data.addrs[NDIRECT]);
                let slots = unsafe {
                    core::slice::from_raw_parts(
                        buf.data().bytes().as_ptr() as *const u32,
                        NINDIRECT,
                    )
                };
                for &b in slots {
                    if b != 0 {
                        bfree(self.dev, b);
                    }
                }
            }
            bfree(self.dev, data.addrs[NDIRECT]);
            data.addrs[NDIRECT] = 0;
        }

        data.size = 0;
        self.update(data);
    }

    /// Disk address of the file's `bn`th block, allocating it (and the
    /// indirect block) as needed.
    fn bmap(&self, data: &mut SleepLockGuard<'_, InodeData>, bn: u32) -> Result<u32> {
        let mut bn = bn as usize;

        if bn < NDIRECT {
            if data.addrs[bn] == 0 {
                data.addrs[bn] = balloc(self.dev)?;
            }
            return Ok(data.addrs[bn]);
        }
        bn -= NDIRECT;

        if bn < NINDIRECT {
            if data.addrs[NDIRECT] == 0 {
                data.addrs[NDIRECT] = balloc(self.dev)?;
            }

            let mut buf = BCACHE.read(self.dev, data.addrs[NDIRECT]);
            let slots = unsafe {
                core::slice::from_raw_parts_mut(
                    buf.data_mut().bytes_mut().as_mut_ptr() as *mut u32,
                    NINDIRECT,
                )
            };

            if slots[bn] == 0 {
                slots[bn] = balloc(self.dev)?;
                log::write(&buf);
            }
            return Ok(slots[bn]);
        }

        Err(KernelError::FileTooLarge)
    }

    pub fn stat(&self, data: &SleepLockGuard<'_, InodeData>) -> Stat {
        Stat {
            dev: self.dev,
            ino: self.inum,
            kind: data.kind as u16,
            nlink: data.nlink,
            size: data.size as u64,
        }
    }

    /// Reads up to `n` bytes at byte `off` into `dst` (user or kernel).
    /// Returns how many bytes were read; short at end of file.
    pub fn read(
        &self,
        data: &mut SleepLockGuard<'_, InodeData>,
        mut off: u32,
        dst: Addr,
        n: u32,
    ) -> Result<u32> {
        if off > data.size || off.checked_add(n).is_none() {
            return Ok(0);
        }
        let n = n.min(data.size - off);

        let mut total = 0u32;
        while total < n {
            let block = self.bmap(data, off / BSIZE as u32)?;
            let buf = BCACHE.read(self.dev, block);

            let m = (n - total).min(BSIZE as u32 - off % BSIZE as u32);
            let from = &buf.data().bytes()[off as usize % BSIZE..][..m as usize];
            if proc::either_copy_out(from, dst.offset(total as usize)).is_err() {
                return Err(KernelError::BadAddress);
            }

            total += m;
            off += m;
        }

        Ok(total)
    }

    /// Convenience for kernel-space reads (exec, directories).
    pub fn read_kernel(
        &self,
        data: &mut SleepLockGuard<'_, InodeData>,
        off: u32,
        dst: &mut [u8],
    ) -> Result<u32> {
        self.read(data, off, Addr::Kernel(dst.as_mut_ptr() as usize), dst.len() as u32)
    }

    /// Writes `n` bytes at byte `off` from `src` (user or kernel),
    /// growing the file if the write extends it. Must be inside a
    /// transaction.
    pub fn write(
        &self,
        data: &mut SleepLockGuard<'_, InodeData>,
        mut off: u32,
        src: Addr,
        n: u32,
    ) -> Result<u32> {
        if off > data.size || off.checked_add(n).is_none() {
            return Err(KernelError::BadArgument);
        }
        if (off + n) as usize > MAXFILE * BSIZE {
            return Err(KernelError::FileTooLarge);
        }

        let mut total = 0u32;
        while total < n {
            let block = self.bmap(data, off / BSIZE as u32)?;
            let mut buf = BCACHE.read(self.dev, block);

            let m = (n - total).min(BSIZE as u32 - off % BSIZE as u32);
            let to = &mut buf.data_mut().bytes_mut()[off as usize % BSIZE..][..m as usize];
            if proc::either_copy_in(to, src.offset(total as usize)).is_err() {
                break;
            }
            log::write(&buf);

            total += m;
            off += m;
        }

        if off > data.size {
            data.size = off;
        }

        // bmap may have grown addrs even if size is unchanged
        self.update(data);

        Ok(total)
    }

    /// Creates `path` as a `kind` inode, or opens a compatible existing
    /// file. Returns the inode locked. Must be inside a transaction.
    pub fn create(
        path: &Path<'_>,
        kind: InodeKind,
        major: u16,
        minor: u16,
    ) -> Result<(Self, SleepLockGuard<'static, InodeData>)> {
        let (parent, name) = path.resolve_parent()?;
        let mut parent_data = parent.lock();

        if let Ok((_, existing)) = dir_lookup(&parent, &mut parent_data, name) {
            parent.unlock_put(parent_data);

            let existing_data = existing.lock();
            if kind == InodeKind::File
                && matches!(existing_data.kind, InodeKind::File | InodeKind::Device)
            {
                return Ok((existing, existing_data));
            }

            existing.unlock_put(existing_data);
            return Err(KernelError::Exists);
        }

        let inode = match Inode::alloc(parent.dev, kind) {
            Ok(inode) => inode,
            Err(e) => {
                parent.unlock_put(parent_data);
                return Err(e);
            }
        };

        let mut data = inode.lock();
        data.major = major;
        data.minor = minor;
        data.nlink = 1;
        data.size = 0;
        data.addrs = [0; NDIRECT + 1];
        inode.update(&data);

        let undo = |inode: Inode, mut data: SleepLockGuard<'static, InodeData>| {
            // roll back: nlink 0 marks it for collection by put
            data.nlink = 0;
            inode.update(&data);
            inode.unlock_put(data);
        };

        // a directory starts with "." and ".."; no extra nlink for "."
        // to keep the count acyclic
        if kind == InodeKind::Directory
            && (dir_link(&inode, &mut data, ".", inode.inum).is_err()
                || dir_link(&inode, &mut data, "..", parent.inum).is_err())
        {
            undo(inode, data);
            parent.unlock_put(parent_data);
            return Err(KernelError::OutOfBlocks);
        }

        if dir_link(&parent, &mut parent_data, name, inode.inum).is_err() {
            undo(inode, data);
            parent.unlock_put(parent_data);
            return Err(KernelError::OutOfBlocks);
        }

        if kind == InodeKind::Directory {
            // ".." in the child counts as a link to the parent
            parent_data.nlink += 1;
            parent.update(&parent_data);
        }

        parent.unlock_put(parent_data);

        Ok((inode, data))
    }
}

/// One directory entry on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    pub inum: u16,
    pub name: [u8; DIRSIZE],
}

impl DirEntry {
    pub const SIZE: usize = size_of::<Self>();

    pub const fn empty() -> Self {
        Self {
            inum: 0,
            name: [0; DIRSIZE],
        }
    }

    fn read_at(
        dir: &Inode,
        data: &mut SleepLockGuard<'_, InodeData>,
        off: u32,
    ) -> Result<Self> {
        let mut bytes = [0u8; Self::SIZE];
        let n = dir.read_kernel(data, off, &mut bytes)?;
        assert_eq!(n as usize, Self::SIZE, "dirent read");
        Ok(unsafe { ptr::read_unaligned(bytes.as_ptr() as *const Self) })
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, Self::SIZE) }
    }

    fn name_is(&self, name: &str) -> bool {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(DIRSIZE);
        &self.name[..len] == name.as_bytes()
    }

    fn set_name(&mut self, name: &str) {
        self.name.fill(0);
        let n = name.len().min(DIRSIZE);
        self.name[..n].copy_from_slice(&name.as_bytes()[..n]);
    }
}

/// Looks `name` up in directory `dir`; returns the entry's byte offset
/// and a fresh reference to its inode.
pub fn dir_lookup(
    dir: &Inode,
    data: &mut SleepLockGuard<'_, InodeData>,
    name: &str,
) -> Result<(u32, Inode)> {
    assert_eq!(data.kind, InodeKind::Directory, "dir_lookup: not a dir");

    for off in (0..data.size).step_by(DirEntry::SIZE) {
        let entry = DirEntry::read_at(dir, data, off)?;
        if entry.inum != 0 && entry.name_is(name) {
            return Ok((off, Inode::get(dir.dev, entry.inum as u32)?));
        }
    }

    Err(KernelError::NotFound)
}

/// Adds the entry (`name`, `inum`) to directory `dir`.
pub fn dir_link(
    dir: &Inode,
    data: &mut SleepLockGuard<'_, InodeData>,
    name: &str,
    inum: u32,
) -> Result<()> {
    if let Ok((_, existing)) = dir_lookup(dir, data, name) {
        existing.put();
        return Err(KernelError::Exists);
    }

    // reuse a hole, or append
    let mut off = 0;
    while off < data.size {
        let entry = DirEntry::read_at(dir, data, off)?;
        if entry.inum == 0 {
            break;
        }
        off += DirEntry::SIZE as u32;
    }

    let mut entry = DirEntry::empty();
    entry.set_name(name);
    entry.inum = inum as u16;

    let written = dir.write(
        data,
        off,
        Addr::Kernel(entry.as_bytes().as_ptr() as usize),
        DirEntry::SIZE as u32,
    )?;
    if written as usize != DirEntry::SIZE {
        return Err(KernelError::OutOfBlocks);
    }

    Ok(())
}

/// True when `dir` holds nothing besides "." and "..".
pub fn dir_is_empty(dir: &Inode, data: &mut SleepLockGuard<'_, InodeData>) -> bool {
    let mut off = 2 * DirEntry::SIZE as u32;
    while off < data.size {
        let entry = DirEntry::read_at(dir, data, off).expect("dir_is_empty: read");
        if entry.inum != 0 {
            return false;
        }
        off += DirEntry::SIZE as u32;
    }
    true
}

/// A borrowed path string with xv6 semantics: leading '/' means
/// absolute, otherwise relative to the current process's cwd.
#[derive(Debug, Clone)]
pub struct Path<'a>(&'a str);

impl<'a> Path<'a> {
    pub const fn new(s: &'a str) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }

    fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }

    /// Splits off the next component: ("a", "b/c") from "a/b/c".
    fn next_component(&self) -> Option<(&'a str, Path<'a>)> {
        let s = self.0.trim_start_matches('/');
        if s.is_empty() {
            return None;
        }

        match s.find('/') {
            Some(i) => Some((&s[..i], Path(s[i..].trim_start_matches('/')))),
            None => Some((s, Path(""))),
        }
    }

    fn resolve_inner(&self, stop_at_parent: bool) -> Result<(Inode, &'a str)> {
        let mut inode = if self.is_absolute() {
            Inode::get(ROOTDEV, ROOTINO)?
        } else {
            proc::current()
                .local()
                .cwd
                .as_ref()
                .expect("cwd")
                .dup()
        };

        let mut last = "";
        let mut path = self.clone();

        while let Some((component, rest)) = path.next_component() {
            let mut data = inode.lock();

            if data.kind != InodeKind::Directory {
                inode.unlock_put(data);
                return Err(KernelError::NotADirectory);
            }

            if stop_at_parent && rest.0.is_empty() {
                // stop one level early, returning the directory
                inode.unlock(data);
                return Ok((inode, component));
            }

            match dir_lookup(&inode, &mut data, component) {
                Ok((_, next)) => {
                    inode.unlock_put(data);
                    inode = next;
                }
                Err(e) => {
                    inode.unlock_put(data);
                    return Err(e);
                }
            }

            last = component;
            path = rest;
        }

        if stop_at_parent {
            // path named the root, which has no parent to return
            inode.put();
            return Err(KernelError::NotFound);
        }

        Ok((inode, last))
    }

    /// The inode the whole path names.
    pub fn resolve(&self) -> Result<Inode> {
        self.resolve_inner(false).map(|(inode, _)| inode)
    }

    /// The parent directory and the final component's name.
    pub fn resolve_parent(&self) -> Result<(Inode, &'a str)> {
        self.resolve_inner(true)
    }
}

const _: () = assert!(mem::size_of::<DirEntry>() == 16);
const _: () = assert!(BSIZE % mem::size_of::<DiskInode>() == 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn geometry() {
        assert_eq!(IPB, (BSIZE / size_of::<DiskInode>()) as u32);
        assert_eq!(NINDIRECT, 256);
        assert_eq!(DirEntry::SIZE, 16);
    }

    #[test_case]
    fn dirent_names() {
        let mut e = DirEntry::empty();
        e.set_name("console");
        assert!(e.name_is("console"));
        assert!(!e.name_is("consol"));
        assert!(!e.name_is("console2"));
    }

    #[test_case]
    fn path_components() {
        let p = Path::new("/a//b/c");
        let (c1, rest) = p.next_component().unwrap();
        assert_eq!(c1, "a");
        let (c2, rest) = rest.next_component().unwrap();
        assert_eq!(c2, "b");
        let (c3, rest) = rest.next_component().unwrap();
        assert_eq!(c3, "c");
        assert!(rest.next_component().is_none());
    }
}
