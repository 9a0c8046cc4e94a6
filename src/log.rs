//! Write-ahead log, so multi-block file system operations are crash
//! atomic.
//!
//! A transaction batches the updates of every file system syscall running
//! at commit time; the log only commits when none are active, so a commit
//! never writes half a syscall. Callers hold an [`Operation`] for the
//! span of each file system syscall; usually creating one just bumps a
//! counter, but when log space looks tight it sleeps until the current
//! batch commits.
//!
//! On disk the log is a header block listing target block numbers,
//! followed by the staged copies of those blocks. Appends are
//! synchronous.

use crate::buf::{BCACHE, Buf};
use crate::fs::{BSIZE, SuperBlock};
use crate::param::LOGBLOCKS;
use crate::proc::{self, Chan};
use crate::spinlock::SpinLock;

struct LogState {
    /// first log block on disk
    start: u32,
    /// log blocks available
    size: u32,
    /// file system syscalls currently inside an `Operation`
    outstanding: u32,
    committing: bool,
    dev: u32,
    /// staged block count and their home addresses; mirrors the on-disk
    /// header between commits
    n: u32,
    blocks: [u32; LOGBLOCKS],
}

static LOG: SpinLock<LogState> = SpinLock::new(
    LogState {
        start: 0,
        size: 0,
        outstanding: 0,
        committing: false,
        dev: 0,
        n: 0,
        blocks: [0; LOGBLOCKS],
    },
    "log",
);

/// On-disk header block layout.
#[repr(C)]
struct DiskLogHeader {
    n: u32,
    blocks: [u32; LOGBLOCKS],
}

/// Reads the on-disk header into memory, for recovery.
fn read_head(dev: u32, start: u32) -> (u32, [u32; LOGBLOCKS]) {
    let buf = BCACHE.read(dev, start);
    let head = unsafe { &*(buf.data().bytes().as_ptr() as *const DiskLogHeader) };
    (head.n, head.blocks)
}

/// Writes the in-memory header to disk. This is the moment a transaction
/// commits (n > 0) or is erased (n == 0).
fn write_head(dev: u32, start: u32, n: u32, blocks: &[u32; LOGBLOCKS]) {
    let mut buf = BCACHE.read(dev, start);
    {
        let head =
            unsafe { &mut *(buf.data_mut().bytes_mut().as_mut_ptr() as *mut DiskLogHeader) };
        head.n = n;
        head.blocks = *blocks;
    }
    BCACHE.write(&mut buf);
}

/// Copies staged blocks from the cache into the log area.
fn write_log(dev: u32, start: u32, n: u32, blocks: &[u32; LOGBLOCKS]) {
    for i in 0..n {
        let mut to = BCACHE.read(dev, start + i + 1);
        let from = BCACHE.read(dev, blocks[i as usize]);
        to.data_mut().bytes_mut().copy_from_slice(from.data().bytes());
        BCACHE.write(&mut to);
    }
}

/// Copies committed blocks from the log area to their homes.
fn install_trans(dev: u32, start: u32, n: u32, blocks: &[u32; LOGBLOCKS], recovering: bool) {
    for i in 0..n {
        let from = BCACHE.read(dev, start + i + 1);
        let mut to = BCACHE.read(dev, blocks[i as usize]);
        to.data_mut().bytes_mut().copy_from_slice(from.data().bytes());
        BCACHE.write(&mut to);
        if !recovering {
            BCACHE.unpin(&to);
        }
    }
}

fn commit() {
    let (dev, start, n, blocks) = {
        let log = LOG.lock();
        (log.dev, log.start, log.n, log.blocks)
    };

    if n == 0 {
        return;
    }

    write_log(dev, start, n, &blocks);
    write_head(dev, start, n, &blocks); // the real commit
    install_trans(dev, start, n, &blocks, false);
    LOG.lock().n = 0;
    write_head(dev, start, 0, &blocks); // erase the transaction
}

/// A file system transaction span: taken at the top of each file system
/// syscall, released (possibly committing) when dropped.
pub struct Operation;

impl Operation {
    pub fn begin() -> Self {
        let mut log = LOG.lock();

        loop {
            if log.committing {
                log = proc::sleep(Chan::LogSpace, log);
            } else if log.n as usize + (log.outstanding as usize + 1) * crate::param::MAXOPBLOCKS
                > LOGBLOCKS
            {
                // this op might exhaust the log; wait for the commit
                log = proc::sleep(Chan::LogSpace, log);
            } else {
                log.outstanding += 1;
                break;
            }
        }

        Operation
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        let mut do_commit = false;

        {
            let mut log = LOG.lock();

            log.outstanding -= 1;
            assert!(!log.committing, "log committing");

            if log.outstanding == 0 {
                do_commit = true;
                log.committing = true;
            } else {
                // begin() may be waiting for space; our reservation is
                // now returned
                proc::wakeup(Chan::LogSpace);
            }
        }

        if do_commit {
            // sleeps inside, so no locks may be held here
            commit();

            LOG.lock().committing = false;
            proc::wakeup(Chan::LogSpace);
        }
    }
}

/// Records that `buf` belongs to the current transaction instead of
/// writing it now; the commit does the disk write. Replaces
/// `BCACHE.write` inside an `Operation`.
pub fn write(buf: &Buf) {
    let mut log = LOG.lock();

    assert!(
        (log.n as usize) < LOGBLOCKS && log.n < log.size - 1,
        "log::write: transaction too big"
    );
    assert!(log.outstanding >= 1, "log::write outside of transaction");

    // absorption: a block already staged this transaction stays put
    let mut i = 0;
    while i < log.n as usize {
        if log.blocks[i] == buf.blockno {
            break;
        }
        i += 1;
    }

    log.blocks[i] = buf.blockno;
    if i == log.n as usize {
        BCACHE.pin(buf);
        log.n += 1;
    }
}

/// Replays any committed transaction left in the log, then clears it.
fn recover(dev: u32, start: u32) {
    let (n, blocks) = read_head(dev, start);
    install_trans(dev, start, n, &blocks, true);
    LOG.lock().n = 0;
    write_head(dev, start, 0, &blocks);
}

/// Sizes the log from the superblock and runs crash recovery.
pub fn init(dev: u32, sb: &SuperBlock) {
    assert!(
        size_of::<DiskLogHeader>() <= BSIZE,
        "log: header too big"
    );

    {
        let mut log = LOG.lock();
        log.start = sb.logstart;
        log.size = sb.nlog;
        log.dev = dev;
    }

    recover(dev, sb.logstart);
}
