//! The block cache: cached copies of disk blocks, one sleep-locked
//! buffer per block in use.
//!
//! Holding a `Buf` is holding the block: only one process can use a
//! given block at a time, and the cache is also where processes
//! serialize on shared metadata blocks. Get one with `BCACHE.read`,
//! write it back with `BCACHE.write` (or `log::write` inside a
//! transaction), and let it drop when done.

use crate::fs::BSIZE;
use crate::param::NBUF;
use crate::ramdisk;
use crate::sleeplock::{SleepLock, SleepLockGuard};
use crate::spinlock::SpinLock;

pub static BCACHE: BufCache = BufCache::new();

struct BufMeta {
    dev: u32,
    blockno: u32,
    refcnt: usize,
    /// stamp from a monotonic counter; smallest unreferenced loses
    last_use: usize,
}

pub struct BufData {
    valid: bool,
    bytes: [u8; BSIZE],
}

impl BufData {
    pub fn bytes(&self) -> &[u8; BSIZE] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; BSIZE] {
        &mut self.bytes
    }
}

pub struct BufCache {
    meta: SpinLock<([BufMeta; NBUF], usize)>,
    data: [SleepLock<BufData>; NBUF],
}

/// An owned reference to one cached block, with its contents locked.
/// Dropping it unlocks the block and releases the cache reference.
pub struct Buf {
    pub id: usize,
    pub dev: u32,
    pub blockno: u32,
    guard: Option<SleepLockGuard<'static, BufData>>,
}

impl Buf {
    pub fn data(&self) -> &BufData {
        self.guard.as_ref().unwrap()
    }

    pub fn data_mut(&mut self) -> &mut BufData {
        self.guard.as_mut().unwrap()
    }
}

impl Drop for Buf {
    fn drop(&mut self) {
        // release the contents lock before the cache reference
        self.guard.take();

        let mut meta = BCACHE.meta.lock();
        let stamp = meta.1;
        meta.1 += 1;

        let slot = &mut meta.0[self.id];
        assert!(slot.refcnt >= 1, "buf release");
        slot.refcnt -= 1;
        if slot.refcnt == 0 {
            slot.last_use = stamp;
        }
    }
}

impl BufCache {
    const fn new() -> Self {
        Self {
            meta: SpinLock::new(
                (
                    [const {
                        BufMeta {
                            dev: 0,
                            blockno: 0,
                            refcnt: 0,
                            last_use: 0,
                        }
                    }; NBUF],
                    0,
                ),
                "bcache",
            ),
            data: [const {
                SleepLock::new(
                    BufData {
                        valid: false,
                        bytes: [0; BSIZE],
                    },
                    "buf",
                )
            }; NBUF],
        }
    }

    /// Finds the cache slot for (`dev`, `blockno`), recycling the least
    /// recently used free slot on a miss.
    fn get(&'static self, dev: u32, blockno: u32) -> Buf {
        let mut meta = self.meta.lock();

        // already cached?
        for (id, slot) in meta.0.iter_mut().enumerate() {
            if slot.dev == dev && slot.blockno == blockno {
                slot.refcnt += 1;
                drop(meta);
                return Buf {
                    id,
                    dev,
                    blockno,
                    guard: Some(self.data[id].lock()),
                };
            }
        }

        // recycle the coldest unreferenced slot
        let mut victim: Option<usize> = None;
        for (id, slot) in meta.0.iter().enumerate() {
            if slot.refcnt == 0
                && victim.is_none_or(|v| slot.last_use < meta.0[v].last_use)
            {
                victim = Some(id);
            }
        }
        let id = victim.expect("bcache: no buffers");

        let slot = &mut meta.0[id];
        slot.dev = dev;
        slot.blockno = blockno;
        slot.refcnt = 1;

        // Safety: refcnt was 0, so nobody holds the contents lock.
        unsafe { self.data[id].get_mut_unchecked() }.valid = false;

        drop(meta);
        Buf {
            id,
            dev,
            blockno,
            guard: Some(self.data[id].lock()),
        }
    }

    /// A locked buffer holding the current contents of the block.
    pub fn read(&'static self, dev: u32, blockno: u32) -> Buf {
        let mut buf = self.get(dev, blockno);

        if !buf.data().valid {
            ramdisk::read(blockno, buf.data_mut().bytes_mut());
            buf.data_mut().valid = true;
        }

        buf
    }

    /// Writes the buffer's contents back to the device.
    pub fn write(&self, buf: &mut Buf) {
        ramdisk::write(buf.blockno, buf.data().bytes());
    }

    /// Holds an extra cache reference so the slot cannot be recycled
    /// before the log commits it.
    pub fn pin(&self, buf: &Buf) {
        self.meta.lock().0[buf.id].refcnt += 1;
    }

    pub fn unpin(&self, buf: &Buf) {
        let mut meta = self.meta.lock();
        assert!(meta.0[buf.id].refcnt >= 1, "bcache unpin");
        meta.0[buf.id].refcnt -= 1;
    }
}
