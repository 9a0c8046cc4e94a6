//! Memory-backed block device.
//!
//! The file system image sits at a fixed physical address, placed there
//! by qemu's loader device before boot. Reads and writes are plain
//! copies, so there is no interrupt path and no per-request sleeping;
//! the buffer cache calls straight through.

use crate::fs::BSIZE;
use crate::memlayout::RAMDISK;
use crate::param::FSSIZE;

fn block_ptr(blockno: u32) -> *mut u8 {
    assert!((blockno as usize) < FSSIZE, "ramdisk: block out of range");
    (RAMDISK + blockno as usize * BSIZE) as *mut u8
}

/// Copies block `blockno` into `dst`.
pub fn read(blockno: u32, dst: &mut [u8; BSIZE]) {
    // Safety: the region below PHYSTOP is direct-mapped and reserved for
    // the image; block_ptr checked the bound.
    unsafe { core::ptr::copy_nonoverlapping(block_ptr(blockno), dst.as_mut_ptr(), BSIZE) };
}

/// Copies `src` over block `blockno`.
pub fn write(blockno: u32, src: &[u8; BSIZE]) {
    // Safety: as in `read`.
    unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), block_ptr(blockno), BSIZE) };
}
