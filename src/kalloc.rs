//! Physical memory allocation.
//!
//! Two pools share the RAM between the kernel image and the ramdisk:
//! a fixed-size buddy heap right after the kernel for small objects
//! (`Box`, `Arc`, `String`), and a free list of whole 4096-byte pages for
//! everything the virtual memory code maps: user pages, page-table pages,
//! trap frames, kernel stacks.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use buddy_alloc::{BuddyAllocParam, buddy_alloc::BuddyAlloc};

use crate::memlayout::{HEAPSIZE, RAMDISK};
use crate::println;
use crate::riscv::{PGSIZE, pg_round_up};
use crate::spinlock::SpinLock;

unsafe extern "C" {
    /// First address after the kernel image, from kernel.ld.
    static end: [u8; 0];
}

/// Byte pattern written over freed pages, to trip users of dangling refs.
const FREE_JUNK: u8 = 0xf5;
/// Byte pattern in fresh pages, so uninitialized reads look like garbage.
const ALLOC_JUNK: u8 = 0xa9;

/// A free page; its first word links to the next free page.
struct Run {
    next: *mut Run,
}

struct PagePool {
    free: *mut Run,
    /// Lowest address belonging to the pool.
    base: usize,
    /// Free pages currently on the list.
    count: usize,
}

unsafe impl Send for PagePool {}

static PAGES: SpinLock<PagePool> = SpinLock::new(
    PagePool {
        free: ptr::null_mut(),
        base: 0,
        count: 0,
    },
    "pages",
);

/// Hands out one 4096-byte page, filled with junk, or None when RAM is
/// exhausted. Callers that need zeroes clear it themselves.
pub fn alloc_page() -> Option<NonNull<u8>> {
    let mut pool = PAGES.lock();

    let run = pool.free;
    if run.is_null() {
        return None;
    }

    pool.free = unsafe { (*run).next };
    pool.count -= 1;
    drop(pool);

    let page = run as *mut u8;
    unsafe { ptr::write_bytes(page, ALLOC_JUNK, PGSIZE) };
    NonNull::new(page)
}

/// Returns a page to the pool.
///
/// Panics on anything that is not a page the pool handed out: misaligned
/// pointers, addresses inside the kernel image or heap, or addresses at or
/// beyond the pool's top.
pub fn free_page(page: NonNull<u8>) {
    let pa = page.as_ptr() as usize;

    {
        let pool = PAGES.lock();
        assert!(
            pa % PGSIZE == 0 && pa >= pool.base && pa < RAMDISK,
            "free_page"
        );
    }

    unsafe { ptr::write_bytes(page.as_ptr(), FREE_JUNK, PGSIZE) };

    let run = page.as_ptr() as *mut Run;
    let mut pool = PAGES.lock();
    unsafe { (*run).next = pool.free };
    pool.free = run;
    pool.count += 1;
}

/// Number of pages currently free, for diagnostics.
pub fn free_page_count() -> usize {
    PAGES.lock().count
}

/// Kernel heap for sub-page allocations.
#[global_allocator]
static KHEAP: Kheap = Kheap(SpinLock::new(None, "kheap"));

struct Kheap(SpinLock<Option<BuddyAlloc>>);

// Safety: BuddyAlloc itself is not thread safe, but every touch goes
// through the spin lock.
unsafe impl Sync for Kheap {}

unsafe impl GlobalAlloc for Kheap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.0
            .lock()
            .as_mut()
            .expect("kheap initialized")
            .malloc(layout.size().max(layout.align()))
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.0.lock().as_mut().expect("kheap initialized").free(ptr)
    }
}

#[alloc_error_handler]
fn handle_alloc_error(layout: Layout) -> ! {
    panic!("kernel heap exhausted: {:?}", layout)
}

/// Carves RAM into the heap and the page pool.
///
/// # Safety
/// Must run exactly once, on the boot hart, before any allocation.
pub unsafe fn init() {
    let heap_base = unsafe { end.as_ptr() } as usize;

    {
        let mut heap = KHEAP.0.lock();
        let param = BuddyAllocParam::new(heap_base as *const u8, HEAPSIZE, 64);
        *heap = Some(unsafe { BuddyAlloc::new(param) });
    }

    let pool_base = pg_round_up(heap_base + HEAPSIZE);
    {
        let mut pool = PAGES.lock();
        pool.base = pool_base;
    }
    for pa in (pool_base..RAMDISK).step_by(PGSIZE) {
        free_page(NonNull::new(pa as *mut u8).unwrap());
    }

    println!("kalloc: {} pages, heap {:#x}..{:#x}", free_page_count(), heap_base, pool_base);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn pages_are_conserved() {
        let before = free_page_count();
        let a = alloc_page().unwrap();
        let b = alloc_page().unwrap();
        assert_eq!(free_page_count(), before - 2);
        free_page(a);
        free_page(b);
        assert_eq!(free_page_count(), before);
    }

    #[test_case]
    fn fresh_pages_carry_junk() {
        let page = alloc_page().unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(page.as_ptr(), PGSIZE) };
        assert!(bytes.iter().all(|&b| b == ALLOC_JUNK));
        free_page(page);
    }
}
