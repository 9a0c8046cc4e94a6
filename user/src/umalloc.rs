//! User-space heap: a bump allocator over sbrk. Frees are dropped on
//! the floor, which is plenty for these short-lived tools.

use core::alloc::{GlobalAlloc, Layout};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::syscall::sbrk;

#[global_allocator]
static HEAP: Bump = Bump {
    next: AtomicUsize::new(0),
    end: AtomicUsize::new(0),
};

struct Bump {
    next: AtomicUsize,
    end: AtomicUsize,
}

unsafe impl GlobalAlloc for Bump {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // processes are single threaded; plain loads are fine
        let mut at = self.next.load(Ordering::Relaxed);
        at = (at + layout.align() - 1) & !(layout.align() - 1);
        let new_next = at + layout.size();

        let mut end = self.end.load(Ordering::Relaxed);
        if new_next > end {
            // grow in 4k steps
            let grow = (new_next - end + 4095) & !4095;
            let old = sbrk(grow as isize);
            if old < 0 {
                return core::ptr::null_mut();
            }
            if end == 0 {
                // first call: the break was at old
                at = (old as usize + layout.align() - 1) & !(layout.align() - 1);
            }
            end = old as usize + grow;
            self.end.store(end, Ordering::Relaxed);

            let new_next = at + layout.size();
            if new_next > end {
                return core::ptr::null_mut();
            }
            self.next.store(new_next, Ordering::Relaxed);
            return at as *mut u8;
        }

        self.next.store(new_next, Ordering::Relaxed);
        at as *mut u8
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {}
}
