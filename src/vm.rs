//! Sv39 page tables for the kernel and for user processes.
//!
//! Page-table pages and user memory both come from the page pool in
//! kalloc; nothing here touches the kernel heap.

use core::cmp::min;
use core::ptr::{self, NonNull};

use alloc::string::String;

use crate::error::{KernelError, Result};
use crate::kalloc::{alloc_page, free_page};
use crate::memlayout::{KERNBASE, PHYSTOP, PLIC, TRAMPOLINE, TRAPFRAME, UART0};
use crate::proc;
use crate::riscv::{
    MAXVA, PGSIZE, PTE_R, PTE_U, PTE_V, PTE_W, PTE_X, pa_to_pte, pg_round_down, pg_round_up,
    pte_flags, pte_to_pa, px, registers::satp, sfence_vma,
};
use crate::sync::OnceLock;
use crate::trampoline::trampoline;

unsafe extern "C" {
    /// End of kernel text, from kernel.ld.
    fn etext();
}

pub static KVM: OnceLock<KernelVm> = OnceLock::new();

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysAddr(pub usize);

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr(pub usize);

impl PhysAddr {
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl VirtAddr {
    pub const fn as_usize(self) -> usize {
        self.0
    }

    pub const fn add(self, n: usize) -> Self {
        Self(self.0 + n)
    }

    pub const fn is_page_aligned(self) -> bool {
        self.0 % PGSIZE == 0
    }
}

impl From<usize> for PhysAddr {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<usize> for VirtAddr {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy)]
struct Pte(usize);

impl Pte {
    const EMPTY: Self = Self(0);

    fn valid(self) -> bool {
        self.0 & PTE_V != 0
    }

    fn user(self) -> bool {
        self.0 & PTE_U != 0
    }

    fn writable(self) -> bool {
        self.0 & PTE_W != 0
    }

    /// A leaf names a data page; interior entries carry no permission bits.
    fn leaf(self) -> bool {
        self.0 & (PTE_R | PTE_W | PTE_X) != 0
    }

    fn pa(self) -> PhysAddr {
        PhysAddr(pte_to_pa(self.0))
    }

    fn flags(self) -> usize {
        pte_flags(self.0)
    }
}

/// One page of 512 entries; all three levels look the same.
#[repr(C, align(4096))]
struct Table([Pte; 512]);

/// An owning handle on a tree of table pages. Not `Clone`: exactly one
/// owner frees it.
#[derive(Debug)]
pub struct PageTable {
    root: NonNull<Table>,
}

// Safety: the tree is plain memory; whoever owns the handle owns the
// pages, and shared access after boot is read-only.
unsafe impl Send for PageTable {}
unsafe impl Sync for PageTable {}

impl PageTable {
    /// One zeroed table page.
    pub fn try_new() -> Result<Self> {
        let page = alloc_page().ok_or(KernelError::OutOfMemory)?;
        unsafe { ptr::write_bytes(page.as_ptr(), 0, PGSIZE) };
        Ok(Self { root: page.cast() })
    }

    pub fn root_pa(&self) -> PhysAddr {
        PhysAddr(self.root.as_ptr() as usize)
    }

    /// Finds the leaf PTE for `va`, optionally growing interior tables.
    fn walk(&mut self, va: VirtAddr, alloc: bool) -> Result<&mut Pte> {
        assert!(va.0 < MAXVA, "walk");

        let mut table = self.root.as_ptr();

        unsafe {
            for level in [2, 1] {
                let pte = &mut (*table).0[px(level, va.0)];

                if pte.valid() {
                    table = pte.pa().0 as *mut Table;
                } else {
                    if !alloc {
                        return Err(KernelError::BadAddress);
                    }

                    let page = alloc_page().ok_or(KernelError::OutOfMemory)?;
                    ptr::write_bytes(page.as_ptr(), 0, PGSIZE);
                    table = page.cast().as_ptr();
                    *pte = Pte(pa_to_pte(table as usize) | PTE_V);
                }
            }

            Ok(&mut (*table).0[px(0, va.0)])
        }
    }

    /// Physical address behind a user virtual address. Fails on anything
    /// unmapped or not user-accessible.
    pub fn translate(&mut self, va: VirtAddr) -> Result<PhysAddr> {
        if va.0 >= MAXVA {
            return Err(KernelError::BadAddress);
        }

        let pte = *self.walk(va, false)?;
        if !pte.valid() || !pte.user() {
            return Err(KernelError::BadAddress);
        }

        Ok(pte.pa())
    }

    /// Installs mappings for `size` bytes starting at `va` onto physical
    /// memory starting at `pa`. `va` and `size` must be page-aligned, and
    /// the range must be unmapped.
    pub fn map_pages(&mut self, va: VirtAddr, pa: PhysAddr, size: usize, perm: usize) -> Result<()> {
        assert!(va.is_page_aligned(), "map_pages: va not aligned");
        assert_eq!(size % PGSIZE, 0, "map_pages: size not aligned");
        assert_ne!(size, 0, "map_pages: empty range");

        let mut va = va.0;
        let mut pa = pa.0;
        let last = va + size - PGSIZE;

        loop {
            let pte = self.walk(VirtAddr(va), true)?;
            assert!(!pte.valid(), "map_pages: remap");

            *pte = Pte(pa_to_pte(pa) | perm | PTE_V);

            if va == last {
                break;
            }
            va += PGSIZE;
            pa += PGSIZE;
        }

        Ok(())
    }

    /// Removes `npages` mappings starting at page-aligned `va`, which must
    /// all exist and be leaves, optionally freeing the frames.
    fn unmap_pages(&mut self, va: VirtAddr, npages: usize, free: bool) {
        assert!(va.is_page_aligned(), "unmap_pages: not aligned");

        for va in (va.0..va.0 + npages * PGSIZE).step_by(PGSIZE) {
            let pte = self.walk(VirtAddr(va), false).expect("unmap_pages: walk");
            assert!(pte.valid(), "unmap_pages: not mapped");
            assert!(pte.leaf(), "unmap_pages: not a leaf");

            if free {
                let pa = pte.pa().0 as *mut u8;
                free_page(NonNull::new(pa).unwrap());
            }
            *pte = Pte::EMPTY;
        }
    }

    /// Frees the table pages themselves. Every leaf mapping must already
    /// have been removed.
    fn free_walk(self) {
        fn recurse(table: *mut Table) {
            let entries = unsafe { &mut (*table).0 };
            for pte in entries.iter_mut() {
                if pte.valid() {
                    assert!(!pte.leaf(), "free_walk: leaf");
                    recurse(pte.pa().0 as *mut Table);
                    *pte = Pte::EMPTY;
                }
            }
            free_page(NonNull::new(table as *mut u8).unwrap());
        }

        recurse(self.root.as_ptr());
    }
}

/// The kernel's direct-mapped address space.
#[derive(Debug)]
pub struct KernelVm(PageTable);

impl KernelVm {
    /// Maps a range or dies; boot-time mappings have nowhere to report to.
    pub fn map(&mut self, va: VirtAddr, pa: PhysAddr, size: usize, perm: usize) {
        if self.0.map_pages(va, pa, size, perm).is_err() {
            panic!("kvm map");
        }
    }

    fn make() -> Self {
        let mut kvm = Self(PageTable::try_new().expect("kvm root"));

        // uart registers
        kvm.map(VirtAddr(UART0), PhysAddr(UART0), PGSIZE, PTE_R | PTE_W);

        // PLIC
        kvm.map(VirtAddr(PLIC), PhysAddr(PLIC), 0x40_0000, PTE_R | PTE_W);

        // kernel text, executable and read-only
        let etext = etext as *const () as usize;
        kvm.map(
            VirtAddr(KERNBASE),
            PhysAddr(KERNBASE),
            etext - KERNBASE,
            PTE_R | PTE_X,
        );

        // kernel data and all RAM above it, including the ramdisk image
        kvm.map(
            VirtAddr(etext),
            PhysAddr(etext),
            PHYSTOP - etext,
            PTE_R | PTE_W,
        );

        // trampoline page at the top of the kernel address space too
        kvm.map(
            VirtAddr(TRAMPOLINE),
            PhysAddr(trampoline as *const () as usize),
            PGSIZE,
            PTE_R | PTE_X,
        );

        // a kernel stack (plus guard hole) per process slot
        proc::map_stacks(&mut kvm);

        kvm
    }
}

/// Builds the kernel page table.
///
/// # Safety
/// Once, on the boot hart, before paging is on anywhere.
pub unsafe fn init() {
    KVM.init_with(KernelVm::make);
}

/// Turns on paging for this hart.
///
/// # Safety
/// Once per hart, after [`init`].
pub unsafe fn init_hart() {
    unsafe {
        // order earlier table writes before the switch
        sfence_vma();
        satp::write(satp::make(KVM.expect("kvm").0.root_pa().0));
        // drop stale translations
        sfence_vma();
    }
}

/// A user process's address space.
#[derive(Debug)]
pub struct UserVm(PageTable);

impl UserVm {
    /// An empty space: no mappings at all yet.
    pub fn new_empty() -> Result<Self> {
        Ok(Self(PageTable::try_new()?))
    }

    pub fn root_satp(&self) -> usize {
        satp::make(self.0.root_pa().0)
    }

    pub fn map_pages(&mut self, va: VirtAddr, pa: PhysAddr, size: usize, perm: usize) -> Result<()> {
        self.0.map_pages(va, pa, size, perm)
    }

    pub fn unmap_pages(&mut self, va: VirtAddr, npages: usize, free: bool) {
        self.0.unmap_pages(va, npages, free)
    }

    pub fn translate(&mut self, va: VirtAddr) -> Result<PhysAddr> {
        self.0.translate(va)
    }

    /// Copies the boot blob into a fresh first page, for the very first
    /// process. The blob must fit in one page.
    pub fn install_initcode(&mut self, code: &[u8]) -> Result<()> {
        assert!(code.len() < PGSIZE, "initcode too big");

        let page = alloc_page().ok_or(KernelError::OutOfMemory)?;
        unsafe {
            ptr::write_bytes(page.as_ptr(), 0, PGSIZE);
            ptr::copy_nonoverlapping(code.as_ptr(), page.as_ptr(), code.len());
        }

        self.map_pages(
            VirtAddr(0),
            PhysAddr(page.as_ptr() as usize),
            PGSIZE,
            PTE_R | PTE_W | PTE_X | PTE_U,
        )
    }

    /// Grows the space from `old_size` to `new_size` bytes with zeroed
    /// pages readable by user code plus `xperm`. Returns the new size;
    /// on failure everything just grown is taken back.
    pub fn grow(&mut self, old_size: usize, new_size: usize, xperm: usize) -> Result<usize> {
        if new_size < old_size {
            return Ok(old_size);
        }

        let old_size = pg_round_up(old_size);
        for va in (old_size..new_size).step_by(PGSIZE) {
            let Some(page) = alloc_page() else {
                self.shrink(va, old_size);
                return Err(KernelError::OutOfMemory);
            };
            unsafe { ptr::write_bytes(page.as_ptr(), 0, PGSIZE) };

            if let Err(e) = self.map_pages(
                VirtAddr(va),
                PhysAddr(page.as_ptr() as usize),
                PGSIZE,
                PTE_R | PTE_U | xperm,
            ) {
                free_page(page);
                self.shrink(va, old_size);
                return Err(e);
            }
        }

        Ok(new_size)
    }

    /// Shrinks the space from `old_size` down to `new_size` bytes, freeing
    /// the dropped pages. Returns the new size.
    pub fn shrink(&mut self, old_size: usize, new_size: usize) -> usize {
        if new_size >= old_size {
            return old_size;
        }

        let first_gone = pg_round_up(new_size);
        let old_top = pg_round_up(old_size);
        if first_gone < old_top {
            let npages = (old_top - first_gone) / PGSIZE;
            self.unmap_pages(VirtAddr(first_gone), npages, true);
        }

        new_size
    }

    /// Strips the user bit from the page holding `va`, for inaccessible
    /// stack guard pages.
    pub fn clear_user(&mut self, va: VirtAddr) -> Result<()> {
        let pte = self.0.walk(va, false)?;
        pte.0 &= !PTE_U;
        Ok(())
    }

    /// Deep-copies the first `size` bytes of this space into `child`,
    /// for fork. Both page table entries and page contents are copied.
    /// On failure the child's partial mappings are undone.
    pub fn clone_into(&mut self, child: &mut UserVm, size: usize) -> Result<()> {
        for va in (0..size).step_by(PGSIZE) {
            let pte = *self
                .0
                .walk(VirtAddr(va), false)
                .expect("clone_into: pte should exist");
            assert!(pte.valid(), "clone_into: page not present");

            let src = pte.pa().0 as *const u8;
            let flags = pte.flags();

            let Some(page) = alloc_page() else {
                child.unmap_pages(VirtAddr(0), va / PGSIZE, true);
                return Err(KernelError::OutOfMemory);
            };
            unsafe { ptr::copy_nonoverlapping(src, page.as_ptr(), PGSIZE) };

            if let Err(e) = child.map_pages(
                VirtAddr(va),
                PhysAddr(page.as_ptr() as usize),
                PGSIZE,
                flags,
            ) {
                free_page(page);
                child.unmap_pages(VirtAddr(0), va / PGSIZE, true);
                return Err(e);
            }
        }

        Ok(())
    }

    /// Unmaps the trampoline and trap frame, frees `size` bytes of user
    /// pages, and frees the table pages. Consumes the space.
    pub fn release(mut self, size: usize) {
        self.unmap_pages(VirtAddr(TRAMPOLINE), 1, false);
        self.unmap_pages(VirtAddr(TRAPFRAME), 1, false);
        self.free_user(size);
    }

    /// Frees user pages and then the tables; for spaces that never got
    /// their trampoline mapped.
    pub fn free_user(mut self, size: usize) {
        if size > 0 {
            self.unmap_pages(VirtAddr(0), pg_round_up(size) / PGSIZE, true);
        }
        self.0.free_walk();
    }

    /// Copies `src` into this space at `dst`, page by page. Fails if any
    /// page in the range is unmapped, not user-accessible, or read-only.
    pub fn copy_out(&mut self, dst: VirtAddr, mut src: &[u8]) -> Result<()> {
        let mut dst = dst.0;

        while !src.is_empty() {
            if dst >= MAXVA {
                return Err(KernelError::BadAddress);
            }

            let va0 = pg_round_down(dst);
            let pte = *self.0.walk(VirtAddr(va0), false)?;
            if !pte.valid() || !pte.user() || !pte.writable() {
                return Err(KernelError::BadAddress);
            }

            let n = min(PGSIZE - (dst - va0), src.len());
            unsafe {
                let to = (pte.pa().0 + (dst - va0)) as *mut u8;
                ptr::copy_nonoverlapping(src.as_ptr(), to, n);
            }

            src = &src[n..];
            dst = va0 + PGSIZE;
        }

        Ok(())
    }

    /// Copies from `src` in this space into `dst`.
    pub fn copy_in(&mut self, mut dst: &mut [u8], src: VirtAddr) -> Result<()> {
        let mut src = src.0;

        while !dst.is_empty() {
            let va0 = pg_round_down(src);
            let pa0 = self.translate(VirtAddr(va0))?;

            let n = min(PGSIZE - (src - va0), dst.len());
            unsafe {
                let from = (pa0.0 + (src - va0)) as *const u8;
                ptr::copy_nonoverlapping(from, dst.as_mut_ptr(), n);
            }

            dst = &mut dst[n..];
            src = va0 + PGSIZE;
        }

        Ok(())
    }

    /// Copies a NUL-terminated string from `src`, up to `max` bytes.
    /// Fails if no terminator appears in range or a page is missing.
    pub fn copy_in_str(&mut self, src: VirtAddr, max: usize) -> Result<String> {
        let mut out = String::new();
        let mut src = src.0;
        let mut left = max;

        while left > 0 {
            let va0 = pg_round_down(src);
            let pa0 = self.translate(VirtAddr(va0))?;

            let n = min(PGSIZE - (src - va0), left);
            let chunk = unsafe {
                core::slice::from_raw_parts((pa0.0 + (src - va0)) as *const u8, n)
            };

            match chunk.iter().position(|&b| b == 0) {
                Some(nul) => {
                    out.push_str(
                        core::str::from_utf8(&chunk[..nul])
                            .map_err(|_| KernelError::BadArgument)?,
                    );
                    return Ok(out);
                }
                None => {
                    out.push_str(
                        core::str::from_utf8(chunk).map_err(|_| KernelError::BadArgument)?,
                    );
                    left -= n;
                    src = va0 + PGSIZE;
                }
            }
        }

        Err(KernelError::StringTooLong)
    }
}
