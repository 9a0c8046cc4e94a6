use core::arch::asm;
use core::cell::UnsafeCell;
use core::mem::{MaybeUninit, transmute};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloc::string::String;

use crate::cpu;
use crate::error::{KernelError, Result};
use crate::file::File;
use crate::fs::{self, Inode};
use crate::kalloc::{alloc_page, free_page};
use crate::log::Operation;
use crate::memlayout::{TRAMPOLINE, TRAPFRAME, kstack};
use crate::param::{NOFILE, NPROC, ROOTDEV};
use crate::println;
use crate::riscv::{PGSIZE, PTE_R, PTE_W, PTE_X, interrupts};
use crate::spinlock::{SpinLock, SpinLockGuard};
use crate::swtch::{Context, swtch};
use crate::sync::OnceLock;
use crate::trampoline::trampoline;
use crate::trap::user_trap_ret;
use crate::vm::{KernelVm, PhysAddr, UserVm, VirtAddr};

pub static PROC_TABLE: ProcTable = ProcTable::new();
pub static INIT_PROC: OnceLock<&'static Proc> = OnceLock::new();

/// Saved user registers plus the landing fields the trampoline needs,
/// filling one page mapped at TRAPFRAME in the owning process's space.
/// The field offsets are fixed; uservec/userret address them numerically.
#[repr(C)]
pub struct TrapFrame {
    /*   0 */ pub kernel_satp: usize,
    /*   8 */ pub kernel_sp: usize,
    /*  16 */ pub kernel_trap: usize,
    /*  24 */ pub epc: usize,
    /*  32 */ pub kernel_hartid: usize,
    /*  40 */ pub ra: usize,
    /*  48 */ pub sp: usize,
    /*  56 */ pub gp: usize,
    /*  64 */ pub tp: usize,
    /*  72 */ pub t0: usize,
    /*  80 */ pub t1: usize,
    /*  88 */ pub t2: usize,
    /*  96 */ pub s0: usize,
    /* 104 */ pub s1: usize,
    /* 112 */ pub a0: usize,
    /* 120 */ pub a1: usize,
    /* 128 */ pub a2: usize,
    /* 136 */ pub a3: usize,
    /* 144 */ pub a4: usize,
    /* 152 */ pub a5: usize,
    /* 160 */ pub a6: usize,
    /* 168 */ pub a7: usize,
    /* 176 */ pub s2: usize,
    /* 184 */ pub s3: usize,
    /* 192 */ pub s4: usize,
    /* 200 */ pub s5: usize,
    /* 208 */ pub s6: usize,
    /* 216 */ pub s7: usize,
    /* 224 */ pub s8: usize,
    /* 232 */ pub s9: usize,
    /* 240 */ pub s10: usize,
    /* 248 */ pub s11: usize,
    /* 256 */ pub t3: usize,
    /* 264 */ pub t4: usize,
    /* 272 */ pub t5: usize,
    /* 280 */ pub t6: usize,
}

/// Process id: unique, increasing, never reused within one boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Pid(usize);

impl Pid {
    fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        Pid(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl From<usize> for Pid {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

/// Rendezvous identities for sleep/wakeup. Typed rather than raw
/// addresses, but the contract is the same: sleepers and wakers agree on
/// a value, and wakeup rouses every sleeper holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chan {
    /// the global tick counter
    Ticks,
    /// process slot `i`, used by wait/exit
    Proc(usize),
    /// console input
    Input,
    /// room in the uart transmit ring
    UartTx,
    /// a sleeplock, by address
    Lock(usize),
    /// log space or commit
    LogSpace,
    /// read end of a pipe, by address
    PipeRead(usize),
    /// write end of a pipe, by address
    PipeWrite(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcState {
    #[default]
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl ProcState {
    /// Short name for the Ctrl-P listing.
    fn name(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Used => "used",
            ProcState::Sleeping => "sleep",
            ProcState::Runnable => "runnable",
            ProcState::Running => "run",
            ProcState::Zombie => "zombie",
        }
    }
}

/// The part of a process every CPU may inspect; guarded by the process
/// lock.
#[derive(Debug, Default)]
pub struct ProcShared {
    pub state: ProcState,
    /// what this process is sleeping on, when Sleeping
    pub chan: Option<Chan>,
    pub killed: bool,
    /// exit status held for the parent's wait
    pub xstate: i32,
    pub pid: Pid,
}

impl ProcShared {
    const fn new() -> Self {
        Self {
            state: ProcState::Unused,
            chan: None,
            killed: false,
            xstate: 0,
            pid: Pid(0),
        }
    }
}

/// The part only the process itself (or its not-yet-published slot)
/// touches; no lock needed, see `Proc::local_mut`.
pub struct ProcLocal {
    /// top of this slot's kernel stack area (virtual)
    pub kstack: VirtAddr,
    /// user memory size in bytes
    pub size: usize,
    pub space: Option<UserVm>,
    /// one page, mapped at TRAPFRAME in `space`
    trapframe: Option<NonNull<TrapFrame>>,
    /// swtch() here to run the process
    pub context: Context,
    pub files: [Option<File>; NOFILE],
    pub cwd: Option<Inode>,
    /// for debugging
    pub name: String,
}

impl ProcLocal {
    const fn new() -> Self {
        Self {
            kstack: VirtAddr(0),
            size: 0,
            space: None,
            trapframe: None,
            context: Context::new(),
            files: [const { None }; NOFILE],
            cwd: None,
            name: String::new(),
        }
    }

    pub fn trapframe(&self) -> &TrapFrame {
        unsafe { self.trapframe.expect("trapframe").as_ref() }
    }

    #[allow(clippy::mut_from_ref)]
    pub fn trapframe_mut(&mut self) -> &mut TrapFrame {
        unsafe { self.trapframe.expect("trapframe").as_mut() }
    }

    fn trapframe_pa(&self) -> PhysAddr {
        PhysAddr(self.trapframe.expect("trapframe").as_ptr() as usize)
    }

    pub fn space_mut(&mut self) -> &mut UserVm {
        self.space.as_mut().expect("user space")
    }
}

unsafe impl Send for ProcLocal {}
unsafe impl Sync for ProcLocal {}

/// One process slot.
pub struct Proc {
    /// Index in the table; parent links and wait channels use this, not
    /// the pid.
    pub idx: usize,
    pub shared: SpinLock<ProcShared>,
    local: UnsafeCell<ProcLocal>,
}

unsafe impl Sync for Proc {}

impl Proc {
    const fn new(idx: usize) -> Self {
        Self {
            idx,
            shared: SpinLock::new(ProcShared::new(), "proc"),
            local: UnsafeCell::new(ProcLocal::new()),
        }
    }

    pub fn local(&self) -> &ProcLocal {
        unsafe { &*self.local.get() }
    }

    /// Exclusive access to the lock-free side of the slot.
    ///
    /// # Safety
    /// Caller must be the process itself, or hold the slot before it is
    /// published (alloc, fork, wait-reap).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn local_mut(&self) -> &mut ProcLocal {
        unsafe { &mut *self.local.get() }
    }

    pub fn is_init(&self) -> bool {
        INIT_PROC.get().is_some_and(|init| ptr::eq(self, *init))
    }

    /// Takes and releases the process lock.
    pub fn killed(&self) -> bool {
        self.shared.lock().killed
    }

    pub fn pid(&self) -> Pid {
        self.shared.lock().pid
    }

    /// Builds a user space holding only the trampoline and this slot's
    /// trap frame, the two pages every process carries.
    pub fn build_space(&self) -> Result<UserVm> {
        let mut space = UserVm::new_empty()?;

        // Trampoline at the very top; supervisor-only, so no PTE_U.
        if let Err(e) = space.map_pages(
            VirtAddr(TRAMPOLINE),
            PhysAddr(trampoline as *const () as usize),
            PGSIZE,
            PTE_R | PTE_X,
        ) {
            space.free_user(0);
            return Err(e);
        }

        // Trap frame just below it.
        if let Err(e) = space.map_pages(
            VirtAddr(TRAPFRAME),
            self.local().trapframe_pa(),
            PGSIZE,
            PTE_R | PTE_W,
        ) {
            space.unmap_pages(VirtAddr(TRAMPOLINE), 1, false);
            space.free_user(0);
            return Err(e);
        }

        Ok(space)
    }

    /// Returns the slot to Unused, freeing whatever it accumulated.
    /// Caller holds the lock and passes its guard in.
    fn free(&self, mut shared: SpinLockGuard<'_, ProcShared>) {
        // Safety: the slot is being unpublished; we are its only user.
        let local = unsafe { self.local_mut() };

        if let Some(tf) = local.trapframe.take() {
            free_page(tf.cast());
        }
        if let Some(space) = local.space.take() {
            space.release(local.size);
        }

        local.size = 0;
        local.name.clear();
        shared.pid = Pid(0);
        shared.chan = None;
        shared.killed = false;
        shared.xstate = 0;
        shared.state = ProcState::Unused;
    }
}

pub struct ProcTable {
    slots: [Proc; NPROC],
    /// parents[child.idx] names the child's parent slot. One lock for the
    /// whole forest: this is the wait lock, and it is always taken before
    /// any per-process lock.
    pub parents: SpinLock<[Option<usize>; NPROC]>,
}

unsafe impl Sync for ProcTable {}

impl ProcTable {
    const fn new() -> Self {
        let slots = {
            let mut slots: [MaybeUninit<Proc>; NPROC] =
                [const { MaybeUninit::uninit() }; NPROC];
            let mut i = 0;
            while i < NPROC {
                slots[i] = MaybeUninit::new(Proc::new(i));
                i += 1;
            }
            unsafe { transmute::<[MaybeUninit<Proc>; NPROC], [Proc; NPROC]>(slots) }
        };

        Self {
            slots,
            parents: SpinLock::new([None; NPROC], "wait"),
        }
    }

    pub fn get(&self, idx: usize) -> &Proc {
        &self.slots[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proc> {
        self.slots.iter()
    }

    /// Claims an Unused slot: fresh pid, a trap-frame page, an empty user
    /// space, and a context that will first run `fork_ret` on this slot's
    /// kernel stack. Returns the slot with its lock still held.
    pub fn alloc(&self) -> Result<(&Proc, SpinLockGuard<'_, ProcShared>)> {
        for proc in self.iter() {
            let mut shared = proc.shared.lock();
            if shared.state != ProcState::Unused {
                continue;
            }

            shared.pid = Pid::next();
            shared.state = ProcState::Used;

            // Safety: just claimed; nothing else can see this slot yet.
            let local = unsafe { proc.local_mut() };

            let Some(tf) = alloc_page() else {
                proc.free(shared);
                return Err(KernelError::OutOfMemory);
            };
            unsafe { ptr::write_bytes(tf.as_ptr(), 0, PGSIZE) };
            local.trapframe = Some(tf.cast());

            match proc.build_space() {
                Ok(space) => local.space = Some(space),
                Err(e) => {
                    proc.free(shared);
                    return Err(e);
                }
            }

            local.context.clear();
            local.context.ra = fork_ret as *const () as usize;
            local.context.sp = local.kstack.add(PGSIZE).as_usize();

            return Ok((proc, shared));
        }

        Err(KernelError::OutOfProcs)
    }

    /// Prints one line per live process: pid, state, name.
    ///
    /// # Safety
    /// Takes no locks on purpose, so it works even when the machine is
    /// wedged; it may read torn state.
    pub unsafe fn dump(&self) {
        println!();

        for proc in self.iter() {
            let shared = unsafe { proc.shared.get_mut_unchecked() };
            if shared.state == ProcState::Unused {
                continue;
            }
            println!(
                "{} {} {}",
                shared.pid.as_usize(),
                shared.state.name(),
                proc.local().name
            );
        }
    }
}

/// The running process, or None on a scheduler-only hart.
pub fn current_opt() -> Option<&'static Proc> {
    cpu::current_proc()
}

pub fn current() -> &'static Proc {
    current_opt().expect("no current process")
}

/// A destination or source that is either a user virtual address or a
/// plain kernel pointer; the copy routines dispatch on it.
#[derive(Debug, Clone, Copy)]
pub enum Addr {
    User(VirtAddr),
    Kernel(usize),
}

impl Addr {
    pub fn offset(self, n: usize) -> Self {
        match self {
            Addr::User(va) => Addr::User(va.add(n)),
            Addr::Kernel(pa) => Addr::Kernel(pa + n),
        }
    }
}

/// Copies into the current process's space.
pub fn copy_out_user(src: &[u8], dst: VirtAddr) -> Result<()> {
    // Safety: we are the current process.
    let local = unsafe { current().local_mut() };
    local.space_mut().copy_out(dst, src)
}

/// Copies out of the current process's space.
pub fn copy_in_user(dst: &mut [u8], src: VirtAddr) -> Result<()> {
    // Safety: we are the current process.
    let local = unsafe { current().local_mut() };
    local.space_mut().copy_in(dst, src)
}

pub fn either_copy_out(src: &[u8], dst: Addr) -> Result<()> {
    match dst {
        Addr::User(va) => copy_out_user(src, va),
        Addr::Kernel(pa) => {
            unsafe { ptr::copy_nonoverlapping(src.as_ptr(), pa as *mut u8, src.len()) };
            Ok(())
        }
    }
}

pub fn either_copy_in(dst: &mut [u8], src: Addr) -> Result<()> {
    match src {
        Addr::User(va) => copy_in_user(dst, va),
        Addr::Kernel(pa) => {
            unsafe { ptr::copy_nonoverlapping(pa as *const u8, dst.as_mut_ptr(), dst.len()) };
            Ok(())
        }
    }
}

/// Allocates a kernel stack page per slot, mapped high with an unmapped
/// guard page below each. Called while the kernel page table is being
/// built.
pub fn map_stacks(kvm: &mut KernelVm) {
    for i in 0..NPROC {
        let page = alloc_page().expect("map_stacks");
        kvm.map(
            VirtAddr(kstack(i)),
            PhysAddr(page.as_ptr() as usize),
            PGSIZE,
            PTE_R | PTE_W,
        );
    }
}

/// Records each slot's kernel stack address.
///
/// # Safety
/// Once, during boot, before the scheduler runs.
pub unsafe fn init() {
    for proc in PROC_TABLE.iter() {
        // Safety: boot; no slot is live.
        unsafe { proc.local_mut() }.kstack = VirtAddr(kstack(proc.idx));
    }
}

/// Machine code for the first user program: it execs /init and exits if
/// that fails. Assembled from
///     la a0, init; la a1, argv; li a7, SYS_exec; ecall
///     li a7, SYS_exit; ecall; jal .
/// with "/init" and argv inline after the code.
static INITCODE: [u8; 52] = [
    0x17, 0x05, 0x00, 0x00, 0x13, 0x05, 0x45, 0x02, 0x97, 0x05, 0x00, 0x00, 0x93, 0x85, 0x35,
    0x02, 0x93, 0x08, 0x70, 0x00, 0x73, 0x00, 0x00, 0x00, 0x93, 0x08, 0x20, 0x00, 0x73, 0x00,
    0x00, 0x00, 0xef, 0xf0, 0x9f, 0xff, 0x2f, 0x69, 0x6e, 0x69, 0x74, 0x00, 0x00, 0x24, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Hand-builds the first process around INITCODE.
pub fn user_init() {
    let (proc, mut shared) = PROC_TABLE.alloc().expect("user_init");
    INIT_PROC.init_with(|| proc);

    // Safety: the slot is not Runnable yet.
    let local = unsafe { proc.local_mut() };

    local
        .space_mut()
        .install_initcode(&INITCODE)
        .expect("user_init: initcode");
    local.size = PGSIZE;

    // user program counter and stack pointer for the blob
    let tf = local.trapframe_mut();
    tf.epc = 0;
    tf.sp = PGSIZE;

    local.name.push_str("initcode");
    // The root inode needs no disk read here, so this is safe before the
    // file system is recovered in fork_ret.
    local.cwd = Some(Inode::get(ROOTDEV, fs::ROOTINO).expect("user_init: root"));

    shared.state = ProcState::Runnable;
}

/// Grows (or shrinks, for negative `n`) the current process's memory.
pub fn grow(n: isize) -> Result<()> {
    // Safety: we are the current process.
    let local = unsafe { current().local_mut() };
    let size = local.size;

    let new_size = if n > 0 {
        local.space_mut().grow(size, size + n as usize, PTE_W)?
    } else if n < 0 {
        let shrink = -n as usize;
        if shrink > size {
            return Err(KernelError::BadArgument);
        }
        local.space_mut().shrink(size, size - shrink)
    } else {
        size
    };

    local.size = new_size;
    Ok(())
}

/// Creates a copy of the current process; the child resumes in user space
/// at the same spot with 0 in a0.
pub fn fork() -> Result<Pid> {
    let proc = current();
    // Safety: we are the current process.
    let local = unsafe { proc.local_mut() };

    let (child, child_shared) = PROC_TABLE.alloc()?;
    // Safety: the child is not published yet.
    let child_local = unsafe { child.local_mut() };

    // duplicate the address space
    let size = local.size;
    if let Err(e) = local
        .space_mut()
        .clone_into(child_local.space_mut(), size)
    {
        child.free(child_shared);
        return Err(e);
    }
    child_local.size = size;

    // same saved registers, so the child continues at the same user pc,
    // but fork returns 0 there
    let tf = child_local.trapframe_mut();
    unsafe {
        ptr::copy_nonoverlapping(local.trapframe() as *const TrapFrame, tf as *mut TrapFrame, 1)
    };
    tf.a0 = 0;

    // share the open files and working directory
    for (i, file) in local.files.iter().enumerate() {
        child_local.files[i] = file.clone();
    }
    child_local.cwd = local.cwd.as_ref().map(Inode::dup);
    child_local.name = local.name.clone();

    let pid = child_shared.pid;

    // Publish the parent link under the wait lock, without holding the
    // child's lock (lock order: wait lock first).
    drop(child_shared);
    {
        let mut parents = PROC_TABLE.parents.lock();
        parents[child.idx] = Some(proc.idx);
    }

    child.shared.lock().state = ProcState::Runnable;

    Ok(pid)
}

/// Hands `proc`'s children to init, waking it to reap them. Runs under
/// the wait lock.
fn reparent(proc: &Proc, parents: &mut SpinLockGuard<'_, [Option<usize>; NPROC]>) {
    let init_idx = INIT_PROC.expect("init proc").idx;
    for parent in parents.iter_mut() {
        if *parent == Some(proc.idx) {
            *parent = Some(init_idx);
            wakeup(Chan::Proc(init_idx));
        }
    }
}

/// Terminates the current process; it stays a zombie until the parent
/// reaps it. Never returns.
pub fn exit(status: i32) -> ! {
    let proc = current();
    assert!(!proc.is_init(), "init exiting");

    // Safety: we are the current process.
    let local = unsafe { proc.local_mut() };

    // Close everything; inode puts need a transaction.
    for file in &mut local.files {
        file.take();
    }
    {
        let _op = Operation::begin();
        if let Some(cwd) = local.cwd.take() {
            cwd.put();
        }
    }

    let mut parents = PROC_TABLE.parents.lock();

    reparent(proc, &mut parents);

    // the parent may be blocked in wait
    let parent_idx = parents[proc.idx].expect("exit: no parent");
    wakeup(Chan::Proc(parent_idx));

    let mut shared = proc.shared.lock();
    shared.xstate = status;
    shared.state = ProcState::Zombie;

    drop(parents);

    sched(shared, &mut local.context);

    unreachable!("zombie ran");
}

/// Waits for any child to exit, returning its pid and copying the exit
/// status to `status_addr` unless it is 0. Fails when there is nothing to
/// wait for or the caller has been killed.
pub fn wait(status_addr: VirtAddr) -> Result<Pid> {
    let proc = current();

    let mut parents = PROC_TABLE.parents.lock();

    loop {
        let mut have_kids = false;

        for child in PROC_TABLE.iter() {
            if parents[child.idx] != Some(proc.idx) {
                continue;
            }

            // The lock ensures the child is done with exit()'s swtch.
            let child_shared = child.shared.lock();
            have_kids = true;

            if child_shared.state == ProcState::Zombie {
                let pid = child_shared.pid;

                if status_addr.as_usize() != 0 {
                    let bytes = child_shared.xstate.to_le_bytes();
                    if copy_out_user(&bytes, status_addr).is_err() {
                        return Err(KernelError::BadAddress);
                    }
                }

                parents[child.idx] = None;
                child.free(child_shared);

                return Ok(pid);
            }
        }

        if !have_kids {
            return Err(KernelError::NoChildren);
        }
        if proc.killed() {
            return Err(KernelError::Killed);
        }

        // Sleep on our own slot; exiting children wake it.
        parents = sleep(Chan::Proc(proc.idx), parents);
    }
}

/// Marks `pid` killed. A sleeping target is made runnable so it can
/// notice; it actually dies on its next trip toward user space.
pub fn kill(pid: Pid) -> Result<()> {
    for proc in PROC_TABLE.iter() {
        let mut shared = proc.shared.lock();
        if shared.pid == pid && shared.state != ProcState::Unused {
            shared.killed = true;
            if shared.state == ProcState::Sleeping {
                shared.state = ProcState::Runnable;
            }
            return Ok(());
        }
    }

    Err(KernelError::NoProcess)
}

/// Per-hart scheduler loop; never returns. Picks any Runnable slot,
/// switches into it, and takes back over when the process calls `sched`.
///
/// # Safety
/// Called once per hart at the end of boot, with interrupts off.
pub unsafe fn scheduler() -> ! {
    // This hart's record never moves; cache the reference.
    let cpu = unsafe { cpu::current() };
    cpu.proc = None;

    loop {
        // The last process may have left interrupts off. Open a window so
        // pending interrupts can land (avoiding deadlock when everyone is
        // asleep), then close it for the table scan.
        interrupts::enable();
        interrupts::disable();

        let mut ran_one = false;

        for proc in PROC_TABLE.iter() {
            let mut shared = proc.shared.lock();

            if shared.state == ProcState::Runnable {
                // The process must release this lock and reacquire it on
                // its way back.
                shared.state = ProcState::Running;
                cpu.proc = Some(proc);
                unsafe { swtch(&mut cpu.context, &proc.local().context) };

                // It changed state before switching back here.
                cpu.proc = None;
                ran_one = true;
            }
        }

        if !ran_one {
            // nothing runnable; idle until an interrupt
            unsafe { asm!("wfi") };
        }
    }
}

/// Switches from the current process back to this hart's scheduler.
///
/// Caller must hold exactly its own process lock (passed as the guard),
/// with the state already moved off Running. The hart's saved
/// interrupt-enable flag travels with the kernel thread, since it is a
/// property of this call chain, not of the CPU.
pub fn sched<'a>(
    shared: SpinLockGuard<'a, ProcShared>,
    context: &mut Context,
) -> SpinLockGuard<'a, ProcShared> {
    let cpu = unsafe { cpu::current() };

    assert_eq!(cpu.noff, 1, "sched locks");
    assert_ne!(shared.state, ProcState::Running, "sched running");
    assert!(!interrupts::get(), "sched interruptible");

    let intr_on_entry = cpu.intr_on_entry;
    unsafe { swtch(context, &cpu.context) };

    // Possibly a different hart now; reload.
    let cpu = unsafe { cpu::current() };
    cpu.intr_on_entry = intr_on_entry;

    shared
}

/// Gives up the CPU for one scheduling round.
pub fn yield_now() {
    let proc = current();
    // Safety: we are the current process.
    let local = unsafe { proc.local_mut() };

    let mut shared = proc.shared.lock();
    shared.state = ProcState::Runnable;
    sched(shared, &mut local.context);
}

/// First landing pad of every new process, still holding the process lock
/// the scheduler took. The very first arrival also brings up the file
/// system, which sleeps and so cannot run during boot proper.
pub unsafe extern "C" fn fork_ret() {
    static FIRST: AtomicBool = AtomicBool::new(true);

    // Safety: the scheduler locked our slot; its guard lives on the
    // scheduler stack and can never drop in this context.
    unsafe { current().shared.force_unlock() };

    if FIRST
        .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
        .is_ok()
    {
        fs::init(ROOTDEV);
    }

    unsafe { user_trap_ret() };
}

/// Atomically trades `guard` for a nap on `chan`; reacquires the same
/// lock before returning.
///
/// Taking our own lock before dropping `guard` closes the lost-wakeup
/// window: a waker must take that same lock to move us out of Sleeping,
/// and it cannot before we finish switching away.
pub fn sleep<T>(chan: Chan, guard: SpinLockGuard<'_, T>) -> SpinLockGuard<'_, T> {
    let proc = current();

    let condition = {
        let mut shared = proc.shared.lock();
        let condition = SpinLock::unlock(guard);

        shared.chan = Some(chan);
        shared.state = ProcState::Sleeping;

        // Safety: we are the current process.
        let context = unsafe { &mut proc.local_mut().context };
        let mut shared = sched(shared, context);

        shared.chan = None;
        condition
    }; // our own lock drops here

    condition.lock()
}

/// Wakes every process sleeping on `chan`. Must be called with no
/// process lock held.
pub fn wakeup(chan: Chan) {
    let me = current_opt();

    for proc in PROC_TABLE.iter() {
        if me.is_some_and(|p| ptr::eq(p, proc)) {
            continue;
        }

        let mut shared = proc.shared.lock();
        if shared.state == ProcState::Sleeping && shared.chan == Some(chan) {
            shared.state = ProcState::Runnable;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn pids_increase() {
        let a = Pid::next();
        let b = Pid::next();
        assert!(b > a);
    }

    #[test_case]
    fn state_names() {
        assert_eq!(ProcState::Sleeping.name(), "sleep");
        assert_eq!(ProcState::Zombie.name(), "zombie");
    }

    #[test_case]
    fn chan_identity() {
        assert_eq!(Chan::Proc(3), Chan::Proc(3));
        assert_ne!(Chan::Proc(3), Chan::Proc(4));
        assert_ne!(Chan::Ticks, Chan::Input);
    }
}
