//! Thread descriptors and the global thread table.

use crate::arch::Arch;
use crate::config::{clamp_nice, clamp_priority};
use crate::fixed_point::Fixed;
use crate::list::{Link, Linked};
use crate::mem::{ArcLite, Stack};
use crate::sync::Lock;
use portable_atomic::{AtomicBool, AtomicI8, AtomicU32, AtomicU64, AtomicU8, Ordering};

extern crate alloc;
use alloc::string::String;

pub mod builder;
pub mod handle;

pub use builder::ThreadBuilder;
pub use handle::JoinHandle;

/// Stack-overflow sentinel written at the top (lowest address) of every
/// thread's stack and checked on every scheduling decision.
pub const STACK_MAGIC: u64 = 0xC0FF_EE15_DEAD_BEEF;

/// Maximum thread name length, per the data model.
pub const MAX_NAME_LEN: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(core::num::NonZeroUsize);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    /// # Safety
    /// Caller must ensure `id` is non-zero and unique among live threads.
    pub unsafe fn new_unchecked(id: usize) -> Self {
        Self(unsafe { core::num::NonZeroUsize::new_unchecked(id) })
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Thread status, per the data model: `RUNNING | READY | BLOCKED | DYING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Running = 0,
    Ready = 1,
    Blocked = 2,
    Dying = 3,
}

impl ThreadState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ThreadState::Running,
            1 => ThreadState::Ready,
            2 => ThreadState::Blocked,
            _ => ThreadState::Dying,
        }
    }
}

/// Reference-counted handle to a thread descriptor. Cloning shares the
/// same underlying `ThreadInner`; the thread table (`sched::ThreadTable`)
/// holds the canonical strong reference for a thread's whole lifetime,
/// ready queues and waiter lists hold only raw pointers derived from it.
pub struct Thread {
    inner: ArcLite<ThreadInner>,
}

pub struct ThreadInner {
    pub id: ThreadId,
    name: spin::Mutex<String>,
    status: AtomicU8,

    base_priority: AtomicU8,
    effective_priority: AtomicU8,

    nice: AtomicI8,
    recent_cpu: spin::Mutex<Fixed>,

    wake_tick: AtomicU64,
    /// Ticks accumulated since this thread last became RUNNING, for the
    /// round-robin time-slice check in `timer::on_tick`.
    ticks_used: AtomicU32,

    /// The lock this thread is currently blocked trying to acquire, or
    /// none. Read/written only with interrupts disabled.
    waiting_on: spin::Mutex<Option<core::ptr::NonNull<Lock>>>,
    /// Locks currently held by this thread. Scanned in full on every
    /// `recompute_effective_priority` call — held-lock counts per thread
    /// are small enough that keeping this sorted wouldn't pay for itself.
    held_locks: crate::list::IntrusiveList<Lock>,

    /// Membership in exactly one of: the ready queue, or nothing (while
    /// RUNNING/BLOCKED/DYING).
    pub(crate) ready_link: Link<ThreadInner>,
    /// Membership in exactly one of: a semaphore waiter list, or the
    /// sleep list. These uses are mutually exclusive — sleeping and
    /// waiting on a lock/semaphore/condvar are different BLOCKED reasons
    /// that never overlap for the same thread — so they share one slot
    /// instead of paying for two.
    pub(crate) wait_link: Link<ThreadInner>,

    magic: AtomicU64,
    stack: Option<Stack>,
    context: spin::Mutex<<crate::arch::DefaultArch as Arch>::SavedContext>,
    join_result: spin::Mutex<Option<()>>,
    is_idle: AtomicBool,
}

unsafe impl crate::list::Linked for ThreadInner {
    fn link(&self) -> &Link<ThreadInner> {
        &self.ready_link
    }
}

/// A second view of the same type for the wait-list slot. `IntrusiveList`
/// is generic over one `Linked` impl per type, so waiter lists are typed
/// over this newtype wrapper rather than `ThreadInner` directly, keeping
/// the ready-queue and wait-list link fields from being ambiguous to the
/// compiler even though they coexist on one struct.
#[repr(transparent)]
pub struct WaitNode(pub ThreadInner);

unsafe impl Linked for WaitNode {
    fn link(&self) -> &Link<WaitNode> {
        // SAFETY: `WaitNode` is `#[repr(transparent)]` over `ThreadInner`,
        // and `wait_link` is never concurrently accessed as a
        // `Link<ThreadInner>` by the ready queue (the two slots are
        // disjoint fields; this cast only reinterprets which of the two
        // fields the list machinery is allowed to touch).
        unsafe { &*(core::ptr::addr_of!(self.0.wait_link) as *const Link<WaitNode>) }
    }
}

impl Thread {
    pub fn new(
        id: ThreadId,
        stack: Stack,
        name: &str,
        priority: u8,
    ) -> (Self, JoinHandle) {
        let priority = clamp_priority(priority);
        let mut truncated = String::new();
        for c in name.chars().take(MAX_NAME_LEN) {
            truncated.push(c);
        }

        let inner = ThreadInner {
            id,
            name: spin::Mutex::new(truncated),
            status: AtomicU8::new(ThreadState::Ready as u8),
            base_priority: AtomicU8::new(priority),
            effective_priority: AtomicU8::new(priority),
            nice: AtomicI8::new(0),
            recent_cpu: spin::Mutex::new(Fixed::ZERO),
            wake_tick: AtomicU64::new(0),
            ticks_used: AtomicU32::new(0),
            waiting_on: spin::Mutex::new(None),
            held_locks: crate::list::IntrusiveList::new(),
            ready_link: Link::new(),
            wait_link: Link::new(),
            magic: AtomicU64::new(STACK_MAGIC),
            stack: Some(stack),
            context: spin::Mutex::new(Default::default()),
            join_result: spin::Mutex::new(None),
            is_idle: AtomicBool::new(false),
        };

        let inner_arc = ArcLite::new(inner);
        let thread = Self { inner: inner_arc.clone() };
        let join_handle = JoinHandle { inner: inner_arc };
        (thread, join_handle)
    }

    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.inner.name.lock().clone()
    }

    pub fn set_name(&self, name: String) {
        let mut truncated = String::new();
        for c in name.chars().take(MAX_NAME_LEN) {
            truncated.push(c);
        }
        *self.inner.name.lock() = truncated;
    }

    pub fn status(&self) -> ThreadState {
        self.inner.status()
    }

    pub fn set_status(&self, status: ThreadState) {
        self.inner.set_status(status);
    }

    pub fn base_priority(&self) -> u8 {
        self.inner.base_priority()
    }

    pub fn effective_priority(&self) -> u8 {
        self.inner.effective_priority()
    }

    /// Set `base_priority` and recompute `effective_priority` as
    /// `max(base_priority, max donation)`, per §4.3 `set_priority`.
    pub fn set_base_priority(&self, p: u8) {
        let p = clamp_priority(p);
        self.inner.base_priority.store(p, Ordering::Release);
        self.inner.recompute_effective_priority();
    }

    /// Recompute `effective_priority := max(base_priority, max over held
    /// locks of their max_waiter_priority)`, per lock release (§4.4) and
    /// `set_priority` (§4.3).
    pub fn recompute_effective_priority(&self) {
        self.inner.recompute_effective_priority();
    }

    pub fn nice(&self) -> i8 {
        self.inner.nice()
    }

    pub fn set_nice(&self, n: i8) {
        self.inner.set_nice(clamp_nice(n));
    }

    pub fn recent_cpu(&self) -> Fixed {
        self.inner.recent_cpu()
    }

    pub fn set_recent_cpu(&self, v: Fixed) {
        self.inner.set_recent_cpu(v);
    }

    pub fn wake_tick(&self) -> u64 {
        self.inner.wake_tick()
    }

    pub fn set_wake_tick(&self, tick: u64) {
        self.inner.set_wake_tick(tick);
    }

    /// Record one more tick of this thread having been RUNNING; returns
    /// the new count.
    pub fn increment_ticks_used(&self) -> u32 {
        self.inner.increment_ticks_used()
    }

    /// Reset the time-slice counter, called whenever this thread becomes
    /// RUNNING.
    pub fn reset_ticks_used(&self) {
        self.inner.reset_ticks_used();
    }

    pub fn waiting_on(&self) -> Option<core::ptr::NonNull<Lock>> {
        self.inner.waiting_on()
    }

    pub fn set_waiting_on(&self, lock: Option<core::ptr::NonNull<Lock>>) {
        self.inner.set_waiting_on(lock);
    }

    pub fn held_locks(&self) -> &crate::list::IntrusiveList<Lock> {
        self.inner.held_locks()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }

    pub fn mark_idle(&self) {
        self.inner.is_idle.store(true, Ordering::Release);
    }

    /// Stack-overflow integrity check (invariant 6): the running
    /// thread's `magic` must equal the expected sentinel.
    pub fn check_stack_integrity(&self) -> bool {
        self.inner.check_stack_integrity()
    }

    pub fn stack_bottom(&self) -> Option<*mut u8> {
        self.inner.stack.as_ref().map(|s| s.stack_bottom())
    }

    pub fn context_ptr(&self) -> *mut <crate::arch::DefaultArch as Arch>::SavedContext {
        self.inner.context_ptr()
    }

    #[allow(unused_variables)]
    pub fn setup_initial_context(&self, entry_point: usize, stack_top: usize, arg: usize) {
        let mut ctx = self.inner.context.lock();
        #[cfg(target_arch = "aarch64")]
        {
            ctx.x = [0; 31];
            ctx.x[0] = arg as u64;
            ctx.sp = stack_top as u64;
            ctx.pc = entry_point as u64;
            ctx.pstate = 0x3c5;
            #[cfg(feature = "full-fpu")]
            {
                ctx.neon_state = [0; 32];
                ctx.fpcr = 0;
                ctx.fpsr = 0;
            }
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            let _ = (entry_point, stack_top, arg);
        }
    }

    /// Access to the thread as a `NonNull<ThreadInner>` for intrusive
    /// list membership. Valid as long as this `Thread`'s `ArcLite`
    /// strong reference (or a clone, e.g. the one held by the thread
    /// table) stays alive.
    pub fn as_ptr(&self) -> core::ptr::NonNull<ThreadInner> {
        core::ptr::NonNull::from(&*self.inner)
    }

    /// Same address, typed for membership in a wait list (`wait_link`
    /// instead of `ready_link`). See `WaitNode`.
    pub fn as_wait_ptr(&self) -> core::ptr::NonNull<WaitNode> {
        self.as_ptr().cast()
    }

    pub fn mark_finished(&self) {
        self.set_status(ThreadState::Dying);
        if let Some(mut r) = self.inner.join_result.try_lock() {
            *r = Some(());
        }
    }

    pub fn join_result(&self) -> Option<()> {
        self.inner.join_result.try_lock().and_then(|g| *g)
    }
}

/// Accessors used directly through a raw `&ThreadInner` obtained from
/// intrusive-list traversal, where wrapping back up in a `Thread`/`ArcLite`
/// isn't worth it (the scheduler and sync primitives walk lists of raw
/// `NonNull<ThreadInner>` under interrupts-disabled, not `Thread` handles).
impl ThreadInner {
    pub(crate) fn status(&self) -> ThreadState {
        ThreadState::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: ThreadState) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn effective_priority(&self) -> u8 {
        self.effective_priority.load(Ordering::Acquire)
    }

    pub(crate) fn base_priority(&self) -> u8 {
        self.base_priority.load(Ordering::Acquire)
    }

    pub(crate) fn nice(&self) -> i8 {
        self.nice.load(Ordering::Acquire)
    }

    pub(crate) fn set_nice(&self, n: i8) {
        self.nice.store(n, Ordering::Release);
    }

    pub(crate) fn recent_cpu(&self) -> Fixed {
        *self.recent_cpu.lock()
    }

    pub(crate) fn set_recent_cpu(&self, v: Fixed) {
        *self.recent_cpu.lock() = v;
    }

    pub(crate) fn wake_tick(&self) -> u64 {
        self.wake_tick.load(Ordering::Acquire)
    }

    pub(crate) fn set_wake_tick(&self, tick: u64) {
        self.wake_tick.store(tick, Ordering::Release);
    }

    pub(crate) fn increment_ticks_used(&self) -> u32 {
        self.ticks_used.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn reset_ticks_used(&self) {
        self.ticks_used.store(0, Ordering::Release);
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.is_idle.load(Ordering::Acquire)
    }

    pub(crate) fn context_ptr(&self) -> *mut <crate::arch::DefaultArch as Arch>::SavedContext {
        let guard = self.context.lock();
        &*guard as *const _ as *mut _
    }

    pub(crate) fn check_stack_integrity(&self) -> bool {
        self.magic.load(Ordering::Acquire) == STACK_MAGIC
    }

    /// Recompute `effective_priority` from `base_priority` and the
    /// donations of every lock this thread currently holds. Donation is
    /// disabled in MLFQS mode (§4.7): `base_priority` there is itself
    /// derived from `recent_cpu`/`nice`, and folding held-lock donations
    /// on top would corrupt that derivation.
    pub(crate) fn recompute_effective_priority(&self) {
        let mlfqs_mode = crate::kernel::get_global_kernel::<crate::arch::DefaultArch>()
            .map(|k| k.sched().config().mlfqs_mode)
            .unwrap_or(false);
        let mut max_donated = self.base_priority();
        if !mlfqs_mode {
            self.held_locks.for_each(|lock_ptr| {
                let lock = unsafe { lock_ptr.as_ref() };
                max_donated = max_donated.max(lock.max_waiter_priority());
            });
        }
        self.effective_priority.store(max_donated, Ordering::Release);
    }

    pub(crate) fn held_locks(&self) -> &crate::list::IntrusiveList<Lock> {
        &self.held_locks
    }

    pub(crate) fn waiting_on(&self) -> Option<core::ptr::NonNull<Lock>> {
        *self.waiting_on.lock()
    }

    pub(crate) fn set_waiting_on(&self, lock: Option<core::ptr::NonNull<Lock>>) {
        *self.waiting_on.lock() = lock;
    }
}

impl Clone for Thread {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

unsafe impl Send for Thread {}
unsafe impl Sync for Thread {}
unsafe impl Send for ThreadInner {}
unsafe impl Sync for ThreadInner {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{StackPool, StackSizeClass};

    fn make_thread(priority: u8) -> (Thread, JoinHandle) {
        let pool = StackPool::new();
        let stack = pool.allocate(StackSizeClass::Small).unwrap();
        let id = unsafe { ThreadId::new_unchecked(1) };
        Thread::new(id, stack, "t", priority)
    }

    #[test]
    fn new_thread_is_ready_with_clamped_priority() {
        let (t, _h) = make_thread(200);
        assert_eq!(t.status(), ThreadState::Ready);
        assert_eq!(t.base_priority(), crate::config::PRI_MAX);
        assert_eq!(t.effective_priority(), crate::config::PRI_MAX);
    }

    #[test]
    fn name_is_truncated_to_fifteen_chars() {
        let (t, _h) = make_thread(10);
        t.set_name(String::from("this-name-is-way-too-long"));
        assert_eq!(t.name().chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn stack_integrity_starts_intact() {
        let (t, _h) = make_thread(10);
        assert!(t.check_stack_integrity());
    }

    #[test]
    fn set_base_priority_without_donation_sets_effective_too() {
        let (t, _h) = make_thread(10);
        t.set_base_priority(40);
        assert_eq!(t.base_priority(), 40);
        assert_eq!(t.effective_priority(), 40);
    }
}
