//! Kernel orchestration: boot, spawn, yield, exit, and the timer hook.
//!
//! `SchedulerState` (in `sched`) owns the ready queue and thread table;
//! this module is the `Arch`-generic layer that actually switches
//! contexts and ties scheduling decisions to the rest of the system
//! (interrupt gating, stack allocation, the idle thread).

use crate::arch::Arch;
use crate::config::Config;
use crate::errors::SpawnError;
use crate::interrupt::InterruptGuard;
use crate::mem::{StackPool, StackSizeClass};
use crate::sched::SchedulerState;
use crate::thread::{JoinHandle, Thread, ThreadId, ThreadState};
use core::marker::PhantomData;
use portable_atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

extern crate alloc;
use alloc::boxed::Box;

static GLOBAL_KERNEL: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

pub struct Kernel<A: Arch> {
    sched: SchedulerState,
    stack_pool: StackPool,
    _arch: PhantomData<A>,
    initialized: AtomicBool,
    next_thread_id: AtomicUsize,
}

impl<A: Arch> Kernel<A> {
    pub const fn new(config: Config) -> Self {
        Self {
            sched: SchedulerState::new(config),
            stack_pool: StackPool::new(),
            _arch: PhantomData,
            initialized: AtomicBool::new(false),
            next_thread_id: AtomicUsize::new(1),
        }
    }

    pub fn init(&self) -> Result<(), SpawnError> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(())
        } else {
            Err(SpawnError::NotInitialized)
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn sched(&self) -> &SchedulerState {
        &self.sched
    }

    fn next_thread_id(&self) -> ThreadId {
        let id = self.next_thread_id.fetch_add(1, Ordering::AcqRel);
        unsafe { ThreadId::new_unchecked(id) }
    }

    fn spawn_inner<F>(&self, entry: F, priority: u8, name: &str, size: StackSizeClass) -> Result<(Thread, JoinHandle), SpawnError>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_initialized() {
            return Err(SpawnError::NotInitialized);
        }

        let stack = self.stack_pool.allocate(size).ok_or(SpawnError::OutOfMemory)?;
        let thread_id = self.next_thread_id();
        let stack_bottom = stack.stack_bottom();

        let (thread, join_handle) = Thread::new(thread_id, stack, name, priority);

        let closure_ptr = Box::into_raw(Box::new(entry));

        fn trampoline<F: FnOnce() + Send + 'static>(closure_ptr: *mut F) {
            let closure = unsafe { Box::from_raw(closure_ptr) };
            closure();
            exit_current::<crate::arch::DefaultArch>();
        }

        thread.setup_initial_context(
            trampoline::<F> as *const () as usize,
            stack_bottom as usize,
            closure_ptr as usize,
        );

        Ok((thread, join_handle))
    }

    /// Spawn a thread running `entry`, per §4.3 thread creation. If the
    /// new thread outranks the caller, the caller yields immediately
    /// rather than waiting for the next preemption point.
    pub fn spawn<F>(&self, entry: F, priority: u8, name: &str) -> Result<JoinHandle, SpawnError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (thread, join_handle) = self.spawn_inner(entry, priority, name, StackSizeClass::Medium)?;
        self.sched.register(thread.clone());
        {
            let _guard = InterruptGuard::<A>::disable();
            self.sched.push_ready(&thread);
        }
        if self.check_should_yield() {
            self.yield_now();
        }
        Ok(join_handle)
    }

    /// Spawn the idle thread and switch to the first real thread,
    /// bootstrapping the scheduler. Never returns.
    pub fn start(&'static self) -> ! {
        let (idle, _handle) = self
            .spawn_inner(|| loop { idle_loop::<A>() }, crate::config::PRI_MIN, "idle", StackSizeClass::Small)
            .expect("failed to spawn idle thread");
        idle.mark_idle();
        self.sched.register(idle.clone());
        self.sched.set_idle_thread(idle);

        unsafe { self.register_global() };

        let _guard = InterruptGuard::<A>::disable();
        let next = self.sched.pick_next().expect("no schedulable thread at startup");
        next.set_status(ThreadState::Running);
        next.reset_ticks_used();
        let next_ctx = next.context_ptr();
        self.sched.set_current(Some(next));

        let mut dummy = A::SavedContext::default();
        unsafe {
            A::context_switch(&mut dummy as *mut _, next_ctx as *const _);
        }
        unreachable!("context_switch into the first thread must not return")
    }

    /// Voluntarily give up the CPU, per §4.3 `yield`.
    pub fn yield_now(&self) {
        if !self.is_initialized() {
            return;
        }
        let _guard = InterruptGuard::<A>::disable();
        let Some(current) = self.sched.current() else { return };
        if current.is_idle() && self.sched.highest_ready_priority().is_none() {
            return;
        }
        self.sched.push_ready(&current);
        self.switch_to_next(&current);
    }

    /// Returns `true` if a ready thread strictly outranks the running
    /// thread and a preemption decision should be made now.
    pub fn check_should_yield(&self) -> bool {
        let Some(current) = self.sched.current() else { return false };
        match self.sched.highest_ready_priority() {
            Some(p) => p > current.effective_priority(),
            None => false,
        }
    }

    /// Block the current thread. Caller (sync/alarm) must already have
    /// placed it on whatever wait list it's blocking on and must already
    /// hold interrupts disabled.
    pub fn block_current(&self) {
        let Some(current) = self.sched.current() else { return };
        current.set_status(ThreadState::Blocked);
        self.switch_to_next(&current);
    }

    /// Wake a blocked thread, making it READY. If it now outranks the
    /// running thread, the caller should follow up with `yield_now` to
    /// get immediate preemption (§4.4 invariant: a higher-priority waiter
    /// runs before the thread that woke it continues).
    pub fn unblock(&self, thread: &Thread) {
        let _guard = InterruptGuard::<A>::disable();
        self.sched.push_ready(thread);
    }

    /// Exit the current thread. Never returns.
    pub fn exit_current(&self) -> ! {
        let _guard = InterruptGuard::<A>::disable();
        let current = self.sched.current().expect("exit_current with no running thread");
        current.mark_finished();
        let id = current.id();
        self.sched.retire(id);
        let next = self.sched.pick_next().expect("no schedulable thread on exit");
        next.set_status(ThreadState::Running);
        next.reset_ticks_used();
        let next_ctx = next.context_ptr();
        self.sched.set_current(Some(next));
        core::mem::forget(_guard);
        let mut dummy = A::SavedContext::default();
        unsafe {
            A::context_switch(&mut dummy as *mut _, next_ctx as *const _);
        }
        unreachable!("a DYING thread must never be resumed")
    }

    /// Set the running thread's base priority, per §4.3 `set_priority`.
    pub fn set_priority(&self, priority: u8) {
        let _guard = InterruptGuard::<A>::disable();
        if let Some(current) = self.sched.current() {
            current.set_base_priority(priority);
        }
        drop(_guard);
        if self.check_should_yield() {
            self.yield_now();
        }
    }

    /// Switch away from `current` (already updated to its new state) to
    /// whatever the scheduler picks next.
    fn switch_to_next(&self, current: &Thread) {
        let next = match self.sched.pick_next() {
            Some(t) => t,
            None => return,
        };
        if next.id() == current.id() {
            current.set_status(ThreadState::Running);
            current.reset_ticks_used();
            self.sched.set_current(Some(next));
            return;
        }
        next.set_status(ThreadState::Running);
        next.reset_ticks_used();
        let prev_ctx = current.context_ptr();
        let next_ctx = next.context_ptr();
        self.sched.set_current(Some(next));
        unsafe {
            A::context_switch(prev_ctx as *mut _, next_ctx as *const _);
        }
    }

    /// # Safety
    /// Stores a raw pointer to `self` in a global; `self` must outlive
    /// every future call to `get_global_kernel`.
    pub unsafe fn register_global(&'static self) {
        GLOBAL_KERNEL.store(self as *const _ as *mut (), Ordering::Release);
    }
}

fn idle_loop<A: Arch>() {
    A::enable_interrupts();
    loop {
        core::hint::spin_loop();
    }
}

unsafe impl<A: Arch> Send for Kernel<A> {}
unsafe impl<A: Arch> Sync for Kernel<A> {}

/// Get the global kernel reference (for interrupt handlers and the
/// ambient-use free functions below).
pub fn get_global_kernel<A: Arch>() -> Option<&'static Kernel<A>> {
    let ptr = GLOBAL_KERNEL.load(Ordering::Acquire);
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { &*(ptr as *const Kernel<A>) })
    }
}

/// Yield the current thread using the default architecture's registered
/// kernel instance. A no-op if no kernel has been registered.
pub fn yield_current() {
    if let Some(kernel) = get_global_kernel::<crate::arch::DefaultArch>() {
        kernel.yield_now();
    }
}

/// Exit the current thread using the registered kernel. Diverges if a
/// kernel is registered; otherwise spins (there is nowhere to return to
/// from a thread trampoline).
pub fn exit_current<A: Arch + 'static>() -> ! {
    if let Some(kernel) = get_global_kernel::<A>() {
        kernel.exit_current();
    }
    loop {
        core::hint::spin_loop();
    }
}

/// Block the current thread on the registered kernel. Interrupts must
/// already be disabled by the caller.
pub fn block_current() {
    if let Some(kernel) = get_global_kernel::<crate::arch::DefaultArch>() {
        kernel.block_current();
    }
}

/// Wake `thread` on the registered kernel, then yield if it now outranks
/// the running thread.
pub fn wake_and_maybe_yield(thread: &Thread) {
    if let Some(kernel) = get_global_kernel::<crate::arch::DefaultArch>() {
        kernel.unblock(thread);
        if kernel.check_should_yield() {
            kernel.yield_now();
        }
    }
}
