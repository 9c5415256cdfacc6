//! Ready queue, thread table, and scheduling state (§4.3).
//!
//! This module owns the data the scheduler decides over: who is ready to
//! run, in what order, and the MLFQS bookkeeping (`load_avg`, per-thread
//! `recent_cpu`). It has no opinion on *how* a context switch happens —
//! that's `kernel::Kernel<A>`, which is generic over `Arch` and calls back
//! into this module's queue operations under an `InterruptGuard`.

pub mod mlfqs;

use crate::config::Config;
use crate::fixed_point::Fixed;
use crate::list::IntrusiveList;
use crate::thread::{Thread, ThreadInner, ThreadState, WaitNode};
use core::cmp::Reverse;
use core::ptr::NonNull;
use portable_atomic::{AtomicU64, Ordering};

extern crate alloc;
use alloc::vec::Vec;

/// All scheduler-owned state for a single (uniprocessor) kernel instance.
pub struct SchedulerState {
    ready_queue: IntrusiveList<ThreadInner>,
    pub(crate) sleep_list: IntrusiveList<WaitNode>,
    current: spin::Mutex<Option<Thread>>,
    all_threads: spin::Mutex<Vec<Thread>>,
    idle_thread: spin::Mutex<Option<Thread>>,
    ticks: AtomicU64,
    load_avg: spin::Mutex<Fixed>,
    config: Config,
}

impl SchedulerState {
    pub const fn new(config: Config) -> Self {
        Self {
            ready_queue: IntrusiveList::new(),
            sleep_list: IntrusiveList::new(),
            current: spin::Mutex::new(None),
            all_threads: spin::Mutex::new(Vec::new()),
            idle_thread: spin::Mutex::new(None),
            ticks: AtomicU64::new(0),
            load_avg: spin::Mutex::new(Fixed::ZERO),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub(crate) fn tick_increment(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn load_avg(&self) -> Fixed {
        *self.load_avg.lock()
    }

    pub(crate) fn set_load_avg(&self, v: Fixed) {
        *self.load_avg.lock() = v;
    }

    /// Register a newly spawned thread in the thread table. The table
    /// holds the canonical strong reference for the thread's whole life;
    /// the ready queue and wait lists only ever hold raw pointers into it.
    pub fn register(&self, thread: Thread) {
        self.all_threads.lock().push(thread);
    }

    /// Drop a DYING thread from the thread table, releasing its stack and
    /// descriptor once every other reference (there shouldn't be any) is
    /// gone.
    pub fn retire(&self, id: crate::thread::ThreadId) {
        self.all_threads.lock().retain(|t| t.id() != id);
    }

    pub fn for_each_thread(&self, mut f: impl FnMut(&Thread)) {
        for t in self.all_threads.lock().iter() {
            f(t);
        }
    }

    pub fn thread_count(&self) -> usize {
        self.all_threads.lock().len()
    }

    pub fn set_idle_thread(&self, thread: Thread) {
        *self.idle_thread.lock() = Some(thread);
    }

    pub fn current(&self) -> Option<Thread> {
        self.current.lock().clone()
    }

    pub(crate) fn set_current(&self, thread: Option<Thread>) {
        *self.current.lock() = thread;
    }

    /// Insert a READY thread into the ready queue, ordered by descending
    /// effective priority with FIFO order among equal priorities.
    pub fn push_ready(&self, thread: &Thread) {
        thread.set_status(ThreadState::Ready);
        let ptr = thread.as_ptr();
        self.ready_queue
            .insert_ordered(ptr, |t: &ThreadInner| Reverse(t.effective_priority()));
    }

    /// Pick the next thread to run: the highest-priority ready thread, or
    /// the idle thread when the ready queue is empty. The idle thread is
    /// always schedulable once `Kernel::start` has spawned it, so this
    /// only returns `None` before startup.
    pub fn pick_next(&self) -> Option<Thread> {
        if let Some(ptr) = self.ready_queue.pop_front() {
            if let Some(t) = self.find_thread(ptr) {
                return Some(t);
            }
        }
        self.idle_thread.lock().clone()
    }

    /// Highest effective priority currently sitting in the ready queue,
    /// or `None` if it's empty. Used by `check_should_yield`.
    pub fn highest_ready_priority(&self) -> Option<u8> {
        self.ready_queue.front().map(|ptr| unsafe { ptr.as_ref().effective_priority() })
    }

    /// Re-sort `thread`'s position in the ready queue after its effective
    /// priority changed in place (donation). A no-op unless `thread` is
    /// actually READY — per §4.4 acquire step 1, only a visited thread
    /// that's READY needs repositioning; a RUNNING/BLOCKED one isn't in
    /// `ready_queue` at all.
    pub fn reposition_ready(&self, thread: &Thread) {
        if thread.status() != ThreadState::Ready {
            return;
        }
        let ptr = thread.as_ptr();
        self.ready_queue.remove(ptr);
        self.ready_queue.insert_ordered(ptr, |t: &ThreadInner| Reverse(t.effective_priority()));
    }

    /// Rebuild `ready_queue`'s order from scratch. Needed after a bulk
    /// in-place priority change (the MLFQS per-tick recompute) that
    /// invalidates the insertion-time order for every entry at once,
    /// where repositioning one thread at a time isn't enough.
    pub fn resort_ready_queue(&self) {
        let mut drained = Vec::new();
        while let Some(ptr) = self.ready_queue.pop_front() {
            drained.push(ptr);
        }
        for ptr in drained {
            self.ready_queue.insert_ordered(ptr, |t: &ThreadInner| Reverse(t.effective_priority()));
        }
    }

    fn find_thread(&self, ptr: NonNull<ThreadInner>) -> Option<Thread> {
        self.all_threads.lock().iter().find(|t| t.as_ptr() == ptr).cloned()
    }

    pub fn find_thread_by_ptr(&self, ptr: NonNull<ThreadInner>) -> Option<Thread> {
        self.find_thread(ptr)
    }
}

/// Current running thread, read through the globally registered kernel.
/// Used by `sync` primitives, which don't carry their own `Kernel`
/// reference.
pub fn current_thread() -> Option<Thread> {
    crate::kernel::get_global_kernel::<crate::arch::DefaultArch>()
        .and_then(|k| k.sched().current())
}

/// Reconstruct the `Thread` handle for a wait-list node pointer obtained
/// from `Thread::as_wait_ptr`. The thread table owns the strong
/// reference for a thread's whole life, so any pointer a waiter list
/// still holds names a thread that's still registered.
pub fn thread_from_wait_ptr(ptr: NonNull<WaitNode>) -> Option<Thread> {
    let inner_ptr = ptr.cast::<ThreadInner>();
    crate::kernel::get_global_kernel::<crate::arch::DefaultArch>()
        .and_then(|k| k.sched().find_thread_by_ptr(inner_ptr))
}

unsafe impl Send for SchedulerState {}
unsafe impl Sync for SchedulerState {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{StackPool, StackSizeClass};
    use crate::thread::ThreadId;

    fn make_thread(id: usize, priority: u8) -> Thread {
        let pool = StackPool::new();
        let stack = pool.allocate(StackSizeClass::Small).unwrap();
        let tid = unsafe { ThreadId::new_unchecked(id) };
        let (t, _h) = Thread::new(tid, stack, "t", priority);
        t
    }

    #[test]
    fn pick_next_returns_highest_priority_first() {
        let state = SchedulerState::new(Config::new());
        let low = make_thread(1, 10);
        let high = make_thread(2, 50);
        state.register(low.clone());
        state.register(high.clone());
        state.push_ready(&low);
        state.push_ready(&high);

        let picked = state.pick_next().unwrap();
        assert_eq!(picked.id(), high.id());
    }

    #[test]
    fn equal_priority_ties_break_fifo() {
        let state = SchedulerState::new(Config::new());
        let first = make_thread(1, 20);
        let second = make_thread(2, 20);
        state.register(first.clone());
        state.register(second.clone());
        state.push_ready(&first);
        state.push_ready(&second);

        assert_eq!(state.pick_next().unwrap().id(), first.id());
        assert_eq!(state.pick_next().unwrap().id(), second.id());
    }

    #[test]
    fn empty_ready_queue_falls_back_to_idle() {
        let state = SchedulerState::new(Config::new());
        let idle = make_thread(1, 0);
        state.set_idle_thread(idle.clone());
        assert_eq!(state.pick_next().unwrap().id(), idle.id());
    }

    /// Scenario: low-priority L (20) is running; high-priority H (40) is
    /// spawned ready. H must outrank L's preemption check so the kernel
    /// decides to switch before L continues.
    #[test]
    fn scenario_priority_preemption_high_priority_outranks_running_thread() {
        let state = SchedulerState::new(Config::new());
        let l = make_thread(1, 20);
        let h = make_thread(2, 40);
        state.register(l.clone());
        state.register(h.clone());
        state.push_ready(&h);

        assert!(state.highest_ready_priority().unwrap() > l.effective_priority());
    }

    /// Scenario: three threads issue `sleep` for 30, 10, and 20 ticks at
    /// tick 0. The sleep list, ordered ascending by wake tick, must drain
    /// B (10) before C (20) before A (30).
    #[test]
    fn scenario_sleep_list_wakes_in_ascending_tick_order() {
        let state = SchedulerState::new(Config::new());
        let a = make_thread(1, 31);
        let b = make_thread(2, 31);
        let c = make_thread(3, 31);
        a.set_wake_tick(30);
        b.set_wake_tick(10);
        c.set_wake_tick(20);

        state.sleep_list.insert_ordered(a.as_wait_ptr(), |t| t.0.wake_tick());
        state.sleep_list.insert_ordered(b.as_wait_ptr(), |t| t.0.wake_tick());
        state.sleep_list.insert_ordered(c.as_wait_ptr(), |t| t.0.wake_tick());

        let order: alloc::vec::Vec<u64> = {
            let mut v = alloc::vec::Vec::new();
            while let Some(ptr) = state.sleep_list.pop_front() {
                v.push(unsafe { ptr.as_ref().0.wake_tick() });
            }
            v
        };
        assert_eq!(order, alloc::vec![10, 20, 30]);
    }

    /// Scenario: two equal-priority threads, A running and B ready. A's
    /// `ticks_used` climbs tick by tick; once it reaches
    /// `time_slice_ticks`, the same condition `timer::on_tick` checks
    /// (ticks_used exceeded AND a ready peer exists) must fire, even
    /// though B never outranks A on priority alone.
    #[test]
    fn scenario_equal_priority_threads_round_robin_on_time_slice() {
        let config = Config::builder().time_slice_ticks(4).build();
        let state = SchedulerState::new(config);
        let a = make_thread(1, 31);
        let b = make_thread(2, 31);
        state.register(a.clone());
        state.register(b.clone());
        state.push_ready(&b);

        assert!(state.highest_ready_priority().unwrap() <= a.effective_priority());

        let slice = state.config().time_slice_ticks;
        let mut used = 0;
        for _ in 0..slice - 1 {
            used = a.increment_ticks_used();
            assert!(used < slice, "expired early at {used}");
        }
        used = a.increment_ticks_used();
        assert!(used >= slice);
    }

    /// Scenario: A (20) and B (25) are both READY, so `pick_next` would
    /// return B first. A then receives a donation that raises it above
    /// B; `reposition_ready` must move it to the front without a full
    /// resort.
    #[test]
    fn reposition_ready_moves_donated_thread_to_front() {
        let state = SchedulerState::new(Config::new());
        let a = make_thread(1, 20);
        let b = make_thread(2, 25);
        state.register(a.clone());
        state.register(b.clone());
        state.push_ready(&a);
        state.push_ready(&b);

        assert_eq!(state.highest_ready_priority().unwrap(), 25);

        a.set_base_priority(50);
        state.reposition_ready(&a);

        assert_eq!(state.pick_next().unwrap().id(), a.id());
    }

    /// Scenario: three READY threads get their priorities mutated in
    /// place (simulating the MLFQS per-tick recompute) in an order that
    /// no longer matches their insertion-time positions. `resort_ready_queue`
    /// must restore highest-first order.
    #[test]
    fn resort_ready_queue_restores_priority_order_after_bulk_mutation() {
        let state = SchedulerState::new(Config::new());
        let a = make_thread(1, 10);
        let b = make_thread(2, 20);
        let c = make_thread(3, 30);
        state.register(a.clone());
        state.register(b.clone());
        state.register(c.clone());
        state.push_ready(&a);
        state.push_ready(&b);
        state.push_ready(&c);

        // Invert the priorities in place without reordering the list.
        a.set_base_priority(90);
        b.set_base_priority(5);
        c.set_base_priority(1);
        state.resort_ready_queue();

        assert_eq!(state.pick_next().unwrap().id(), a.id());
        assert_eq!(state.pick_next().unwrap().id(), b.id());
        assert_eq!(state.pick_next().unwrap().id(), c.id());
    }
}
