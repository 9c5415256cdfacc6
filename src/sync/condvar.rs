//! Condition variable, always used together with a `Lock` (§4.4).

use crate::arch::DefaultArch;
use crate::interrupt::InterruptGuard;
use crate::list::IntrusiveList;
use crate::sync::Lock;
use crate::thread::WaitNode;
use core::cmp::Reverse;

pub struct Condvar {
    waiters: IntrusiveList<WaitNode>,
}

impl Condvar {
    pub const fn new() -> Self {
        Self { waiters: IntrusiveList::new() }
    }

    /// Atomically release `lock` and block, reacquiring it before
    /// returning. `lock` must be held by the calling thread.
    pub fn wait(&self, lock: &Lock) {
        debug_assert!(lock.held_by_current_thread());
        let current = crate::sched::current_thread().expect("wait() with no running thread");

        let _guard = InterruptGuard::<DefaultArch>::disable();
        self.waiters
            .insert_ordered(current.as_wait_ptr(), |t| Reverse(t.0.effective_priority()));
        lock.release();
        crate::kernel::block_current();
        drop(_guard);

        lock.acquire();
    }

    /// Wake the single highest-priority waiter, if any. Waiters are
    /// rescanned here rather than trusted from insertion time, for the
    /// same reason `Semaphore::up` and `Lock::release` do.
    pub fn signal(&self) {
        let woken = {
            let _guard = InterruptGuard::<DefaultArch>::disable();
            self.waiters.remove_max_by(|t| t.0.effective_priority())
        };
        if let Some(ptr) = woken {
            if let Some(thread) = crate::sched::thread_from_wait_ptr(ptr) {
                crate::kernel::wake_and_maybe_yield(&thread);
            }
        }
    }

    /// Wake every waiter.
    pub fn broadcast(&self) {
        loop {
            let woken = {
                let _guard = InterruptGuard::<DefaultArch>::disable();
                self.waiters.remove_max_by(|t| t.0.effective_priority())
            };
            match woken {
                Some(ptr) => {
                    if let Some(thread) = crate::sched::thread_from_wait_ptr(ptr) {
                        crate::kernel::wake_and_maybe_yield(&thread);
                    }
                }
                None => break,
            }
        }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{StackPool, StackSizeClass};
    use crate::thread::ThreadId;

    fn make_thread(id: usize, priority: u8) -> crate::thread::Thread {
        let pool = StackPool::new();
        let stack = pool.allocate(StackSizeClass::Small).unwrap();
        let tid = unsafe { ThreadId::new_unchecked(id) };
        let (t, _h) = crate::thread::Thread::new(tid, stack, "t", priority);
        t
    }

    /// Scenario: two waiters queued at priorities 25 and 45; the waiter
    /// list must surface the 45 waiter regardless of insertion order.
    #[test]
    fn highest_priority_waiter_is_found_regardless_of_insertion_order() {
        let cv = Condvar::new();
        let low = make_thread(1, 25);
        let high = make_thread(2, 45);

        cv.waiters.insert_ordered(low.as_wait_ptr(), |t| Reverse(t.0.effective_priority()));
        cv.waiters.insert_ordered(high.as_wait_ptr(), |t| Reverse(t.0.effective_priority()));

        let woken = cv.waiters.remove_max_by(|t| t.0.effective_priority()).unwrap();
        assert_eq!(unsafe { woken.as_ref().0.effective_priority() }, 45);
    }
}
