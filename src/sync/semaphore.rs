//! Counting semaphore with a priority-ordered waiter list (§4.4).

use crate::interrupt::InterruptGuard;
use crate::list::IntrusiveList;
use crate::thread::WaitNode;
use core::cmp::Reverse;
use portable_atomic::{AtomicIsize, Ordering};

pub struct Semaphore {
    value: AtomicIsize,
    waiters: IntrusiveList<WaitNode>,
}

impl Semaphore {
    pub const fn new(value: isize) -> Self {
        Self {
            value: AtomicIsize::new(value),
            waiters: IntrusiveList::new(),
        }
    }

    pub fn value(&self) -> isize {
        self.value.load(Ordering::Acquire)
    }

    /// Decrement the semaphore, blocking while its value is zero.
    pub fn down(&self) {
        loop {
            let _guard = InterruptGuard::<crate::arch::DefaultArch>::disable();
            if self.value.load(Ordering::Acquire) > 0 {
                self.value.fetch_sub(1, Ordering::AcqRel);
                return;
            }
            let current = match crate::sched::current_thread() {
                Some(t) => t,
                None => return,
            };
            self.waiters
                .insert_ordered(current.as_wait_ptr(), |t| Reverse(t.0.effective_priority()));
            drop(_guard);
            crate::kernel::block_current();
        }
    }

    /// Non-blocking decrement; returns `false` if the value was already
    /// zero, per the benign-refusal error handling convention.
    pub fn try_down(&self) -> bool {
        let _guard = InterruptGuard::<crate::arch::DefaultArch>::disable();
        if self.value.load(Ordering::Acquire) > 0 {
            self.value.fetch_sub(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    /// Increment the semaphore, waking the highest-priority waiter if any
    /// (waiters are rescanned here rather than trusting insertion order,
    /// since donation can have raised a waiter's priority after it
    /// queued).
    pub fn up(&self) {
        let woken = {
            let _guard = InterruptGuard::<crate::arch::DefaultArch>::disable();
            self.value.fetch_add(1, Ordering::AcqRel);
            self.waiters.remove_max_by(|t| t.0.effective_priority())
        };
        if let Some(ptr) = woken {
            if let Some(thread) = crate::sched::thread_from_wait_ptr(ptr) {
                crate::kernel::wake_and_maybe_yield(&thread);
            }
        }
    }
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_down_fails_on_zero_value() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_down());
    }

    #[test]
    fn try_down_succeeds_and_decrements() {
        let sem = Semaphore::new(1);
        assert!(sem.try_down());
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn up_increments_value_with_no_waiters() {
        let sem = Semaphore::new(0);
        sem.up();
        assert_eq!(sem.value(), 1);
    }
}
