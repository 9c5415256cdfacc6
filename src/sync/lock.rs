//! Lock with priority donation (§4.4).
//!
//! A thread blocked trying to acquire a held lock donates its effective
//! priority to the holder, and transitively up the chain of locks the
//! holder is itself waiting on, bounded by
//! [`Config::donation_chain_depth`](crate::config::Config) to keep a
//! pathological wait-for graph from walking forever.

use crate::arch::DefaultArch;
use crate::config::PRI_MIN;
use crate::interrupt::InterruptGuard;
use crate::list::{IntrusiveList, Link, Linked};
use crate::thread::{Thread, WaitNode};
use core::cmp::Reverse;
use core::ptr::NonNull;

pub struct Lock {
    holder: spin::Mutex<Option<Thread>>,
    waiters: IntrusiveList<WaitNode>,
    link: Link<Lock>,
}

unsafe impl Linked for Lock {
    fn link(&self) -> &Link<Lock> {
        &self.link
    }
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            holder: spin::Mutex::new(None),
            waiters: IntrusiveList::new(),
            link: Link::new(),
        }
    }

    pub fn is_held(&self) -> bool {
        self.holder.lock().is_some()
    }

    pub fn held_by_current_thread(&self) -> bool {
        match (crate::sched::current_thread(), self.holder.lock().as_ref()) {
            (Some(current), Some(holder)) => current.id() == holder.id(),
            _ => false,
        }
    }

    /// Highest effective priority among threads waiting on this lock, or
    /// `PRI_MIN` if there are none — the floor a lock with no waiters
    /// contributes to its holder's donated priority.
    pub fn max_waiter_priority(&self) -> u8 {
        let mut max = PRI_MIN;
        self.waiters.for_each(|ptr| {
            let node = unsafe { ptr.as_ref() };
            max = max.max(node.0.effective_priority());
        });
        max
    }

    /// Acquire the lock, blocking and donating priority up the holder
    /// chain while it's held by someone else.
    pub fn acquire(&self) {
        let current = crate::sched::current_thread().expect("acquire() with no running thread");

        loop {
            let _guard = InterruptGuard::<DefaultArch>::disable();
            let mut holder = self.holder.lock();
            if holder.is_none() {
                *holder = Some(current.clone());
                break;
            }
            let holder_thread = holder.clone();
            drop(holder);

            current.set_waiting_on(Some(NonNull::from(self)));
            self.waiters
                .insert_ordered(current.as_wait_ptr(), |t| Reverse(t.0.effective_priority()));

            let mlfqs_mode = crate::kernel::get_global_kernel::<DefaultArch>()
                .map(|k| k.sched().config().mlfqs_mode)
                .unwrap_or(false);
            if let Some(h) = holder_thread.filter(|_| !mlfqs_mode) {
                donate_chain(&h);
            }
            drop(_guard);
            crate::kernel::block_current();

            let acquired = self
                .holder
                .lock()
                .as_ref()
                .map(|h| h.id() == current.id())
                .unwrap_or(false);
            if acquired {
                break;
            }
        }

        current.set_waiting_on(None);
        current.held_locks().push_back(NonNull::from(self));
    }

    /// Non-blocking acquire; returns `false` if already held.
    pub fn try_acquire(&self) -> bool {
        let current = match crate::sched::current_thread() {
            Some(t) => t,
            None => return false,
        };
        let _guard = InterruptGuard::<DefaultArch>::disable();
        let mut holder = self.holder.lock();
        if holder.is_some() {
            return false;
        }
        *holder = Some(current.clone());
        drop(holder);
        drop(_guard);
        current.held_locks().push_back(NonNull::from(self));
        true
    }

    /// Release the lock, handing it directly to the highest-priority
    /// waiter (rescanned here, not trusted from insertion time, since
    /// donation can have changed priorities after a waiter queued) and
    /// waking it.
    pub fn release(&self) {
        let current = crate::sched::current_thread().expect("release() with no running thread");
        let _guard = InterruptGuard::<DefaultArch>::disable();

        current.held_locks().remove(NonNull::from(self));
        current.recompute_effective_priority();

        let next_waiter = self.waiters.remove_max_by(|t| t.0.effective_priority());
        let next_holder = next_waiter.and_then(crate::sched::thread_from_wait_ptr);
        *self.holder.lock() = next_holder.clone();

        drop(_guard);
        if let Some(woken) = next_holder {
            crate::kernel::wake_and_maybe_yield(&woken);
        }
    }
}

/// Walk the chain of lock holders starting at `holder`, recomputing each
/// one's effective priority and following whatever lock *it* is blocked
/// on, up to `donation_chain_depth` hops. A visited thread that's READY
/// is repositioned in `ready_queue` (§4.4 acquire step 1) — the common
/// case, since a lock holder is usually READY, having been preempted by
/// the higher-priority thread now acquiring on it.
fn donate_chain(holder: &Thread) {
    let kernel = crate::kernel::get_global_kernel::<DefaultArch>();
    let depth = kernel.map(|k| k.sched().config().donation_chain_depth).unwrap_or(8);

    let mut current = Some(holder.clone());
    for _ in 0..depth {
        let Some(thread) = current.take() else { break };
        thread.recompute_effective_priority();
        if let Some(k) = kernel {
            k.sched().reposition_ready(&thread);
        }
        match thread.waiting_on() {
            Some(lock_ptr) => {
                let lock = unsafe { lock_ptr.as_ref() };
                current = lock.holder.lock().clone();
            }
            None => break,
        }
    }
}

unsafe impl Send for Lock {}
unsafe impl Sync for Lock {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lock_is_unheld() {
        let lock = Lock::new();
        assert!(!lock.is_held());
    }

    #[test]
    fn max_waiter_priority_with_no_waiters_is_floor() {
        let lock = Lock::new();
        assert_eq!(lock.max_waiter_priority(), PRI_MIN);
    }

    fn make_thread(id: usize, priority: u8) -> Thread {
        use crate::mem::{StackPool, StackSizeClass};
        let pool = StackPool::new();
        let stack = pool.allocate(StackSizeClass::Small).unwrap();
        let tid = unsafe { crate::thread::ThreadId::new_unchecked(id) };
        let (t, _h) = Thread::new(tid, stack, "t", priority);
        t
    }

    /// Scenario: L (20) holds X. M (30) then H (40) queue on X. L's
    /// effective priority should rise to the highest waiter's, 40.
    #[test]
    fn donation_basic_raises_holder_to_highest_waiter() {
        let lock = Lock::new();
        let l = make_thread(1, 20);
        let m = make_thread(2, 30);
        let h = make_thread(3, 40);

        *lock.holder.lock() = Some(l.clone());
        lock.waiters.insert_ordered(m.as_wait_ptr(), |t| Reverse(t.0.effective_priority()));
        lock.waiters.insert_ordered(h.as_wait_ptr(), |t| Reverse(t.0.effective_priority()));
        l.held_locks().push_back(NonNull::from(&lock));
        l.recompute_effective_priority();

        assert_eq!(l.effective_priority(), 40);

        // Releasing drops L back to its base once X is no longer held.
        l.held_locks().remove(NonNull::from(&lock));
        l.recompute_effective_priority();
        assert_eq!(l.effective_priority(), 20);
    }

    /// Scenario: nested donation chain. L holds X, M blocks on X; M holds
    /// Y, H blocks on Y. The donation through M should bump L to H's
    /// priority, and unwind correctly as each lock is released.
    #[test]
    fn donation_chain_propagates_and_unwinds_in_order() {
        let lock_x = Lock::new();
        let lock_y = Lock::new();
        let l = make_thread(1, 20);
        let m = make_thread(2, 30);
        let h = make_thread(3, 40);

        // M holds Y; H queues on Y.
        *lock_y.holder.lock() = Some(m.clone());
        lock_y.waiters.insert_ordered(h.as_wait_ptr(), |t| Reverse(t.0.effective_priority()));
        m.held_locks().push_back(NonNull::from(&lock_y));
        m.recompute_effective_priority();
        assert_eq!(m.effective_priority(), 40);

        // L holds X; M queues on X. M's current (donated) priority is
        // what X should report as its max waiter priority.
        *lock_x.holder.lock() = Some(l.clone());
        lock_x.waiters.insert_ordered(m.as_wait_ptr(), |t| Reverse(t.0.effective_priority()));
        l.held_locks().push_back(NonNull::from(&lock_x));
        l.recompute_effective_priority();
        assert_eq!(l.effective_priority(), 40);

        // M releases Y (hands it to H): M no longer holds Y, so M's own
        // priority drops to its base. L is still donated from X's waiter
        // list, but that waiter (M) now only carries its base priority.
        m.held_locks().remove(NonNull::from(&lock_y));
        m.recompute_effective_priority();
        assert_eq!(m.effective_priority(), 30);
        l.recompute_effective_priority();
        assert_eq!(l.effective_priority(), 30);

        // L releases X: back to base.
        l.held_locks().remove(NonNull::from(&lock_x));
        l.recompute_effective_priority();
        assert_eq!(l.effective_priority(), 20);
    }
}
