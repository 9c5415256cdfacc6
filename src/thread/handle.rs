use super::{ThreadId, ThreadInner, ThreadState};
use crate::mem::ArcLite;

pub struct JoinHandle {
    pub(super) inner: ArcLite<ThreadInner>,
}

impl JoinHandle {
    /// Block until the thread finishes. Busy-waits on the scheduler via
    /// `yield_now` rather than a dedicated wait mechanism — join is rare
    /// enough on this kernel that a blocking primitive isn't worth it.
    pub fn join(self) {
        while self.inner.status() != ThreadState::Dying {
            crate::yield_now();
        }
    }

    pub fn try_join(&self) -> bool {
        self.inner.status() == ThreadState::Dying
    }

    pub fn thread_id(&self) -> ThreadId {
        self.inner.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.status() != ThreadState::Dying
    }
}

unsafe impl Send for JoinHandle {}
unsafe impl Sync for JoinHandle {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{StackPool, StackSizeClass};
    use crate::thread::Thread;

    #[cfg(feature = "std-shim")]
    #[test]
    fn join_handle_reflects_thread_lifecycle() {
        let pool = StackPool::new();
        let stack = pool.allocate(StackSizeClass::Small).unwrap();
        let thread_id = unsafe { ThreadId::new_unchecked(1) };

        let (thread, join_handle) = Thread::new(thread_id, stack, "t", 31);

        assert_eq!(join_handle.thread_id(), thread_id);
        assert!(join_handle.is_alive());
        assert!(!join_handle.try_join());

        thread.mark_finished();

        assert!(!join_handle.is_alive());
        assert!(join_handle.try_join());
    }
}
