//! Tick-based sleep facility (§4.5).
//!
//! `sleep` blocks the calling thread on the scheduler's sleep list,
//! ordered by wake tick, and relies on `timer::on_tick` to drain it.
//! Interrupts are disabled for the whole enqueue-then-block sequence via
//! `InterruptGuard`, so every exit path — including an early return for
//! `duration_ticks == 0` — restores the caller's interrupt level.

use crate::arch::DefaultArch;
use crate::interrupt::InterruptGuard;

/// Block the calling thread for at least `duration_ticks` timer ticks.
/// `duration_ticks == 0` returns immediately without blocking.
pub fn sleep(duration_ticks: u64) {
    let _guard = InterruptGuard::<DefaultArch>::disable();

    if duration_ticks == 0 {
        return;
    }

    let Some(kernel) = crate::kernel::get_global_kernel::<DefaultArch>() else { return };
    let Some(current) = kernel.sched().current() else { return };

    let wake_at = kernel.sched().ticks() + duration_ticks;
    current.set_wake_tick(wake_at);
    kernel
        .sched()
        .sleep_list
        .insert_ordered(current.as_wait_ptr(), |t| t.0.wake_tick());

    crate::kernel::block_current();
}

/// Drain every sleeper whose wake tick has arrived, called from
/// `timer::on_tick`. The sleep list is ordered ascending by wake tick, so
/// this only needs to pop from the front while it's due.
pub(crate) fn wake_due_sleepers<A: crate::arch::Arch>(kernel: &crate::kernel::Kernel<A>, now: u64) {
    loop {
        let due = match kernel.sched().sleep_list.front() {
            Some(ptr) => (unsafe { ptr.as_ref().0.wake_tick() }) <= now,
            None => false,
        };
        if !due {
            break;
        }
        let Some(ptr) = kernel.sched().sleep_list.pop_front() else { break };
        if let Some(thread) = crate::sched::thread_from_wait_ptr(ptr) {
            kernel.unblock(&thread);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_zero_returns_without_a_registered_kernel() {
        // With no global kernel registered, sleep(0) must still return
        // rather than hang waiting on a kernel that doesn't exist.
        sleep(0);
    }
}
