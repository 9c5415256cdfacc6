//! Timer interrupt handler duties (§4.6).
//!
//! Called once per timer tick from the architecture's IRQ vector. Order
//! matters: tick accounting and stack-integrity checking happen before
//! sleepers are woken (so a newly-woken thread's own first tick is
//! counted starting next interrupt, not this one), and MLFQS recomputes
//! happen last since they can change who `check_should_yield` favors.
//! The time-slice check runs alongside the final priority-based yield
//! decision so equal-priority threads round-robin instead of one running
//! forever.

use crate::arch::Arch;
use crate::kernel::Kernel;
use crate::thread::ThreadState;

/// Run one tick's worth of timer bookkeeping. Returns `true` if the
/// caller should preempt the running thread before returning from the
/// interrupt.
pub fn on_tick<A: Arch>(kernel: &Kernel<A>) -> bool {
    let ticks = kernel.sched().tick_increment();

    let mut time_slice_expired = false;
    if let Some(current) = kernel.sched().current() {
        if !current.check_stack_integrity() {
            crate::errors::kernel_panic(current.id(), &current.name(), "stack overflow detected");
        }
        if !current.is_idle() {
            current.set_recent_cpu(current.recent_cpu().add_int(1));
            let used = current.increment_ticks_used();
            time_slice_expired = used >= kernel.sched().config().time_slice_ticks
                && kernel.sched().highest_ready_priority().is_some();
        }
    }

    crate::alarm::wake_due_sleepers(kernel, ticks);

    if kernel.sched().config().mlfqs_mode {
        let timer_hz = kernel.sched().config().timer_hz as u64;
        if timer_hz > 0 && ticks % timer_hz == 0 {
            recompute_load_avg_and_recent_cpu(kernel);
        }
        if ticks % 4 == 0 {
            recompute_priorities(kernel);
        }
    }

    time_slice_expired || kernel.check_should_yield()
}

fn recompute_load_avg_and_recent_cpu<A: Arch>(kernel: &Kernel<A>) {
    let mut ready_threads: u32 = 0;
    kernel.sched().for_each_thread(|t| {
        if !t.is_idle() && matches!(t.status(), ThreadState::Ready | ThreadState::Running) {
            ready_threads += 1;
        }
    });

    let load_avg = crate::sched::mlfqs::recompute_load_avg(kernel.sched().load_avg(), ready_threads);
    kernel.sched().set_load_avg(load_avg);

    kernel.sched().for_each_thread(|t| {
        if t.is_idle() {
            return;
        }
        let new_cpu = crate::sched::mlfqs::recompute_recent_cpu(t.recent_cpu(), load_avg, t.nice());
        t.set_recent_cpu(new_cpu);
    });
}

fn recompute_priorities<A: Arch>(kernel: &Kernel<A>) {
    kernel.sched().for_each_thread(|t| {
        if t.is_idle() {
            return;
        }
        let priority = crate::sched::mlfqs::recompute_priority(t.recent_cpu(), t.nice());
        t.set_base_priority(priority);
    });
    // `set_base_priority` mutates every thread's priority in place, which
    // invalidates `ready_queue`'s insertion-time order all at once —
    // resort rather than repositioning one entry at a time.
    kernel.sched().resort_ready_queue();
}
