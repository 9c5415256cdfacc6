//! Multi-level feedback queue scheduler formulas (§4.7).
//!
//! Pure functions over `Fixed` so they're testable without a running
//! kernel. `timer::on_tick` is the only caller; it supplies `load_avg`,
//! `recent_cpu`, and `nice` from the current thread/global state and
//! writes the results back.

use crate::config::{PRI_MAX, PRI_MIN};
use crate::fixed_point::Fixed;

/// `load_avg := (59/60) * load_avg + (1/60) * ready_threads`
///
/// `ready_threads` counts threads that are READY or RUNNING, excluding
/// the idle thread, at the instant of the recompute.
pub fn recompute_load_avg(load_avg: Fixed, ready_threads: u32) -> Fixed {
    let fifty_nine_sixtieths = Fixed::from_int(59).div_int(60);
    let one_sixtieth = Fixed::from_int(1).div_int(60);
    fifty_nine_sixtieths.mul(load_avg) + one_sixtieth.mul_int(ready_threads as i32)
}

/// `recent_cpu := (2*load_avg) / (2*load_avg + 1) * recent_cpu + nice`
pub fn recompute_recent_cpu(recent_cpu: Fixed, load_avg: Fixed, nice: i8) -> Fixed {
    let two_load_avg = load_avg.mul_int(2);
    let decay = two_load_avg.div(two_load_avg.add_int(1));
    decay.mul(recent_cpu).add_int(nice as i32)
}

/// `priority := PRI_MAX - (recent_cpu / 4) - (nice * 2)`, clamped.
pub fn recompute_priority(recent_cpu: Fixed, nice: i8) -> u8 {
    let raw = Fixed::from_int(PRI_MAX as i32)
        .sub(recent_cpu.div_int(4))
        .sub_int((nice as i32) * 2);
    raw.to_int_round().clamp(PRI_MIN as i32, PRI_MAX as i32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_avg_with_one_ready_thread_converges_below_one() {
        let mut load_avg = Fixed::ZERO;
        for _ in 0..1000 {
            load_avg = recompute_load_avg(load_avg, 1);
        }
        assert!(load_avg.to_int_round() <= 1);
        assert!(load_avg.raw() > 0);
    }

    #[test]
    fn recent_cpu_decays_toward_zero_with_no_load() {
        let mut recent_cpu = Fixed::from_int(100);
        let load_avg = Fixed::ZERO;
        for _ in 0..200 {
            recent_cpu = recompute_recent_cpu(recent_cpu, load_avg, 0);
        }
        assert_eq!(recent_cpu, Fixed::ZERO);
    }

    #[test]
    fn higher_recent_cpu_yields_lower_priority() {
        let low_usage = recompute_priority(Fixed::from_int(0), 0);
        let high_usage = recompute_priority(Fixed::from_int(100), 0);
        assert!(high_usage < low_usage);
    }

    #[test]
    fn positive_nice_lowers_priority() {
        let neutral = recompute_priority(Fixed::ZERO, 0);
        let nice = recompute_priority(Fixed::ZERO, 10);
        assert!(nice < neutral);
    }

    #[test]
    fn priority_clamps_to_valid_range() {
        let p = recompute_priority(Fixed::from_int(100_000), 20);
        assert_eq!(p, PRI_MIN);
    }

    /// Scenario: a single CPU-bound thread (never blocks, always ready)
    /// over 400 ticks at `timer_hz = 100`. `recent_cpu` accumulates every
    /// tick, decays once per second, and priority is resampled every 4
    /// ticks — it must never increase and must stay at or above PRI_MIN.
    #[test]
    fn scenario_mlfqs_priority_decreases_monotonically_under_sustained_load() {
        let timer_hz = 100u64;
        let mut load_avg = Fixed::ZERO;
        let mut recent_cpu = Fixed::ZERO;
        let mut priority = recompute_priority(recent_cpu, 0);
        let mut last_priority = priority;

        for tick in 1..=400u64 {
            recent_cpu = recent_cpu.add_int(1);

            if tick % timer_hz == 0 {
                load_avg = recompute_load_avg(load_avg, 1);
                recent_cpu = recompute_recent_cpu(recent_cpu, load_avg, 0);
            }

            if tick % 4 == 0 {
                priority = recompute_priority(recent_cpu, 0);
                assert!(priority <= last_priority, "priority rose at tick {tick}");
                assert!(priority >= PRI_MIN);
                last_priority = priority;
            }
        }

        assert!(last_priority < recompute_priority(Fixed::ZERO, 0));
    }
}
