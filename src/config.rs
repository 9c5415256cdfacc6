//! Boot-time configuration.
//!
//! Grouped the way the rest of this codebase groups optional construction
//! parameters: a plain data struct with a `const fn` default and a builder
//! for the handful of callers that want to override one or two fields
//! (mirroring `thread::ThreadBuilder`).

/// Lowest legal thread priority.
pub const PRI_MIN: u8 = 0;
/// Highest legal thread priority.
pub const PRI_MAX: u8 = 63;
/// Lowest legal `nice` value (more favorable scheduling).
pub const NICE_MIN: i8 = -20;
/// Highest legal `nice` value (less favorable scheduling).
pub const NICE_MAX: i8 = 20;
/// Default priority assigned to a thread that doesn't request one.
pub const PRI_DEFAULT: u8 = 31;

/// Kernel-wide configuration, fixed for the lifetime of a `Kernel`.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Timer interrupt frequency in Hz. Drives tick granularity for sleep,
    /// CPU accounting, and the once-per-second MLFQS recompute.
    pub timer_hz: u32,
    /// Select the MLFQS scheduler instead of priority donation.
    pub mlfqs_mode: bool,
    /// Bound on how many locks a donation chain walk traverses before
    /// giving up, to avoid pathological traversal on a malformed or
    /// adversarial wait-for graph.
    pub donation_chain_depth: usize,
    /// Ticks a thread may run before being forced to yield to the next
    /// equal-priority READY thread, so threads at the same priority
    /// round-robin instead of one running forever.
    pub time_slice_ticks: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            timer_hz: 100,
            mlfqs_mode: false,
            donation_chain_depth: 8,
            time_slice_ticks: 4,
        }
    }

    pub const fn builder() -> ConfigBuilder {
        ConfigBuilder { config: Config::new() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub const fn timer_hz(mut self, hz: u32) -> Self {
        self.config.timer_hz = hz;
        self
    }

    pub const fn mlfqs_mode(mut self, enabled: bool) -> Self {
        self.config.mlfqs_mode = enabled;
        self
    }

    pub const fn donation_chain_depth(mut self, depth: usize) -> Self {
        self.config.donation_chain_depth = depth;
        self
    }

    pub const fn time_slice_ticks(mut self, ticks: u32) -> Self {
        self.config.time_slice_ticks = ticks;
        self
    }

    pub const fn build(self) -> Config {
        self.config
    }
}

/// Clamp a requested priority into `[PRI_MIN, PRI_MAX]`.
///
/// The source's boundary behavior for an out-of-range `set_priority` is
/// left as an open question between "assert" and "clamp"; this crate
/// clamps (see DESIGN.md) so a caller's off-by-one can't halt the kernel.
pub fn clamp_priority(p: u8) -> u8 {
    p.clamp(PRI_MIN, PRI_MAX)
}

pub fn clamp_nice(n: i8) -> i8 {
    n.clamp(NICE_MIN, NICE_MAX)
}
