//! Kernel diagnostic logging.
//!
//! Bare-metal builds have no `std::log`; diagnostics go out over the
//! PL011 UART the same way the rest of this codebase already does it
//! (`pl011_println!`). Under `std-shim` (host-side tests), there is no
//! UART to write to, so `klog!` falls back to `std::println!` instead of
//! silently dropping the message.

/// Log a kernel diagnostic line.
///
/// Used for fatal-assertion diagnostics (`errors::kernel_panic`),
/// donation chain depth-bound hits, and MLFQS recompute tracing.
#[macro_export]
macro_rules! klog {
    ($($arg:tt)*) => {{
        #[cfg(not(feature = "std-shim"))]
        {
            $crate::pl011_println!($($arg)*);
        }
        #[cfg(feature = "std-shim")]
        {
            extern crate std;
            std::println!($($arg)*);
        }
    }};
}
