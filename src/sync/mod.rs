//! Synchronization primitives built directly on the scheduler's block/wake
//! primitives and interrupt-level mutual exclusion (§4.4).
//!
//! None of these use a finer-grained spinlock internally — on a
//! uniprocessor kernel, `InterruptGuard` already gives exclusive access to
//! everything these primitives touch, so nesting another lock underneath
//! would only add overhead, not safety.

pub mod condvar;
pub mod lock;
pub mod semaphore;

pub use condvar::Condvar;
pub use lock::Lock;
pub use semaphore::Semaphore;
