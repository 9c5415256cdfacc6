//! Error handling for the threading system.
//!
//! Three kinds of failure exist here, matched one-to-one to the error
//! handling design: invariant violations are fatal assertions that halt
//! the kernel (programming bugs, not recoverable conditions), resource
//! exhaustion is reported through `Result`, and benign refusals
//! (`try_down`, `try_acquire`) are reported through a plain `bool` and
//! never touch this module at all.

use core::fmt;
extern crate alloc;
use alloc::string::String;

use crate::thread::ThreadId;

/// Result type for fallible threading operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Top-level error type for all threading operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadError {
    /// Thread spawning errors.
    Spawn(SpawnError),
    /// Scheduling errors.
    Schedule(ScheduleError),
    /// Architecture-specific errors (context switch, interrupt controller).
    Arch(ArchError),
    /// Invalid operation errors.
    InvalidOperation(InvalidOperationError),
}

/// Errors that can occur during thread spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// The kernel has not been initialized yet.
    NotInitialized,
    /// No free thread page was available (resource exhaustion; surfaces
    /// to the caller as the `TID_ERROR` sentinel at the public API).
    OutOfMemory,
    /// Requested priority outside `[PRI_MIN, PRI_MAX]`.
    InvalidPriority(u8),
    /// Thread name longer than the 15-character limit.
    InvalidName(String),
}

/// Errors related to scheduling operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// No schedulable thread exists, not even the idle thread (can only
    /// happen before `start` spawns it).
    NoThreadsAvailable,
    /// The scheduler was asked to do something that requires interrupts
    /// to already be disabled, and they weren't.
    InterruptsEnabled,
}

/// Architecture-specific errors (the context-switch primitive, the
/// interrupt controller — out of scope as collaborators, but their
/// failure modes still need a home in this taxonomy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchError {
    ContextSwitchFailed,
    InterruptControllerError,
}

/// Invalid operation errors: a caller violated a documented precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidOperationError {
    /// Operation required the current thread to be RUNNING.
    WrongState,
    /// A lock operation was attempted by a thread that doesn't hold it.
    LockNotHeld,
    /// Invalid parameter provided.
    InvalidParameter(String),
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::Spawn(e) => write!(f, "thread spawn error: {}", e),
            ThreadError::Schedule(e) => write!(f, "scheduling error: {}", e),
            ThreadError::Arch(e) => write!(f, "architecture error: {}", e),
            ThreadError::InvalidOperation(e) => write!(f, "invalid operation: {}", e),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::NotInitialized => write!(f, "threading system not initialized"),
            SpawnError::OutOfMemory => write!(f, "no free thread page available"),
            SpawnError::InvalidPriority(p) => write!(f, "invalid priority: {}", p),
            SpawnError::InvalidName(name) => write!(f, "invalid thread name: {}", name),
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::NoThreadsAvailable => write!(f, "no schedulable threads available"),
            ScheduleError::InterruptsEnabled => write!(f, "operation requires interrupts disabled"),
        }
    }
}

impl fmt::Display for ArchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchError::ContextSwitchFailed => write!(f, "context switch failed"),
            ArchError::InterruptControllerError => write!(f, "interrupt controller error"),
        }
    }
}

impl fmt::Display for InvalidOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidOperationError::WrongState => write!(f, "operation called in wrong thread state"),
            InvalidOperationError::LockNotHeld => write!(f, "lock released by a thread that does not hold it"),
            InvalidOperationError::InvalidParameter(p) => write!(f, "invalid parameter: {}", p),
        }
    }
}

impl From<SpawnError> for ThreadError {
    fn from(e: SpawnError) -> Self {
        ThreadError::Spawn(e)
    }
}

impl From<ScheduleError> for ThreadError {
    fn from(e: ScheduleError) -> Self {
        ThreadError::Schedule(e)
    }
}

impl From<ArchError> for ThreadError {
    fn from(e: ArchError) -> Self {
        ThreadError::Arch(e)
    }
}

impl From<InvalidOperationError> for ThreadError {
    fn from(e: InvalidOperationError) -> Self {
        ThreadError::InvalidOperation(e)
    }
}

/// Sentinel returned by `Kernel::create` on resource exhaustion, matching
/// the source's `TID_ERROR` convention instead of threading a `Result`
/// through every caller of thread creation.
pub const TID_ERROR: usize = 0;

/// Halt the kernel on a detected invariant violation.
///
/// Every fatal path in this crate goes through here instead of an ad-hoc
/// `panic!()`, so the diagnostic always carries `tid` and `name` as the
/// error handling design requires.
#[cold]
#[inline(never)]
pub fn kernel_panic(tid: ThreadId, name: &str, msg: &str) -> ! {
    crate::klog!("FATAL tid={} name={}: {}", tid, name, msg);
    panic!("kernel invariant violation (tid={}, name={}): {}", tid, name, msg);
}
