//! Builder for spawning a thread with non-default stack size or name.

use super::{Thread, ThreadId};
use crate::errors::SpawnError;
use crate::mem::{StackPool, StackSizeClass};

extern crate alloc;
use alloc::string::String;

pub struct ThreadBuilder {
    stack_size: StackSizeClass,
    priority: u8,
    name: Option<String>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self {
            stack_size: StackSizeClass::Medium,
            priority: crate::config::PRI_DEFAULT,
            name: None,
        }
    }

    pub fn stack_size(mut self, size: StackSizeClass) -> Self {
        self.stack_size = size;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Allocate a descriptor and stack for this configuration, without
    /// wiring an entry point or registering it with a scheduler — callers
    /// that need a schedulable thread should go through `Kernel::spawn`,
    /// which also sets up the initial context and ready-queue membership.
    pub fn build(self, pool: &StackPool, id: ThreadId) -> Result<(Thread, super::JoinHandle), SpawnError> {
        let stack = pool.allocate(self.stack_size).ok_or(SpawnError::OutOfMemory)?;
        let name = self.name.as_deref().unwrap_or("thread");
        Ok(Thread::new(id, stack, name, self.priority))
    }
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_applies_requested_name_and_priority() {
        let pool = StackPool::new();
        let id = unsafe { ThreadId::new_unchecked(1) };
        let (thread, _handle) = ThreadBuilder::new()
            .name("worker")
            .priority(40)
            .stack_size(StackSizeClass::Small)
            .build(&pool, id)
            .unwrap();
        assert_eq!(thread.name(), "worker");
        assert_eq!(thread.base_priority(), 40);
    }
}
