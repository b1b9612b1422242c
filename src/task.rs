//! The slice of a process the CPU switch consumes: a kernel stack and an
//! address space. Scheduling, PIDs and the rest of the process table are
//! the process layer's business, not this subsystem's.

use crate::config::{KERN_BASE, KERNEL_STACK_SIZE, PAGE_SIZE};
use crate::error::MmError;
use crate::mm::address::PhysAddr;
use crate::mm::frame_allocator::{frame_alloc, frame_free};
use crate::mm::memory_set::AddressSpace;

pub struct Process {
    /// Kernel virtual address of the stack bottom; the task state points
    /// `esp0` at `kstack + KERNEL_STACK_SIZE`.
    pub kstack: Option<usize>,
    pub space: Option<AddressSpace>,
}

impl Process {
    /// Allocate the kernel stack and a fresh kernel-mapped address space.
    /// Either failure unwinds the other half; the caller just reports a
    /// failed fork/exec upward.
    pub fn new() -> Result<Self, MmError> {
        const _: () = assert!(KERNEL_STACK_SIZE == PAGE_SIZE);
        let stack_frame = frame_alloc().ok_or(MmError::AllocationExhausted)?;
        let space = match AddressSpace::new_kernel() {
            Ok(space) => space,
            Err(e) => {
                frame_free(stack_frame.get_first_addr());
                return Err(e);
            }
        };
        Ok(Self {
            kstack: Some(KERN_BASE + stack_frame.get_first_addr().bits()),
            space: Some(space),
        })
    }

    /// Release the kernel stack and tear down the address space.
    pub fn exit(self) {
        if let Some(kstack) = self.kstack {
            frame_free(PhysAddr(kstack - KERN_BASE));
        }
        if let Some(space) = self.space {
            space.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::frame_allocator::free_frame_count;
    use crate::test_support;

    #[test]
    fn process_lifecycle_returns_all_frames() {
        let _guard = test_support::serial();
        let before = free_frame_count();
        let process = Process::new().unwrap();
        assert!(process.kstack.is_some() && process.space.is_some());
        process.exit();
        assert_eq!(free_frame_count(), before);
    }
}
