//! Memory-management core of a small SMP, protected-mode, paged kernel:
//! physical frame allocation, two-level page tables, the kernel mapping
//! set shared by every address space, user address-space lifecycle,
//! kernel/user translation and copy, and the per-core space switch.
//!
//! Physical memory and the per-core registers are modeled explicitly, so
//! the whole subsystem builds as `no_std` and runs under `cargo test` on
//! the host.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod config;
pub mod cpu;
pub mod error;
#[cfg(any(test, feature = "std"))]
pub mod logging;
pub mod mm;
pub mod task;

pub use error::MmError;
pub use mm::address::{PhysAddr, PhysPageNum, VirtAddr, VirtPageNum};
pub use mm::memory_set::{AddressSpace, ByteSource, kernel_space};

/// Single-shot bring-up for a hosted caller: both allocator phases, the
/// kernel address space, and core 0 pointed at it. A real boot sequence
/// calls the phases separately around starting the other cores.
pub fn init() {
    mm::init_phase1();
    mm::init_phase2();
    cpu::install_kernel_space(0);
}
