use log::*;

pub mod address;
pub mod frame_allocator;
pub mod memory_set;
pub mod page_table;
pub mod phys;

/// Early single-core bring-up: back the physical arena and seed the frame
/// range the provisional boot directory maps. No locking yet — the
/// synchronization primitives may not be ready and no other core runs.
pub fn init_phase1() {
    phys::init();
    frame_allocator::init_phase1();
    info!("[kernel] early frame range seeded");
}

/// Finish bring-up once every core can see the full kernel mapping: seed
/// the rest of physical memory, enable locked allocation, and build the
/// kernel-only address space used whenever no process is scheduled.
pub fn init_phase2() {
    frame_allocator::init_phase2();
    memory_set::init_kernel_space();
    info!("[kernel] kernel address space built");
}
