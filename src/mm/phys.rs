//! Backing storage for the machine's physical memory.
//!
//! The crate models RAM as one page-aligned arena covering physical
//! addresses `[0, PHYS_TOP)`, leaked once at bring-up so frames have
//! `'static` lifetime exactly like real RAM behind a direct map. Every
//! physical access in the crate funnels through [`phys_to_virt`], the
//! moral equivalent of the kernel's P2V direct-map arithmetic.

use crate::config::{PAGE_SIZE, PHYS_TOP};
use alloc::vec;
use spin::Once;

use super::address::PhysAddr;

#[derive(Clone)]
#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE]);

struct PhysMemory {
    base: *mut u8,
}

// The arena pointer never moves after init; frame-level aliasing is
// governed by the single-owner rule, not by this handle.
unsafe impl Send for PhysMemory {}
unsafe impl Sync for PhysMemory {}

static PHYS_MEMORY: Once<PhysMemory> = Once::new();

/// Reserve the arena. Runs once, before the frame allocator is seeded.
pub fn init() {
    PHYS_MEMORY.call_once(|| {
        let frames = vec![Frame([0; PAGE_SIZE]); PHYS_TOP / PAGE_SIZE];
        let base = frames.leak().as_mut_ptr() as *mut u8;
        PhysMemory { base }
    });
}

/// Kernel-accessible pointer for a physical address.
///
/// Panics if the arena is not initialized or `pa` is past the physical
/// ceiling — device-window addresses are mapped but never dereferenced
/// through here.
pub fn phys_to_virt(pa: PhysAddr) -> *mut u8 {
    let mem = PHYS_MEMORY
        .get()
        .expect("physical memory accessed before init");
    assert!(pa.bits() < PHYS_TOP, "{:?} beyond physical ceiling", pa);
    unsafe { mem.base.add(pa.bits()) }
}
