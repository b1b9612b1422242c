//! Free-list allocator for 4096-byte physical frames.
//!
//! Initialization happens in two phases. Phase 1 seeds the range the
//! provisional boot directory already maps, before any secondary core runs
//! and before synchronization is trustworthy. Phase 2 seeds the rest of
//! physical memory and flips the allocator into locked multi-core mode,
//! once every core can see the full kernel mapping.

use super::address::{PhysAddr, PhysPageNum};
use crate::config::{BOOT_FREE_TOP, KERNEL_END, PAGE_SIZE, PHYS_TOP};
use alloc::vec::Vec;
use spin::Mutex;

/// Byte written over every freed frame so stale references to freed
/// memory read as garbage instead of their old contents.
pub const JUNK_BYTE: u8 = 0x01;

/// Global frame allocator instance. The mutex is the one cross-core lock
/// in the subsystem; `locking` records which bring-up phase we are in.
static FRAME_ALLOCATOR: Mutex<FrameAllocator> = Mutex::new(FrameAllocator::new());

/// Seed the early free range. No concurrent callers exist yet.
pub fn init_phase1() {
    let mut allocator = FRAME_ALLOCATOR.lock();
    assert!(!allocator.locking, "phase 1 after locking enabled");
    allocator.free_range(PhysAddr(KERNEL_END), PhysAddr(BOOT_FREE_TOP));
}

/// Seed the rest of physical memory and enable locked operation.
pub fn init_phase2() {
    let mut allocator = FRAME_ALLOCATOR.lock();
    allocator.free_range(PhysAddr(BOOT_FREE_TOP), PhysAddr(PHYS_TOP));
    allocator.locking = true;
    log::info!(
        "frame allocator ready: {} frames in [{:#x}, {:#x})",
        allocator.free_list.len(),
        KERNEL_END,
        PHYS_TOP
    );
}

/// Allocate one physical frame. Contents are unspecified; callers zero
/// what they need. `None` when memory is exhausted.
pub fn frame_alloc() -> Option<PhysPageNum> {
    let ppn = FRAME_ALLOCATOR.lock().alloc();
    if ppn.is_none() {
        log::warn!("frame allocator out of memory");
    }
    ppn
}

/// Return a frame to the free list.
///
/// # Panics
/// `pa` must be page-aligned, at or above the allocator floor and below
/// the physical ceiling. Anything else is a corrupted frame reference and
/// halts the kernel rather than poisoning the free list.
pub fn frame_free(pa: PhysAddr) {
    if !pa.aligned() || pa.bits() < KERNEL_END || pa.bits() >= PHYS_TOP {
        panic!("frame_free: bad frame {:?}", pa);
    }
    // Fill with junk to catch dangling refs.
    pa.floor().get_bytes_array_mut().fill(JUNK_BYTE);
    FRAME_ALLOCATOR.lock().free_list.push(pa.floor());
}

/// Number of frames currently on the free list.
pub fn free_frame_count() -> usize {
    FRAME_ALLOCATOR.lock().free_list.len()
}

/// Whether phase 2 has switched the allocator into locked mode.
pub fn locking_enabled() -> bool {
    FRAME_ALLOCATOR.lock().locking
}

struct FrameAllocator {
    /// LIFO stack of free physical page numbers.
    free_list: Vec<PhysPageNum>,
    /// False only during single-core bring-up, before phase 2.
    locking: bool,
}

impl FrameAllocator {
    const fn new() -> Self {
        Self {
            free_list: Vec::new(),
            locking: false,
        }
    }

    fn alloc(&mut self) -> Option<PhysPageNum> {
        self.free_list.pop()
    }

    /// Push every whole frame in `[start, end)` onto the free list.
    fn free_range(&mut self, start: PhysAddr, end: PhysAddr) {
        let mut pa = start.ceil().get_first_addr();
        while pa.bits() + PAGE_SIZE <= end.bits() {
            pa.floor().get_bytes_array_mut().fill(JUNK_BYTE);
            self.free_list.push(pa.floor());
            pa = PhysAddr(pa.bits() + PAGE_SIZE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn alloc_free_restores_count() {
        let _guard = test_support::serial();
        let before = free_frame_count();

        let mut frames: Vec<PhysPageNum> = (0..64)
            .map(|_| frame_alloc().expect("allocation should succeed"))
            .collect();
        assert_eq!(free_frame_count(), before - 64);

        // Free in a different order than allocation.
        frames.reverse();
        let (left, right) = frames.split_at(32);
        for ppn in right.iter().chain(left.iter()) {
            frame_free(ppn.get_first_addr());
        }
        assert_eq!(free_frame_count(), before);
    }

    #[test]
    fn freed_frames_are_junk_filled() {
        let _guard = test_support::serial();
        let ppn = frame_alloc().unwrap();
        ppn.get_bytes_array_mut().fill(0xC3);
        frame_free(ppn.get_first_addr());
        assert!(ppn.get_bytes_array().iter().all(|&b| b == JUNK_BYTE));
    }

    #[test]
    fn free_list_is_lifo() {
        let _guard = test_support::serial();
        let a = frame_alloc().unwrap();
        frame_free(a.get_first_addr());
        let b = frame_alloc().unwrap();
        assert_eq!(a, b);
        frame_free(b.get_first_addr());
    }

    #[test]
    fn locked_mode_after_bring_up() {
        let _guard = test_support::serial();
        assert!(locking_enabled());
    }

    #[test]
    #[should_panic(expected = "bad frame")]
    fn free_unaligned_is_fatal() {
        let _guard = test_support::serial();
        frame_free(PhysAddr(KERNEL_END + 123));
    }

    #[test]
    #[should_panic(expected = "bad frame")]
    fn free_below_floor_is_fatal() {
        let _guard = test_support::serial();
        frame_free(PhysAddr(KERNEL_END - PAGE_SIZE));
    }

    #[test]
    #[should_panic(expected = "bad frame")]
    fn free_past_ceiling_is_fatal() {
        let _guard = test_support::serial();
        frame_free(PhysAddr(PHYS_TOP));
    }
}
