//! Memory layout and machine constants.
//!
//! The physical map is the classic PC layout: low memory up to `EXT_MEM` is
//! the identity I/O window, the kernel image is loaded at `EXT_MEM`, and
//! everything from the end of the image to `PHYS_TOP` is allocatable RAM.
//! Virtually, the kernel owns `[KERN_BASE, ..)` in every address space and
//! user memory is the prefix below it.

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_OFFSET_BITS: usize = 12;

/// Entries per page directory / page table (two-level, 10+10+12 split).
pub const ENTRY_COUNT: usize = 1024;
/// Bytes covered by one directory entry (one second-level table).
pub const DIR_SPAN: usize = ENTRY_COUNT * PAGE_SIZE;

/// End of the identity-mapped low I/O window (BIOS, VGA, option ROMs).
pub const EXT_MEM: usize = 0x10_0000;
/// Physical end of kernel text+rodata; kernel data starts here.
pub const KTEXT_END: usize = 0x20_0000;
/// First physical address past the loaded kernel image. The frame
/// allocator never manages anything below this floor.
pub const KERNEL_END: usize = 0x30_0000;
/// Top of the phase-1 free range: the few megabytes the provisional boot
/// directory already maps, seeded before locking is possible.
pub const BOOT_FREE_TOP: usize = 0x40_0000;
/// Physical memory ceiling.
pub const PHYS_TOP: usize = 0x100_0000;

/// Kernel half of every virtual address space starts here.
pub const KERN_BASE: usize = 0x8000_0000;
/// Virtual address the kernel image is linked at.
pub const KERN_LINK: usize = KERN_BASE + EXT_MEM;
/// Memory-mapped device window, direct-mapped up to the 4 GiB edge.
pub const DEV_SPACE: usize = 0xFE00_0000;
pub const DEV_TOP: usize = 0x1_0000_0000;

pub const KERNEL_STACK_SIZE: usize = PAGE_SIZE;

/// Cores the per-CPU table is sized for.
pub const NCPU: usize = 4;
