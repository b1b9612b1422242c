use super::page_table::PageTableEntry;
use super::phys;
use crate::config::{DIR_SPAN, ENTRY_COUNT, PAGE_OFFSET_BITS, PAGE_SIZE};
use core::fmt::{self, Debug, Formatter};

/// Physical address width (in bits)
const PA_WIDTH: usize = 32;
/// Virtual address width (in bits)
const VA_WIDTH: usize = 32;
/// Physical page number width (in bits)
const PPN_WIDTH: usize = PA_WIDTH - PAGE_OFFSET_BITS;
/// Virtual page number width (in bits)
const VPN_WIDTH: usize = VA_WIDTH - PAGE_OFFSET_BITS;

/// Definition

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct PhysAddr(pub usize);

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct VirtAddr(pub usize);

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct PhysPageNum(pub usize);

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct VirtPageNum(pub usize);

/// Debugging
impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:#x}(PA)", self.0))
    }
}
impl Debug for VirtAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:#x}(VA)", self.0))
    }
}
impl Debug for PhysPageNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:#x}(PPN)", self.0))
    }
}
impl Debug for VirtPageNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:#x}(VPN)", self.0))
    }
}

/// usize <-> T
impl From<usize> for PhysAddr {
    fn from(v: usize) -> Self {
        Self(v & ((1 << PA_WIDTH) - 1))
    }
}
impl From<usize> for VirtAddr {
    fn from(v: usize) -> Self {
        Self(v & ((1 << VA_WIDTH) - 1))
    }
}
impl From<usize> for PhysPageNum {
    fn from(v: usize) -> Self {
        Self(v & ((1 << PPN_WIDTH) - 1))
    }
}
impl From<usize> for VirtPageNum {
    fn from(v: usize) -> Self {
        Self(v & ((1 << VPN_WIDTH) - 1))
    }
}

impl VirtAddr {
    pub fn bits(&self) -> usize {
        self.0
    }

    /// Returns the offset within the page for this virtual address.
    pub fn page_offset(&self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Returns the virtual page number containing this address (rounded down).
    pub fn floor(&self) -> VirtPageNum {
        VirtPageNum(self.0 / PAGE_SIZE)
    }

    /// Returns the virtual page number containing this address (rounded up).
    pub fn ceil(&self) -> VirtPageNum {
        VirtPageNum(self.0.div_ceil(PAGE_SIZE))
    }

    pub fn aligned(&self) -> bool {
        self.page_offset() == 0
    }

    /// First address of the next 4 MiB directory region. Used by the shrink
    /// loop to hop over directory slots that never got a table.
    pub fn next_dir_base(&self) -> VirtAddr {
        VirtAddr((self.0 / DIR_SPAN + 1) * DIR_SPAN)
    }
}

impl VirtPageNum {
    pub fn bits(&self) -> usize {
        self.0
    }

    /// Returns the two-level page table indexes for this virtual page number.
    ///
    /// The result is `[directory index, table index]`, 10 bits each.
    pub fn indexes(&self) -> [usize; 2] {
        const MASK: usize = ENTRY_COUNT - 1;
        [(self.0 >> 10) & MASK, self.0 & MASK]
    }

    /// Returns the starting virtual address of this page.
    pub fn get_first_addr(&self) -> VirtAddr {
        VirtAddr(self.0 << PAGE_OFFSET_BITS)
    }
}

impl PhysAddr {
    pub fn bits(&self) -> usize {
        self.0
    }

    pub fn page_offset(&self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Returns the physical page number containing this address (rounded down).
    pub fn floor(&self) -> PhysPageNum {
        PhysPageNum(self.0 / PAGE_SIZE)
    }

    /// Returns the physical page number containing this address (rounded up).
    pub fn ceil(&self) -> PhysPageNum {
        PhysPageNum(self.0.div_ceil(PAGE_SIZE))
    }

    pub fn aligned(&self) -> bool {
        self.page_offset() == 0
    }
}

impl PhysPageNum {
    pub fn bits(&self) -> usize {
        self.0
    }

    /// Returns the starting physical address of this page.
    pub fn get_first_addr(&self) -> PhysAddr {
        PhysAddr(self.0 << PAGE_OFFSET_BITS)
    }

    /// Returns a mutable byte slice over the frame's memory.
    pub fn get_bytes_array_mut(&self) -> &'static mut [u8] {
        let pa: PhysAddr = self.get_first_addr();
        unsafe { core::slice::from_raw_parts_mut(phys::phys_to_virt(pa), PAGE_SIZE) }
    }

    /// Returns an immutable byte slice over the frame's memory.
    pub fn get_bytes_array(&self) -> &'static [u8] {
        let pa: PhysAddr = self.get_first_addr();
        unsafe { core::slice::from_raw_parts(phys::phys_to_virt(pa), PAGE_SIZE) }
    }

    /// Returns a mutable slice of page table entries for this frame.
    ///
    /// # Safety
    /// The frame must be used as a page directory or page table.
    pub fn get_pte_array_mut(&self) -> &'static mut [PageTableEntry] {
        let pa: PhysAddr = self.get_first_addr();
        // PAGE_SIZE / sizeof(PageTableEntry) = 1024; one frame holds a
        // full directory or table.
        unsafe {
            core::slice::from_raw_parts_mut(
                phys::phys_to_virt(pa) as *mut PageTableEntry,
                PAGE_SIZE / size_of::<PageTableEntry>(),
            )
        }
    }
}
