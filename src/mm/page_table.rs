use super::address::{PhysAddr, PhysPageNum, VirtAddr};
use super::frame_allocator::frame_alloc;
use crate::config::PAGE_SIZE;
use crate::error::MmError;
use bitflags::bitflags;

/// Two-level hardware page table rooted at one directory frame.
///
/// There is no shadow bookkeeping: the directory and table entries are the
/// ownership record for every frame they reference. Tearing a table down
/// therefore walks the entries themselves (see `AddressSpace::destroy`).
pub struct PageTable {
    /// The frame holding the 1024-entry page directory.
    pub root_ppn: PhysPageNum,
}

impl PageTable {
    /// Allocate and zero a fresh directory frame.
    pub fn new() -> Result<Self, MmError> {
        let root_ppn = frame_alloc().ok_or(MmError::AllocationExhausted)?;
        root_ppn.get_bytes_array_mut().fill(0);
        Ok(PageTable { root_ppn })
    }

    /// Locate the leaf-entry slot for `va` without allocating.
    ///
    /// Returns `None` iff the directory slot has no table; the returned
    /// slot may itself be empty — callers check `is_present`.
    pub fn find_pte(&self, va: VirtAddr) -> Option<&'static mut PageTableEntry> {
        let [dir_idx, tbl_idx] = va.floor().indexes();
        let dir_entry = &self.root_ppn.get_pte_array_mut()[dir_idx];
        if !dir_entry.is_present() {
            return None;
        }
        Some(&mut dir_entry.ppn().get_pte_array_mut()[tbl_idx])
    }

    /// Locate the leaf-entry slot for `va`, allocating the second-level
    /// table on demand.
    ///
    /// A fresh table is installed in the directory with `P|W|U`. The
    /// permissions there are overly generous on purpose: restriction
    /// happens only at leaf entries.
    pub fn find_pte_create(&mut self, va: VirtAddr) -> Result<&'static mut PageTableEntry, MmError> {
        let [dir_idx, tbl_idx] = va.floor().indexes();
        let dir_entry = &mut self.root_ppn.get_pte_array_mut()[dir_idx];
        if !dir_entry.is_present() {
            let table = frame_alloc().ok_or(MmError::AllocationExhausted)?;
            // Make sure all those present bits are zero.
            table.get_bytes_array_mut().fill(0);
            *dir_entry = PageTableEntry::new(table, PTEFlags::P | PTEFlags::W | PTEFlags::U);
        }
        Ok(&mut dir_entry.ppn().get_pte_array_mut()[tbl_idx])
    }

    /// Install leaf mappings for every page covering `[va, va + size)`,
    /// advancing `pa` in lockstep. `size` need not be page-aligned.
    ///
    /// Allocation failure aborts the whole call; entries already written
    /// stay for the caller to unwind.
    ///
    /// # Panics
    /// Mapping a page that is already present is a fatal remap violation.
    pub fn map_range(
        &mut self,
        va: VirtAddr,
        size: usize,
        pa: PhysAddr,
        flags: PTEFlags,
    ) -> Result<(), MmError> {
        let mut page = va.floor().get_first_addr();
        let last = VirtAddr(va.bits() + size - 1).floor().get_first_addr();
        let mut ppn = pa.floor();
        loop {
            let pte = self.find_pte_create(page)?;
            assert!(!pte.is_present(), "remap of {:?}", page);
            *pte = PageTableEntry::new(ppn, flags | PTEFlags::P);
            if page == last {
                break;
            }
            page = VirtAddr(page.bits() + PAGE_SIZE);
            ppn = PhysPageNum(ppn.0 + 1);
        }
        Ok(())
    }
}

/// A leaf or directory entry: 20-bit frame number plus flag bits.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct PageTableEntry {
    pub bits: u32,
}

impl PageTableEntry {
    pub fn new(ppn: PhysPageNum, flags: PTEFlags) -> Self {
        PageTableEntry {
            bits: (ppn.0 as u32) << 12 | flags.bits(),
        }
    }

    pub fn empty() -> Self {
        PageTableEntry { bits: 0 }
    }

    /// The physical frame this entry references.
    pub fn ppn(&self) -> PhysPageNum {
        PhysPageNum((self.bits >> 12) as usize)
    }

    pub fn flags(&self) -> PTEFlags {
        PTEFlags::from_bits_truncate(self.bits)
    }

    pub fn is_present(&self) -> bool {
        self.flags().contains(PTEFlags::P)
    }

    pub fn is_writable(&self) -> bool {
        self.flags().contains(PTEFlags::W)
    }

    pub fn is_user(&self) -> bool {
        self.flags().contains(PTEFlags::U)
    }
}

bitflags! {
    /// Hardware entry flag bits (low 12 bits of an entry).
    #[derive(Copy, Clone, PartialEq, Debug)]
    pub struct PTEFlags: u32 {
        /// Present
        const P = 1 << 0;
        /// Writable
        const W = 1 << 1;
        /// User-accessible
        const U = 1 << 2;
        /// Large page. Only the boot loader's provisional directory maps
        /// large pages; the flag exists so entries round-trip faithfully.
        const PS = 1 << 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DIR_SPAN;
    use crate::mm::frame_allocator::{frame_free, free_frame_count};
    use crate::test_support;

    fn scratch_table() -> PageTable {
        PageTable::new().expect("directory frame")
    }

    fn teardown(pt: PageTable) {
        // Tests here only ever allocate the directory plus second-level
        // tables, all referenced from the directory.
        for entry in pt.root_ppn.get_pte_array_mut() {
            if entry.is_present() {
                frame_free(entry.ppn().get_first_addr());
            }
        }
        frame_free(pt.root_ppn.get_first_addr());
    }

    #[test]
    fn walk_without_allocation_reports_absent_directory() {
        let _guard = test_support::serial();
        let pt = scratch_table();
        assert!(pt.find_pte(VirtAddr(0x40_0000)).is_none());
        teardown(pt);
    }

    #[test]
    fn walk_with_allocation_installs_permissive_directory_entry() {
        let _guard = test_support::serial();
        let mut pt = scratch_table();
        let pte = pt.find_pte_create(VirtAddr(0x40_1000)).unwrap();
        assert!(!pte.is_present());

        let [dir_idx, _] = VirtAddr(0x40_1000).floor().indexes();
        let dir_entry = pt.root_ppn.get_pte_array_mut()[dir_idx];
        assert!(dir_entry.is_present() && dir_entry.is_writable() && dir_entry.is_user());
        teardown(pt);
    }

    #[test]
    fn map_range_advances_va_and_pa_together() {
        let _guard = test_support::serial();
        let mut pt = scratch_table();
        pt.map_range(
            VirtAddr(0x80_0000),
            3 * PAGE_SIZE,
            PhysAddr(0x31_0000),
            PTEFlags::W,
        )
        .unwrap();
        for i in 0..3 {
            let pte = pt.find_pte(VirtAddr(0x80_0000 + i * PAGE_SIZE)).unwrap();
            assert!(pte.is_present() && pte.is_writable() && !pte.is_user());
            assert_eq!(pte.ppn().get_first_addr().bits(), 0x31_0000 + i * PAGE_SIZE);
        }
        teardown(pt);
    }

    #[test]
    fn map_range_handles_unaligned_size() {
        let _guard = test_support::serial();
        let mut pt = scratch_table();
        // 1 byte past a page boundary still maps two pages.
        pt.map_range(VirtAddr(0), PAGE_SIZE + 1, PhysAddr(0x32_0000), PTEFlags::U)
            .unwrap();
        assert!(pt.find_pte(VirtAddr(0)).unwrap().is_present());
        assert!(pt.find_pte(VirtAddr(PAGE_SIZE)).unwrap().is_present());
        assert!(!pt.find_pte(VirtAddr(2 * PAGE_SIZE)).unwrap().is_present());
        teardown(pt);
    }

    #[test]
    #[should_panic(expected = "remap")]
    fn remap_is_fatal() {
        let _guard = test_support::serial();
        let mut pt = scratch_table();
        pt.map_range(VirtAddr(0x10_0000), PAGE_SIZE, PhysAddr(0x33_0000), PTEFlags::W)
            .unwrap();
        let _ = pt.map_range(VirtAddr(0x10_0000), PAGE_SIZE, PhysAddr(0x34_0000), PTEFlags::W);
    }

    #[test]
    fn table_frames_come_from_the_allocator() {
        let _guard = test_support::serial();
        let before = free_frame_count();
        let mut pt = scratch_table();
        pt.find_pte_create(VirtAddr(0)).unwrap();
        pt.find_pte_create(VirtAddr(DIR_SPAN)).unwrap();
        // Directory plus two second-level tables.
        assert_eq!(free_frame_count(), before - 3);
        teardown(pt);
        assert_eq!(free_frame_count(), before);
    }
}
