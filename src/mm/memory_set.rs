use super::address::{PhysAddr, PhysPageNum, VirtAddr};
use super::frame_allocator::{frame_alloc, frame_free};
use super::page_table::{PTEFlags, PageTable, PageTableEntry};
use crate::config::{
    DEV_SPACE, DEV_TOP, EXT_MEM, KERN_BASE, KERN_LINK, KTEXT_END, PAGE_SIZE, PHYS_TOP,
};
use crate::error::MmError;
use log::*;
use spin::Once;

/// The kernel-only address space, for use when no process is scheduled.
/// Built once in bring-up phase 2.
static KERNEL_SPACE: Once<AddressSpace> = Once::new();

pub fn init_kernel_space() {
    KERNEL_SPACE.call_once(|| {
        AddressSpace::new_kernel().expect("out of frames building the boot kernel space")
    });
}

pub fn kernel_space() -> &'static AddressSpace {
    KERNEL_SPACE.get().expect("kernel space not built yet")
}

/// One fixed kernel segment, present identically in every address space.
struct KernelSegment {
    name: &'static str,
    virt: usize,
    phys_start: usize,
    phys_end: usize,
    flags: PTEFlags,
}

/// The kernel's mappings, shared by every process's page table:
///
///   0..KERN_BASE            : user memory (text+data+stack+heap)
///   KERN_BASE..KERN_LINK    : identity window over low I/O space
///   KERN_LINK..+text        : kernel instructions and read-only data
///   ..KERN_BASE+PHYS_TOP    : kernel data plus all remaining free memory
///   DEV_SPACE..4 GiB        : memory-mapped devices, direct-mapped
const KERNEL_MAP: [KernelSegment; 4] = [
    KernelSegment {
        name: "I/O space",
        virt: KERN_BASE,
        phys_start: 0,
        phys_end: EXT_MEM,
        flags: PTEFlags::W,
    },
    KernelSegment {
        name: "kernel text+rodata",
        virt: KERN_LINK,
        phys_start: EXT_MEM,
        phys_end: KTEXT_END,
        flags: PTEFlags::empty(),
    },
    KernelSegment {
        name: "kernel data+memory",
        virt: KERN_BASE + KTEXT_END,
        phys_start: KTEXT_END,
        phys_end: PHYS_TOP,
        flags: PTEFlags::W,
    },
    KernelSegment {
        name: "device window",
        virt: DEV_SPACE,
        phys_start: DEV_SPACE,
        phys_end: DEV_TOP,
        flags: PTEFlags::W,
    },
];

/// Supplies segment bytes during exec; the file layer implements this.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes starting at `offset`. Returns the
    /// number of bytes delivered, or `None` for a failed read.
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Option<usize>;
}

impl ByteSource for &[u8] {
    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> Option<usize> {
        if offset >= self.len() {
            return Some(0);
        }
        let n = usize::min(buf.len(), self.len() - offset);
        buf[..n].copy_from_slice(&self[offset..offset + n]);
        Some(n)
    }
}

/// One process's (or the kernel's) view of memory: a page directory plus
/// the tables and frames it transitively references.
///
/// The entries themselves are the ownership record; there is no separate
/// frame list. An `AddressSpace` is exclusively owned by its process, so
/// no lock guards mutation — the allocator underneath is the only shared
/// structure.
pub struct AddressSpace {
    pub page_table: PageTable,
}

impl AddressSpace {
    /// Build a fresh address space containing the kernel segments and an
    /// empty user range. Undone completely on any segment failure.
    pub fn new_kernel() -> Result<Self, MmError> {
        assert!(
            KERN_BASE + PHYS_TOP <= DEV_SPACE,
            "physical ceiling overlaps the device window"
        );
        let mut space = AddressSpace {
            page_table: PageTable::new()?,
        };
        for seg in KERNEL_MAP.iter() {
            trace!(
                "mapping {} [{:#x}, {:#x})",
                seg.name, seg.virt, seg.virt + (seg.phys_end - seg.phys_start)
            );
            if let Err(e) = space.page_table.map_range(
                VirtAddr(seg.virt),
                seg.phys_end - seg.phys_start,
                PhysAddr(seg.phys_start),
                seg.flags,
            ) {
                space.destroy();
                return Err(e);
            }
        }
        Ok(space)
    }

    /// Map the very first process's code at virtual address 0.
    ///
    /// # Panics
    /// The image must fit in less than one page; only boot uses this.
    pub fn load_initial_image(&mut self, image: &[u8]) {
        assert!(image.len() < PAGE_SIZE, "initial image larger than a page");
        let ppn = frame_alloc().expect("out of frames loading the initial image");
        ppn.get_bytes_array_mut().fill(0);
        self.page_table
            .map_range(
                VirtAddr(0),
                PAGE_SIZE,
                ppn.get_first_addr(),
                PTEFlags::W | PTEFlags::U,
            )
            .expect("out of frames loading the initial image");
        ppn.get_bytes_array_mut()[..image.len()].copy_from_slice(image);
    }

    /// Fill `[va, va + size)` from `source` at `offset`, page by page.
    ///
    /// A short or failed read is an ordinary load error; the exec attempt
    /// aborts and the caller throws the half-built space away.
    ///
    /// # Panics
    /// `va` must be page-aligned and every page in range already mapped
    /// (`grow` maps segments before they are loaded).
    pub fn load_segment(
        &mut self,
        va: VirtAddr,
        source: &mut dyn ByteSource,
        offset: usize,
        size: usize,
    ) -> Result<(), MmError> {
        assert!(va.aligned(), "load_segment: unaligned base {:?}", va);
        let mut loaded = 0;
        while loaded < size {
            let page = VirtAddr(va.bits() + loaded);
            let pte = self
                .page_table
                .find_pte(page)
                .expect("load_segment: page should exist");
            assert!(pte.is_present(), "load_segment: page should exist");
            let n = usize::min(PAGE_SIZE, size - loaded);
            let buf = &mut pte.ppn().get_bytes_array_mut()[..n];
            if source.read_at(offset + loaded, buf) != Some(n) {
                return Err(MmError::ShortRead);
            }
            loaded += n;
        }
        Ok(())
    }

    /// Grow the user range from `old_size` to `new_size` bytes with fresh
    /// zeroed, writable, user-accessible pages. All-or-nothing: any
    /// mid-loop failure shrinks back to `old_size` first.
    pub fn grow(&mut self, old_size: usize, new_size: usize) -> Result<usize, MmError> {
        if new_size >= KERN_BASE {
            return Err(MmError::BeyondUserRange);
        }
        if new_size < old_size {
            return Ok(old_size);
        }

        let mut va = VirtAddr(old_size).ceil().get_first_addr().bits();
        while va < new_size {
            let Some(ppn) = frame_alloc() else {
                warn!("grow out of memory");
                self.shrink(new_size, old_size);
                return Err(MmError::AllocationExhausted);
            };
            ppn.get_bytes_array_mut().fill(0);
            if let Err(e) = self.page_table.map_range(
                VirtAddr(va),
                PAGE_SIZE,
                ppn.get_first_addr(),
                PTEFlags::W | PTEFlags::U,
            ) {
                warn!("grow out of memory (table)");
                self.shrink(new_size, old_size);
                frame_free(ppn.get_first_addr());
                return Err(e);
            }
            va += PAGE_SIZE;
        }
        Ok(new_size)
    }

    /// Release user pages to bring the size from `old_size` down to
    /// `new_size`. Neither needs to be page-aligned, and `old_size` may
    /// exceed the actual populated size. Always succeeds.
    pub fn shrink(&mut self, old_size: usize, new_size: usize) -> usize {
        if new_size >= old_size {
            return old_size;
        }

        let mut va = VirtAddr(new_size).ceil().get_first_addr();
        while va.bits() < old_size {
            match self.page_table.find_pte(va) {
                // No table under this directory slot: hop straight to the
                // next 4 MiB region. The landing point matters for loop
                // termination when old_size straddles a region boundary.
                None => va = va.next_dir_base(),
                Some(pte) => {
                    if pte.is_present() {
                        let pa = pte.ppn().get_first_addr();
                        assert!(pa.bits() != 0, "shrink: page backed by frame 0");
                        frame_free(pa);
                        *pte = PageTableEntry::empty();
                    }
                    va = VirtAddr(va.bits() + PAGE_SIZE);
                }
            }
        }
        new_size
    }

    /// Eagerly copy the user range `[0, size)` into a fresh kernel-mapped
    /// space. No frame is ever shared between source and copy; leaf flags
    /// carry over bit-for-bit (a guard page stays non-user).
    ///
    /// # Panics
    /// The source must be fully populated up to `size`.
    pub fn duplicate(&self, size: usize) -> Result<AddressSpace, MmError> {
        let mut dup = AddressSpace::new_kernel()?;
        let mut va = 0;
        while va < size {
            let pte = self
                .page_table
                .find_pte(VirtAddr(va))
                .expect("duplicate: page should exist");
            assert!(pte.is_present(), "duplicate: page not present");
            let flags = pte.flags();
            let Some(ppn) = frame_alloc() else {
                dup.destroy();
                return Err(MmError::AllocationExhausted);
            };
            ppn.get_bytes_array_mut()
                .copy_from_slice(pte.ppn().get_bytes_array());
            if let Err(e) =
                dup.page_table
                    .map_range(VirtAddr(va), PAGE_SIZE, ppn.get_first_addr(), flags)
            {
                frame_free(ppn.get_first_addr());
                dup.destroy();
                return Err(e);
            }
            va += PAGE_SIZE;
        }
        Ok(dup)
    }

    /// Free every user page, every second-level table and the directory
    /// itself. Kernel segment targets are not allocator-owned and stay.
    pub fn destroy(mut self) {
        self.shrink(KERN_BASE, 0);
        for entry in self.page_table.root_ppn.get_pte_array_mut() {
            if entry.is_present() {
                frame_free(entry.ppn().get_first_addr());
            }
        }
        frame_free(self.page_table.root_ppn.get_first_addr());
    }

    /// Make the page at `va` inaccessible from user mode. Placed beneath
    /// the user stack to trap overflow.
    ///
    /// # Panics
    /// The page must be mapped.
    pub fn protect_guard_page(&mut self, va: VirtAddr) {
        let pte = self
            .page_table
            .find_pte(va)
            .expect("guard page not mapped");
        assert!(pte.is_present(), "guard page not mapped");
        pte.bits &= !PTEFlags::U.bits();
    }

    /// Resolve a user virtual address to its backing frame and page
    /// offset — only if the page is both present *and* user-accessible,
    /// so user code is never handed a kernel-only page.
    pub fn translate_user(&self, uva: VirtAddr) -> Option<(PhysPageNum, usize)> {
        let pte = self.page_table.find_pte(uva)?;
        if !pte.is_present() || !pte.is_user() {
            return None;
        }
        Some((pte.ppn(), uva.page_offset()))
    }

    /// Copy `src` to `dest` in this address space, which need not be the
    /// active one. Splits at page boundaries; hitting an unmapped or
    /// non-user page stops the copy and bytes already written stay.
    pub fn copy_to_user(&self, dest: VirtAddr, src: &[u8]) -> Result<(), MmError> {
        let mut va = dest.bits();
        let mut copied = 0;
        while copied < src.len() {
            let page = VirtAddr(va).floor().get_first_addr();
            let (ppn, _) = self
                .translate_user(page)
                .ok_or(MmError::BadUserAccess)?;
            let offset = va - page.bits();
            let n = usize::min(PAGE_SIZE - offset, src.len() - copied);
            ppn.get_bytes_array_mut()[offset..offset + n]
                .copy_from_slice(&src[copied..copied + n]);
            copied += n;
            va = page.bits() + PAGE_SIZE;
        }
        Ok(())
    }

    /// Root directory frame, the value a core loads to activate this space.
    pub fn root(&self) -> PhysPageNum {
        self.page_table.root_ppn
    }
}
