//! mem — memori fisik dan page table
//!
//! Bootloader memetakan seluruh memori fisik di `phys_mem_offset`.
//! Di atasnya ada dua hal:
//!   - region slot: 6 × 4 MiB berurutan, disisihkan dari allocator
//!   - frame allocator sederhana (bump) untuk page table kernel

pub mod mapper;
pub mod paging;

use crate::sys::layout::{DEFAULT_SLOT_BASE, HUGE_PAGE_SIZE, SLOT_REGION_SIZE};
use crate::{klog, kwarn};

use bootloader::bootinfo::{MemoryMap, MemoryRegionType};
use bootloader::BootInfo;
use core::ops::Range;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;
use x86_64::structures::paging::{FrameAllocator, PhysFrame, Size4KiB};
use x86_64::{align_up, PhysAddr, VirtAddr};

static PHYS_MEM_OFFSET: AtomicU64 = AtomicU64::new(0);

pub fn phys_mem_offset() -> VirtAddr {
    VirtAddr::new(PHYS_MEM_OFFSET.load(Ordering::Relaxed))
}

pub fn phys_to_virt(addr: PhysAddr) -> VirtAddr {
    phys_mem_offset() + addr.as_u64()
}

// ---------------------------------------------------------------------------
// Region slot
// ---------------------------------------------------------------------------

/// Cari base fisik untuk semua slot di antara region `[start, end)` yang usable.
///
/// Base pertama yang rata 2 MiB, tidak di bawah `DEFAULT_SLOT_BASE`, dan
/// muat 6 slot di dalam satu region.
pub fn find_slot_region<I>(usable: I) -> Option<u64>
where
    I: Iterator<Item = (u64, u64)>,
{
    usable
        .map(|(start, end)| (align_up(start.max(DEFAULT_SLOT_BASE), HUGE_PAGE_SIZE), end))
        .find(|&(base, end)| base.checked_add(SLOT_REGION_SIZE).is_some_and(|top| top <= end))
        .map(|(base, _)| base)
}

fn usable_regions(map: &'static MemoryMap) -> impl Iterator<Item = (u64, u64)> {
    map.iter()
        .filter(|r| r.region_type == MemoryRegionType::Usable)
        .map(|r| (r.range.start_addr(), r.range.end_addr()))
}

// ---------------------------------------------------------------------------
// Frame allocator
// ---------------------------------------------------------------------------

pub struct BootInfoFrameAllocator {
    memory_map: &'static MemoryMap,
    reserved:   Range<u64>,
    next:       usize,
}

impl BootInfoFrameAllocator {
    /// # Safety
    /// `memory_map` harus benar; frame Usable belum dipakai siapa pun.
    pub unsafe fn new(memory_map: &'static MemoryMap, reserved: Range<u64>) -> Self {
        Self { memory_map, reserved, next: 0 }
    }

    fn usable_frames(&self) -> impl Iterator<Item = PhysFrame> + '_ {
        usable_regions(self.memory_map)
            .flat_map(|(start, end)| (start..end).step_by(4096))
            .filter(move |addr| !self.reserved.contains(addr))
            .map(|addr| PhysFrame::containing_address(PhysAddr::new(addr)))
    }
}

unsafe impl FrameAllocator<Size4KiB> for BootInfoFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame> {
        let frame = self.usable_frames().nth(self.next);
        self.next += 1;
        frame
    }
}

static ALLOCATOR: Mutex<Option<BootInfoFrameAllocator>> = Mutex::new(None);
static SLOT_BASE: AtomicU64 = AtomicU64::new(DEFAULT_SLOT_BASE);

pub fn with_frame_allocator<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut BootInfoFrameAllocator) -> R,
{
    ALLOCATOR.lock().as_mut().map(f)
}

/// Base fisik region slot yang dipilih saat boot
pub fn slot_base() -> PhysAddr {
    PhysAddr::new(SLOT_BASE.load(Ordering::Relaxed))
}

pub fn init(boot_info: &'static BootInfo) {
    PHYS_MEM_OFFSET.store(boot_info.physical_memory_offset, Ordering::Relaxed);

    let map = &boot_info.memory_map;
    let total: u64 = usable_regions(map).map(|(start, end)| end - start).sum();
    klog!("MEM: {} KB usable", total >> 10);

    let base = match find_slot_region(usable_regions(map)) {
        Some(base) => base,
        None => {
            kwarn!("MEM: no room for process slots, using {:#x}", DEFAULT_SLOT_BASE);
            DEFAULT_SLOT_BASE
        }
    };
    SLOT_BASE.store(base, Ordering::Relaxed);
    klog!("MEM: process slots at {:#x}..{:#x}", base, base + SLOT_REGION_SIZE);

    let allocator = unsafe { BootInfoFrameAllocator::new(map, base..base + SLOT_REGION_SIZE) };
    *ALLOCATOR.lock() = Some(allocator);
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1 << 20;

    #[test]
    fn default_base_used_when_free() {
        let regions = [(0x10_0000, 0x20_0000), (4 * MB, 64 * MB)];
        assert_eq!(find_slot_region(regions.iter().copied()), Some(DEFAULT_SLOT_BASE));
    }

    #[test]
    fn falls_back_to_aligned_base() {
        // Region pertama terlalu kecil; base kedua dibulatkan ke 2 MiB
        let regions = [(0, 4 * MB), (50 * MB + 4096, 90 * MB)];
        assert_eq!(find_slot_region(regions.iter().copied()), Some(52 * MB));
    }

    #[test]
    fn never_below_default_base() {
        let regions = [(2 * MB, 40 * MB)];
        assert_eq!(find_slot_region(regions.iter().copied()), Some(DEFAULT_SLOT_BASE));
    }

    #[test]
    fn none_when_too_small() {
        let regions = [(0, 16 * MB), (20 * MB, 40 * MB)];
        assert_eq!(find_slot_region(regions.iter().copied()), None);
    }
}
