//! Paging — jalan dari CR3 ke tabel yang dipegang `Mapper`
//!
//! Bootloader sudah memetakan kernel di GiB pertama dengan halaman 4 KiB.
//! Di sini kita hanya mencari (atau membuat) tabel level 2 untuk GiB itu,
//! tabel level 1 yang menaungi VGA, dan satu tabel level 1 baru untuk
//! halaman video user.

use super::{phys_to_virt, with_frame_allocator};
use crate::sys::layout::{directory_index, VGA_PHYS};

use core::fmt;
use x86_64::registers::control::Cr3;
use x86_64::structures::paging::{FrameAllocator, PageTable, PageTableFlags, PhysFrame};
use x86_64::PhysAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    OutOfFrames,
    /// Entry yang seharusnya menunjuk tabel ternyata huge page
    HugePage(usize),
}

impl fmt::Display for PagingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PagingError::OutOfFrames  => write!(f, "out of physical frames"),
            PagingError::HugePage(lv) => write!(f, "level {} entry is a huge page", lv),
        }
    }
}

/// Ambil pointer ke active page table dari register CR3
pub unsafe fn active_page_table() -> &'static mut PageTable {
    let (frame, _) = Cr3::read();
    create_page_table_from_frame(frame)
}

/// Tabel dari frame fisik, lewat peta memori fisik bootloader
pub unsafe fn create_page_table_from_frame(frame: PhysFrame) -> &'static mut PageTable {
    let virt = phys_to_virt(frame.start_address());
    &mut *virt.as_mut_ptr()
}

const TABLE_FLAGS: PageTableFlags = PageTableFlags::from_bits_truncate(
    PageTableFlags::PRESENT.bits()
    | PageTableFlags::WRITABLE.bits()
    | PageTableFlags::USER_ACCESSIBLE.bits()
);

fn allocate_table() -> Result<(&'static mut PageTable, PhysAddr), PagingError> {
    let frame = with_frame_allocator(|fa| fa.allocate_frame())
        .flatten()
        .ok_or(PagingError::OutOfFrames)?;
    let table = unsafe { create_page_table_from_frame(frame) };
    table.zero();
    Ok((table, frame.start_address()))
}

/// Tabel di bawah `table[index]`; dibuat kalau belum ada.
///
/// Entry yang sudah ada ikut diberi USER_ACCESSIBLE supaya slot user
/// di bawahnya bisa diakses dari ring 3.
unsafe fn next_table(
    table: &mut PageTable,
    index: usize,
    level: usize,
) -> Result<&'static mut PageTable, PagingError> {
    let entry = &mut table[index];
    if entry.flags().contains(PageTableFlags::HUGE_PAGE) {
        return Err(PagingError::HugePage(level));
    }
    if entry.is_unused() {
        let (_, phys) = allocate_table()?;
        entry.set_addr(phys, TABLE_FLAGS);
    } else {
        entry.set_flags(entry.flags() | TABLE_FLAGS);
    }
    let frame = PhysFrame::containing_address(entry.addr());
    Ok(create_page_table_from_frame(frame))
}

pub struct KernelTables {
    pub directory:       &'static mut PageTable,
    pub video:           &'static mut PageTable,
    pub user_video:      &'static mut PageTable,
    pub user_video_phys: PhysAddr,
}

/// # Safety
/// Dipanggil sekali, setelah `mem::init`, sebelum ada proses user.
pub unsafe fn kernel_tables() -> Result<KernelTables, PagingError> {
    let p4 = active_page_table();
    let p3 = next_table(p4, 0, 4)?;
    let directory = next_table(p3, 0, 3)?;
    let video = next_table(directory, directory_index(VGA_PHYS), 2)?;
    let (user_video, user_video_phys) = allocate_table()?;

    Ok(KernelTables { directory, video, user_video, user_video_phys })
}
