//! GDT — Global Descriptor Table
//!
//! Mendefinisikan segmen kernel dan userspace, serta Task State Segment.
//! RSP0 di TSS ditulis ulang setiap kali proses lain dijadwalkan, supaya
//! interrupt dari ring 3 mendarat di kernel stack milik proses itu.

use core::ptr::{addr_of, addr_of_mut};
use lazy_static::lazy_static;
use x86_64::instructions::segmentation::{CS, DS, Segment};
use x86_64::instructions::tables::load_tss;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

/// Ukuran stack IST dan stack ring-0 sebelum proses pertama (20 KB)
const IST_STACK_SIZE: usize = 20 * 1024;

/// Indeks IST untuk double fault
pub const DOUBLE_FAULT_IST: u16 = 0;

static mut DOUBLE_FAULT_STACK: [u8; IST_STACK_SIZE] = [0; IST_STACK_SIZE];
static mut BOOT_RSP0_STACK:    [u8; IST_STACK_SIZE] = [0; IST_STACK_SIZE];

/// Task State Segment: CPU membacanya langsung dari memori setiap
/// privilege switch, jadi RSP0 boleh diubah setelah TSS di-load.
static mut TSS: TaskStateSegment = TaskStateSegment::new();

/// Selector segmen yang dipakai oleh kernel dan userspace
pub struct SegmentSelectors {
    pub tss:       SegmentSelector,
    pub k_code:    SegmentSelector,
    pub k_data:    SegmentSelector,
    pub u_code:    SegmentSelector,
    pub u_data:    SegmentSelector,
}

lazy_static! {
    /// GDT dan selector segmen Trident
    pub static ref GDT: (GlobalDescriptorTable, SegmentSelectors) = {
        let mut gdt = GlobalDescriptorTable::new();

        let tss    = gdt.add_entry(Descriptor::tss_segment(unsafe { &*addr_of!(TSS) }));
        let k_code = gdt.add_entry(Descriptor::kernel_code_segment());
        let k_data = gdt.add_entry(Descriptor::kernel_data_segment());
        let u_code = gdt.add_entry(Descriptor::user_code_segment());
        let u_data = gdt.add_entry(Descriptor::user_data_segment());

        (gdt, SegmentSelectors { tss, k_code, k_data, u_code, u_data })
    };
}

/// Isi TSS, load GDT dan TSS ke prosesor
pub fn init() {
    unsafe {
        let tss = &mut *addr_of_mut!(TSS);
        tss.interrupt_stack_table[DOUBLE_FAULT_IST as usize] =
            VirtAddr::from_ptr(addr_of!(DOUBLE_FAULT_STACK)) + IST_STACK_SIZE as u64;
        tss.privilege_stack_table[0] =
            VirtAddr::from_ptr(addr_of!(BOOT_RSP0_STACK)) + IST_STACK_SIZE as u64;
    }

    GDT.0.load();
    unsafe {
        CS::set_reg(GDT.1.k_code);
        DS::set_reg(GDT.1.k_data);
        load_tss(GDT.1.tss);
    }
}

/// Stack ring-0 untuk interrupt berikutnya dari userspace
pub fn set_kernel_stack(top: VirtAddr) {
    unsafe {
        (*addr_of_mut!(TSS)).privilege_stack_table[0] = top;
    }
}
