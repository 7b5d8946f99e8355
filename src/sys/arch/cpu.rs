//! CPU — identitas prosesor dan loop idle

use crate::klog;

use raw_cpuid::CpuId;
use x86_64::instructions::{hlt, interrupts};

pub fn init() {
    let cpuid = CpuId::new();
    if let Some(vendor) = cpuid.get_vendor_info() {
        klog!("cpu: vendor {}", vendor.as_str());
    }
    if let Some(brand) = cpuid.get_processor_brand_string() {
        klog!("cpu: {}", brand.as_str().trim());
    }
}

/// Tunggu interrupt selamanya (interrupt tidak diubah)
pub fn hlt_loop() -> ! {
    loop {
        hlt();
    }
}

/// Seperti `hlt_loop`, tapi interrupt dinyalakan supaya timer tetap jalan
pub fn idle() -> ! {
    loop {
        interrupts::enable_and_hlt();
    }
}
