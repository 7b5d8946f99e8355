//! Trident — kernel x86_64 kecil dengan tiga terminal
//!
//! Kernel, bukan host: build biasa memakai `no_std`. `cargo test`
//! menjalankan inti (tabel proses, scheduler, filesystem, terminal)
//! di host dengan platform tiruan.

#![cfg_attr(not(test), no_std)]
#![feature(abi_x86_interrupt)]

pub mod sys;

use bootloader::BootInfo;

/// Urutan init: tabel CPU, memori, lalu perangkat.
///
/// Interrupt tetap mati; iretq ke shell pertama yang menyalakannya.
pub fn init(boot_info: &'static BootInfo) {
    sys::gdt::init();
    sys::idt::init();
    sys::pic::init();
    sys::cpu::init();
    sys::mem::init(boot_info);
    sys::clk::init();
    sys::clk::rtc::init();
    sys::keyboard::init();
    crate::klog!("init: done");
}

pub fn hlt_loop() -> ! {
    sys::cpu::hlt_loop()
}
