//! RTC — periodic interrupt CMOS (IRQ 8) dan virtualisasinya
//!
//! Hardware selalu berdetak 1024 Hz. Setiap fd RTC punya frekuensi
//! virtual sendiri (2..=1024, pangkat dua) dan read menunggu sampai
//! kelipatan 1024/frekuensi tick berikutnya.

use crate::sys::arch::idt;
use crate::sys::kernel;

use x86_64::instructions::{interrupts, port::Port};

pub const RTC_HZ: u32 = 1024;
pub const DEFAULT_VIRTUAL_HZ: u32 = 2;

/// Rate divider CMOS untuk 1024 Hz: 32768 >> (6 - 1)
const RATE_1024HZ: u8 = 6;

const CMOS_ADDR: u16 = 0x70;
const CMOS_DATA: u16 = 0x71;
const NMI_DISABLE: u8 = 0x80;

const REG_A: u8 = 0x0A;
const REG_B: u8 = 0x0B;
const REG_C: u8 = 0x0C;

/// Penghitung tick hardware
pub struct Rtc {
    ticks: u64,
}

impl Rtc {
    pub const fn new() -> Self {
        Self { ticks: 0 }
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

pub fn valid_rate(hz: u32) -> bool {
    hz.is_power_of_two() && (2..=RTC_HZ).contains(&hz)
}

/// Tick hardware berikutnya (setelah `now`) yang jatuh pada detak virtual `hz`
pub fn next_deadline(now: u64, hz: u32) -> u64 {
    let interval = (RTC_HZ / hz.clamp(2, RTC_HZ)) as u64;
    (now / interval + 1) * interval
}

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

fn cmos_read(reg: u8) -> u8 {
    unsafe {
        let mut addr: Port<u8> = Port::new(CMOS_ADDR);
        let mut data: Port<u8> = Port::new(CMOS_DATA);
        addr.write(NMI_DISABLE | reg);
        data.read()
    }
}

fn cmos_write(reg: u8, value: u8) {
    unsafe {
        let mut addr: Port<u8> = Port::new(CMOS_ADDR);
        let mut data: Port<u8> = Port::new(CMOS_DATA);
        addr.write(NMI_DISABLE | reg);
        data.write(value);
    }
}

/// Nyalakan periodic interrupt 1024 Hz
pub fn init() {
    interrupts::without_interrupts(|| {
        let a = cmos_read(REG_A);
        cmos_write(REG_A, (a & 0xF0) | RATE_1024HZ);
        let b = cmos_read(REG_B);
        cmos_write(REG_B, b | 0x40);
        cmos_read(REG_C);
    });
    idt::set_irq_handler(8, on_irq);
}

fn on_irq() {
    // Register C harus dibaca, kalau tidak IRQ 8 tidak datang lagi
    cmos_read(REG_C);
    kernel::try_with_kernel(|k| k.rtc.tick());
}
