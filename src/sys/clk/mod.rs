//! Clock — timer Trident
//!
//! Menyediakan:
//!   - PIT (IRQ 0), 1000 Hz: uptime dan detak scheduler
//!   - rtc: periodic interrupt CMOS untuk file RTC

pub mod rtc;

use crate::sys::arch::idt;
use crate::sys::proc::sched;

use core::sync::atomic::{AtomicU64, Ordering};
use x86_64::instructions::port::Port;

// ---------------------------------------------------------------------------
// PIT Timer (IRQ 0)
// ---------------------------------------------------------------------------

/// Tick per detik
pub const TICKS_PER_SEC: u64 = 1000;

const PIT_HZ: u32 = 1_193_182;

static TICK_COUNT: AtomicU64 = AtomicU64::new(0);

/// Divisor 16-bit untuk channel 0; 0 di hardware berarti 65536
pub fn pit_divisor(hz: u32) -> u16 {
    match PIT_HZ / hz.max(1) {
        0 => 1,
        d if d > u16::MAX as u32 => 0,
        d => d as u16,
    }
}

pub fn init() {
    let divisor = pit_divisor(TICKS_PER_SEC as u32);
    unsafe {
        let mut cmd: Port<u8> = Port::new(0x43);
        let mut ch0: Port<u8> = Port::new(0x40);
        cmd.write(0x36); // channel 0, lobyte/hibyte, mode 3
        ch0.write((divisor & 0xFF) as u8);
        ch0.write((divisor >> 8) as u8);
    }

    idt::set_irq_handler(0, on_tick);
}

fn on_tick() {
    let ticks = TICK_COUNT.fetch_add(1, Ordering::Relaxed) + 1;
    // Bisa tidak kembali sampai proses ini dijadwalkan lagi
    sched::tick(ticks);
}

/// Waktu sejak PIT mulai berdetak, dalam milidetik
pub fn uptime_ms() -> u64 {
    TICK_COUNT.load(Ordering::Relaxed) * 1000 / TICKS_PER_SEC
}
