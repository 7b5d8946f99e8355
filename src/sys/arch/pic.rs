//! PIC — Programmable Interrupt Controller (Intel 8259)
//!
//! Dua PIC yang dirangkai (master + slave). Trident memakai IRQ 0
//! (PIT), IRQ 1 (keyboard), IRQ 2 (cascade), dan IRQ 8 (RTC).

use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;

/// Offset IRQ di IDT (IRQ 0-7 → vektor 32-39, IRQ 8-15 → vektor 40-47)
pub const PIC_MASTER_OFFSET: u8 = 32;
pub const PIC_SLAVE_OFFSET:  u8 = PIC_MASTER_OFFSET + 8;

/// Bit 1 = IRQ dimatikan
const MASTER_MASK: u8 = !0b0000_0111;
const SLAVE_MASK:  u8 = !0b0000_0001;

/// Instance PIC global
pub static PICS: Mutex<ChainedPics> = Mutex::new(unsafe {
    ChainedPics::new(PIC_MASTER_OFFSET, PIC_SLAVE_OFFSET)
});

/// Inisialisasi PIC; interrupt CPU baru menyala saat masuk ring 3
pub fn init() {
    unsafe {
        PICS.lock().initialize();
        Port::<u8>::new(0x21).write(MASTER_MASK);
        Port::<u8>::new(0xA1).write(SLAVE_MASK);
    }
}

/// Konversi nomor IRQ ke vektor IDT
pub fn irq_vector(irq: u8) -> u8 {
    PIC_MASTER_OFFSET + irq
}

pub fn end_of_interrupt(irq: u8) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(irq_vector(irq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_irqs_are_unmasked() {
        for irq in [0u8, 1, 2] {
            assert_eq!(MASTER_MASK & (1 << irq), 0);
        }
        assert_eq!(SLAVE_MASK & 1, 0);
        assert_eq!(irq_vector(8), PIC_SLAVE_OFFSET);
    }
}
