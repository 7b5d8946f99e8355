//! arch — x86_64 hardware abstraction layer
//!
//! Berisi semua komponen yang berhubungan langsung dengan arsitektur x86_64:
//!   - GDT (Global Descriptor Table) dan TSS
//!   - IDT (Interrupt Descriptor Table), exception, IRQ, gate int 0x80
//!   - CPU utilities
//!   - PIC (Programmable Interrupt Controller)

pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod pic;
