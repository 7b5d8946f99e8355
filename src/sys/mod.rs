//! sys — subsistem kernel Trident
//!
//! Struktur:
//!   arch/    — x86_64: gdt, idt, cpu, pic
//!   clk/     — PIT dan RTC
//!   debug/   — logging lewat serial
//!   fs/      — filesystem read-only dan tabel operasi fd
//!   mem/     — region slot, page table, mapper
//!   proc/    — proses: PCB, context, execute/halt, scheduler
//!   syscall/ — gerbang int 0x80
//!
//! `kernel` menyatukan semuanya dalam satu struct di balik lock.

pub mod arch;
pub mod clk;
pub mod debug;
pub mod fs;
pub mod kernel;
pub mod keyboard;
pub mod layout;
pub mod mem;
pub mod proc;
pub mod syscall;
pub mod term;
pub mod vga;

// Jalur pendek yang sering dipakai
pub use arch::{cpu, gdt, idt, pic};
pub use debug::serial;
