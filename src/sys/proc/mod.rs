//! proc — process management
//!
//! Berisi semua komponen yang berhubungan dengan manajemen proses:
//!   - process: PCB, fd, tabel proses
//!   - context: simpan/pulihkan konteks, transisi ke ring 3
//!   - exec:    execute dan halt
//!   - sched:   round-robin antar terminal, context switch

pub mod context;
pub mod exec;
pub mod process;
pub mod sched;

#[cfg(test)]
pub mod mock;
