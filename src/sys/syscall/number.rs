//! Nomor syscall — harus sama persis dengan userland/trident_api

pub const HALT:        u64 = 1;
pub const EXECUTE:     u64 = 2;
pub const READ:        u64 = 3;
pub const WRITE:       u64 = 4;
pub const OPEN:        u64 = 5;
pub const CLOSE:       u64 = 6;
pub const GETARGS:     u64 = 7;
pub const VIDMAP:      u64 = 8;
pub const SET_HANDLER: u64 = 9;
pub const SIGRETURN:   u64 = 10;
