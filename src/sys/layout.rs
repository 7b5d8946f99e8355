//! Layout — peta memori tetap Trident
//!
//! Semua alamat dan ukuran yang harus disepakati kernel, loader,
//! dan program user ada di sini. Satu proses = satu slot 4 MiB
//! (dua entry directory 2 MiB), selalu terlihat di `USER_BASE`.

// ---------------------------------------------------------------------------
// Proses & terminal
// ---------------------------------------------------------------------------

pub const MAX_PROCS:     usize = 6;
pub const NUM_TERMINALS: usize = 3;

// ---------------------------------------------------------------------------
// Slot proses
// ---------------------------------------------------------------------------

pub const PAGE_SIZE:       u64 = 4096;
pub const HUGE_PAGE_SIZE:  u64 = 2 << 20;
pub const SLOT_SIZE:       u64 = 4 << 20;
pub const ENTRIES_PER_SLOT: usize = (SLOT_SIZE / HUGE_PAGE_SIZE) as usize;

/// Base virtual slot user (128 MiB)
pub const USER_BASE: u64 = 0x0800_0000;

/// Offset image program di dalam slot
pub const LOAD_OFFSET: u64 = 0x48000;
pub const PROGRAM_IMAGE: u64 = USER_BASE + LOAD_OFFSET;
pub const MAX_IMAGE_SIZE: usize = (SLOT_SIZE - LOAD_OFFSET) as usize;

pub const USER_STACK_TOP: u64 = USER_BASE + SLOT_SIZE - 8;

/// Halaman video yang diberikan oleh vidmap (132 MiB)
pub const USER_VIDEO: u64 = 0x0840_0000;

/// Base fisik default region slot; dipindah saat boot kalau memory map menolak
pub const DEFAULT_SLOT_BASE: u64 = 8 << 20;
pub const SLOT_REGION_SIZE:  u64 = SLOT_SIZE * MAX_PROCS as u64;

// ---------------------------------------------------------------------------
// Kernel stack per pid
// ---------------------------------------------------------------------------

pub const KERNEL_STACK_SIZE: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

pub const VGA_PHYS: u64 = 0xB8000;

/// Halaman cadangan milik terminal `t` (di belakang layar)
pub const fn backing_page(t: usize) -> u64 {
    VGA_PHYS + PAGE_SIZE * (t as u64 + 1)
}

// ---------------------------------------------------------------------------
// Indeks tabel
// ---------------------------------------------------------------------------

/// Indeks entry directory (level 2) untuk alamat di GiB pertama
pub const fn directory_index(virt: u64) -> usize {
    ((virt >> 21) & 0x1FF) as usize
}

/// Indeks entry level 1 untuk alamat virtual
pub const fn table_index(virt: u64) -> usize {
    ((virt >> 12) & 0x1FF) as usize
}

pub const USER_DIRECTORY_INDEX: usize = directory_index(USER_BASE);
pub const USER_VIDEO_DIRECTORY_INDEX: usize = directory_index(USER_VIDEO);

/// `[addr, addr + len)` seluruhnya ada di dalam slot user
pub fn in_user_slot(addr: u64, len: u64) -> bool {
    match addr.checked_add(len) {
        Some(end) => addr >= USER_BASE && end <= USER_BASE + SLOT_SIZE,
        None => false,
    }
}
