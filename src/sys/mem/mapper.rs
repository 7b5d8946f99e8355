//! Mapper — pemetaan slot proses dan halaman video
//!
//! Tiga tabel dipegang di sini:
//!   directory  — level 2 untuk GiB pertama; entry 64..66 = slot user
//!   video      — level 1 untuk jendela VGA kernel (0xB8000)
//!   user_video — level 1 milik kernel, dipasang di `USER_VIDEO`
//!
//! Hanya satu slot yang terlihat di `USER_BASE` pada satu waktu:
//! slot milik proses yang sedang dijadwalkan.

use crate::sys::layout::{
    backing_page, directory_index, table_index, ENTRIES_PER_SLOT, HUGE_PAGE_SIZE, MAX_PROCS,
    NUM_TERMINALS, PAGE_SIZE, SLOT_SIZE, USER_DIRECTORY_INDEX, USER_VIDEO, VGA_PHYS,
};
use crate::sys::proc::process::Pid;
use crate::kwarn;

use core::fmt;
use x86_64::structures::paging::{PageTable, PageTableFlags as Flags};
use x86_64::PhysAddr;

/// Siapa pun yang bisa membuang isi TLB
pub trait Tlb {
    fn flush_tlb(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    InvalidPid(usize),
    InvalidTerminal(usize),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MapError::InvalidPid(pid)    => write!(f, "pid {} has no slot", pid),
            MapError::InvalidTerminal(t) => write!(f, "terminal {} does not exist", t),
        }
    }
}

/// Halaman fisik yang sedang dipakai terminal untuk menulis layar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoBinding {
    /// Buffer VGA yang sedang tampil
    Live,
    /// Halaman cadangan terminal di belakang layar
    Backing(usize),
}

impl VideoBinding {
    pub fn for_terminal(terminal: usize, visible: bool) -> Self {
        if visible { VideoBinding::Live } else { VideoBinding::Backing(terminal) }
    }

    pub fn phys(self) -> PhysAddr {
        match self {
            VideoBinding::Live       => PhysAddr::new(VGA_PHYS),
            VideoBinding::Backing(t) => PhysAddr::new(backing_page(t)),
        }
    }
}

const SLOT_FLAGS: Flags = Flags::from_bits_truncate(
    Flags::PRESENT.bits()
    | Flags::WRITABLE.bits()
    | Flags::USER_ACCESSIBLE.bits()
    | Flags::HUGE_PAGE.bits()
);

const TABLE_FLAGS: Flags = Flags::from_bits_truncate(
    Flags::PRESENT.bits()
    | Flags::WRITABLE.bits()
    | Flags::USER_ACCESSIBLE.bits()
);

const VIDEO_FLAGS: Flags = Flags::from_bits_truncate(
    Flags::PRESENT.bits()
    | Flags::WRITABLE.bits()
    | Flags::NO_CACHE.bits()
);

const USER_VIDEO_FLAGS: Flags = Flags::from_bits_truncate(
    VIDEO_FLAGS.bits() | Flags::USER_ACCESSIBLE.bits()
);

/// Bit yang diset CPU sendiri; tidak ikut dibandingkan
const HW_BITS: Flags = Flags::from_bits_truncate(
    Flags::ACCESSED.bits() | Flags::DIRTY.bits()
);

pub struct Mapper<'a> {
    directory:       &'a mut PageTable,
    video:           &'a mut PageTable,
    user_video:      &'a mut PageTable,
    user_video_phys: PhysAddr,
    slot_base:       PhysAddr,
    binding:         VideoBinding,
}

impl<'a> Mapper<'a> {
    pub fn new(
        directory:       &'a mut PageTable,
        video:           &'a mut PageTable,
        user_video:      &'a mut PageTable,
        user_video_phys: PhysAddr,
        slot_base:       PhysAddr,
    ) -> Self {
        Self { directory, video, user_video, user_video_phys, slot_base, binding: VideoBinding::Live }
    }

    /// Siapkan slot (kosong), tabel video user, dan jendela VGA kernel.
    ///
    /// Region kernel sudah dipetakan oleh bootloader; yang dibangun di sini
    /// hanya bagian yang nanti ditulis ulang saat switch.
    pub fn init<T: Tlb>(&mut self, tlb: &mut T) {
        for i in 0..ENTRIES_PER_SLOT {
            self.directory[USER_DIRECTORY_INDEX + i].set_unused();
        }

        self.user_video.zero();
        self.directory[directory_index(USER_VIDEO)].set_addr(self.user_video_phys, TABLE_FLAGS);

        // Live page + satu halaman cadangan per terminal, identity, supervisor
        for page in 0..=NUM_TERMINALS as u64 {
            let phys = VGA_PHYS + page * PAGE_SIZE;
            self.video[table_index(phys)].set_addr(PhysAddr::new(phys), VIDEO_FLAGS);
        }

        self.bind(VideoBinding::Live);
        tlb.flush_tlb();
    }

    pub fn slot_base(&self) -> PhysAddr {
        self.slot_base
    }

    /// Alamat fisik slot milik `pid`
    pub fn slot_phys(&self, pid: Pid) -> Result<PhysAddr, MapError> {
        if pid.index() >= MAX_PROCS {
            return Err(MapError::InvalidPid(pid.index()));
        }
        Ok(self.slot_base + pid.index() as u64 * SLOT_SIZE)
    }

    /// Pasang (atau cabut) region fisik 4 MiB di `USER_BASE`.
    ///
    /// Alamat 0 berarti "tidak ada yang dipetakan". TLB hanya di-flush
    /// kalau ada entry yang benar-benar berubah.
    pub fn map_process_slot<T: Tlb>(&mut self, phys: PhysAddr, present: bool, tlb: &mut T) {
        if phys.is_null() {
            return;
        }

        let mut flags = SLOT_FLAGS;
        if !present {
            flags.remove(Flags::PRESENT);
        }

        let mut changed = false;
        for i in 0..ENTRIES_PER_SLOT {
            let entry = &mut self.directory[USER_DIRECTORY_INDEX + i];
            let addr  = phys + i as u64 * HUGE_PAGE_SIZE;
            if entry.addr() != addr || entry.flags() - HW_BITS != flags {
                entry.set_addr(addr, flags);
                changed = true;
            }
        }

        if changed {
            tlb.flush_tlb();
        }
    }

    pub fn map_slot<T: Tlb>(&mut self, pid: Pid, present: bool, tlb: &mut T) -> Result<(), MapError> {
        let phys = self.slot_phys(pid).map_err(|err| {
            kwarn!("Mapper: {}", err);
            err
        })?;
        self.map_process_slot(phys, present, tlb);
        Ok(())
    }

    /// Slot yang sedang terpasang di `USER_BASE`, kalau ada
    pub fn installed_slot(&self) -> Option<PhysAddr> {
        let entry = &self.directory[USER_DIRECTORY_INDEX];
        if entry.flags().contains(Flags::PRESENT) {
            Some(entry.addr())
        } else {
            None
        }
    }

    /// Arahkan jendela video kernel dan halaman video user ke live VGA
    /// (terminal yang tampil) atau ke halaman cadangan terminal.
    pub fn remap_terminal_video<T: Tlb>(
        &mut self,
        terminal: usize,
        is_foreground: bool,
        tlb: &mut T,
    ) -> Result<(), MapError> {
        if terminal >= NUM_TERMINALS {
            return Err(MapError::InvalidTerminal(terminal));
        }

        if self.bind(VideoBinding::for_terminal(terminal, is_foreground)) {
            tlb.flush_tlb();
        }
        Ok(())
    }

    pub fn binding(&self) -> VideoBinding {
        self.binding
    }

    pub fn flush<T: Tlb>(&self, tlb: &mut T) {
        tlb.flush_tlb();
    }

    fn bind(&mut self, binding: VideoBinding) -> bool {
        let phys = binding.phys();
        let kernel = &mut self.video[table_index(VGA_PHYS)];
        let user   = &mut self.user_video[table_index(USER_VIDEO)];

        let changed = kernel.addr() != phys
            || user.addr() != phys
            || user.flags() - HW_BITS != USER_VIDEO_FLAGS;

        kernel.set_addr(phys, VIDEO_FLAGS);
        user.set_addr(phys, USER_VIDEO_FLAGS);
        self.binding = binding;
        changed
    }
}
