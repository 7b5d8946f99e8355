//! Process Table — tabel PCB Trident
//!
//! PCB disimpan di arena tetap `[Pcb; MAX_PROCS]` yang diindeks pid,
//! plus satu PCB "root" (pid −1) untuk keadaan sebelum shell pertama.
//! Pid yang hidup ditandai di bitmap; PCB yang dibebaskan tidak dinolkan,
//! alokasi berikutnya menimpanya.

use crate::sys::fs::ops::{FileOps, CLOSED, STDIN, STDOUT};
use crate::sys::layout::{MAX_PROCS, NUM_TERMINALS};
use crate::sys::proc::context::Context;

use bit_field::BitField;
use core::fmt;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const MAX_FDS:       usize = 8;
pub const FIRST_FREE_FD: usize = 2;
pub const ARG_BUF_LEN:   usize = 128;

// ---------------------------------------------------------------------------
// Pid
// ---------------------------------------------------------------------------

/// Indeks proses. `Option<Pid>` dipakai di mana pun root (−1) boleh muncul.
///
/// Nilai di luar `0..MAX_PROCS` bisa dibentuk, tapi setiap accessor
/// memeriksa batasnya.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(usize);

impl Pid {
    pub const fn new(index: usize) -> Self {
        Pid(index)
    }

    /// −1 = root, 0.. = proses
    pub fn from_raw(raw: i32) -> Result<Option<Pid>, ProcError> {
        match raw {
            -1 => Ok(None),
            n if n >= 0 && (n as usize) < MAX_PROCS => Ok(Some(Pid(n as usize))),
            n => Err(ProcError::InvalidPid(n)),
        }
    }

    pub fn as_raw(pid: Option<Pid>) -> i32 {
        pid.map_or(-1, |p| p.0 as i32)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    TableFull,
    InvalidPid(i32),
    NotLive(Pid),
    NoFreeDescriptor,
    BadDescriptor(usize),
    ArgsTooLong,
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProcError::TableFull         => write!(f, "process table full"),
            ProcError::InvalidPid(pid)   => write!(f, "pid {} out of range", pid),
            ProcError::NotLive(pid)      => write!(f, "pid {} is not running", pid),
            ProcError::NoFreeDescriptor  => write!(f, "no free file descriptor"),
            ProcError::BadDescriptor(fd) => write!(f, "fd {} cannot be used here", fd),
            ProcError::ArgsTooLong       => write!(f, "argument string longer than {} bytes", ARG_BUF_LEN),
        }
    }
}

// ---------------------------------------------------------------------------
// File descriptor
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
pub struct FdEntry {
    pub ops:      &'static dyn FileOps,
    pub inode:    u32,
    pub position: u32,
    /// Tick RTC yang ditunggu read berikutnya
    pub wake_at:  Option<u64>,
    pub in_use:   bool,
}

impl FdEntry {
    pub const fn closed() -> Self {
        Self { ops: &CLOSED, inode: 0, position: 0, wake_at: None, in_use: false }
    }

    pub const fn bound(ops: &'static dyn FileOps) -> Self {
        Self { ops, inode: 0, position: 0, wake_at: None, in_use: true }
    }
}

impl fmt::Debug for FdEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FdEntry")
            .field("ops", &self.ops.name())
            .field("inode", &self.inode)
            .field("position", &self.position)
            .field("in_use", &self.in_use)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Argument buffer
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
pub struct ArgBuffer {
    bytes: [u8; ARG_BUF_LEN],
    len:   usize,
}

impl ArgBuffer {
    pub const fn empty() -> Self {
        Self { bytes: [0; ARG_BUF_LEN], len: 0 }
    }

    pub fn set(&mut self, args: &[u8]) -> Result<(), ProcError> {
        if args.len() > ARG_BUF_LEN {
            return Err(ProcError::ArgsTooLong);
        }
        self.bytes[..args.len()].copy_from_slice(args);
        self.len = args.len();
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ---------------------------------------------------------------------------
// PCB
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Konteks tersimpan di `Pcb::context`, menunggu dijadwalkan lagi
    Suspended,
}

pub struct Pcb {
    pub pid:          Option<Pid>,
    pub terminal:     usize,
    pub parent:       Option<Pid>,
    /// Disimpan oleh scheduler saat proses ditinggalkan
    pub context:      Context,
    pub state:        RunState,
    /// Titik kembali execute milik parent; dipakai halt
    pub exec_return:  Context,
    pub fds:          [FdEntry; MAX_FDS],
    pub args:         ArgBuffer,
    /// Status yang dititipkan halt anak untuk execute yang menunggu
    pub child_status: Option<i32>,
}

impl Pcb {
    const fn empty() -> Self {
        Self {
            pid:          None,
            terminal:     0,
            parent:       None,
            context:      Context::zero(),
            state:        RunState::Suspended,
            exec_return:  Context::zero(),
            fds:          [FdEntry::closed(); MAX_FDS],
            args:         ArgBuffer::empty(),
            child_status: None,
        }
    }

    /// Isi ulang PCB untuk proses baru: stdin/stdout terikat, sisanya kosong
    pub fn reset(&mut self, pid: Pid, terminal: usize, parent: Option<Pid>, args: &[u8]) -> Result<(), ProcError> {
        self.args.set(args)?;
        self.pid          = Some(pid);
        self.terminal     = terminal;
        self.parent       = parent;
        self.context      = Context::zero();
        self.exec_return  = Context::zero();
        self.state        = RunState::Running;
        self.child_status = None;
        self.fds          = [FdEntry::closed(); MAX_FDS];
        self.fds[0]       = FdEntry::bound(&STDIN);
        self.fds[1]       = FdEntry::bound(&STDOUT);
        Ok(())
    }

    /// Tandai descriptor bebas pertama (2..8) sebagai terpakai
    pub fn open_slot(&mut self) -> Result<usize, ProcError> {
        for fd in FIRST_FREE_FD..MAX_FDS {
            if !self.fds[fd].in_use {
                self.fds[fd] = FdEntry::closed();
                self.fds[fd].in_use = true;
                return Ok(fd);
            }
        }
        Err(ProcError::NoFreeDescriptor)
    }

    pub fn close_slot(&mut self, fd: usize) -> Result<(), ProcError> {
        if !(FIRST_FREE_FD..MAX_FDS).contains(&fd) || !self.fds[fd].in_use {
            return Err(ProcError::BadDescriptor(fd));
        }
        self.fds[fd] = FdEntry::closed();
        Ok(())
    }

    /// Descriptor yang sedang terpakai
    pub fn fd_mut(&mut self, fd: usize) -> Result<&mut FdEntry, ProcError> {
        match self.fds.get_mut(fd) {
            Some(entry) if entry.in_use => Ok(entry),
            _ => Err(ProcError::BadDescriptor(fd)),
        }
    }

    pub fn free_fd_count(&self) -> usize {
        self.fds[FIRST_FREE_FD..].iter().filter(|fd| !fd.in_use).count()
    }
}

// ---------------------------------------------------------------------------
// Process Table
// ---------------------------------------------------------------------------

pub struct ProcessTable {
    in_use:     u8,
    count:      usize,
    blocks:     [Pcb; MAX_PROCS],
    root:       Pcb,
    foreground: [Option<Pid>; NUM_TERMINALS],
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            in_use:     0,
            count:      0,
            blocks:     [const { Pcb::empty() }; MAX_PROCS],
            root:       Pcb::empty(),
            foreground: [None; NUM_TERMINALS],
        }
    }

    pub fn init(&mut self) {
        self.in_use     = 0;
        self.count      = 0;
        self.foreground = [None; NUM_TERMINALS];
        self.root       = Pcb::empty();
        self.root.state = RunState::Running;
    }

    /// Pid bebas terkecil
    pub fn allocate_pid(&mut self) -> Option<Pid> {
        let index = (0..MAX_PROCS).find(|&i| !self.in_use.get_bit(i))?;
        self.in_use.set_bit(index, true);
        self.count += 1;
        Some(Pid(index))
    }

    pub fn free_pid(&mut self, pid: Pid) {
        if self.is_live(pid) {
            self.in_use.set_bit(pid.0, false);
            self.count -= 1;
        }
    }

    pub fn is_live(&self, pid: Pid) -> bool {
        pid.0 < MAX_PROCS && self.in_use.get_bit(pid.0)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// PCB milik `pid` (root kalau `None`); `None` kalau di luar arena
    pub fn pcb_for(&self, pid: Option<Pid>) -> Option<&Pcb> {
        match pid {
            None      => Some(&self.root),
            Some(pid) => self.blocks.get(pid.0),
        }
    }

    pub fn pcb_for_mut(&mut self, pid: Option<Pid>) -> Option<&mut Pcb> {
        match pid {
            None      => Some(&mut self.root),
            Some(pid) => self.blocks.get_mut(pid.0),
        }
    }

    /// Seperti `pcb_for_mut`, tapi pid harus hidup
    pub fn live_pcb_mut(&mut self, pid: Pid) -> Result<&mut Pcb, ProcError> {
        if !self.is_live(pid) {
            return Err(ProcError::NotLive(pid));
        }
        Ok(&mut self.blocks[pid.0])
    }

    /// Pointer konteks `from` dan `to` sekaligus, untuk primitive switch
    pub fn context_ptrs(&mut self, from: Option<Pid>, to: Option<Pid>) -> Option<(*mut Context, *const Context)> {
        let to_ptr = &self.pcb_for(to)?.context as *const Context;
        let from_ptr = &mut self.pcb_for_mut(from)?.context as *mut Context;
        Some((from_ptr, to_ptr))
    }

    pub fn foreground(&self, terminal: usize) -> Option<Pid> {
        self.foreground.get(terminal).copied().flatten()
    }

    pub fn set_foreground(&mut self, terminal: usize, pid: Option<Pid>) {
        if let Some(slot) = self.foreground.get_mut(terminal) {
            *slot = pid;
        }
    }
}
