//! Kernel — satu struct yang memegang semua state Trident
//!
//! Mapper, tabel proses, scheduler, terminal, RTC, dan filesystem hidup
//! di dalam `Kernel<P>`. Instance global memakai `Hardware` dan dijaga
//! `spin::Mutex`; lock hanya diambil dengan interrupt mati.
//!
//! Operasi di sini tidak pernah melompat ke konteks lain. Yang bisa
//! "tidak kembali" (execute, halt, tick) mengembalikan rencana yang
//! dijalankan pemanggil setelah lock dilepas.

use crate::sys::clk::rtc::Rtc;
use crate::sys::fs::ops::{ops_for, Io};
use crate::sys::fs::{FileSystem, FsError};
use crate::sys::layout::{NUM_TERMINALS, USER_VIDEO};
use crate::sys::mem::mapper::{MapError, Mapper, VideoBinding};
use crate::sys::proc::context::{Hardware, Platform};
use crate::sys::proc::exec::ExecError;
use crate::sys::proc::process::{FdEntry, Pid, ProcError, ProcessTable, FIRST_FREE_FD, MAX_FDS};
use crate::sys::proc::sched::{SchedError, Scheduler};
use crate::sys::term::{Key, Terminals};
use crate::{klog, kwarn};

use core::fmt;
use spin::Mutex;
use x86_64::instructions::interrupts;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Semua alasan syscall gagal; glue syscall mengubahnya menjadi −1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysError {
    NoProcess,
    BadAddress,
    NoArgs,
    Unsupported(u64),
    Proc(ProcError),
    Fs(FsError),
    Exec(ExecError),
    Sched(SchedError),
    Map(MapError),
}

impl SysError {
    pub fn would_block(&self) -> bool {
        *self == SysError::Fs(FsError::WouldBlock)
    }
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SysError::NoProcess  => write!(f, "no process is running"),
            SysError::BadAddress => write!(f, "buffer outside the user slot"),
            SysError::NoArgs     => write!(f, "no arguments"),
            SysError::Unsupported(n) => write!(f, "unsupported call {}", n),
            SysError::Proc(err)  => write!(f, "{}", err),
            SysError::Fs(err)    => write!(f, "{}", err),
            SysError::Exec(err)  => write!(f, "{}", err),
            SysError::Sched(err) => write!(f, "{}", err),
            SysError::Map(err)   => write!(f, "{}", err),
        }
    }
}

impl From<ProcError> for SysError {
    fn from(err: ProcError) -> Self {
        SysError::Proc(err)
    }
}

impl From<FsError> for SysError {
    fn from(err: FsError) -> Self {
        SysError::Fs(err)
    }
}

impl From<ExecError> for SysError {
    fn from(err: ExecError) -> Self {
        SysError::Exec(err)
    }
}

impl From<SchedError> for SysError {
    fn from(err: SchedError) -> Self {
        SysError::Sched(err)
    }
}

impl From<MapError> for SysError {
    fn from(err: MapError) -> Self {
        SysError::Map(err)
    }
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

pub struct Kernel<P: Platform> {
    pub(crate) platform: P,
    pub(crate) mapper:   Mapper<'static>,
    pub(crate) procs:    ProcessTable,
    pub(crate) sched:    Scheduler,
    pub(crate) terms:    Terminals,
    pub(crate) rtc:      Rtc,
    pub(crate) fs:       &'static dyn FileSystem,
}

impl<P: Platform> Kernel<P> {
    pub fn new(platform: P, mapper: Mapper<'static>, fs: &'static dyn FileSystem) -> Self {
        Self {
            platform,
            mapper,
            procs: ProcessTable::new(),
            sched: Scheduler::new(),
            terms: Terminals::new(),
            rtc:   Rtc::new(),
            fs,
        }
    }

    /// Tabel proses kosong, terminal bersih, slot user belum terpasang
    pub fn init(&mut self) {
        self.procs.init();
        self.terms.init();
        self.sched.set_current(None, 0);
        self.mapper.init(&mut self.platform);
    }

    pub fn current(&self) -> Option<Pid> {
        self.sched.current()
    }

    fn current_pid(&self) -> Result<Pid, SysError> {
        self.sched.current().ok_or(SysError::NoProcess)
    }

    /// `Io` untuk terminal `terminal` plus tabel proses, dipinjam bersamaan
    pub(crate) fn io_and_procs(&mut self, terminal: usize) -> (Io<'_>, &mut ProcessTable) {
        let io = Io {
            fs:        self.fs,
            terminals: &mut self.terms,
            terminal,
            video:     &mut self.platform,
            rtc_ticks: self.rtc.ticks(),
        };
        (io, &mut self.procs)
    }

    // -----------------------------------------------------------------------
    // File descriptor
    // -----------------------------------------------------------------------

    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, SysError> {
        let pid = self.current_pid()?;
        let (mut io, procs) = self.io_and_procs(self.sched.current_terminal());
        let entry = procs.live_pcb_mut(pid)?.fd_mut(fd)?;
        let ops = entry.ops;
        Ok(ops.read(&mut io, entry, buf)?)
    }

    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize, SysError> {
        let pid = self.current_pid()?;
        let (mut io, procs) = self.io_and_procs(self.sched.current_terminal());
        let entry = procs.live_pcb_mut(pid)?.fd_mut(fd)?;
        let ops = entry.ops;
        Ok(ops.write(&mut io, entry, buf)?)
    }

    /// Slot fd bebas pertama, diikat ke tabel sesuai jenis file
    pub fn open(&mut self, name: &[u8]) -> Result<usize, SysError> {
        let pid = self.current_pid()?;
        let dentry = self.fs.resolve_name(name)?;
        let (mut io, procs) = self.io_and_procs(self.sched.current_terminal());
        let pcb = procs.live_pcb_mut(pid)?;

        let fd = pcb.open_slot()?;
        let entry = &mut pcb.fds[fd];
        *entry = FdEntry::bound(ops_for(dentry.kind));
        entry.inode = dentry.inode;

        let ops = entry.ops;
        if let Err(err) = ops.open(&mut io, entry) {
            let _ = pcb.close_slot(fd);
            return Err(err.into());
        }
        Ok(fd)
    }

    pub fn close(&mut self, fd: usize) -> Result<(), SysError> {
        if !(FIRST_FREE_FD..MAX_FDS).contains(&fd) {
            return Err(ProcError::BadDescriptor(fd).into());
        }
        let pid = self.current_pid()?;
        let (mut io, procs) = self.io_and_procs(self.sched.current_terminal());
        let pcb = procs.live_pcb_mut(pid)?;

        let entry = pcb.fd_mut(fd)?;
        let ops = entry.ops;
        let closed = ops.close(&mut io, entry);
        pcb.close_slot(fd)?;
        Ok(closed?)
    }

    // -----------------------------------------------------------------------
    // Argumen & video
    // -----------------------------------------------------------------------

    /// Salin argumen + NUL ke `buf`
    pub fn getargs(&mut self, buf: &mut [u8]) -> Result<(), SysError> {
        let pid = self.current_pid()?;
        let pcb = self.procs.live_pcb_mut(pid)?;
        let args = pcb.args.as_bytes();
        if args.is_empty() {
            return Err(SysError::NoArgs);
        }
        if args.len() + 1 > buf.len() {
            return Err(ProcError::ArgsTooLong.into());
        }
        buf[..args.len()].copy_from_slice(args);
        buf[args.len()] = 0;
        Ok(())
    }

    /// Alamat halaman video user untuk proses sekarang
    pub fn vidmap(&mut self) -> Result<u64, SysError> {
        self.current_pid()?;
        let terminal = self.sched.current_terminal();
        self.mapper.remap_terminal_video(terminal, self.terms.is_visible(terminal), &mut self.platform)?;
        Ok(USER_VIDEO)
    }

    // -----------------------------------------------------------------------
    // Terminal
    // -----------------------------------------------------------------------

    pub fn key_input(&mut self, key: Key) {
        match key {
            Key::Switch(t) => {
                if let Err(err) = self.switch_terminal(t) {
                    kwarn!("term: {}", err);
                }
            }
            key => self.terms.input(key, &mut self.platform),
        }
    }

    /// Tampilkan terminal `t`. Terminal yang belum pernah jalan ditandai
    /// started; tick berikutnya memberinya shell.
    pub fn switch_terminal(&mut self, t: usize) -> Result<(), SysError> {
        if t >= NUM_TERMINALS {
            return Err(MapError::InvalidTerminal(t).into());
        }
        let old = self.terms.visible();
        if old == t {
            return Ok(());
        }

        self.platform.copy_video(VideoBinding::Backing(old), VideoBinding::Live);
        self.platform.copy_video(VideoBinding::Live, VideoBinding::Backing(t));
        self.terms.set_visible(t);

        let scheduled = self.sched.current_terminal();
        self.mapper.remap_terminal_video(scheduled, self.terms.is_visible(scheduled), &mut self.platform)?;
        if let Some(term) = self.terms.get(t) {
            self.platform.set_cursor(term.cursor());
        }

        if self.terms.mark_started(t) {
            klog!("term: terminal {} started", t);
        }
        klog!("term: switched {} -> {}", old, t);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Instance global
// ---------------------------------------------------------------------------

pub static KERNEL: Mutex<Option<Kernel<Hardware>>> = Mutex::new(None);

pub fn install(kernel: Kernel<Hardware>) {
    interrupts::without_interrupts(|| {
        *KERNEL.lock() = Some(kernel);
    });
}

pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel<Hardware>) -> R) -> Option<R> {
    interrupts::without_interrupts(|| KERNEL.lock().as_mut().map(f))
}

/// Untuk handler interrupt: `None` kalau lock sedang dipegang
pub fn try_with_kernel<R>(f: impl FnOnce(&mut Kernel<Hardware>) -> R) -> Option<R> {
    KERNEL.try_lock()?.as_mut().map(f)
}
