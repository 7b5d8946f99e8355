//! File operations — tabel dispatch per jenis descriptor
//!
//! Setiap `FdEntry` menunjuk satu tabel statis. Descriptor yang sudah
//! ditutup menunjuk `CLOSED`, yang menolak semua operasi.

use super::{FileSystem, FileType, FsError, MAX_NAME_LEN};
use crate::sys::clk::rtc::{self, DEFAULT_VIRTUAL_HZ};
use crate::sys::proc::process::FdEntry;
use crate::sys::term::Terminals;
use crate::sys::vga::VideoMemory;

/// Semua yang boleh disentuh oleh operasi file
pub struct Io<'a> {
    pub fs:        &'a dyn FileSystem,
    pub terminals: &'a mut Terminals,
    /// Terminal milik proses pemanggil
    pub terminal:  usize,
    pub video:     &'a mut dyn VideoMemory,
    pub rtc_ticks: u64,
}

pub trait FileOps: Sync {
    fn name(&self) -> &'static str;

    fn open(&self, _io: &mut Io, _fd: &mut FdEntry) -> Result<(), FsError> {
        Ok(())
    }

    fn read(&self, io: &mut Io, fd: &mut FdEntry, buf: &mut [u8]) -> Result<usize, FsError>;

    fn write(&self, io: &mut Io, fd: &mut FdEntry, buf: &[u8]) -> Result<usize, FsError>;

    fn close(&self, _io: &mut Io, _fd: &mut FdEntry) -> Result<(), FsError> {
        Ok(())
    }
}

pub struct Stdin;
pub struct Stdout;
pub struct RegularFile;
pub struct Directory;
pub struct RtcFile;
pub struct Closed;

pub static STDIN:     Stdin       = Stdin;
pub static STDOUT:    Stdout      = Stdout;
pub static REGULAR:   RegularFile = RegularFile;
pub static DIRECTORY: Directory   = Directory;
pub static RTC:       RtcFile     = RtcFile;
pub static CLOSED:    Closed      = Closed;

pub fn ops_for(kind: FileType) -> &'static dyn FileOps {
    match kind {
        FileType::Rtc       => &RTC,
        FileType::Directory => &DIRECTORY,
        FileType::Regular   => &REGULAR,
    }
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

impl FileOps for Stdin {
    fn name(&self) -> &'static str {
        "stdin"
    }

    /// Satu baris lengkap (termasuk '\n'), atau `WouldBlock`
    fn read(&self, io: &mut Io, _fd: &mut FdEntry, buf: &mut [u8]) -> Result<usize, FsError> {
        let term = io.terminals.get_mut(io.terminal).ok_or(FsError::BadArgument)?;
        term.take_line(buf).ok_or(FsError::WouldBlock)
    }

    fn write(&self, _io: &mut Io, _fd: &mut FdEntry, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotWritable)
    }
}

impl FileOps for Stdout {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn read(&self, _io: &mut Io, _fd: &mut FdEntry, _buf: &mut [u8]) -> Result<usize, FsError> {
        Err(FsError::NotReadable)
    }

    fn write(&self, io: &mut Io, _fd: &mut FdEntry, buf: &[u8]) -> Result<usize, FsError> {
        Ok(io.terminals.write(io.terminal, &mut *io.video, buf))
    }
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

impl FileOps for RegularFile {
    fn name(&self) -> &'static str {
        "file"
    }

    fn read(&self, io: &mut Io, fd: &mut FdEntry, buf: &mut [u8]) -> Result<usize, FsError> {
        let n = io.fs.read_bytes(fd.inode, fd.position, buf)?;
        fd.position += n as u32;
        Ok(n)
    }

    fn write(&self, _io: &mut Io, _fd: &mut FdEntry, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotWritable)
    }
}

impl FileOps for Directory {
    fn name(&self) -> &'static str {
        "directory"
    }

    /// Satu nama per read; `position` = indeks entry berikutnya
    fn read(&self, io: &mut Io, fd: &mut FdEntry, buf: &mut [u8]) -> Result<usize, FsError> {
        let Some(entry) = io.fs.entry_at(fd.position as usize) else {
            return Ok(0);
        };
        let name = entry.name();
        let n = name.len().min(buf.len()).min(MAX_NAME_LEN);
        buf[..n].copy_from_slice(&name[..n]);
        fd.position += 1;
        Ok(n)
    }

    fn write(&self, _io: &mut Io, _fd: &mut FdEntry, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotWritable)
    }
}

// ---------------------------------------------------------------------------
// RTC: `position` menyimpan frekuensi virtual fd
// ---------------------------------------------------------------------------

impl FileOps for RtcFile {
    fn name(&self) -> &'static str {
        "rtc"
    }

    fn open(&self, _io: &mut Io, fd: &mut FdEntry) -> Result<(), FsError> {
        fd.position = DEFAULT_VIRTUAL_HZ;
        fd.wake_at = None;
        Ok(())
    }

    fn read(&self, io: &mut Io, fd: &mut FdEntry, _buf: &mut [u8]) -> Result<usize, FsError> {
        match fd.wake_at {
            Some(deadline) if io.rtc_ticks >= deadline => {
                fd.wake_at = None;
                Ok(0)
            }
            Some(_) => Err(FsError::WouldBlock),
            None => {
                fd.wake_at = Some(rtc::next_deadline(io.rtc_ticks, fd.position));
                Err(FsError::WouldBlock)
            }
        }
    }

    fn write(&self, _io: &mut Io, fd: &mut FdEntry, buf: &[u8]) -> Result<usize, FsError> {
        let bytes: [u8; 4] = buf.try_into().map_err(|_| FsError::BadArgument)?;
        let hz = u32::from_le_bytes(bytes);
        if !rtc::valid_rate(hz) {
            return Err(FsError::BadArgument);
        }
        fd.position = hz;
        fd.wake_at = None;
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Closed
// ---------------------------------------------------------------------------

impl FileOps for Closed {
    fn name(&self) -> &'static str {
        "closed"
    }

    fn open(&self, _io: &mut Io, _fd: &mut FdEntry) -> Result<(), FsError> {
        Err(FsError::BadArgument)
    }

    fn read(&self, _io: &mut Io, _fd: &mut FdEntry, _buf: &mut [u8]) -> Result<usize, FsError> {
        Err(FsError::NotReadable)
    }

    fn write(&self, _io: &mut Io, _fd: &mut FdEntry, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotWritable)
    }

    fn close(&self, _io: &mut Io, _fd: &mut FdEntry) -> Result<(), FsError> {
        Err(FsError::BadArgument)
    }
}
