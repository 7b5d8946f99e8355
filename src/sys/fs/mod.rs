//! fs — filesystem read-only Trident
//!
//! Kernel hanya butuh empat hal dari filesystem: cari nama, baca byte
//! dari inode, tahu panjang file, dan iterasi entry direktori. Semuanya
//! lewat trait `FileSystem`; implementasi boot ada di `rofs`.

pub mod ops;
pub mod rofs;
#[cfg(test)]
pub mod testing;

use core::fmt;

pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Rtc,
    Directory,
    Regular,
}

impl FileType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FileType::Rtc),
            1 => Some(FileType::Directory),
            2 => Some(FileType::Regular),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    name:      [u8; MAX_NAME_LEN],
    pub kind:  FileType,
    pub inode: u32,
}

impl DirEntry {
    /// Nama dipotong ke 32 byte
    pub fn new(name: &[u8], kind: FileType, inode: u32) -> Self {
        let mut buf = [0u8; MAX_NAME_LEN];
        let n = name.len().min(MAX_NAME_LEN);
        buf[..n].copy_from_slice(&name[..n]);
        Self { name: buf, kind, inode }
    }

    /// Nama tanpa padding NUL (nama 32 byte tidak punya NUL)
    pub fn name(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        &self.name[..end]
    }
}

impl fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DirEntry")
            .field("name", &core::str::from_utf8(self.name()).unwrap_or("?"))
            .field("kind", &self.kind)
            .field("inode", &self.inode)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    NameTooLong,
    BadInode(u32),
    Corrupt,
    NotReadable,
    NotWritable,
    BadArgument,
    /// Belum ada data; pemanggil boleh menunggu lalu mencoba lagi
    WouldBlock,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::NotFound      => write!(f, "no such file"),
            FsError::NameTooLong   => write!(f, "name longer than {} bytes", MAX_NAME_LEN),
            FsError::BadInode(i)   => write!(f, "inode {} out of range", i),
            FsError::Corrupt       => write!(f, "filesystem image is corrupt"),
            FsError::NotReadable   => write!(f, "descriptor cannot be read"),
            FsError::NotWritable   => write!(f, "descriptor cannot be written"),
            FsError::BadArgument   => write!(f, "bad argument"),
            FsError::WouldBlock    => write!(f, "operation would block"),
        }
    }
}

pub trait FileSystem: Sync {
    /// Cocokkan nama persis (tanpa path)
    fn resolve_name(&self, name: &[u8]) -> Result<DirEntry, FsError>;

    /// Entry direktori ke-`index`, urut seperti di image
    fn entry_at(&self, index: usize) -> Option<DirEntry>;

    /// Baca mulai `offset`; 0 berarti akhir file
    fn read_bytes(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize, FsError>;

    fn file_len(&self, inode: u32) -> Result<u32, FsError>;
}
