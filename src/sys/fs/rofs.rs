//! RoFs — image filesystem read-only yang ikut di-link ke kernel
//!
//! LAYOUT (blok 4 KiB):
//!   Blok 0        : boot block
//!   Blok 1..=N    : inode (N = num_inodes)
//!   Blok N+1..    : data block
//!
//! BOOT BLOCK:
//!   [0..4]    num_dentries
//!   [4..8]    num_inodes
//!   [8..12]   num_data_blocks
//!   [12..64]  reserved
//!   [64..]    dentry × 63, masing-masing 64 byte
//!
//! DENTRY (64 bytes):
//!   [0..32]   name  (tanpa NUL kalau panjangnya 32)
//!   [32..36]  type  (0 = rtc, 1 = directory, 2 = regular)
//!   [36..40]  inode
//!   [40..64]  reserved
//!
//! INODE:
//!   [0..4]    length (bytes)
//!   [4..]     indeks data block × 1023

use super::{DirEntry, FileSystem, FileType, FsError, MAX_NAME_LEN};

pub const BLOCK_SIZE:   usize = 4096;
pub const DENTRY_SIZE:  usize = 64;
pub const MAX_DENTRIES: usize = 63;
pub const MAX_BLOCKS_PER_INODE: usize = (BLOCK_SIZE - 4) / 4;

pub struct RoFs<'a> {
    image:           &'a [u8],
    num_dentries:    usize,
    num_inodes:      u32,
    num_data_blocks: u32,
}

fn u32_at(bin: &[u8], at: usize) -> Result<u32, FsError> {
    let bytes = bin.get(at..at + 4).ok_or(FsError::Corrupt)?;
    Ok(u32::from_le_bytes(bytes.try_into().map_err(|_| FsError::Corrupt)?))
}

impl<'a> RoFs<'a> {
    /// Validasi ukuran image terhadap statistik di boot block
    pub fn new(image: &'a [u8]) -> Result<Self, FsError> {
        let num_dentries    = u32_at(image, 0)? as usize;
        let num_inodes      = u32_at(image, 4)?;
        let num_data_blocks = u32_at(image, 8)?;

        let blocks = 1 + num_inodes as usize + num_data_blocks as usize;
        if num_dentries > MAX_DENTRIES || image.len() < blocks * BLOCK_SIZE {
            return Err(FsError::Corrupt);
        }

        Ok(Self { image, num_dentries, num_inodes, num_data_blocks })
    }

    pub fn entry_count(&self) -> usize {
        self.num_dentries
    }

    fn dentry(&self, index: usize) -> Result<DirEntry, FsError> {
        let at = DENTRY_SIZE * (index + 1);
        let name = self.image.get(at..at + MAX_NAME_LEN).ok_or(FsError::Corrupt)?;
        let kind = FileType::from_raw(u32_at(self.image, at + 32)?).ok_or(FsError::Corrupt)?;
        let inode = u32_at(self.image, at + 36)?;
        Ok(DirEntry::new(name, kind, inode))
    }

    fn inode_block(&self, inode: u32) -> Result<usize, FsError> {
        if inode >= self.num_inodes {
            return Err(FsError::BadInode(inode));
        }
        Ok(BLOCK_SIZE * (1 + inode as usize))
    }

    fn data_block(&self, index: u32) -> Result<&[u8], FsError> {
        if index >= self.num_data_blocks {
            return Err(FsError::Corrupt);
        }
        let at = BLOCK_SIZE * (1 + self.num_inodes as usize + index as usize);
        self.image.get(at..at + BLOCK_SIZE).ok_or(FsError::Corrupt)
    }
}

impl FileSystem for RoFs<'_> {
    fn resolve_name(&self, name: &[u8]) -> Result<DirEntry, FsError> {
        if name.is_empty() {
            return Err(FsError::NotFound);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }
        (0..self.num_dentries)
            .filter_map(|i| self.dentry(i).ok())
            .find(|entry| entry.name() == name)
            .ok_or(FsError::NotFound)
    }

    fn entry_at(&self, index: usize) -> Option<DirEntry> {
        if index >= self.num_dentries {
            return None;
        }
        self.dentry(index).ok()
    }

    fn read_bytes(&self, inode: u32, offset: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let base = self.inode_block(inode)?;
        let len  = u32_at(self.image, base)? as usize;
        let offset = offset as usize;
        if offset >= len {
            return Ok(0);
        }

        let total = buf.len().min(len - offset);
        let mut done = 0;
        while done < total {
            let pos = offset + done;
            let slot = pos / BLOCK_SIZE;
            if slot >= MAX_BLOCKS_PER_INODE {
                return Err(FsError::Corrupt);
            }
            let block = self.data_block(u32_at(self.image, base + 4 + 4 * slot)?)?;
            let within = pos % BLOCK_SIZE;
            let n = (BLOCK_SIZE - within).min(total - done);
            buf[done..done + n].copy_from_slice(&block[within..within + n]);
            done += n;
        }
        Ok(done)
    }

    fn file_len(&self, inode: u32) -> Result<u32, FsError> {
        u32_at(self.image, self.inode_block(inode)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::fs::testing::ImageBuilder;
    use std::vec;

    #[test]
    fn resolves_exact_names() {
        let image = ImageBuilder::new().file(b"hello", b"hi").file(b"hello2", b"x").build();
        let fs = RoFs::new(&image).unwrap();

        let entry = fs.resolve_name(b"hello").unwrap();
        assert_eq!(entry.kind, FileType::Regular);
        assert_eq!(entry.name(), b"hello");
        assert_eq!(fs.resolve_name(b"hell"), Err(FsError::NotFound));
        assert_eq!(fs.resolve_name(b""), Err(FsError::NotFound));
        assert_eq!(fs.resolve_name(&[b'a'; 33]), Err(FsError::NameTooLong));
        assert_eq!(fs.resolve_name(b"rtc").unwrap().kind, FileType::Rtc);
        assert_eq!(fs.resolve_name(b".").unwrap().kind, FileType::Directory);
    }

    #[test]
    fn full_length_name_has_no_terminator() {
        let name = [b'n'; MAX_NAME_LEN];
        let image = ImageBuilder::new().file(&name, b"data").build();
        let fs = RoFs::new(&image).unwrap();
        assert_eq!(fs.resolve_name(&name).unwrap().name(), &name[..]);
    }

    #[test]
    fn reads_across_block_boundary() {
        let data: std::vec::Vec<u8> = (0..BLOCK_SIZE + 100).map(|i| (i % 251) as u8).collect();
        let image = ImageBuilder::new().file(b"big", &data).build();
        let fs = RoFs::new(&image).unwrap();
        let inode = fs.resolve_name(b"big").unwrap().inode;

        assert_eq!(fs.file_len(inode), Ok(data.len() as u32));

        let mut buf = vec![0u8; 200];
        let n = fs.read_bytes(inode, (BLOCK_SIZE - 100) as u32, &mut buf).unwrap();
        assert_eq!(n, 200);
        assert_eq!(&buf[..], &data[BLOCK_SIZE - 100..BLOCK_SIZE + 100]);
    }

    #[test]
    fn reads_clamp_at_end_of_file() {
        let image = ImageBuilder::new().file(b"f", b"abcdef").build();
        let fs = RoFs::new(&image).unwrap();
        let inode = fs.resolve_name(b"f").unwrap().inode;

        let mut buf = [0u8; 16];
        assert_eq!(fs.read_bytes(inode, 4, &mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(fs.read_bytes(inode, 6, &mut buf), Ok(0));
        assert_eq!(fs.read_bytes(99, 0, &mut buf), Err(FsError::BadInode(99)));
    }

    #[test]
    fn directory_entries_in_image_order() {
        let image = ImageBuilder::new().file(b"a", b"1").file(b"b", b"2").build();
        let fs = RoFs::new(&image).unwrap();
        assert_eq!(fs.entry_count(), 4);
        assert_eq!(fs.entry_at(0).unwrap().name(), b".");
        assert_eq!(fs.entry_at(1).unwrap().name(), b"rtc");
        assert_eq!(fs.entry_at(3).unwrap().name(), b"b");
        assert!(fs.entry_at(4).is_none());
    }

    #[test]
    fn truncated_image_is_rejected() {
        let image = ImageBuilder::new().file(b"a", b"1").build();
        assert_eq!(RoFs::new(&image[..BLOCK_SIZE]).err(), Some(FsError::Corrupt));
        assert_eq!(RoFs::new(&[]).err(), Some(FsError::Corrupt));
    }
}
