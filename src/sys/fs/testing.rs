//! Pembuat image filesystem untuk test
//!
//! Layout sama dengan yang dikemas `build.rs`: entry "." dan "rtc"
//! selalu di depan, lalu file reguler sesuai urutan `file()`.

use super::rofs::{BLOCK_SIZE, DENTRY_SIZE};
use super::MAX_NAME_LEN;

use std::vec;
use std::vec::Vec;

pub struct ImageBuilder {
    files: Vec<(Vec<u8>, Vec<u8>)>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    pub fn file(mut self, name: &[u8], data: &[u8]) -> Self {
        self.files.push((name.to_vec(), data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let blocks_of = |len: usize| (len + BLOCK_SIZE - 1) / BLOCK_SIZE;
        let num_inodes = self.files.len();
        let num_data: usize = self.files.iter().map(|(_, d)| blocks_of(d.len())).sum();
        let mut image = vec![0u8; BLOCK_SIZE * (1 + num_inodes + num_data)];

        let mut dentries: Vec<(&[u8], u32, u32)> = vec![(&b"."[..], 1, 0), (&b"rtc"[..], 0, 0)];
        for (i, (name, _)) in self.files.iter().enumerate() {
            dentries.push((name.as_slice(), 2, i as u32));
        }

        put(&mut image, 0, dentries.len() as u32);
        put(&mut image, 4, num_inodes as u32);
        put(&mut image, 8, num_data as u32);
        for (i, (name, kind, inode)) in dentries.iter().enumerate() {
            let at = DENTRY_SIZE * (i + 1);
            image[at..at + name.len()].copy_from_slice(name);
            put(&mut image, at + MAX_NAME_LEN, *kind);
            put(&mut image, at + MAX_NAME_LEN + 4, *inode);
        }

        // Data block disusun mundur supaya indeks blok tidak sama dengan urutan file
        let mut next = num_data;
        for (i, (_, data)) in self.files.iter().enumerate() {
            let inode_at = BLOCK_SIZE * (1 + i);
            put(&mut image, inode_at, data.len() as u32);
            for (j, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
                next -= 1;
                put(&mut image, inode_at + 4 + 4 * j, next as u32);
                let at = BLOCK_SIZE * (1 + num_inodes + next);
                image[at..at + chunk.len()].copy_from_slice(chunk);
            }
        }
        image
    }
}

/// Executable minimal: magic ELF, entry di offset 24, lalu `body` byte isi
pub fn executable(entry: u32, body: usize) -> Vec<u8> {
    let mut bin = vec![0u8; 28 + body];
    bin[..4].copy_from_slice(&object::elf::ELFMAG);
    bin[24..28].copy_from_slice(&entry.to_le_bytes());
    for (i, b) in bin[28..].iter_mut().enumerate() {
        *b = (i % 200) as u8 + 1;
    }
    bin
}

fn put(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
