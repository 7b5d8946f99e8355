//! build.rs — kemas `fsdir/` menjadi image filesystem read-only
//!
//! Layout image (blok 4 KiB):
//!   blok 0       : boot block (statistik + 63 dentry × 64 byte)
//!   blok 1..=N   : inode (u32 length + 1023 indeks data block)
//!   blok N+1..   : data block
//!
//! Entry "." (directory) dan "rtc" selalu ada; sisanya file reguler.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const BLOCK_SIZE:   usize = 4096;
const DENTRY_SIZE:  usize = 64;
const MAX_DENTRIES: usize = 63;
const MAX_NAME:     usize = 32;
const MAX_BLOCKS_PER_INODE: usize = 1023;

const TYPE_RTC:       u32 = 0;
const TYPE_DIRECTORY: u32 = 1;
const TYPE_REGULAR:   u32 = 2;

fn main() {
    let root = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let out  = PathBuf::from(env::var("OUT_DIR").unwrap());
    let dir  = root.join("fsdir");

    println!("cargo:rerun-if-changed=fsdir");

    let files = collect(&dir);
    let image = pack(&files);
    fs::write(out.join("fs.img"), image).unwrap();
}

fn collect(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.len() > MAX_NAME {
                println!("cargo:warning=fsdir/{} skipped: name longer than {} bytes", name, MAX_NAME);
                continue;
            }
            println!("cargo:rerun-if-changed={}", path.display());
            files.push((name, fs::read(&path).unwrap()));
        }
    }
    files.sort();
    files.truncate(MAX_DENTRIES - 2);
    files
}

fn pack(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let num_inodes = files.len();
    let blocks_of = |len: usize| (len + BLOCK_SIZE - 1) / BLOCK_SIZE;
    let num_data: usize = files.iter().map(|(_, d)| blocks_of(d.len())).sum();

    let mut image = vec![0u8; BLOCK_SIZE * (1 + num_inodes + num_data)];

    let mut dentries: Vec<(&str, u32, u32)> = vec![(".", TYPE_DIRECTORY, 0), ("rtc", TYPE_RTC, 0)];
    for (i, (name, _)) in files.iter().enumerate() {
        dentries.push((name.as_str(), TYPE_REGULAR, i as u32));
    }

    put_u32(&mut image, 0, dentries.len() as u32);
    put_u32(&mut image, 4, num_inodes as u32);
    put_u32(&mut image, 8, num_data as u32);

    for (i, (name, kind, inode)) in dentries.iter().enumerate() {
        let at = DENTRY_SIZE * (i + 1);
        image[at..at + name.len()].copy_from_slice(name.as_bytes());
        put_u32(&mut image, at + MAX_NAME, *kind);
        put_u32(&mut image, at + MAX_NAME + 4, *inode);
    }

    let mut next_block = 0usize;
    for (i, (name, data)) in files.iter().enumerate() {
        let inode_at = BLOCK_SIZE * (1 + i);
        let count = blocks_of(data.len());
        assert!(count <= MAX_BLOCKS_PER_INODE, "fsdir/{} is too large", name);

        put_u32(&mut image, inode_at, data.len() as u32);
        for (j, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
            put_u32(&mut image, inode_at + 4 + 4 * j, (next_block + j) as u32);
            let at = BLOCK_SIZE * (1 + num_inodes + next_block + j);
            image[at..at + chunk.len()].copy_from_slice(chunk);
        }
        next_block += count;
    }

    image
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
