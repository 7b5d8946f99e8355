//! shell — baca satu baris, jalankan, ulangi
//!
//! `exit` mengakhiri shell; shell root langsung diganti yang baru oleh kernel.

#![no_std]
#![no_main]

use trident_api::{entry, execute, print, print_num, println, read, STDIN};

entry!(main);

const PROMPT: &str = "trident> ";

/// Status yang dipakai kernel untuk program yang mati karena exception
const STATUS_EXCEPTION: isize = 256;

fn main() -> u8 {
    let mut line = [0u8; 128];
    loop {
        print(PROMPT);
        let n = read(STDIN, &mut line);
        if n <= 0 {
            continue;
        }
        let command = trim(&line[..n as usize]);
        if command.is_empty() {
            continue;
        }
        if command == b"exit" {
            return 0;
        }

        match execute(command) {
            -1 => println("no such command"),
            STATUS_EXCEPTION => println("program terminated by exception"),
            0 => {}
            status => {
                print("exit status ");
                print_num(status as u64);
                println("");
            }
        }
    }
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|&b| b != b' ').unwrap_or(line.len());
    let end = line.iter().rposition(|&b| b != b' ' && b != b'\n').map_or(start, |i| i + 1);
    &line[start..end.max(start)]
}
