//! counter — hitung 1 sampai 10, satu angka per detak RTC 2 Hz

#![no_std]
#![no_main]

use trident_api::{close, entry, open, print_num, println, read, write};

entry!(main);

const RATE_HZ: u32 = 2;

fn main() -> u8 {
    let fd = open(b"rtc");
    if fd < 0 {
        println("counter: rtc tidak ada");
        return 1;
    }
    let fd = fd as usize;
    if write(fd, &RATE_HZ.to_le_bytes()) < 0 {
        println("counter: frekuensi ditolak");
    }

    println("Menghitung...");
    let mut tick = [0u8; 4];
    for i in 1..=10 {
        read(fd, &mut tick);
        print_num(i);
        println("");
    }
    close(fd);
    0
}
