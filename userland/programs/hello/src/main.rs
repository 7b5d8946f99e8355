//! hello — program pertama, ikut mencetak argumennya

#![no_std]
#![no_main]

use trident_api::{entry, getargs, print, println};

entry!(main);

fn main() -> u8 {
    let mut args = [0u8; 128];
    print("Halo dari Trident!");
    if getargs(&mut args) == 0 {
        let len = args.iter().position(|&b| b == 0).unwrap_or(args.len());
        print(" args: ");
        print(core::str::from_utf8(&args[..len]).unwrap_or("?"));
    }
    println("");
    0
}
