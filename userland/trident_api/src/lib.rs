//! trident_api — library untuk program user Trident
//!
//! Wrap semua syscall Trident agar program bisa:
//!   - menulis ke layar dan membaca baris dari keyboard
//!   - membuka file dari filesystem (termasuk "rtc" dan ".")
//!   - menjalankan program lain dan menunggu statusnya
//!
//! Semua syscall mengembalikan −1 kalau gagal.

#![no_std]

// ---------------------------------------------------------------------------
// Syscall numbers, harus sama persis dengan src/sys/syscall/number.rs
// ---------------------------------------------------------------------------
pub mod number {
    pub const HALT:        usize = 1;
    pub const EXECUTE:     usize = 2;
    pub const READ:        usize = 3;
    pub const WRITE:       usize = 4;
    pub const OPEN:        usize = 5;
    pub const CLOSE:       usize = 6;
    pub const GETARGS:     usize = 7;
    pub const VIDMAP:      usize = 8;
    pub const SET_HANDLER: usize = 9;
    pub const SIGRETURN:   usize = 10;
}

pub const STDIN:  usize = 0;
pub const STDOUT: usize = 1;

// ---------------------------------------------------------------------------
// Raw syscall (int 0x80: rax = nomor, rdi/rsi/rdx = argumen)
// ---------------------------------------------------------------------------

#[inline(always)]
pub unsafe fn syscall1(n: usize, a1: usize) -> isize {
    let ret: isize;
    core::arch::asm!(
        "int 0x80",
        inlateout("rax") n as isize => ret,
        in("rdi") a1,
        options(nostack)
    );
    ret
}

#[inline(always)]
pub unsafe fn syscall2(n: usize, a1: usize, a2: usize) -> isize {
    let ret: isize;
    core::arch::asm!(
        "int 0x80",
        inlateout("rax") n as isize => ret,
        in("rdi") a1,
        in("rsi") a2,
        options(nostack)
    );
    ret
}

#[inline(always)]
pub unsafe fn syscall3(n: usize, a1: usize, a2: usize, a3: usize) -> isize {
    let ret: isize;
    core::arch::asm!(
        "int 0x80",
        inlateout("rax") n as isize => ret,
        in("rdi") a1,
        in("rsi") a2,
        in("rdx") a3,
        options(nostack)
    );
    ret
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// Akhiri program; status 0..=255 sampai ke `execute` milik parent
pub fn halt(status: u8) -> ! {
    unsafe { syscall1(number::HALT, status as usize); }
    loop {} // tidak pernah sampai sini
}

/// Jalankan `command` (nama + argumen) dan tunggu sampai selesai.
///
/// `command` disalin ke buffer ber-NUL dulu; −1 kalau terlalu panjang.
pub fn execute(command: &[u8]) -> isize {
    let mut buf = [0u8; 129];
    if command.len() >= buf.len() {
        return -1;
    }
    buf[..command.len()].copy_from_slice(command);
    unsafe { syscall1(number::EXECUTE, buf.as_ptr() as usize) }
}

pub fn read(fd: usize, buf: &mut [u8]) -> isize {
    unsafe { syscall3(number::READ, fd, buf.as_mut_ptr() as usize, buf.len()) }
}

pub fn write(fd: usize, buf: &[u8]) -> isize {
    unsafe { syscall3(number::WRITE, fd, buf.as_ptr() as usize, buf.len()) }
}

/// Buka file berdasarkan nama (maks 32 byte)
pub fn open(name: &[u8]) -> isize {
    let mut buf = [0u8; 33];
    if name.len() >= buf.len() {
        return -1;
    }
    buf[..name.len()].copy_from_slice(name);
    unsafe { syscall1(number::OPEN, buf.as_ptr() as usize) }
}

pub fn close(fd: usize) -> isize {
    unsafe { syscall1(number::CLOSE, fd) }
}

/// Argumen program (tanpa nama program), diakhiri NUL di `buf`
pub fn getargs(buf: &mut [u8]) -> isize {
    unsafe { syscall2(number::GETARGS, buf.as_mut_ptr() as usize, buf.len()) }
}

/// Alamat halaman video 80×25 milik terminal program ini
pub fn vidmap() -> Option<*mut u16> {
    let mut addr: u64 = 0;
    let ret = unsafe { syscall1(number::VIDMAP, &mut addr as *mut u64 as usize) };
    (ret == 0).then_some(addr as *mut u16)
}

/// Print string ke stdout
pub fn print(s: &str) {
    write(STDOUT, s.as_bytes());
}

/// Print string + newline
pub fn println(s: &str) {
    print(s);
    print("\n");
}

/// Print angka desimal tanpa alokasi
pub fn print_num(mut n: u64) {
    let mut buf = [0u8; 20];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    write(STDOUT, &buf[i..]);
}

// ---------------------------------------------------------------------------
// Titik masuk program
// ---------------------------------------------------------------------------

/// Definisikan `_start` yang memanggil `$main() -> u8` lalu halt
#[macro_export]
macro_rules! entry {
    ($main:path) => {
        #[no_mangle]
        #[link_section = ".text._start"]
        pub extern "C" fn _start() -> ! {
            let status: u8 = $main();
            $crate::halt(status)
        }
    };
}

// ---------------------------------------------------------------------------
// Panic handler, wajib ada untuk no_std
// ---------------------------------------------------------------------------

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    write(STDOUT, b"[panic]\n");
    halt(255)
}
