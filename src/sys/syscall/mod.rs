//! syscall — pintu int 0x80
//!
//! Konvensi: rax = nomor, argumen di rdi, rsi, rdx, hasil di rax.
//! −1 berarti gagal; penyebabnya dicatat lewat `kwarn!`.
//!
//! Setiap pointer dari user diperiksa harus seluruhnya di dalam slot
//! user sebelum disentuh. Lock kernel tidak pernah dipegang saat
//! menunggu input atau saat melompat ke proses lain.

pub mod number;

use crate::sys::kernel::{with_kernel, SysError};
use crate::sys::fs::{FsError, MAX_NAME_LEN};
use crate::sys::layout::{in_user_slot, SLOT_SIZE, USER_BASE};
use crate::sys::proc::context::Hardware;
use crate::sys::proc::exec::{ExecError, Resume, STATUS_EXCEPTION};
use crate::sys::term::LINE_LEN;
use crate::kwarn;

use x86_64::instructions::interrupts;

// ---------------------------------------------------------------------------
// Entry point (gate DPL 3, interrupt mati)
// ---------------------------------------------------------------------------

/// Simpan register caller-saved, panggil `dispatch`, iretq.
///
/// Frame interrupt (5 qword) + 8 push = 13 qword; `sub rsp, 8` membuat
/// stack 16-byte aligned sebelum `call`.
#[unsafe(naked)]
pub unsafe extern "sysv64" fn entry() {
    core::arch::naked_asm!(
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "sub rsp, 8",
        "mov rcx, rdx",
        "mov rdx, rsi",
        "mov rsi, rdi",
        "mov rdi, rax",
        "call {dispatch}",
        "add rsp, 8",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "iretq",
        dispatch = sym dispatch,
    );
}

pub extern "sysv64" fn dispatch(n: u64, arg1: u64, arg2: u64, arg3: u64) -> i64 {
    let result = match n {
        number::HALT        => halt_with(arg1 as u8 as i32),
        number::EXECUTE     => execute(arg1),
        number::READ        => read(arg1, arg2, arg3),
        number::WRITE       => write(arg1, arg2, arg3),
        number::OPEN        => open(arg1),
        number::CLOSE       => close(arg1),
        number::GETARGS     => getargs(arg1, arg2),
        number::VIDMAP      => vidmap(arg1),
        number::SET_HANDLER => Err(SysError::Unsupported(n)),
        number::SIGRETURN   => Err(SysError::Unsupported(n)),
        _                   => Err(SysError::Unsupported(n)),
    };

    match result {
        Ok(value) => value,
        Err(err) => {
            // open pada nama yang tidak ada itu biasa (shell mencoba dulu)
            if err != SysError::Fs(FsError::NotFound) {
                kwarn!("syscall {}: {}", n, err);
            }
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// Pointer user
// ---------------------------------------------------------------------------

fn check_user(addr: u64, len: u64) -> Result<(), SysError> {
    if len != 0 && !in_user_slot(addr, len) {
        return Err(SysError::BadAddress);
    }
    Ok(())
}

fn user_slice<'a>(addr: u64, len: u64) -> Result<&'a [u8], SysError> {
    check_user(addr, len)?;
    if len == 0 {
        return Ok(&[]);
    }
    Ok(unsafe { core::slice::from_raw_parts(addr as *const u8, len as usize) })
}

fn user_slice_mut<'a>(addr: u64, len: u64) -> Result<&'a mut [u8], SysError> {
    check_user(addr, len)?;
    if len == 0 {
        return Ok(&mut []);
    }
    Ok(unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, len as usize) })
}

/// Salin string NUL-terminated dari user ke `out`; panjang tanpa NUL.
///
/// Tanpa NUL di dalam `out`, hasilnya `out.len()`: pemanggil memberi
/// buffer satu byte lebih besar dari batasnya untuk mendeteksi ini.
fn copy_user_str(addr: u64, out: &mut [u8]) -> Result<usize, SysError> {
    check_user(addr, 1)?;
    let avail = (USER_BASE + SLOT_SIZE - addr).min(out.len() as u64);
    Ok(copy_str(user_slice(addr, avail)?, out))
}

fn copy_str(src: &[u8], out: &mut [u8]) -> usize {
    let len = src.iter().position(|&b| b == 0).unwrap_or(src.len()).min(out.len());
    out[..len].copy_from_slice(&src[..len]);
    len
}

/// Perintah execute maksimal `LINE_LEN` byte; lebih dari itu ditolak utuh
fn check_command(len: usize) -> Result<usize, SysError> {
    if len > LINE_LEN {
        return Err(ExecError::ArgsTooLong.into());
    }
    Ok(len)
}

fn kernel<R>(f: impl FnOnce(&mut crate::sys::kernel::Kernel<Hardware>) -> R) -> Result<R, SysError> {
    with_kernel(f).ok_or(SysError::NoProcess)
}

// ---------------------------------------------------------------------------
// Syscall
// ---------------------------------------------------------------------------

/// halt tidak pernah kembali ke pemanggilnya
pub fn halt_with(status: i32) -> ! {
    let plan = with_kernel(|k| k.halt(status)).unwrap_or(Resume::Idle);
    unsafe { plan.run::<Hardware>() }
}

/// Exception dari ring 3: beri tahu terminal, lalu halt dengan status 256
pub fn abort_current(reason: &str) -> ! {
    let _ = with_kernel(|k| {
        let _ = k.write(1, b"\nexception: ");
        let _ = k.write(1, reason.as_bytes());
        let _ = k.write(1, b"\n");
    });
    kwarn!("pid {:?} killed by {}", with_kernel(|k| k.current()).flatten(), reason);
    halt_with(STATUS_EXCEPTION)
}

fn execute(cmd: u64) -> Result<i64, SysError> {
    let mut line = [0u8; LINE_LEN + 1];
    let len = check_command(copy_user_str(cmd, &mut line)?)?;
    let launch = kernel(|k| k.execute(&line[..len]))??;

    // Kembali ke sini saat anak halt
    unsafe { launch.run::<Hardware>() };
    Ok(kernel(|k| k.collect_status())? as i64)
}

fn read(fd: u64, buf: u64, len: u64) -> Result<i64, SysError> {
    let buf = user_slice_mut(buf, len)?;
    loop {
        match kernel(|k| k.read(fd as usize, buf))? {
            Err(err) if err.would_block() => {
                // Lock sudah lepas; timer boleh menjadwalkan terminal lain
                interrupts::enable_and_hlt();
                interrupts::disable();
            }
            result => return Ok(result? as i64),
        }
    }
}

fn write(fd: u64, buf: u64, len: u64) -> Result<i64, SysError> {
    let buf = user_slice(buf, len)?;
    Ok(kernel(|k| k.write(fd as usize, buf))?? as i64)
}

fn open(name: u64) -> Result<i64, SysError> {
    let mut buf = [0u8; MAX_NAME_LEN + 1];
    let len = copy_user_str(name, &mut buf)?;
    if len > MAX_NAME_LEN {
        return Err(FsError::NameTooLong.into());
    }
    Ok(kernel(|k| k.open(&buf[..len]))?? as i64)
}

fn close(fd: u64) -> Result<i64, SysError> {
    kernel(|k| k.close(fd as usize))??;
    Ok(0)
}

fn getargs(buf: u64, len: u64) -> Result<i64, SysError> {
    let buf = user_slice_mut(buf, len)?;
    kernel(|k| k.getargs(buf))??;
    Ok(0)
}

fn vidmap(out: u64) -> Result<i64, SysError> {
    check_user(out, 8)?;
    let addr = kernel(|k| k.vidmap())??;
    unsafe { (out as *mut u64).write_unaligned(addr) };
    Ok(0)
}
