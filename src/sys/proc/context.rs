//! Context — simpan/pulihkan konteks kernel dan transisi ke ring 3
//!
//! Logika inti (scheduler, execute/halt) tidak pernah melompat sendiri.
//! Ia menyerahkan pointer `Context` ke `Platform`, yang punya empat
//! primitive:
//!
//!   save_and_switch — simpan konteks sekarang, lanjut dari konteks lain
//!   save_and_enter  — simpan konteks sekarang, masuk user mode
//!   enter           — masuk user mode, tanpa menyimpan apa pun
//!   resume          — lanjut dari konteks tersimpan, tanpa menyimpan
//!
//! `Hardware` mengimplementasikannya dengan naked function. Register
//! callee-saved (rbx, r12–r15) ikut di-push ke stack sebelum rsp disimpan.

use crate::sys::arch::gdt::{self, GDT};
use crate::sys::layout::{KERNEL_STACK_SIZE, MAX_IMAGE_SIZE, MAX_PROCS, PROGRAM_IMAGE};
use crate::sys::mem::{self, mapper::{Tlb, VideoBinding}};
use crate::sys::proc::process::Pid;
use crate::sys::vga::{self, Cursor, VideoMemory, PAGE_CELLS};

use core::cell::UnsafeCell;
use x86_64::VirtAddr;

/// Stack/frame pointer kernel yang tersimpan
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    pub rsp: u64,
    pub rbp: u64,
}

impl Context {
    pub const fn zero() -> Self {
        Self { rsp: 0, rbp: 0 }
    }
}

/// Semua yang dibutuhkan untuk iretq ke program user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserEntry {
    pub entry:        u64,
    pub user_stack:   u64,
    pub kernel_stack: u64,
}

pub trait Platform: Tlb + VideoMemory {
    /// Stack ring 0 yang dipakai saat interrupt datang dari user mode
    fn set_kernel_stack(&mut self, top: u64);

    fn kernel_stack_top(&self, pid: Pid) -> Option<u64>;

    /// Region load program di slot yang sedang terpasang
    fn load_window(&mut self) -> &mut [u8];

    fn copy_video(&mut self, dst: VideoBinding, src: VideoBinding) {
        let mut cells = [0u16; PAGE_CELLS];
        cells.copy_from_slice(&self.video_page(src)[..PAGE_CELLS]);
        self.video_page(dst)[..PAGE_CELLS].copy_from_slice(&cells);
    }

    /// # Safety
    /// `from` harus bisa ditulis dan `to` harus berisi konteks yang
    /// disimpan oleh `save_and_switch`. Interrupt harus mati.
    unsafe fn save_and_switch(from: *mut Context, to: *const Context);

    /// Kembali ke pemanggil saat seseorang me-`resume` atau men-switch
    /// ke konteks yang disimpan di `save`.
    ///
    /// # Safety
    /// Slot proses tujuan harus sudah terpasang dan TSS sudah menunjuk
    /// ke `entry.kernel_stack`.
    unsafe fn save_and_enter(save: *mut Context, entry: UserEntry);

    /// # Safety
    /// Sama seperti `save_and_enter`.
    unsafe fn enter(entry: UserEntry) -> !;

    /// # Safety
    /// `ctx` harus berisi konteks yang disimpan oleh `save_and_enter`.
    unsafe fn resume(ctx: *const Context) -> !;
}

// ---------------------------------------------------------------------------
// Kernel stack per pid
// ---------------------------------------------------------------------------

#[repr(C, align(16))]
struct KernelStack(UnsafeCell<[u8; KERNEL_STACK_SIZE]>);

struct KernelStacks([KernelStack; MAX_PROCS]);

// Tiap stack hanya dipakai oleh pid pemiliknya
unsafe impl Sync for KernelStacks {}

static KERNEL_STACKS: KernelStacks = KernelStacks(
    [const { KernelStack(UnsafeCell::new([0; KERNEL_STACK_SIZE])) }; MAX_PROCS]
);

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

/// Frame iretq; urutan field dibaca oleh `user_iret`
#[repr(C)]
struct IretFrame {
    rip:          u64,
    user_rsp:     u64,
    kernel_rsp:   u64,
    code:         u64,
    data:         u64,
}

impl IretFrame {
    fn new(entry: UserEntry) -> Self {
        Self {
            rip:        entry.entry,
            user_rsp:   entry.user_stack,
            kernel_rsp: entry.kernel_stack,
            code:       GDT.1.u_code.0 as u64,
            data:       GDT.1.u_data.0 as u64,
        }
    }
}

pub struct Hardware {
    _private: (),
}

impl Hardware {
    /// # Safety
    /// Hanya satu instance, dibuat setelah GDT dan memori siap.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Tlb for Hardware {
    fn flush_tlb(&mut self) {
        x86_64::instructions::tlb::flush_all();
    }
}

impl VideoMemory for Hardware {
    fn video_page(&mut self, binding: VideoBinding) -> &mut [u16] {
        let virt = mem::phys_to_virt(binding.phys());
        unsafe { core::slice::from_raw_parts_mut(virt.as_mut_ptr::<u16>(), PAGE_CELLS) }
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        vga::move_hw_cursor(cursor);
    }
}

impl Platform for Hardware {
    fn set_kernel_stack(&mut self, top: u64) {
        gdt::set_kernel_stack(VirtAddr::new(top));
    }

    fn kernel_stack_top(&self, pid: Pid) -> Option<u64> {
        let stack = KERNEL_STACKS.0.get(pid.index())?;
        Some(stack.0.get() as u64 + KERNEL_STACK_SIZE as u64)
    }

    fn load_window(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(PROGRAM_IMAGE as *mut u8, MAX_IMAGE_SIZE) }
    }

    unsafe fn save_and_switch(from: *mut Context, to: *const Context) {
        switch_stacks(from, to);
    }

    unsafe fn save_and_enter(save: *mut Context, entry: UserEntry) {
        let frame = IretFrame::new(entry);
        save_then_iret(save, &frame);
    }

    unsafe fn enter(entry: UserEntry) -> ! {
        let frame = IretFrame::new(entry);
        user_iret(&frame)
    }

    unsafe fn resume(ctx: *const Context) -> ! {
        restore_stack(ctx)
    }
}

// ---------------------------------------------------------------------------
// Naked primitives
// Argumen (System V AMD64 ABI): rdi, rsi
// Layout Context: rsp=0, rbp=8
// ---------------------------------------------------------------------------

#[unsafe(naked)]
unsafe extern "sysv64" fn switch_stacks(from: *mut Context, to: *const Context) {
    core::arch::naked_asm!(
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov [rdi + 8], rbp",
        "mov rsp, [rsi]",
        "mov rbp, [rsi + 8]",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "ret",
    );
}

#[unsafe(naked)]
unsafe extern "sysv64" fn save_then_iret(save: *mut Context, frame: *const IretFrame) {
    core::arch::naked_asm!(
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov [rdi + 8], rbp",
        "mov rdi, rsi",
        "jmp {iret}",
        iret = sym user_iret,
    );
}

/// Layout IretFrame: rip=0, user_rsp=8, kernel_rsp=16, code=24, data=32
#[unsafe(naked)]
unsafe extern "sysv64" fn user_iret(frame: *const IretFrame) -> ! {
    core::arch::naked_asm!(
        // Baca semua field dulu; frame bisa berada di stack yang akan ditimpa
        "mov r10, [rdi]",
        "mov rcx, [rdi + 8]",
        "mov rdx, [rdi + 16]",
        "mov r8,  [rdi + 24]",
        "mov r9,  [rdi + 32]",
        "mov rsp, rdx",
        "mov ax, r9w",
        "mov ds, ax",
        "mov es, ax",
        // Frame iretq: SS, RSP, RFLAGS (IF=1), CS, RIP
        "push r9",
        "push rcx",
        "push 0x202",
        "push r8",
        "push r10",
        "xor rax, rax",
        "xor rbx, rbx",
        "xor rcx, rcx",
        "xor rdx, rdx",
        "xor rsi, rsi",
        "xor rdi, rdi",
        "xor rbp, rbp",
        "xor r8,  r8",
        "xor r9,  r9",
        "xor r10, r10",
        "xor r11, r11",
        "xor r12, r12",
        "xor r13, r13",
        "xor r14, r14",
        "xor r15, r15",
        "iretq",
    );
}

#[unsafe(naked)]
unsafe extern "sysv64" fn restore_stack(ctx: *const Context) -> ! {
    core::arch::naked_asm!(
        "mov rsp, [rdi]",
        "mov rbp, [rdi + 8]",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_layout_matches_asm_offsets() {
        assert_eq!(core::mem::size_of::<Context>(), 16);
        assert_eq!(core::mem::offset_of!(Context, rbp), 8);
        assert_eq!(core::mem::offset_of!(IretFrame, kernel_rsp), 16);
        assert_eq!(core::mem::offset_of!(IretFrame, data), 32);
    }

    #[test]
    fn kernel_stacks_are_disjoint_and_aligned() {
        let hw = Hardware { _private: () };
        let a = hw.kernel_stack_top(Pid::new(0)).unwrap();
        let b = hw.kernel_stack_top(Pid::new(1)).unwrap();
        assert_eq!(a % 16, 0);
        assert!(b.abs_diff(a) >= KERNEL_STACK_SIZE as u64);
        assert!(hw.kernel_stack_top(Pid::new(MAX_PROCS)).is_none());
    }
}
