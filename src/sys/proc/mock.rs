//! MockPlatform — platform palsu untuk test di host
//!
//! CPU disimulasikan sebagai satu `Context` per thread test: switch
//! menyimpan nilai CPU ke `from` lalu memuat `to`. Setiap masuk ke user
//! mode dicatat supaya test bisa memeriksa entry dan stack.

use crate::sys::fs::rofs::RoFs;
use crate::sys::fs::testing::{executable, ImageBuilder};
use crate::sys::kernel::Kernel;
use crate::sys::layout::{DEFAULT_SLOT_BASE, KERNEL_STACK_SIZE, MAX_IMAGE_SIZE, MAX_PROCS, NUM_TERMINALS};
use crate::sys::mem::mapper::{Mapper, Tlb, VideoBinding};
use crate::sys::proc::context::{Context, Platform, UserEntry};
use crate::sys::proc::process::Pid;
use crate::sys::vga::{VideoMemory, PAGE_CELLS};

use std::boxed::Box;
use std::cell::{Cell, RefCell};
use std::vec;
use std::vec::Vec;
use x86_64::structures::paging::PageTable;
use x86_64::PhysAddr;

const STACK_ARENA_TOP: u64 = 0x0020_0000;

pub const SHELL_ENTRY: u32 = 0x0804_8018;
pub const FRAME0: &[u8] = b"frame zero: a small fish swims by\n";

thread_local! {
    static CPU: Cell<Context> = const { Cell::new(Context { rsp: 0xC0DE_0000, rbp: 0xC0DE_0100 }) };
    static ENTERED: RefCell<Vec<UserEntry>> = const { RefCell::new(Vec::new()) };
}

pub struct MockPlatform {
    pub flushes:      usize,
    pub kernel_stack: u64,
    pub window:       Vec<u8>,
    pub pages:        Vec<Vec<u16>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        CPU.with(|c| c.set(Context { rsp: 0xC0DE_0000, rbp: 0xC0DE_0100 }));
        ENTERED.with(|e| e.borrow_mut().clear());
        Self {
            flushes:      0,
            kernel_stack: 0,
            window:       vec![0; MAX_IMAGE_SIZE],
            pages:        vec![vec![0; PAGE_CELLS]; NUM_TERMINALS + 1],
        }
    }

    pub fn cpu() -> Context {
        CPU.with(|c| c.get())
    }

    pub fn set_cpu(ctx: Context) {
        CPU.with(|c| c.set(ctx));
    }

    pub fn entered() -> Vec<UserEntry> {
        ENTERED.with(|e| e.borrow().clone())
    }

    fn page_index(binding: VideoBinding) -> usize {
        match binding {
            VideoBinding::Live       => 0,
            VideoBinding::Backing(t) => t + 1,
        }
    }
}

impl Tlb for MockPlatform {
    fn flush_tlb(&mut self) {
        self.flushes += 1;
    }
}

impl VideoMemory for MockPlatform {
    fn video_page(&mut self, binding: VideoBinding) -> &mut [u16] {
        &mut self.pages[Self::page_index(binding)]
    }
}

impl Platform for MockPlatform {
    fn set_kernel_stack(&mut self, top: u64) {
        self.kernel_stack = top;
    }

    fn kernel_stack_top(&self, pid: Pid) -> Option<u64> {
        if pid.index() >= MAX_PROCS {
            return None;
        }
        Some(STACK_ARENA_TOP - (pid.index() * KERNEL_STACK_SIZE) as u64)
    }

    fn load_window(&mut self) -> &mut [u8] {
        &mut self.window
    }

    unsafe fn save_and_switch(from: *mut Context, to: *const Context) {
        let saved = Self::cpu();
        let next = *to;
        *from = saved;
        Self::set_cpu(next);
    }

    unsafe fn save_and_enter(save: *mut Context, entry: UserEntry) {
        *save = Self::cpu();
        Self::set_cpu(Context { rsp: entry.kernel_stack, rbp: 0 });
        ENTERED.with(|e| e.borrow_mut().push(entry));
    }

    unsafe fn enter(entry: UserEntry) -> ! {
        panic!("mock cannot enter user mode at {:#x}", entry.entry)
    }

    unsafe fn resume(ctx: *const Context) -> ! {
        panic!("mock cannot resume {:?}", *ctx)
    }
}

// ---------------------------------------------------------------------------
// Kernel di atas MockPlatform
// ---------------------------------------------------------------------------

/// Kernel dengan image berisi shell, hello, counter, dan frame0.txt
pub fn kernel() -> Kernel<MockPlatform> {
    let image = ImageBuilder::new()
        .file(b"shell", &executable(SHELL_ENTRY, 64))
        .file(b"hello", &executable(0x0804_8020, 32))
        .file(b"counter", &executable(0x0804_8030, 32))
        .file(b"frame0.txt", FRAME0)
        .build();
    kernel_with_image(image)
}

/// Tabel halaman dan image dibocorkan supaya hidup `'static` seperti di boot
pub fn kernel_with_image(image: Vec<u8>) -> Kernel<MockPlatform> {
    let image: &'static [u8] = Box::leak(image.into_boxed_slice());
    let fs: &'static RoFs<'static> = Box::leak(Box::new(RoFs::new(image).unwrap()));
    let mapper = Mapper::new(
        Box::leak(Box::new(PageTable::new())),
        Box::leak(Box::new(PageTable::new())),
        Box::leak(Box::new(PageTable::new())),
        PhysAddr::new(0x7000),
        PhysAddr::new(DEFAULT_SLOT_BASE),
    );
    let mut k = Kernel::new(MockPlatform::new(), mapper, fs);
    k.init();
    k
}
