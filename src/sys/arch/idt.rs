//! IDT — Interrupt Descriptor Table
//!
//! Tiga jenis entry:
//!   - exception CPU: dari ring 3 → proses di-halt dengan status 256,
//!     dari ring 0 → panic
//!   - IRQ 0..15: EOI dulu, lalu handler yang didaftarkan lewat
//!     `set_irq_handler` (switch proses bisa lama tidak kembali)
//!   - int 0x80: gate DPL 3 ke `syscall::entry`

use crate::sys::arch::{gdt, pic};
use crate::sys::syscall;

use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::{PrivilegeLevel, VirtAddr};

pub const SYSCALL_VECTOR: usize = 0x80;

const IRQ_COUNT: usize = 16;

fn default_irq_handler() {}

static IRQ_HANDLERS: Mutex<[fn(); IRQ_COUNT]> = Mutex::new([default_irq_handler; IRQ_COUNT]);

/// Daftarkan handler untuk IRQ `irq` (0..15)
pub fn set_irq_handler(irq: u8, handler: fn()) {
    x86_64::instructions::interrupts::without_interrupts(|| {
        if let Some(slot) = IRQ_HANDLERS.lock().get_mut(irq as usize) {
            *slot = handler;
        }
    });
}

macro_rules! irq_handler {
    ($name:ident, $irq:expr) => {
        extern "x86-interrupt" fn $name(_frame: InterruptStackFrame) {
            let handler = IRQ_HANDLERS.lock()[$irq];
            pic::end_of_interrupt($irq);
            handler();
        }
    };
}

irq_handler!(irq0, 0);
irq_handler!(irq1, 1);
irq_handler!(irq2, 2);
irq_handler!(irq3, 3);
irq_handler!(irq4, 4);
irq_handler!(irq5, 5);
irq_handler!(irq6, 6);
irq_handler!(irq7, 7);
irq_handler!(irq8, 8);
irq_handler!(irq9, 9);
irq_handler!(irq10, 10);
irq_handler!(irq11, 11);
irq_handler!(irq12, 12);
irq_handler!(irq13, 13);
irq_handler!(irq14, 14);
irq_handler!(irq15, 15);

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(divide_error);
        idt.debug.set_handler_fn(debug);
        idt.breakpoint.set_handler_fn(breakpoint);
        idt.overflow.set_handler_fn(overflow);
        idt.bound_range_exceeded.set_handler_fn(bound_range_exceeded);
        idt.invalid_opcode.set_handler_fn(invalid_opcode);
        idt.device_not_available.set_handler_fn(device_not_available);
        idt.invalid_tss.set_handler_fn(invalid_tss);
        idt.segment_not_present.set_handler_fn(segment_not_present);
        idt.stack_segment_fault.set_handler_fn(stack_segment_fault);
        idt.general_protection_fault.set_handler_fn(general_protection_fault);
        idt.page_fault.set_handler_fn(page_fault);
        idt.x87_floating_point.set_handler_fn(x87_floating_point);
        idt.alignment_check.set_handler_fn(alignment_check);
        idt.simd_floating_point.set_handler_fn(simd_floating_point);
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault)
                .set_stack_index(gdt::DOUBLE_FAULT_IST);
        }

        let irqs: [extern "x86-interrupt" fn(InterruptStackFrame); IRQ_COUNT] = [
            irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7,
            irq8, irq9, irq10, irq11, irq12, irq13, irq14, irq15,
        ];
        for (irq, handler) in irqs.into_iter().enumerate() {
            idt[pic::irq_vector(irq as u8) as usize].set_handler_fn(handler);
        }

        unsafe {
            idt[SYSCALL_VECTOR]
                .set_handler_addr(VirtAddr::new(syscall::entry as usize as u64))
                .set_privilege_level(PrivilegeLevel::Ring3);
        }

        idt
    };
}

pub fn init() {
    IDT.load();
}

// ---------------------------------------------------------------------------
// Exception
// ---------------------------------------------------------------------------

fn fault(frame: &InterruptStackFrame, name: &str) {
    if frame.code_segment & 3 == 3 {
        syscall::abort_current(name);
    }
    panic!("{} in kernel at {:#x}\n{:#?}", name, frame.instruction_pointer.as_u64(), frame);
}

macro_rules! exception {
    ($name:ident, $label:expr) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame) {
            fault(&frame, $label);
        }
    };
    ($name:ident, $label:expr, code) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame, _code: u64) {
            fault(&frame, $label);
        }
    };
}

exception!(divide_error, "divide error");
exception!(debug, "debug");
exception!(overflow, "overflow");
exception!(bound_range_exceeded, "bound range exceeded");
exception!(invalid_opcode, "invalid opcode");
exception!(device_not_available, "device not available");
exception!(x87_floating_point, "x87 floating point");
exception!(simd_floating_point, "SIMD floating point");
exception!(invalid_tss, "invalid TSS", code);
exception!(segment_not_present, "segment not present", code);
exception!(stack_segment_fault, "stack segment fault", code);
exception!(general_protection_fault, "general protection fault", code);
exception!(alignment_check, "alignment check", code);

extern "x86-interrupt" fn breakpoint(frame: InterruptStackFrame) {
    crate::klog!("breakpoint at {:#x}", frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn page_fault(frame: InterruptStackFrame, code: PageFaultErrorCode) {
    let addr = x86_64::registers::control::Cr2::read();
    crate::kwarn!("page fault at {:#x} ({:?})", addr.as_u64(), code);
    fault(&frame, "page fault");
}

extern "x86-interrupt" fn double_fault(frame: InterruptStackFrame, _code: u64) -> ! {
    panic!("double fault\n{:#?}", frame);
}
