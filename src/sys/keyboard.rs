//! Keyboard — PS/2 scancode set 1 (IRQ 1)
//!
//! `pc-keyboard` menerjemahkan scancode ke karakter; Alt dan Ctrl
//! dilacak sendiri karena kombinasi Alt+F1..F3 (ganti terminal) dan
//! Ctrl+L (bersihkan layar) bukan karakter.

use crate::sys::arch::idt;
use crate::sys::kernel;
use crate::sys::layout::NUM_TERMINALS;
use crate::sys::term::Key;

use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};
use spin::Mutex;
use x86_64::instructions::port::Port;

const DATA_PORT: u16 = 0x60;

const ALT_DOWN:  u8 = 0x38;
const ALT_UP:    u8 = 0xB8;
const CTRL_DOWN: u8 = 0x1D;
const CTRL_UP:   u8 = 0x9D;
const F1_DOWN:   u8 = 0x3B;

pub struct Decoder {
    keyboard: Keyboard<layouts::Us104Key, ScancodeSet1>,
    alt:      bool,
    ctrl:     bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            keyboard: Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore),
            alt:      false,
            ctrl:     false,
        }
    }

    pub fn feed(&mut self, scancode: u8) -> Option<Key> {
        match scancode {
            ALT_DOWN  => self.alt = true,
            ALT_UP    => self.alt = false,
            CTRL_DOWN => self.ctrl = true,
            CTRL_UP   => self.ctrl = false,
            _ => {}
        }

        let fkey = scancode.wrapping_sub(F1_DOWN) as usize;
        if self.alt && fkey < NUM_TERMINALS {
            return Some(Key::Switch(fkey));
        }

        let event = self.keyboard.add_byte(scancode).ok()??;
        match self.keyboard.process_keyevent(event)? {
            DecodedKey::Unicode('\n') => Some(Key::Enter),
            DecodedKey::Unicode('\u{8}') => Some(Key::Backspace),
            DecodedKey::Unicode(c) if self.ctrl && c.eq_ignore_ascii_case(&'l') => {
                Some(Key::ClearScreen)
            }
            DecodedKey::Unicode(c) if c == ' ' || c.is_ascii_graphic() => Some(Key::Char(c as u8)),
            _ => None,
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref DECODER: Mutex<Decoder> = Mutex::new(Decoder::new());
}

pub fn init() {
    idt::set_irq_handler(1, on_irq);
}

fn on_irq() {
    let scancode: u8 = unsafe { Port::new(DATA_PORT).read() };
    let Some(key) = DECODER.lock().feed(scancode) else {
        return;
    };
    if kernel::try_with_kernel(|k| k.key_input(key)).is_none() {
        crate::kwarn!("keyboard: kernel busy, dropped {:?}", key);
    }
}
