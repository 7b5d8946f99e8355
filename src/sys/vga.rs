//! VGA — penulis teks 80×25 di atas satu halaman video
//!
//! Halaman bisa berupa buffer VGA live atau halaman cadangan terminal;
//! penulis tidak peduli, ia hanya melihat `[u16]`.

use crate::sys::mem::mapper::VideoBinding;

use core::fmt;
use x86_64::instructions::port::Port;

pub const COLS: usize = 80;
pub const ROWS: usize = 25;

/// Sel per halaman 4 KiB (80×25 terpakai, sisanya diam)
pub const PAGE_CELLS: usize = 2048;

/// Abu-abu di atas hitam
const ATTR: u16 = 0x07 << 8;
const BLANK: u16 = ATTR | b' ' as u16;

/// Sumber halaman video untuk sebuah binding
pub trait VideoMemory {
    fn video_page(&mut self, binding: VideoBinding) -> &mut [u16];

    /// Posisi kursor hardware (hanya berarti untuk halaman live)
    fn set_cursor(&mut self, _cursor: Cursor) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub col: usize,
    pub row: usize,
}

pub struct Writer<'a> {
    cells:  &'a mut [u16],
    cursor: &'a mut Cursor,
}

impl<'a> Writer<'a> {
    pub fn new(cells: &'a mut [u16], cursor: &'a mut Cursor) -> Self {
        Self { cells, cursor }
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            0x08  => self.backspace(),
            byte  => {
                let byte = if byte == b'\t' { b' ' } else { byte };
                self.cells[self.cursor.row * COLS + self.cursor.col] = ATTR | byte as u16;
                self.cursor.col += 1;
                if self.cursor.col == COLS {
                    self.new_line();
                }
            }
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }

    /// Mundur satu sel (boleh naik ke baris sebelumnya) dan kosongkan
    pub fn backspace(&mut self) {
        if self.cursor.col > 0 {
            self.cursor.col -= 1;
        } else if self.cursor.row > 0 {
            self.cursor.row -= 1;
            self.cursor.col = COLS - 1;
        } else {
            return;
        }
        self.cells[self.cursor.row * COLS + self.cursor.col] = BLANK;
    }

    pub fn clear(&mut self) {
        self.cells[..COLS * ROWS].fill(BLANK);
        *self.cursor = Cursor::default();
    }

    fn new_line(&mut self) {
        self.cursor.col = 0;
        if self.cursor.row + 1 < ROWS {
            self.cursor.row += 1;
            return;
        }
        self.cells.copy_within(COLS..COLS * ROWS, 0);
        self.cells[COLS * (ROWS - 1)..COLS * ROWS].fill(BLANK);
    }
}

impl fmt::Write for Writer<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Pindahkan kursor hardware VGA (CRTC register 0x0E/0x0F)
pub fn move_hw_cursor(cursor: Cursor) {
    let pos = (cursor.row * COLS + cursor.col) as u16;
    let mut index: Port<u8> = Port::new(0x3D4);
    let mut data:  Port<u8> = Port::new(0x3D5);
    unsafe {
        index.write(0x0F);
        data.write((pos & 0xFF) as u8);
        index.write(0x0E);
        data.write((pos >> 8) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    fn text(cells: &[u16], row: usize) -> std::string::String {
        cells[row * COLS..(row + 1) * COLS]
            .iter()
            .map(|c| (c & 0xFF) as u8 as char)
            .collect::<std::string::String>()
            .trim_end_matches(|c| c == ' ' || c == '\0')
            .into()
    }

    #[test]
    fn writes_and_breaks_lines() {
        let mut cells = vec![0u16; PAGE_CELLS];
        let mut cursor = Cursor::default();
        Writer::new(&mut cells, &mut cursor).write_bytes(b"hi\nthere");
        assert_eq!(text(&cells, 0), "hi");
        assert_eq!(text(&cells, 1), "there");
        assert_eq!(cursor, Cursor { col: 5, row: 1 });
        assert_eq!(cells[0] >> 8, 0x07);
    }

    #[test]
    fn wraps_at_column_eighty() {
        let mut cells = vec![0u16; PAGE_CELLS];
        let mut cursor = Cursor::default();
        Writer::new(&mut cells, &mut cursor).write_bytes(&[b'x'; COLS + 1]);
        assert_eq!(cursor, Cursor { col: 1, row: 1 });
        assert_eq!(text(&cells, 1), "x");
    }

    #[test]
    fn scrolls_when_full() {
        let mut cells = vec![0u16; PAGE_CELLS];
        let mut cursor = Cursor::default();
        let mut w = Writer::new(&mut cells, &mut cursor);
        w.clear();
        w.write_bytes(b"first\n");
        for _ in 0..ROWS - 1 {
            w.write_bytes(b"\n");
        }
        w.write_bytes(b"last");
        drop(w);
        assert_eq!(text(&cells, 0), "");
        assert_eq!(text(&cells, ROWS - 1), "last");
        assert_eq!(cursor.row, ROWS - 1);
    }

    #[test]
    fn backspace_crosses_line_start() {
        let mut cells = vec![0u16; PAGE_CELLS];
        let mut cursor = Cursor { col: 0, row: 1 };
        let mut w = Writer::new(&mut cells, &mut cursor);
        w.backspace();
        drop(w);
        assert_eq!(cursor, Cursor { col: COLS - 1, row: 0 });

        let mut home = Cursor::default();
        Writer::new(&mut cells, &mut home).backspace();
        assert_eq!(home, Cursor::default());
    }
}
