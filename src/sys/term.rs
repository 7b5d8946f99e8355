//! Terminal — tiga konsol virtual
//!
//! Tiap terminal punya kursor, baris input yang sedang diketik, dan
//! satu baris selesai yang menunggu diambil `read(0, ..)`. Hanya satu
//! terminal yang tampil; yang lain menulis ke halaman cadangannya.

use crate::sys::layout::NUM_TERMINALS;
use crate::sys::mem::mapper::VideoBinding;
use crate::sys::vga::{Cursor, VideoMemory, Writer};

pub const LINE_LEN: usize = 128;

/// Input yang sudah diterjemahkan dari keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(u8),
    Backspace,
    Enter,
    ClearScreen,
    Switch(usize),
}

pub struct Terminal {
    pub started: bool,
    cursor:      Cursor,
    line:        [u8; LINE_LEN],
    line_len:    usize,
    ready:       [u8; LINE_LEN],
    ready_len:   Option<usize>,
}

impl Terminal {
    const fn new() -> Self {
        Self {
            started:   false,
            cursor:    Cursor { col: 0, row: 0 },
            line:      [0; LINE_LEN],
            line_len:  0,
            ready:     [0; LINE_LEN],
            ready_len: None,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Satu byte disisakan untuk '\n'
    pub fn push_char(&mut self, byte: u8) -> bool {
        if self.line_len >= LINE_LEN - 1 {
            return false;
        }
        self.line[self.line_len] = byte;
        self.line_len += 1;
        true
    }

    pub fn pop_char(&mut self) -> bool {
        if self.line_len == 0 {
            return false;
        }
        self.line_len -= 1;
        true
    }

    /// Enter: baris + '\n' masuk ke latch, baris diketik dikosongkan
    pub fn complete_line(&mut self) {
        self.line[self.line_len] = b'\n';
        let len = self.line_len + 1;
        self.ready[..len].copy_from_slice(&self.line[..len]);
        self.ready_len = Some(len);
        self.line_len = 0;
    }

    pub fn has_line(&self) -> bool {
        self.ready_len.is_some()
    }

    /// Ambil baris selesai (dipotong ke `buf`); `None` kalau belum ada
    pub fn take_line(&mut self, buf: &mut [u8]) -> Option<usize> {
        let len = self.ready_len.take()?;
        let n = len.min(buf.len());
        buf[..n].copy_from_slice(&self.ready[..n]);
        Some(n)
    }

    pub fn pending(&self) -> &[u8] {
        &self.line[..self.line_len]
    }
}

pub struct Terminals {
    terms:   [Terminal; NUM_TERMINALS],
    visible: usize,
}

impl Terminals {
    pub const fn new() -> Self {
        Self { terms: [const { Terminal::new() }; NUM_TERMINALS], visible: 0 }
    }

    pub fn init(&mut self) {
        self.terms = [const { Terminal::new() }; NUM_TERMINALS];
        self.visible = 0;
    }

    pub fn get(&self, t: usize) -> Option<&Terminal> {
        self.terms.get(t)
    }

    pub fn get_mut(&mut self, t: usize) -> Option<&mut Terminal> {
        self.terms.get_mut(t)
    }

    pub fn visible(&self) -> usize {
        self.visible
    }

    pub fn is_visible(&self, t: usize) -> bool {
        self.visible == t
    }

    pub fn set_visible(&mut self, t: usize) {
        if t < NUM_TERMINALS {
            self.visible = t;
        }
    }

    pub fn binding(&self, t: usize) -> VideoBinding {
        VideoBinding::for_terminal(t, self.is_visible(t))
    }

    pub fn is_started(&self, t: usize) -> bool {
        self.terms.get(t).is_some_and(|term| term.started)
    }

    /// `true` kalau terminal baru pertama kali dimulai
    pub fn mark_started(&mut self, t: usize) -> bool {
        match self.terms.get_mut(t) {
            Some(term) if !term.started => {
                term.started = true;
                true
            }
            _ => false,
        }
    }

    pub fn started_count(&self) -> usize {
        self.terms.iter().filter(|t| t.started).count()
    }

    /// Terminal started berikutnya setelah `t`, berputar; `t` sendiri terakhir
    pub fn next_started_after(&self, t: usize) -> Option<usize> {
        (1..=NUM_TERMINALS)
            .map(|step| (t + step) % NUM_TERMINALS)
            .find(|&next| self.is_started(next))
    }

    pub fn write<V: VideoMemory + ?Sized>(&mut self, t: usize, video: &mut V, bytes: &[u8]) -> usize {
        let binding = self.binding(t);
        let Some(term) = self.terms.get_mut(t) else {
            return 0;
        };
        Writer::new(video.video_page(binding), &mut term.cursor).write_bytes(bytes);
        if binding == VideoBinding::Live {
            video.set_cursor(term.cursor);
        }
        bytes.len()
    }

    /// Input keyboard untuk terminal yang tampil (selain `Key::Switch`)
    pub fn input<V: VideoMemory + ?Sized>(&mut self, key: Key, video: &mut V) {
        let term = &mut self.terms[self.visible];
        match key {
            Key::Char(byte) => {
                if term.push_char(byte) {
                    Writer::new(video.video_page(VideoBinding::Live), &mut term.cursor).write_byte(byte);
                }
            }
            Key::Backspace => {
                if term.pop_char() {
                    Writer::new(video.video_page(VideoBinding::Live), &mut term.cursor).backspace();
                }
            }
            Key::Enter => {
                term.complete_line();
                Writer::new(video.video_page(VideoBinding::Live), &mut term.cursor).write_byte(b'\n');
            }
            Key::ClearScreen => {
                let Terminal { cursor, line, line_len, .. } = term;
                let mut echo = Writer::new(video.video_page(VideoBinding::Live), cursor);
                echo.clear();
                echo.write_bytes(&line[..*line_len]);
            }
            Key::Switch(_) => return,
        }
        video.set_cursor(term.cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::vga::{COLS, PAGE_CELLS};
    use std::vec;
    use std::vec::Vec;

    struct Pages(Vec<Vec<u16>>);

    impl Pages {
        fn new() -> Self {
            Pages(vec![vec![0; PAGE_CELLS]; NUM_TERMINALS + 1])
        }

        fn row(&self, binding: VideoBinding, row: usize) -> std::string::String {
            let page = match binding {
                VideoBinding::Live => &self.0[0],
                VideoBinding::Backing(t) => &self.0[t + 1],
            };
            page[row * COLS..(row + 1) * COLS]
                .iter()
                .map(|c| (c & 0xFF) as u8)
                .filter(|&b| b != 0 && b != b' ')
                .map(char::from)
                .collect()
        }
    }

    impl VideoMemory for Pages {
        fn video_page(&mut self, binding: VideoBinding) -> &mut [u16] {
            match binding {
                VideoBinding::Live => &mut self.0[0],
                VideoBinding::Backing(t) => &mut self.0[t + 1],
            }
        }
    }

    fn terminals() -> Terminals {
        let mut t = Terminals::new();
        t.init();
        t
    }

    #[test]
    fn typed_line_is_echoed_and_latched() {
        let mut terms = terminals();
        let mut pages = Pages::new();
        for &b in b"lsx" {
            terms.input(Key::Char(b), &mut pages);
        }
        terms.input(Key::Backspace, &mut pages);
        assert_eq!(terms.get(0).unwrap().pending(), b"ls");
        assert!(!terms.get(0).unwrap().has_line());

        terms.input(Key::Enter, &mut pages);
        assert_eq!(pages.row(VideoBinding::Live, 0), "ls");

        let mut buf = [0u8; 16];
        let n = terms.get_mut(0).unwrap().take_line(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ls\n");
        assert_eq!(terms.get_mut(0).unwrap().take_line(&mut buf), None);
    }

    #[test]
    fn line_keeps_room_for_newline() {
        let mut terms = terminals();
        let mut pages = Pages::new();
        for _ in 0..LINE_LEN + 10 {
            terms.input(Key::Char(b'a'), &mut pages);
        }
        terms.input(Key::Enter, &mut pages);

        let mut buf = [0u8; LINE_LEN];
        let n = terms.get_mut(0).unwrap().take_line(&mut buf).unwrap();
        assert_eq!(n, LINE_LEN);
        assert_eq!(buf[LINE_LEN - 1], b'\n');
    }

    #[test]
    fn short_read_truncates_line() {
        let mut terms = terminals();
        let mut pages = Pages::new();
        for &b in b"hello" {
            terms.input(Key::Char(b), &mut pages);
        }
        terms.input(Key::Enter, &mut pages);
        let mut buf = [0u8; 3];
        assert_eq!(terms.get_mut(0).unwrap().take_line(&mut buf), Some(3));
        assert_eq!(&buf, b"hel");
    }

    #[test]
    fn background_output_goes_to_backing_page() {
        let mut terms = terminals();
        let mut pages = Pages::new();
        terms.write(1, &mut pages, b"bg");
        terms.write(0, &mut pages, b"fg");
        assert_eq!(pages.row(VideoBinding::Backing(1), 0), "bg");
        assert_eq!(pages.row(VideoBinding::Live, 0), "fg");
    }

    #[test]
    fn clear_screen_redraws_pending_input() {
        let mut terms = terminals();
        let mut pages = Pages::new();
        terms.write(0, &mut pages, b"old\nstuff");
        terms.input(Key::Char(b'p'), &mut pages);
        terms.input(Key::ClearScreen, &mut pages);
        assert_eq!(pages.row(VideoBinding::Live, 0), "p");
        assert_eq!(pages.row(VideoBinding::Live, 1), "");
    }

    #[test]
    fn started_scan_is_cyclic() {
        let mut terms = terminals();
        assert_eq!(terms.next_started_after(0), None);
        assert!(terms.mark_started(0));
        assert!(!terms.mark_started(0));
        assert_eq!(terms.next_started_after(0), Some(0));
        terms.mark_started(2);
        assert_eq!(terms.next_started_after(0), Some(2));
        assert_eq!(terms.next_started_after(2), Some(0));
        assert_eq!(terms.next_started_after(1), Some(2));
        assert_eq!(terms.started_count(), 2);
    }
}
