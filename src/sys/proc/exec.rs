//! Exec — siklus hidup proses: execute dan halt
//!
//! Alur execute:
//!   1. parse baris perintah → nama + argumen
//!   2. resolve nama, cek magic ELF, baca entry point (offset 24)
//!   3. alokasi pid, pasang slot pid itu di `USER_BASE`
//!   4. salin seluruh file ke `PROGRAM_IMAGE`
//!   5. isi PCB, arahkan TSS ke kernel stack pid baru
//!   6. kembalikan `Launch`; glue syscall yang melakukan iretq
//!
//! Halt menutup semua fd, membebaskan pid, lalu kembali ke titik execute
//! milik parent. Shell root yang halt diganti shell baru.

use crate::sys::fs::{FileSystem, FileType, FsError, MAX_NAME_LEN};
use crate::sys::kernel::Kernel;
use crate::sys::layout::{MAX_IMAGE_SIZE, NUM_TERMINALS, USER_STACK_TOP};
use crate::sys::mem::mapper::MapError;
use crate::sys::proc::context::{Context, Platform, UserEntry};
use crate::sys::proc::process::{FdEntry, Pid, RunState, ARG_BUF_LEN, MAX_FDS};
use crate::{kerror, klog, kwarn};

use core::fmt;
use object::elf::ELFMAG;

/// Program yang dijalankan di terminal tanpa proses
pub const SHELL: &[u8] = b"shell";

/// Status untuk proses yang dihentikan exception
pub const STATUS_EXCEPTION: i32 = 256;

const HEADER_LEN:   usize = 28;
const ENTRY_OFFSET: usize = 24;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    EmptyCommand,
    NameTooLong,
    NotFound,
    NotExecutable,
    ImageTooLarge,
    ArgsTooLong,
    TableFull,
    Io(FsError),
    Map(MapError),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::EmptyCommand  => write!(f, "empty command"),
            ExecError::NameTooLong   => write!(f, "program name longer than {} bytes", MAX_NAME_LEN),
            ExecError::NotFound      => write!(f, "program not found"),
            ExecError::NotExecutable => write!(f, "not an executable"),
            ExecError::ImageTooLarge => write!(f, "program larger than {} bytes", MAX_IMAGE_SIZE),
            ExecError::ArgsTooLong   => write!(f, "arguments longer than {} bytes", ARG_BUF_LEN),
            ExecError::TableFull     => write!(f, "process table full"),
            ExecError::Io(err)       => write!(f, "load failed: {}", err),
            ExecError::Map(err)      => write!(f, "{}", err),
        }
    }
}

impl From<FsError> for ExecError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => ExecError::NotFound,
            err => ExecError::Io(err),
        }
    }
}

impl From<MapError> for ExecError {
    fn from(err: MapError) -> Self {
        ExecError::Map(err)
    }
}

// ---------------------------------------------------------------------------
// Parse & validate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: &'a [u8],
    pub args: &'a [u8],
}

/// Spasi di depan dilewati; nama sampai spasi berikutnya; argumen adalah
/// sisa setelah tepat satu spasi pemisah, apa adanya. Berhenti di NUL.
pub fn parse_command(line: &[u8]) -> Result<Command<'_>, ExecError> {
    let line = match line.iter().position(|&b| b == 0) {
        Some(end) => &line[..end],
        None => line,
    };
    let start = line.iter().position(|&b| b != b' ').ok_or(ExecError::EmptyCommand)?;
    let rest = &line[start..];
    let end = rest.iter().position(|&b| b == b' ').unwrap_or(rest.len());

    let name = &rest[..end];
    if name.len() > MAX_NAME_LEN {
        return Err(ExecError::NameTooLong);
    }
    let args = rest.get(end + 1..).unwrap_or(&[]);
    Ok(Command { name, args })
}

/// File yang lolos pemeriksaan header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Image {
    pub inode: u32,
    pub len:   usize,
    pub entry: u32,
}

pub fn validate(fs: &dyn FileSystem, name: &[u8]) -> Result<Image, ExecError> {
    let dentry = fs.resolve_name(name)?;
    if dentry.kind != FileType::Regular {
        return Err(ExecError::NotExecutable);
    }

    let mut header = [0u8; HEADER_LEN];
    let n = fs.read_bytes(dentry.inode, 0, &mut header)?;
    if n < HEADER_LEN || header[..4] != ELFMAG {
        return Err(ExecError::NotExecutable);
    }
    let mut entry = [0u8; 4];
    entry.copy_from_slice(&header[ENTRY_OFFSET..ENTRY_OFFSET + 4]);

    let len = fs.file_len(dentry.inode)? as usize;
    if len > MAX_IMAGE_SIZE {
        return Err(ExecError::ImageTooLarge);
    }
    Ok(Image { inode: dentry.inode, len, entry: u32::from_le_bytes(entry) })
}

// ---------------------------------------------------------------------------
// Rencana transfer
// ---------------------------------------------------------------------------

/// Masuk ke program baru; konteks kernel sekarang disimpan di `save`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub pid:   Pid,
    pub save:  *mut Context,
    pub entry: UserEntry,
}

impl Launch {
    /// Kembali saat seseorang me-resume `save`.
    ///
    /// # Safety
    /// Dibuat oleh `execute`/`launch_shell` dan dijalankan sebelum ada
    /// perubahan lain pada tabel proses. Interrupt harus mati.
    pub unsafe fn run<P: Platform>(self) {
        P::save_and_enter(self.save, self.entry);
    }
}

/// Ke mana halt melanjutkan eksekusi
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Kembali ke execute milik parent; status ada di PCB parent
    Parent { ctx: *const Context },
    /// Shell root baru di terminal yang sama
    Relaunch(UserEntry),
    /// Tidak ada yang bisa dijalankan
    Idle,
}

impl Resume {
    /// # Safety
    /// Sama seperti `Launch::run`.
    pub unsafe fn run<P: Platform>(self) -> ! {
        match self {
            Resume::Parent { ctx } => P::resume(ctx),
            Resume::Relaunch(entry) => P::enter(entry),
            Resume::Idle => crate::sys::arch::cpu::idle(),
        }
    }
}

// ---------------------------------------------------------------------------
// Operasi lifecycle di atas kernel
// ---------------------------------------------------------------------------

impl<P: Platform> Kernel<P> {
    /// Muat program ke slot pid baru dan jadikan ia proses sekarang.
    ///
    /// Gagal sebelum alokasi → tidak ada yang berubah. Gagal saat load →
    /// pid dibebaskan dan slot sebelumnya dipasang lagi.
    pub fn spawn(&mut self, line: &[u8], terminal: usize, parent: Option<Pid>) -> Result<(Pid, UserEntry), ExecError> {
        if terminal >= NUM_TERMINALS {
            return Err(ExecError::Map(MapError::InvalidTerminal(terminal)));
        }
        let command = parse_command(line)?;
        let image = validate(self.fs, command.name)?;
        if command.args.len() > ARG_BUF_LEN {
            return Err(ExecError::ArgsTooLong);
        }

        let pid = self.procs.allocate_pid().ok_or(ExecError::TableFull)?;
        let previous = self.mapper.installed_slot();
        if let Err(err) = self.load(pid, image) {
            self.procs.free_pid(pid);
            match previous {
                Some(phys) => self.mapper.map_process_slot(phys, true, &mut self.platform),
                None => {
                    let _ = self.mapper.map_slot(pid, false, &mut self.platform);
                }
            }
            kwarn!("exec: loading pid {} failed: {}", pid, err);
            return Err(err);
        }

        let kernel_stack = self
            .platform
            .kernel_stack_top(pid)
            .ok_or(ExecError::Map(MapError::InvalidPid(pid.index())))?;

        let pcb = self.procs.live_pcb_mut(pid).map_err(|_| ExecError::TableFull)?;
        pcb.reset(pid, terminal, parent, command.args).map_err(|_| ExecError::ArgsTooLong)?;

        self.procs.set_foreground(terminal, Some(pid));
        self.sched.set_current(Some(pid), terminal);
        self.platform.set_kernel_stack(kernel_stack);
        self.mapper.remap_terminal_video(terminal, self.terms.is_visible(terminal), &mut self.platform)?;
        self.mapper.flush(&mut self.platform);

        klog!(
            "exec: pid {} on terminal {} (parent {}) entry {:#x}",
            pid, terminal, Pid::as_raw(parent), image.entry
        );
        let entry = UserEntry {
            entry:        image.entry as u64,
            user_stack:   USER_STACK_TOP,
            kernel_stack,
        };
        Ok((pid, entry))
    }

    fn load(&mut self, pid: Pid, image: Image) -> Result<(), ExecError> {
        self.mapper.map_slot(pid, true, &mut self.platform)?;
        let window = self.platform.load_window();
        let window = window.get_mut(..image.len).ok_or(ExecError::ImageTooLarge)?;
        let n = self.fs.read_bytes(image.inode, 0, window)?;
        if n != image.len {
            return Err(ExecError::Io(FsError::Corrupt));
        }
        Ok(())
    }

    /// execute dari proses sekarang: anak mewarisi terminal, parent menunggu
    pub fn execute(&mut self, line: &[u8]) -> Result<Launch, ExecError> {
        let parent = self.sched.current();
        let terminal = self.sched.current_terminal();
        let (pid, entry) = self.spawn(line, terminal, parent)?;

        if let Some(pcb) = self.procs.pcb_for_mut(parent) {
            pcb.state = RunState::Suspended;
            pcb.child_status = None;
        }
        let save = self.exec_return_ptr(pid)?;
        Ok(Launch { pid, save, entry })
    }

    /// Shell root untuk `terminal`; proses yang sekarang jalan ditangguhkan
    /// seperti pada context switch biasa.
    pub fn launch_shell(&mut self, terminal: usize) -> Result<Launch, ExecError> {
        let from = self.sched.current();
        let (pid, entry) = self.spawn(SHELL, terminal, None)?;
        klog!("exec: shell pid {} started on terminal {}", pid, terminal);

        let pcb = self
            .procs
            .pcb_for_mut(from)
            .ok_or(ExecError::Map(MapError::InvalidPid(Pid::as_raw(from) as usize)))?;
        pcb.state = RunState::Suspended;
        Ok(Launch { pid, save: &mut pcb.context as *mut Context, entry })
    }

    /// Shell pertama di terminal 0
    pub fn boot(&mut self) -> Result<Launch, ExecError> {
        self.terms.set_visible(0);
        self.terms.mark_started(0);
        self.launch_shell(0)
    }

    /// Status yang dititipkan anak terakhir, dibaca setelah `Resume::Parent`
    pub fn collect_status(&mut self) -> i32 {
        let current = self.sched.current();
        self.procs
            .pcb_for_mut(current)
            .and_then(|pcb| pcb.child_status.take())
            .unwrap_or(-1)
    }

    pub fn halt(&mut self, status: i32) -> Resume {
        let Some(pid) = self.sched.current() else {
            kwarn!("halt: no process is running");
            return Resume::Idle;
        };
        let Some((terminal, parent)) = self.procs.pcb_for(Some(pid)).map(|pcb| (pcb.terminal, pcb.parent)) else {
            return Resume::Idle;
        };

        self.close_all(pid, terminal);
        self.procs.free_pid(pid);
        klog!("halt: pid {} status {}", pid, status);

        match parent.filter(|&p| self.procs.is_live(p)) {
            Some(parent) => self.return_to_parent(pid, parent, terminal, status),
            None => {
                self.procs.set_foreground(terminal, None);
                self.sched.set_current(None, terminal);
                klog!("halt: relaunching shell on terminal {}", terminal);
                match self.spawn(SHELL, terminal, None) {
                    Ok((_, entry)) => Resume::Relaunch(entry),
                    Err(err) => {
                        kerror!("halt: shell relaunch failed: {}", err);
                        Resume::Idle
                    }
                }
            }
        }
    }

    fn return_to_parent(&mut self, child: Pid, parent: Pid, terminal: usize, status: i32) -> Resume {
        if let Some(pcb) = self.procs.pcb_for_mut(Some(parent)) {
            pcb.child_status = Some(status);
            pcb.state = RunState::Running;
        }
        self.procs.set_foreground(terminal, Some(parent));
        self.sched.set_current(Some(parent), terminal);

        if let Err(err) = self.mapper.map_slot(parent, true, &mut self.platform) {
            kerror!("halt: cannot restore slot of pid {}: {}", parent, err);
            return Resume::Idle;
        }
        if let Some(top) = self.platform.kernel_stack_top(parent) {
            self.platform.set_kernel_stack(top);
        }
        self.mapper.flush(&mut self.platform);

        match self.procs.pcb_for(Some(child)) {
            Some(pcb) => Resume::Parent { ctx: &pcb.exec_return as *const Context },
            None => Resume::Idle,
        }
    }

    /// Tutup semua fd lewat tabelnya, lalu arahkan ke tabel CLOSED
    fn close_all(&mut self, pid: Pid, terminal: usize) {
        let (mut io, procs) = self.io_and_procs(terminal);
        let Some(pcb) = procs.pcb_for_mut(Some(pid)) else {
            return;
        };
        for fd in 0..MAX_FDS {
            let entry = &mut pcb.fds[fd];
            if entry.in_use {
                let ops = entry.ops;
                if let Err(err) = ops.close(&mut io, entry) {
                    kwarn!("halt: closing fd {} of pid {}: {}", fd, pid, err);
                }
            }
            *entry = FdEntry::closed();
        }
    }

    fn exec_return_ptr(&mut self, pid: Pid) -> Result<*mut Context, ExecError> {
        let pcb = self
            .procs
            .pcb_for_mut(Some(pid))
            .ok_or(ExecError::Map(MapError::InvalidPid(pid.index())))?;
        Ok(&mut pcb.exec_return as *mut Context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::fs::rofs::{RoFs, BLOCK_SIZE};
    use crate::sys::fs::testing::{executable, ImageBuilder};
    use crate::sys::layout::MAX_PROCS;
    use crate::sys::proc::mock::{self, MockPlatform};
    use std::vec;

    fn booted() -> Kernel<MockPlatform> {
        let mut k = mock::kernel();
        let launch = k.boot().unwrap();
        unsafe { launch.run::<MockPlatform>() };
        k
    }

    fn live_pids(k: &Kernel<MockPlatform>) -> usize {
        (0..MAX_PROCS).filter(|&i| k.procs.is_live(Pid::new(i))).count()
    }

    #[test]
    fn parse_strips_name_and_one_space() {
        let cmd = parse_command(b"   cat  frame0.txt ").unwrap();
        assert_eq!(cmd.name, b"cat");
        assert_eq!(cmd.args, b" frame0.txt ");

        let cmd = parse_command(b"ls\0garbage").unwrap();
        assert_eq!(cmd.name, b"ls");
        assert_eq!(cmd.args, b"");
    }

    #[test]
    fn parse_rejects_empty_and_long_names() {
        assert_eq!(parse_command(b""), Err(ExecError::EmptyCommand));
        assert_eq!(parse_command(b"    "), Err(ExecError::EmptyCommand));
        assert_eq!(parse_command(&[b'a'; MAX_NAME_LEN + 1]), Err(ExecError::NameTooLong));
        assert!(parse_command(&[b'a'; MAX_NAME_LEN]).is_ok());
    }

    #[test]
    fn validate_reads_entry_point() {
        let bin = executable(0x0804_8100, 64);
        let image = ImageBuilder::new().file(b"prog", &bin).file(b"text", b"plain words here, not a program").build();
        let fs = RoFs::new(&image).unwrap();

        let img = validate(&fs, b"prog").unwrap();
        assert_eq!(img.entry, 0x0804_8100);
        assert_eq!(img.len, bin.len());
        assert_eq!(validate(&fs, b"text"), Err(ExecError::NotExecutable));
        assert_eq!(validate(&fs, b"."), Err(ExecError::NotExecutable));
        assert_eq!(validate(&fs, b"missing"), Err(ExecError::NotFound));
    }

    #[test]
    fn boot_launches_root_shell() {
        let k = booted();
        let entered = MockPlatform::entered();
        assert_eq!(entered.len(), 1);
        assert_eq!(entered[0].entry, mock::SHELL_ENTRY as u64);
        assert_eq!(entered[0].user_stack, USER_STACK_TOP);

        let pcb = k.procs.pcb_for(Some(Pid::new(0))).unwrap();
        assert_eq!(pcb.parent, None);
        assert!(k.terms.is_started(0));
        assert_eq!(&k.platform.window[..4], &ELFMAG);
        assert_eq!(k.mapper.installed_slot(), k.mapper.slot_phys(Pid::new(0)).ok());
    }

    #[test]
    fn missing_program_leaves_table_untouched() {
        let mut k = booted();
        let slot = k.mapper.installed_slot();
        assert_eq!(k.execute(b"doesnotexist").err(), Some(ExecError::NotFound));
        assert_eq!(live_pids(&k), 1);
        assert_eq!(k.sched.current(), Some(Pid::new(0)));
        assert_eq!(k.mapper.installed_slot(), slot);
    }

    #[test]
    fn execute_takes_lowest_pid_and_keeps_args() {
        let mut k = booted();
        let launch = k.execute(b"shell arg1 arg2").unwrap();
        assert_eq!(launch.pid, Pid::new(1));

        let pcb = k.procs.pcb_for(Some(Pid::new(1))).unwrap();
        assert_eq!(pcb.args.as_bytes(), b"arg1 arg2");
        assert_eq!(pcb.parent, Some(Pid::new(0)));
        assert_eq!(pcb.terminal, 0);
        assert_eq!(k.procs.foreground(0), Some(Pid::new(1)));
        assert_eq!(launch.save, &k.procs.pcb_for(Some(Pid::new(1))).unwrap().exec_return as *const Context as *mut Context);
        assert_eq!(launch.entry.kernel_stack, k.platform.kernel_stack);
    }

    #[test]
    fn full_table_rejects_execute() {
        let mut k = booted();
        for _ in 1..MAX_PROCS {
            let launch = k.execute(b"hello").unwrap();
            unsafe { launch.run::<MockPlatform>() };
        }
        assert_eq!(k.execute(b"hello").err(), Some(ExecError::TableFull));
        assert_eq!(live_pids(&k), MAX_PROCS);
    }

    #[test]
    fn halt_returns_status_to_parent() {
        let mut k = booted();
        let parent_cpu = Context { rsp: 0xAAAA_0000, rbp: 0xAAAA_0100 };
        MockPlatform::set_cpu(parent_cpu);

        let launch = k.execute(b"hello").unwrap();
        unsafe { launch.run::<MockPlatform>() };

        match k.halt(42) {
            Resume::Parent { ctx } => assert_eq!(unsafe { *ctx }, parent_cpu),
            other => panic!("expected parent resume, got {:?}", other),
        }
        assert_eq!(k.collect_status(), 42);
        assert_eq!(k.collect_status(), -1);
        assert_eq!(k.sched.current(), Some(Pid::new(0)));
        assert_eq!(k.procs.foreground(0), Some(Pid::new(0)));
        assert!(!k.procs.is_live(Pid::new(1)));
        assert_eq!(k.mapper.installed_slot(), k.mapper.slot_phys(Pid::new(0)).ok());
        assert_eq!(Some(k.platform.kernel_stack), k.platform.kernel_stack_top(Pid::new(0)));
    }

    #[test]
    fn halting_root_shell_relaunches_in_same_terminal() {
        let mut k = booted();
        match k.halt(0) {
            Resume::Relaunch(entry) => assert_eq!(entry.entry, mock::SHELL_ENTRY as u64),
            other => panic!("expected relaunch, got {:?}", other),
        }
        assert!(k.terms.is_started(0));
        assert_eq!(k.procs.foreground(0), Some(Pid::new(0)));
        assert_eq!(k.procs.pcb_for(Some(Pid::new(0))).unwrap().parent, None);
        assert_eq!(live_pids(&k), 1);
    }

    #[test]
    fn halt_closes_every_descriptor() {
        let mut k = booted();
        k.open(b"frame0.txt").unwrap();
        let launch = k.execute(b"hello").unwrap();
        unsafe { launch.run::<MockPlatform>() };
        k.open(b"rtc").unwrap();
        k.halt(1);

        let child = k.procs.pcb_for(Some(Pid::new(1))).unwrap();
        assert!(child.fds.iter().all(|fd| !fd.in_use && fd.ops.name() == "closed"));
        // fd parent tetap terbuka
        assert!(k.procs.pcb_for(Some(Pid::new(0))).unwrap().fds[2].in_use);
    }

    #[test]
    fn failed_load_restores_previous_slot() {
        // Blok pertama (header) sah, blok kedua menunjuk di luar image
        let shell = executable(mock::SHELL_ENTRY, 16);
        let big = executable(0x0804_8000, BLOCK_SIZE + 100);
        let mut image = ImageBuilder::new().file(b"shell", &shell).file(b"broken", &big).build();
        let inode_at = BLOCK_SIZE * 2;
        image[inode_at + 8..inode_at + 12].copy_from_slice(&999u32.to_le_bytes());

        let mut k = mock::kernel_with_image(image);
        unsafe { k.boot().unwrap().run::<MockPlatform>() };
        let slot = k.mapper.installed_slot();
        assert_eq!(slot, k.mapper.slot_phys(Pid::new(0)).ok());

        assert_eq!(k.execute(b"broken").err(), Some(ExecError::Io(FsError::Corrupt)));
        assert_eq!(live_pids(&k), 1);
        assert_eq!(k.mapper.installed_slot(), slot);
        assert_eq!(k.sched.current(), Some(Pid::new(0)));
    }

    #[test]
    fn oversized_args_are_rejected_before_allocation() {
        let mut k = booted();
        let mut line = vec![b'a'; ARG_BUF_LEN + 1];
        line.splice(0..0, b"hello ".iter().copied());
        assert_eq!(k.execute(&line).err(), Some(ExecError::ArgsTooLong));
        assert_eq!(live_pids(&k), 1);
    }
}
