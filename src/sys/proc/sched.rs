//! Scheduler Trident — round-robin antar terminal
//!
//! Cara kerja:
//!   - IRQ 0 (timer) memanggil `tick` setiap 1 ms
//!   - Setiap `TICKS_PER_SLICE` tick, `on_tick` memilih terminal started
//!     berikutnya (urut indeks, berputar) dan proses foreground-nya
//!   - Terminal started yang belum punya proses mendapat shell baru;
//!     kalau tabel penuh, terminal itu dilewati sampai slot kosong
//!   - Switch sebenarnya (simpan/muat rsp+rbp) dijalankan setelah lock
//!     kernel dilepas, lewat `Switch::run`

use crate::sys::kernel::{self, Kernel};
use crate::sys::layout::{MAX_PROCS, NUM_TERMINALS};
use crate::sys::mem::mapper::MapError;
use crate::sys::proc::context::{Context, Hardware, Platform};
use crate::sys::proc::exec::Launch;
use crate::sys::proc::process::{Pid, RunState};
use crate::{kerror, kwarn};

use core::fmt;

// ---------------------------------------------------------------------------
// Interval scheduler
// ---------------------------------------------------------------------------

/// Switch terminal setiap 40 ms (40 tick @ 1000 Hz = 25 Hz)
pub const TICKS_PER_SLICE: u64 = 40;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Proses yang sedang jalan dan terminal tempat ia jalan.
///
/// Hanya diubah oleh `context_switch`, `spawn`, dan `halt`.
pub struct Scheduler {
    current:          Option<Pid>,
    current_terminal: usize,
    /// Terminal yang shell-nya gagal dibuat; dicatat sekali saja
    launch_failed:    [bool; NUM_TERMINALS],
}

impl Scheduler {
    pub const fn new() -> Self {
        Self { current: None, current_terminal: 0, launch_failed: [false; NUM_TERMINALS] }
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn current_terminal(&self) -> usize {
        self.current_terminal
    }

    pub fn set_current(&mut self, pid: Option<Pid>, terminal: usize) {
        self.current = pid;
        self.current_terminal = terminal;
    }

    pub fn launch_failed(&self, t: usize) -> bool {
        self.launch_failed.get(t).copied().unwrap_or(false)
    }

    /// `true` kalau ini kegagalan pertama sejak launch terakhir yang sukses
    fn note_launch_failure(&mut self, t: usize) -> bool {
        match self.launch_failed.get_mut(t) {
            Some(failed) => !core::mem::replace(failed, true),
            None => false,
        }
    }

    fn clear_launch_failure(&mut self, t: usize) {
        if let Some(failed) = self.launch_failed.get_mut(t) {
            *failed = false;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    InvalidPid(usize),
    NotLive(Pid),
    Map(MapError),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SchedError::InvalidPid(pid) => write!(f, "pid {} out of range", pid),
            SchedError::NotLive(pid)    => write!(f, "pid {} is not running", pid),
            SchedError::Map(err)        => write!(f, "{}", err),
        }
    }
}

impl From<MapError> for SchedError {
    fn from(err: MapError) -> Self {
        SchedError::Map(err)
    }
}

// ---------------------------------------------------------------------------
// Rencana switch
// ---------------------------------------------------------------------------

/// Simpan konteks sekarang ke `from`, lanjut dari `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: *mut Context,
    pub to:   *const Context,
}

impl Switch {
    /// # Safety
    /// Pointer harus berasal dari `context_switch` dan PCB keduanya belum
    /// dipakai ulang. Interrupt harus mati.
    pub unsafe fn run<P: Platform>(self) {
        P::save_and_switch(self.from, self.to);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Idle,
    Switch(Switch),
    /// Terminal started tanpa proses: shell baru
    Launch(Launch),
}

// ---------------------------------------------------------------------------
// Operasi scheduler di atas kernel
// ---------------------------------------------------------------------------

impl<P: Platform> Kernel<P> {
    /// Pilih terminal berikutnya dan siapkan switch ke foreground-nya.
    ///
    /// Terminal started yang shell-nya tidak bisa dibuat (tabel penuh)
    /// dilewati; scan lanjut ke terminal started berikutnya.
    pub fn on_tick(&mut self) -> Tick {
        if self.terms.started_count() < 2 {
            return Tick::Idle;
        }

        let mut at = self.sched.current_terminal();
        for _ in 0..NUM_TERMINALS {
            let Some(next) = self.terms.next_started_after(at) else {
                break;
            };
            at = next;

            if let Some(to) = self.procs.foreground(next) {
                return match self.context_switch(self.sched.current(), Some(to)) {
                    Ok(Some(switch)) => Tick::Switch(switch),
                    Ok(None) => Tick::Idle,
                    Err(err) => {
                        kwarn!("sched: switch to pid {} refused: {}", to, err);
                        Tick::Idle
                    }
                };
            }

            match self.launch_shell(next) {
                Ok(launch) => {
                    self.sched.clear_launch_failure(next);
                    return Tick::Launch(launch);
                }
                Err(err) => {
                    if self.sched.note_launch_failure(next) {
                        kerror!("sched: cannot start shell on terminal {}: {}", next, err);
                    }
                }
            }
        }
        Tick::Idle
    }

    /// Pindahkan semua state global ke `to`; pointer konteks dikembalikan
    /// untuk dijalankan setelah lock dilepas.
    ///
    /// `None` adalah root (−1) dan selalu sah. Pid lain harus hidup.
    /// Switch ke diri sendiri menghasilkan `Ok(None)`.
    pub fn context_switch(&mut self, from: Option<Pid>, to: Option<Pid>) -> Result<Option<Switch>, SchedError> {
        for pid in [from, to].into_iter().flatten() {
            if pid.index() >= MAX_PROCS {
                kwarn!("sched: {}", SchedError::InvalidPid(pid.index()));
                return Err(SchedError::InvalidPid(pid.index()));
            }
            if !self.procs.is_live(pid) {
                kwarn!("sched: {}", SchedError::NotLive(pid));
                return Err(SchedError::NotLive(pid));
            }
        }
        if from == to {
            return Ok(None);
        }

        let terminal = match to {
            Some(pid) => {
                let terminal = self.procs.pcb_for(Some(pid)).map_or(0, |pcb| pcb.terminal);
                self.mapper.map_slot(pid, true, &mut self.platform)?;
                self.mapper.remap_terminal_video(terminal, self.terms.is_visible(terminal), &mut self.platform)?;
                if let Some(top) = self.platform.kernel_stack_top(pid) {
                    self.platform.set_kernel_stack(top);
                }
                terminal
            }
            None => self.sched.current_terminal(),
        };
        self.sched.set_current(to, terminal);
        self.mapper.flush(&mut self.platform);

        if let Some(pcb) = self.procs.pcb_for_mut(from) {
            pcb.state = RunState::Suspended;
        }
        if let Some(pcb) = self.procs.pcb_for_mut(to) {
            pcb.state = RunState::Running;
        }

        let (from, to) = self
            .procs
            .context_ptrs(from, to)
            .ok_or(SchedError::InvalidPid(MAX_PROCS))?;
        Ok(Some(Switch { from, to }))
    }
}

// ---------------------------------------------------------------------------
// tick(): dipanggil dari clk::on_tick setiap timer interrupt
// ---------------------------------------------------------------------------

pub fn tick(ticks: u64) {
    if ticks % TICKS_PER_SLICE != 0 {
        return;
    }

    // Lock sedang dipegang: tick ini dilewati
    let Some(plan) = kernel::try_with_kernel(|k| k.on_tick()) else {
        return;
    };

    match plan {
        Tick::Idle => {}
        Tick::Switch(switch) => unsafe { switch.run::<Hardware>() },
        Tick::Launch(launch) => unsafe { launch.run::<Hardware>() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::mem::mapper::VideoBinding;
    use crate::sys::proc::exec::ExecError;
    use crate::sys::proc::mock::{self, MockPlatform};

    /// Shell di terminal 0 dan 1, terminal 1 yang terakhir jalan
    fn two_terminals() -> Kernel<MockPlatform> {
        let mut k = mock::kernel();
        k.boot().unwrap();
        k.switch_terminal(1).unwrap();
        match k.on_tick() {
            Tick::Launch(launch) => unsafe { launch.run::<MockPlatform>() },
            other => panic!("expected shell launch, got {:?}", other),
        }
        k
    }

    #[test]
    fn single_terminal_never_switches() {
        let mut k = mock::kernel();
        k.boot().unwrap();
        assert_eq!(k.on_tick(), Tick::Idle);
        assert_eq!(k.sched.current(), Some(Pid::new(0)));
    }

    #[test]
    fn new_terminal_gets_a_shell_on_next_tick() {
        let k = two_terminals();
        assert_eq!(k.procs.foreground(0), Some(Pid::new(0)));
        assert_eq!(k.procs.foreground(1), Some(Pid::new(1)));
        assert_eq!(k.sched.current(), Some(Pid::new(1)));
        assert_eq!(k.sched.current_terminal(), 1);
        assert_eq!(k.procs.pcb_for(Some(Pid::new(1))).unwrap().parent, None);
        assert_eq!(k.procs.pcb_for(Some(Pid::new(0))).unwrap().state, RunState::Suspended);
    }

    #[test]
    fn ticks_alternate_between_started_terminals() {
        let mut k = two_terminals();

        let Tick::Switch(_) = k.on_tick() else { panic!("expected switch") };
        assert_eq!(k.sched.current(), Some(Pid::new(0)));
        assert_eq!(k.sched.current_terminal(), 0);

        let Tick::Switch(_) = k.on_tick() else { panic!("expected switch") };
        assert_eq!(k.sched.current(), Some(Pid::new(1)));
        assert_eq!(k.sched.current_terminal(), 1);
    }

    #[test]
    fn full_table_does_not_starve_other_terminals() {
        let mut k = two_terminals();
        // Terminal 1: shell + 4 hello bersarang, tabel penuh
        for _ in 0..4 {
            let launch = k.execute(b"hello").unwrap();
            unsafe { launch.run::<MockPlatform>() };
        }
        assert_eq!(k.execute(b"hello").err(), Some(ExecError::TableFull));
        k.switch_terminal(2).unwrap();

        let Tick::Switch(_) = k.on_tick() else { panic!("expected switch to terminal 0") };
        assert_eq!(k.sched.current(), Some(Pid::new(0)));
        assert_eq!(k.sched.current_terminal(), 0);
        assert!(k.sched.launch_failed(2));

        let Tick::Switch(_) = k.on_tick() else { panic!("expected switch to terminal 1") };
        assert_eq!(k.sched.current(), Some(Pid::new(5)));
        assert_eq!(k.sched.current_terminal(), 1);

        let Tick::Switch(_) = k.on_tick() else { panic!("expected switch to terminal 0") };
        assert_eq!(k.sched.current_terminal(), 0);
        assert_eq!(k.procs.foreground(2), None);
    }

    #[test]
    fn launch_failure_is_reported_once_until_recovery() {
        let mut sched = Scheduler::new();
        assert!(sched.note_launch_failure(2));
        assert!(!sched.note_launch_failure(2));
        assert!(sched.launch_failed(2));
        sched.clear_launch_failure(2);
        assert!(!sched.launch_failed(2));
        assert!(sched.note_launch_failure(2));
        assert!(!sched.note_launch_failure(NUM_TERMINALS));
    }

    #[test]
    fn switch_round_trip_restores_saved_pointers() {
        let mut k = two_terminals();
        let a = Some(Pid::new(1));
        let b = Some(Pid::new(0));

        let before = Context { rsp: 0x1234_5000, rbp: 0x1234_5100 };
        MockPlatform::set_cpu(before);

        let there = k.context_switch(a, b).unwrap().unwrap();
        unsafe { there.run::<MockPlatform>() };
        assert_eq!(k.procs.pcb_for(a).unwrap().context, before);

        let back = k.context_switch(b, a).unwrap().unwrap();
        unsafe { back.run::<MockPlatform>() };
        assert_eq!(MockPlatform::cpu(), before);
    }

    #[test]
    fn switch_installs_slot_and_kernel_stack_of_target() {
        let mut k = two_terminals();
        k.context_switch(Some(Pid::new(1)), Some(Pid::new(0))).unwrap();
        assert_eq!(k.mapper.installed_slot(), k.mapper.slot_phys(Pid::new(0)).ok());
        assert_eq!(Some(k.platform.kernel_stack), k.platform.kernel_stack_top(Pid::new(0)));
        // Terminal 1 tampil, proses terminal 0 menulis ke halaman cadangan
        assert_eq!(k.mapper.binding(), VideoBinding::Backing(0));
    }

    #[test]
    fn switch_to_self_is_a_no_op() {
        let mut k = two_terminals();
        let flushes = k.platform.flushes;
        assert_eq!(k.context_switch(Some(Pid::new(1)), Some(Pid::new(1))), Ok(None));
        assert_eq!(k.platform.flushes, flushes);
    }

    #[test]
    fn invalid_pids_are_rejected_without_effect() {
        let mut k = two_terminals();
        let slot = k.mapper.installed_slot();
        assert_eq!(
            k.context_switch(Some(Pid::new(1)), Some(Pid::new(MAX_PROCS))),
            Err(SchedError::InvalidPid(MAX_PROCS))
        );
        assert_eq!(
            k.context_switch(Some(Pid::new(1)), Some(Pid::new(4))),
            Err(SchedError::NotLive(Pid::new(4)))
        );
        assert_eq!(k.sched.current(), Some(Pid::new(1)));
        assert_eq!(k.mapper.installed_slot(), slot);
    }

    #[test]
    fn root_sentinel_is_a_valid_endpoint() {
        let mut k = two_terminals();
        let switch = k.context_switch(Some(Pid::new(1)), None).unwrap().unwrap();
        assert_eq!(switch.to, &k.procs.pcb_for(None).unwrap().context as *const Context);
        assert_eq!(k.sched.current(), None);
    }
}
