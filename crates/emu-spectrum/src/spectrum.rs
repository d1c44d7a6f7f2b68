//! The Spectrum machine: CPU, bus, scheduler, and frame driver tied
//! together.

use sinclair_ula::Ula;
use zilog_z80::peripherals::NmiCapabilities;
use zilog_z80::{CpuModel, InterruptOutcome, Z80};

use crate::beeper::BeeperState;
use crate::bus::SpectrumBus;
use crate::config::{SpectrumConfig, SpectrumModel};
use crate::hooks::{EprintlnUiErrorSink, FrameHooks, NullFrameHooks, UiErrorSink};
use crate::memory::{Memory48K, Memory128K, SpectrumMemory};
use crate::scheduler::{EventKind, Scheduler};

const SAMPLE_RATE: u32 = 44_100;
const CPU_FREQUENCY: u32 = 3_500_000;

fn build_memory(config: &SpectrumConfig) -> Result<Box<dyn SpectrumMemory>, String> {
    match config.model {
        SpectrumModel::Spectrum48K => {
            if config.rom.len() != 0x4000 {
                return Err(format!(
                    "48K model requires a 16384-byte ROM, got {}",
                    config.rom.len()
                ));
            }
            Ok(Box::new(Memory48K::new(&config.rom)))
        }
        SpectrumModel::Spectrum128K => {
            if config.rom.len() != 0x8000 {
                return Err(format!(
                    "128K model requires a 32768-byte ROM, got {}",
                    config.rom.len()
                ));
            }
            Ok(Box::new(Memory128K::new(&config.rom)))
        }
    }
}

/// A ZX Spectrum: Z80 CPU, bus (memory/ULA/keyboard/beeper), and the event
/// scheduler driving frame and interrupt dispatch.
pub struct Spectrum {
    pub cpu: Z80,
    pub bus: SpectrumBus,
    model: SpectrumModel,
    scheduler: Scheduler,
    frame_event: EventKind,
    /// Re-evaluation of a maskable interrupt deferred by an EI immediately
    /// before the /INT edge (§4.4's deferred-acceptance rule).
    interrupt_event: EventKind,
    /// T-states' worth of ULA pixel clock already delivered this frame.
    /// Rebased alongside `cpu.tstates` so it never drifts out of the same
    /// reference frame.
    ula_tstates: i64,
    frames_since_reset: u64,
    hooks: Box<dyn FrameHooks>,
    ui: Box<dyn UiErrorSink>,
}

impl Spectrum {
    /// Build a `Spectrum` from `config`. Constructs the scheduler and
    /// registers its event kinds first, then the CPU and bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM size doesn't match the selected model.
    pub fn new(config: SpectrumConfig) -> Result<Self, String> {
        let memory = build_memory(&config)?;

        let mut scheduler = Scheduler::new();
        let frame_event = scheduler.register("frame");
        let interrupt_event = scheduler.register("interrupt");
        scheduler.add(config.model.tstates_per_frame(), frame_event);

        let ula = Ula::with_variant(config.model.contention_variant());
        let beeper = BeeperState::new(CPU_FREQUENCY, SAMPLE_RATE);
        let bus = SpectrumBus::new(memory, ula, beeper);
        let cpu = Z80::new(CpuModel::Nmos);

        Ok(Self {
            cpu,
            bus,
            model: config.model,
            scheduler,
            frame_event,
            interrupt_event,
            ula_tstates: 0,
            frames_since_reset: 0,
            hooks: Box::new(NullFrameHooks),
            ui: Box::new(EprintlnUiErrorSink),
        })
    }

    /// Install a custom `FrameHooks` collaborator (replay/audio/profiler/
    /// printer/loader/phantom-typist/input polling).
    pub fn set_hooks(&mut self, hooks: Box<dyn FrameHooks>) {
        self.hooks = hooks;
    }

    /// Install a custom `UiErrorSink` for fatal/warning diagnostics.
    pub fn set_ui_error_sink(&mut self, ui: Box<dyn UiErrorSink>) {
        self.ui = ui;
    }

    #[must_use]
    pub fn frames_since_reset(&self) -> u64 {
        self.frames_since_reset
    }

    #[must_use]
    pub fn model(&self) -> SpectrumModel {
        self.model
    }

    /// Reset the machine. `hard` selects a full power-on reset over a soft
    /// reset (register file only, peripherals untouched).
    pub fn reset(&mut self, hard: bool) {
        self.cpu.reset(hard);
        self.frames_since_reset = 0;
        self.ula_tstates = 0;
    }

    /// Advance the ULA's pixel clock (7 MHz, twice the CPU's 3.5 MHz) up to
    /// `target_tstate` so the beam position it reports to `contention()`,
    /// `floating_bus()`, and `is_screen_fetch_phase()` reflects "now" before
    /// the next CPU bus access consults it.
    fn catch_up_ula(&mut self, target_tstate: i64) {
        while self.ula_tstates < target_tstate {
            let mem = &*self.bus.memory;
            self.bus.ula.tick(|addr| mem.peek(addr));
            self.bus.ula.tick(|addr| mem.peek(addr));
            self.ula_tstates += 1;
        }
    }

    /// Attempt maskable-interrupt acceptance at the CPU's current `tstates`.
    /// If deferred (the previous instruction was EI), schedule a retry one
    /// T-state later via `interrupt_event` per §4.4's deferred-acceptance
    /// rule, rather than dropping the interrupt for the rest of the frame.
    fn raise_maskable_interrupt(&mut self) {
        let interrupt_length = self.model.interrupt_length();
        if let InterruptOutcome::Deferred { retry_at } =
            self.cpu
                .try_maskable_interrupt(&mut self.bus, interrupt_length, false)
        {
            self.scheduler.add(retry_at, self.interrupt_event);
        }
    }

    /// Run T-states until the frame boundary fires, then execute the frame
    /// driver sequence. Returns `true` if a hook requested the host stop
    /// running frames.
    ///
    /// Events are force-dispatched against the CPU's running `tstates`
    /// rather than strictly between instruction boundaries — the decode
    /// table this core implements is a representative subset, so exact
    /// per-instruction dispatch granularity isn't meaningful here; firing
    /// at the correct T-state is what preserves timing fidelity. Only
    /// `frame_event` ends the loop; `interrupt_event` is handled inline so a
    /// deferred interrupt's retry doesn't get mistaken for the frame
    /// boundary.
    pub fn run_frame(&mut self) -> bool {
        let frame_length = self.model.tstates_per_frame();
        while self.cpu.tstates < frame_length {
            self.catch_up_ula(self.cpu.tstates);
            self.cpu.tick(&mut self.bus);

            let fired = self.scheduler.force_events(self.cpu.tstates);
            if fired.is_empty() {
                continue;
            }
            let mut frame_due = false;
            for kind in fired {
                if kind == self.frame_event {
                    frame_due = true;
                } else if kind == self.interrupt_event {
                    self.raise_maskable_interrupt();
                }
            }
            if frame_due {
                break;
            }
        }

        self.hooks.replay_frame_boundary();
        self.hooks.audio_frame();

        self.scheduler.frame(frame_length);
        self.cpu.rebase_tstates(frame_length);
        self.ula_tstates -= frame_length;
        self.hooks.audio_frame();

        self.hooks.profile_frame();
        self.hooks.printer_frame();
        self.hooks.loader_frame();
        self.hooks.phantom_typist_frame();

        self.scheduler.add(frame_length, self.frame_event);
        self.frames_since_reset += 1;

        self.raise_maskable_interrupt();

        self.hooks.poll_input()
    }

    /// Deliver a non-maskable interrupt. No Scorpion/Beta/Spectranet
    /// peripheral is wired up in this core, so paging side effects never
    /// fire; this exists so embedding hosts that do supply those
    /// peripherals can route an NMI through the real acceptance sequence.
    pub fn trigger_nmi(&mut self) -> bool {
        let mut peripherals = NmiCapabilities::default();
        self.cpu.accept_nmi(&mut self.bus, &mut peripherals)
    }

    /// Report a fatal/warning condition through the installed `UiErrorSink`.
    pub fn report_error(&mut self, level: crate::hooks::ErrorLevel, msg: &str) {
        self.ui.error(level, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rom_48k() -> Vec<u8> {
        vec![0u8; 0x4000]
    }

    fn make_spectrum() -> Spectrum {
        Spectrum::new(SpectrumConfig {
            model: SpectrumModel::Spectrum48K,
            rom: make_rom_48k(),
        })
        .unwrap()
    }

    #[test]
    fn new_rejects_wrong_rom_size() {
        let err = Spectrum::new(SpectrumConfig {
            model: SpectrumModel::Spectrum48K,
            rom: vec![0; 100],
        });
        assert!(err.is_err());
    }

    #[test]
    fn run_frame_advances_frame_counter() {
        let mut spectrum = make_spectrum();
        assert_eq!(spectrum.frames_since_reset(), 0);
        spectrum.run_frame();
        assert_eq!(spectrum.frames_since_reset(), 1);
        spectrum.run_frame();
        assert_eq!(spectrum.frames_since_reset(), 2);
    }

    #[test]
    fn run_frame_drives_the_ula_beam_forward() {
        // A whole frame's worth of NOPs (ROM is all zeros) should carry the
        // ULA most of the way around the raster, proving `Ula::tick()` is
        // actually invoked along the CPU's path rather than sitting inert
        // at its `Ula::new()` starting position for the entire run.
        let mut spectrum = make_spectrum();
        assert_eq!(spectrum.bus.ula.line(), 0);
        assert_eq!(spectrum.bus.ula.line_tstate(), 0);
        spectrum.run_frame();
        assert!(spectrum.bus.ula.line() > 300, "line = {}", spectrum.bus.ula.line());
    }

    #[test]
    fn deferred_interrupt_is_retried_instead_of_dropped() {
        // Simulate "the instruction that just ran was EI" at the moment the
        // frame driver raises its end-of-frame interrupt: acceptance must
        // come back Deferred and a retry must land on the scheduler instead
        // of the interrupt being silently dropped for the rest of the frame.
        let mut spectrum = make_spectrum();
        spectrum.cpu.regs.iff1 = true;
        spectrum.cpu.regs.im = 1;
        spectrum.cpu.tstates = 0;
        spectrum.cpu.regs.interrupts_enabled_at = Some(0);

        spectrum.raise_maskable_interrupt();

        assert!(spectrum.cpu.regs.iff1, "a deferred interrupt leaves IFF1 untouched");
        let fired = spectrum.scheduler.force_events(1);
        assert_eq!(fired, vec![spectrum.interrupt_event]);
    }

    #[test]
    fn retried_interrupt_is_accepted_on_the_next_tstate() {
        let mut spectrum = make_spectrum();
        spectrum.cpu.regs.iff1 = true;
        spectrum.cpu.regs.im = 1;
        spectrum.cpu.tstates = 0;
        spectrum.cpu.regs.interrupts_enabled_at = Some(0);
        spectrum.raise_maskable_interrupt();

        // Advance past the retry point and let the scheduler dispatch it.
        spectrum.cpu.tstates = 1;
        let fired = spectrum.scheduler.force_events(spectrum.cpu.tstates);
        assert_eq!(fired, vec![spectrum.interrupt_event]);
        spectrum.raise_maskable_interrupt();

        assert_eq!(spectrum.cpu.regs.pc, 0x0038);
        assert!(!spectrum.cpu.regs.iff1);
    }

    #[test]
    fn run_frame_rebases_cpu_tstates_below_frame_length() {
        let mut spectrum = make_spectrum();
        spectrum.run_frame();
        assert!(spectrum.cpu.tstates < spectrum.model.tstates_per_frame());
    }

    #[test]
    fn run_frame_accepts_interrupt_when_iff1_set() {
        let mut spectrum = make_spectrum();
        spectrum.cpu.regs.iff1 = true;
        spectrum.cpu.regs.im = 1;
        let pc_before = spectrum.cpu.regs.pc;
        spectrum.run_frame();
        // IM1 interrupt acceptance jumps to 0x0038, unless rejected because
        // tstates already exceeded interrupt_length at the point of check.
        assert!(spectrum.cpu.regs.pc == 0x0038 || spectrum.cpu.regs.pc == pc_before);
    }

    #[test]
    fn reset_clears_frame_counter() {
        let mut spectrum = make_spectrum();
        spectrum.run_frame();
        spectrum.run_frame();
        spectrum.reset(false);
        assert_eq!(spectrum.frames_since_reset(), 0);
    }

    #[test]
    fn trigger_nmi_jumps_to_0x0066() {
        let mut spectrum = make_spectrum();
        spectrum.cpu.regs.pc = 0x1234;
        let accepted = spectrum.trigger_nmi();
        assert!(accepted);
        assert_eq!(spectrum.cpu.regs.pc, 0x0066);
    }

    #[test]
    fn model_128k_builds_with_32k_rom() {
        let spectrum = Spectrum::new(SpectrumConfig {
            model: SpectrumModel::Spectrum128K,
            rom: vec![0u8; 0x8000],
        });
        assert!(spectrum.is_ok());
    }
}
