//! Cycle-accurate ZX Spectrum emulator core.
//!
//! Implements the 48K and 128K models. The system ticks at 14 MHz (master
//! crystal); the ULA runs at 7 MHz and the CPU at 3.5 MHz, both derived by
//! integer division. File loaders, audio mixing, tape/RZX replay, a
//! display/UI surface, and the full instruction decode table are out of
//! scope here; see `hooks::FrameHooks` for the collaborator seams that stand
//! in for the out-of-scope peripherals.

mod beeper;
mod bus;
mod config;
mod hooks;
mod keyboard;
mod memory;
mod scheduler;
mod spectrum;

pub use beeper::BeeperState;
pub use bus::SpectrumBus;
pub use config::{SpectrumConfig, SpectrumModel};
pub use hooks::{EprintlnUiErrorSink, ErrorLevel, FrameHooks, NullFrameHooks, UiErrorSink};
pub use keyboard::KeyboardState;
pub use memory::{Memory48K, Memory128K, SpectrumMemory};
pub use scheduler::{EventKind, Scheduler};
pub use spectrum::Spectrum;
