//! Core traits and types for cycle-accurate emulation.
//!
//! `Tickable` and `MasterClock` model a literal master-crystal-synchronous
//! system: every component advances one crystal tick at a time, and runtime
//! dividers decide which components do work on a given tick. That's the
//! right shape for components whose sub-tick interleaving is itself part of
//! what's being modelled (e.g. a video chip that shares a bus with the CPU
//! mid-instruction).
//!
//! Not every component needs that granularity. `zilog_z80::Z80::tick`
//! advances a whole micro-op's T-states per call rather than one crystal
//! tick, because sub-instruction interleaving isn't load-bearing for the
//! bus/ULA coupling this core models; the Spectrum frame driver instead
//! keeps the CPU and ULA in lock step by advancing the ULA's pixel clock up
//! to the CPU's current T-state before every micro-op. `Tickable` and
//! `MasterClock` remain here for components that do need literal
//! per-crystal-tick dispatch.

mod bus;
mod clock;
mod cpu;
mod observable;
mod tickable;
mod ticks;

pub use bus::{Bus, ReadResult, SimpleBus};
pub use clock::MasterClock;
pub use cpu::Cpu;
pub use observable::{Observable, Value};
pub use tickable::Tickable;
pub use ticks::Ticks;
