//! Cycle-accurate Z80 CPU emulator.
//!
//! Each call to `tick()` runs the head of the current instruction's
//! micro-op queue to completion, advancing `tstates` by that micro-op's
//! T-state cost (3-7, depending on the bus cycle) rather than one T-state
//! at a time — sub-instruction interleaving isn't load-bearing for the
//! bus/ULA coupling this core models, so the coarser granularity costs
//! nothing a caller needs. The full instruction decode table is a large
//! mechanical exercise and is deliberately out of scope here; see
//! `cpu::execute` for the representative subset this crate does implement,
//! and the crate-level interrupt/NMI/reset/snapshot surface for what's
//! actually load-bearing: register state, undocumented-flag latches
//! (MEMPTR, Q, `iff2_read`), and interrupt acceptance semantics.

mod alu;
mod cpu;
mod flags;
mod microcode;
pub mod peripherals;
mod registers;
mod snapshot;

pub use cpu::{InterruptOutcome, Z80};
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::{CpuModel, Registers};
pub use snapshot::Z80Snapshot;

#[cfg(feature = "test-utils")]
pub use microcode::MicroOp;
