//! WDC 65C816 dynamic-recompilation frontend.
//!
//! Each basic block of guest code is lifted into the flat SSA IR provided
//! by `rec_core` and evaluated by its reference interpreter against a
//! register file and byte-addressable guest memory. The lifter reproduces
//! the processor cycle by cycle: bus timing, page-cross penalties, the
//! M/X/E width flags and the emulation-mode stack lock all live in the
//! emitted IR.

pub mod addressing;
pub mod cartridge;
pub mod dispatch;
pub mod emitter;
pub mod helpers;
pub mod regs;
pub mod runner;

pub use cartridge::Cartridge;
pub use emitter::Emitter;
pub use regs::{Reg, REG_SLOTS};
pub use runner::{BlockSummary, Recompiler, RunnerError, TraceLine};

#[cfg(test)]
mod tests;
