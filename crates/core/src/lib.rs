//! Core primitives for the block recompiler: IR, interpreter, logging.

pub mod interp;
pub mod ir;
pub mod logging;

/// A CPU-like component that can be stepped; returns cycles consumed.
pub trait Cpu {
    fn reset(&mut self);
    fn step(&mut self) -> u32;
}
