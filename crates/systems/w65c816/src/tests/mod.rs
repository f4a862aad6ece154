//! Lifter test suites: single-instruction scenarios against a live
//! recompiler, structural properties of the emitted IR, and the trace
//! driver surface.

mod tests_lifter;

use rec_core::interp::{interpret, ExecContext};

use crate::dispatch::emit;
use crate::emitter::Emitter;
use crate::regs::{Reg, REG_SLOTS};
use crate::runner::Recompiler;

/// A recompiler with a program at `0xC000` and PC pointing at it.
/// Registers start zeroed with E, M and X set: the 8-bit power-on
/// configuration, unless a test overrides it.
pub fn with_program(bytes: &[u8]) -> Recompiler {
    let mut sys = Recompiler::new();
    sys.mem[0xC000..0xC000 + bytes.len()].copy_from_slice(bytes);
    sys.regs = [0; REG_SLOTS];
    sys.regs[Reg::Pc.ordinal() as usize] = 0xC000;
    sys.regs[Reg::S.ordinal() as usize] = 0x01FD;
    sys.regs[Reg::FlagM.ordinal() as usize] = 1;
    sys.regs[Reg::FlagX.ordinal() as usize] = 1;
    sys.regs[Reg::FlagE.ordinal() as usize] = 1;
    sys
}

pub fn reg(sys: &Recompiler, reg: Reg) -> u64 {
    sys.regs[reg.ordinal() as usize]
}

pub fn set(sys: &mut Recompiler, r: Reg, value: u64) {
    sys.regs[r.ordinal() as usize] = value;
}

/// Switch a prepared recompiler to native mode with the given widths.
pub fn native_mode(sys: &mut Recompiler, m: u64, x: u64) {
    set(sys, Reg::FlagE, 0);
    set(sys, Reg::FlagM, m);
    set(sys, Reg::FlagX, x);
}

/// Lift and execute exactly one instruction at the current PC, writing the
/// registers back. Returns whether the instruction ended its basic block.
pub fn run_one(sys: &mut Recompiler) -> bool {
    let pc = ((reg(sys, Reg::Pbr) as u32) << 16) | reg(sys, Reg::Pc) as u32;
    let opcode = sys.mem[pc as usize];
    let mut e = Emitter::new(pc);
    emit(&mut e, opcode);
    e.finalize();
    interpret(
        e.block(),
        &mut ExecContext {
            regs: &mut sys.regs,
            mem: &mut sys.mem,
            mmio: &mut sys.mmio,
        },
    )
    .expect("interpret");
    e.ending
}
