//! Block emission driver: the read-lift-eval loop tying the lifter to the
//! reference interpreter.
//!
//! For each basic block the driver anchors an [`Emitter`] at the current
//! program counter, then alternates: read the opcode byte from guest
//! memory, lift it, evaluate only the freshly appended IR tail, and read
//! the live register values back out of the evaluation arrays. When an
//! instruction marks the block as ending (or the arena nears the 16-bit
//! handle space) the block is finalized, modified registers are stored
//! back, and the next block starts at the new PC.
//!
//! An `Assert` failure during evaluation means a store of this very block
//! rewrote an opcode byte that was already lifted. The driver rolls the
//! register file back to the last completed instruction and reports the
//! block as invalidated; the caller simply steps again, which re-lifts from
//! fresh bytes.

use rec_core::interp::{partial_interpret, Evaluated, ExecContext, InterpError};
use rec_core::logging::{log, LogCategory, LogLevel};
use rec_core::Cpu;
use thiserror::Error;

use crate::cartridge::{Cartridge, PRG_BANK};
use crate::dispatch::{emit, mnemonic};
use crate::emitter::Emitter;
use crate::helpers::pack_flags;
use crate::regs::{Reg, REG_SLOTS};

/// Stop lifting into a block once the arena crosses this line; leaves room
/// for the epilogue and the next instruction's worst case.
const BLOCK_NODE_BUDGET: usize = 60_000;

/// NTSC timing constants used to derive the PPU dot/scanline columns of the
/// reference trace format.
const DOTS_PER_LINE: u64 = 341;
const LINES_PER_FRAME: u64 = 262;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// Dispatch would hit an empty lifter slot. Fatal by design.
    #[error("unimplemented opcode {opcode:02X} at {pc:06X}")]
    UnimplementedOpcode { opcode: u8, pc: u32 },

    /// PC escaped the mapped guest memory.
    #[error("program counter out of range: {pc:06X}")]
    PcOutOfRange { pc: u32 },

    /// A lifted opcode assertion failed: the block observed self-modifying
    /// code. Registers have been rolled back to the last instruction
    /// boundary; stepping again re-lifts from the new bytes.
    #[error("block at {pc:06X} invalidated by self-modifying code")]
    BlockInvalidated { pc: u32 },

    #[error(transparent)]
    Interp(#[from] InterpError),
}

/// One line of the reference trace, captured before the instruction ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    pub pc: u16,
    pub opcode: u8,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
    pub cycle: u64,
}

impl TraceLine {
    /// PPU dot derived from the cycle counter.
    pub fn dot(&self) -> u64 {
        (self.cycle * 3) % DOTS_PER_LINE
    }

    /// Scanline derived from the cycle counter; -1 is the pre-render line.
    pub fn scanline(&self) -> i64 {
        let line = ((DOTS_PER_LINE * 242 + self.cycle * 3) / DOTS_PER_LINE) % LINES_PER_FRAME;
        line as i64 - 1
    }
}

impl std::fmt::Display for TraceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04X}  {:02X}  A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{:3} SL:{}",
            self.pc,
            self.opcode,
            self.a,
            self.x,
            self.y,
            self.p,
            self.sp,
            self.dot(),
            self.scanline()
        )
    }
}

/// Outcome of one [`Recompiler::step_block`] call.
#[derive(Debug, Default)]
pub struct BlockSummary {
    pub instructions: u32,
    pub cycles: u32,
    /// Per-instruction trace lines; empty unless tracing is enabled.
    pub trace: Vec<TraceLine>,
}

/// The recompiling CPU: register file, guest memory and the block loop.
pub struct Recompiler {
    pub regs: [u64; REG_SLOTS],
    pub mem: Vec<u8>,
    /// Device-state namespace backing `StateRead`/`StateWrite`.
    pub mmio: Vec<u8>,
    /// Collect [`TraceLine`]s while stepping.
    pub trace: bool,
}

impl Recompiler {
    pub fn new() -> Self {
        Self {
            regs: [0; REG_SLOTS],
            mem: vec![0; 0x1_0000],
            mmio: vec![0; 64],
            trace: false,
        }
    }

    /// Map a cartridge: one 16 KiB PRG bank at `0xC000`, mirrored at
    /// `0x8000`.
    pub fn load_cartridge(&mut self, cart: &Cartridge) {
        let prg = &cart.prg_rom[..PRG_BANK];
        self.mem[0xC000..0x1_0000].copy_from_slice(prg);
        self.mem[0x8000..0xC000].copy_from_slice(prg);
        log(LogCategory::Bus, LogLevel::Info, || {
            "PRG mapped at C000-FFFF, mirrored at 8000-BFFF".to_string()
        });
    }

    fn reg(&self, reg: Reg) -> u64 {
        self.regs[reg.ordinal() as usize]
    }

    fn set_reg(&mut self, reg: Reg, value: u64) {
        self.regs[reg.ordinal() as usize] = value;
    }

    pub fn pc(&self) -> u16 {
        self.reg(Reg::Pc) as u16
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.set_reg(Reg::Pc, pc as u64);
    }

    pub fn cycles(&self) -> u64 {
        self.reg(Reg::Cycle)
    }

    /// 24-bit address of the next instruction.
    fn pc24(&self) -> u32 {
        ((self.reg(Reg::Pbr) as u32) << 16) | self.reg(Reg::Pc) as u32
    }

    /// Run one basic block to its end and write the registers back.
    pub fn step_block(&mut self) -> Result<BlockSummary, RunnerError> {
        let block_pc = self.pc24();
        let mut e = Emitter::new(block_pc);
        let mut eval = Evaluated::default();
        let mut cursor = 0usize;
        let mut summary = BlockSummary::default();

        self.run_tail(&e, &mut eval, &mut cursor)?;
        let start_cycle = self.cycles();

        // Register values as of the last completed instruction, for
        // rollback when an opcode assertion trips mid-block.
        let mut last_good = self.snapshot(&e, &eval);

        loop {
            let pc = ((eval.value(e.get(Reg::Pbr)) as u32) << 16)
                | eval.value(e.get(Reg::Pc)) as u32;
            let opcode = *self
                .mem
                .get(pc as usize)
                .ok_or(RunnerError::PcOutOfRange { pc })?;
            if mnemonic(opcode).is_none() {
                return Err(RunnerError::UnimplementedOpcode { opcode, pc });
            }

            if self.trace {
                let p = pack_flags(&mut e);
                self.run_tail(&e, &mut eval, &mut cursor)?;
                summary.trace.push(TraceLine {
                    pc: pc as u16,
                    opcode,
                    a: eval.value(e.get(Reg::A)) as u8,
                    x: eval.value(e.get(Reg::X)) as u8,
                    y: eval.value(e.get(Reg::Y)) as u8,
                    p: eval.value(p) as u8,
                    sp: eval.value(e.get(Reg::S)) as u8,
                    cycle: eval.value(e.get(Reg::Cycle)),
                });
            }

            emit(&mut e, opcode);
            match self.run_tail(&e, &mut eval, &mut cursor) {
                Ok(()) => {}
                Err(InterpError::AssertFailed { .. }) => {
                    self.regs = last_good;
                    log(LogCategory::Cpu, LogLevel::Warn, || {
                        format!("self-modifying code detected at {:06X}; re-lifting", pc)
                    });
                    return Err(RunnerError::BlockInvalidated { pc });
                }
                Err(err) => return Err(err.into()),
            }
            summary.instructions += 1;
            last_good = self.snapshot(&e, &eval);

            if e.ending || e.len() > BLOCK_NODE_BUDGET {
                break;
            }
        }

        e.finalize();
        self.run_tail(&e, &mut eval, &mut cursor)?;
        summary.cycles = (self.cycles() - start_cycle) as u32;
        log(LogCategory::Cpu, LogLevel::Debug, || {
            format!(
                "block {:06X}: {} instruction(s), {} node(s), {} cycle(s)",
                block_pc,
                summary.instructions,
                e.len(),
                summary.cycles
            )
        });
        Ok(summary)
    }

    /// Evaluate the IR appended since the last pass.
    fn run_tail(
        &mut self,
        e: &Emitter,
        eval: &mut Evaluated,
        cursor: &mut usize,
    ) -> Result<(), InterpError> {
        let mut ctx = ExecContext {
            regs: &mut self.regs,
            mem: &mut self.mem,
            mmio: &mut self.mmio,
        };
        partial_interpret(e.block(), eval, &mut ctx, *cursor)?;
        *cursor = e.block().len();
        Ok(())
    }

    /// Current architectural state out of the live SSA map, shaped like the
    /// register file.
    fn snapshot(&self, e: &Emitter, eval: &Evaluated) -> [u64; REG_SLOTS] {
        let mut regs = self.regs;
        for reg in Reg::ALL {
            regs[reg.ordinal() as usize] = eval.value(e.get(reg));
        }
        regs
    }

    /// Power-on state for trace runs: emulation mode, 8-bit widths, IRQs
    /// masked, stack at 0x01FD, PC from the reset vector, and the cycle
    /// counter at 7 (the cost of the reset sequence in the reference logs).
    pub fn reset(&mut self) {
        self.regs = [0; REG_SLOTS];
        self.set_reg(Reg::S, 0x01FD);
        self.set_reg(Reg::FlagM, 1);
        self.set_reg(Reg::FlagX, 1);
        self.set_reg(Reg::FlagI, 1);
        self.set_reg(Reg::FlagE, 1);
        self.set_reg(Reg::Cycle, 7);
        let lo = self.mem[0xFFFC] as u64;
        let hi = self.mem[0xFFFD] as u64;
        self.set_reg(Reg::Pc, (hi << 8) | lo);
    }

    /// JSON snapshot of the register file, for dumps and debugging.
    pub fn save_state(&self) -> serde_json::Value {
        let mut regs = serde_json::Map::new();
        for reg in Reg::ALL {
            regs.insert(format!("{:?}", reg), serde_json::json!(self.reg(reg)));
        }
        serde_json::json!({
            "system": "w65c816-rec",
            "version": 1,
            "regs": serde_json::Value::Object(regs),
        })
    }

    /// Restore a [`save_state`](Self::save_state) snapshot.
    pub fn load_state(&mut self, v: &serde_json::Value) -> Result<(), serde_json::Error> {
        if let Some(regs) = v.get("regs").and_then(|r| r.as_object()) {
            for reg in Reg::ALL {
                if let Some(value) = regs.get(&format!("{:?}", reg)).and_then(|v| v.as_u64()) {
                    self.set_reg(reg, value);
                }
            }
        }
        Ok(())
    }

    /// Debug information useful for inspecting execution state.
    pub fn debug_state(&self) -> serde_json::Value {
        let pc = self.pc24();
        let next: Vec<u8> = (0..4)
            .filter_map(|i| self.mem.get(pc as usize + i).copied())
            .collect();
        serde_json::json!({
            "pc": pc,
            "cycles": self.cycles(),
            "next_bytes": next,
            "next_mnemonic": next.first().and_then(|op| mnemonic(*op)),
            "stack_top": self.reg(Reg::S),
        })
    }
}

impl Default for Recompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for Recompiler {
    fn reset(&mut self) {
        Recompiler::reset(self);
    }

    /// Execute one basic block; returns cycles consumed. Invalidated blocks
    /// retry transparently.
    fn step(&mut self) -> u32 {
        loop {
            match self.step_block() {
                Ok(summary) => return summary.cycles,
                Err(RunnerError::BlockInvalidated { .. }) => continue,
                Err(err) => panic!("recompiler step failed: {err}"),
            }
        }
    }
}
