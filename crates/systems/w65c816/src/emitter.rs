//! SSA builder for one recompiled 65C816 block.
//!
//! The emitter owns the IR arena plus the per-block bookkeeping the lifter
//! leans on: the register-state map (which SSA value currently holds each
//! guest register), the memory-conditional predicate attached to every
//! emitted `MemState`, the constant cache, and the zero-chain used to stitch
//! 16-bit Z flags out of two 8-bit halves.
//!
//! Construction emits the block prologue: one load per register from the
//! register bus, except PC and PBR, whose values are burnt into the block as
//! constants. [`Emitter::finalize`] emits the epilogue: a store for every
//! register whose SSA handle moved past the prologue watermark, and nothing
//! else.
//!
//! Conditional execution never creates control flow. [`Emitter::if_then`]
//! snapshots the register-state map, runs the body with the memory predicate
//! swapped to the condition, then rewrites every diverging map entry as
//! `Ternary(cond, new, old)`. Values the body leaks out are *not*
//! predicated; only register updates and memory effects are.

use std::collections::HashMap;

use rec_core::interp::{MEM_BUS, REG_BUS};
use rec_core::ir::{IrBlock, Node, Opcode, Ssa};

use crate::regs::{Reg, REG_SLOTS};

pub struct Emitter {
    block: IrBlock,
    /// Constant cache: `(value, width)` -> node, so repeated immediates
    /// share one handle per block.
    consts: HashMap<(u32, u8), Ssa>,
    /// Current SSA value of every guest register.
    state: [Ssa; REG_SLOTS],
    /// The register-bus MemState, shared by the prologue and epilogue.
    regs_ms: Ssa,
    /// Bus tag constant for guest memory.
    bus_a: Ssa,
    /// Predicate baked into emitted MemStates; the innermost active `If`
    /// condition, or constant 1 at top level.
    mem_cond: Ssa,
    /// Zero test of the low half of an in-progress 16-bit operation.
    pub(crate) zero_lower: Option<Ssa>,
    /// Arena length right after the prologue; registers whose handle is
    /// below this are untouched.
    initializer_end: usize,
    /// Program counter the block was anchored at (bank:16 | pc).
    block_pc: u32,
    /// Set by the lifter when the instruction ends the basic block.
    pub ending: bool,
}

impl Emitter {
    /// Start a block at the given 24-bit program counter. Emits the
    /// register-load prologue; PC and PBR become block constants.
    pub fn new(pc: u32) -> Emitter {
        let mut block = IrBlock::new();
        let null = block.push(Node::constant(0, 32, false));

        let mut e = Emitter {
            block,
            consts: HashMap::from([((0u32, 32u8), null)]),
            state: [null; REG_SLOTS],
            regs_ms: null,
            bus_a: null,
            mem_cond: null,
            zero_lower: None,
            initializer_end: 0,
            block_pc: pc,
            ending: false,
        };

        let one = e.imm(1, 32);
        debug_assert_eq!(REG_BUS, 0);
        debug_assert_eq!(MEM_BUS, 1);
        e.regs_ms = e.push(Node::ternary(Opcode::MemState, null, null, one));

        for reg in Reg::ALL {
            e.state[reg.ordinal() as usize] = match reg {
                Reg::Pc => e.imm(pc & 0xFFFF, 16),
                Reg::Pbr => e.imm((pc >> 16) & 0xFF, 8),
                reg => e.prologue_load(reg),
            };
        }

        e.initializer_end = e.block.len();
        e.bus_a = one;
        e.mem_cond = one;
        e
    }

    fn prologue_load(&mut self, reg: Reg) -> Ssa {
        let ordinal = self.imm(reg.ordinal(), 32);
        let op = match reg.bus_width() {
            8 => Opcode::Load8,
            16 => Opcode::Load16,
            _ => Opcode::Load64,
        };
        let loaded = self.push(Node::binary(op, self.regs_ms, ordinal));
        if reg.is_flag() {
            // Flags occupy 64-bit slots; the live value is bit 0.
            self.extract(loaded, 0, 1)
        } else {
            loaded
        }
    }

    /// Store back every register modified since the prologue.
    pub fn finalize(&mut self) {
        for reg in Reg::ALL {
            let current = self.state[reg.ordinal() as usize];
            if current.index() < self.initializer_end {
                continue;
            }
            let ordinal = self.imm(reg.ordinal(), 32);
            let op = match reg.bus_width() {
                8 => Opcode::Store8,
                16 => Opcode::Store16,
                _ => Opcode::Store64,
            };
            self.push(Node::ternary(op, self.regs_ms, ordinal, current));
        }
    }

    fn push(&mut self, node: Node) -> Ssa {
        self.block.push(node)
    }

    pub fn block(&self) -> &IrBlock {
        &self.block
    }

    pub fn into_block(self) -> IrBlock {
        self.block
    }

    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// Arena watermark separating the prologue from the body.
    pub fn initializer_end(&self) -> usize {
        self.initializer_end
    }

    /// The 24-bit program counter the block was lifted at.
    pub fn block_pc(&self) -> u32 {
        self.block_pc
    }

    /// Current SSA value of a guest register.
    pub fn get(&self, reg: Reg) -> Ssa {
        self.state[reg.ordinal() as usize]
    }

    /// Replace the SSA value of a guest register.
    pub fn set(&mut self, reg: Reg, value: Ssa) {
        self.state[reg.ordinal() as usize] = value;
    }

    /// Forget the low-half zero test; done at the start of every opcode.
    pub fn reset_zero_chain(&mut self) {
        self.zero_lower = None;
    }

    // ── Constants ───────────────────────────────────────────────────────

    /// Memoized constant. Asking twice for the same `(value, width)` within
    /// a block returns the same handle.
    pub fn imm(&mut self, value: u32, bits: u8) -> Ssa {
        if let Some(&handle) = self.consts.get(&(value, bits)) {
            return handle;
        }
        let handle = self.block.push(Node::constant(value, bits, false));
        self.consts.insert((value, bits), handle);
        handle
    }

    // ── Pure operations ─────────────────────────────────────────────────

    pub fn not(&mut self, a: Ssa) -> Ssa {
        self.push(Node::unary(Opcode::Not, a))
    }

    pub fn add(&mut self, a: Ssa, b: Ssa) -> Ssa {
        self.push(Node::binary(Opcode::Add, a, b))
    }

    /// Add a small immediate; the constant is emitted at 32 bits and the
    /// result keeps the width of `a`.
    pub fn add_imm(&mut self, a: Ssa, b: u32) -> Ssa {
        let b = self.imm(b, 32);
        self.add(a, b)
    }

    pub fn sub(&mut self, a: Ssa, b: Ssa) -> Ssa {
        self.push(Node::binary(Opcode::Sub, a, b))
    }

    pub fn and(&mut self, a: Ssa, b: Ssa) -> Ssa {
        self.push(Node::binary(Opcode::And, a, b))
    }

    pub fn or(&mut self, a: Ssa, b: Ssa) -> Ssa {
        self.push(Node::binary(Opcode::Or, a, b))
    }

    pub fn xor(&mut self, a: Ssa, b: Ssa) -> Ssa {
        self.push(Node::binary(Opcode::Xor, a, b))
    }

    /// Shift left by a constant; widens the result by `bits`.
    pub fn shl(&mut self, a: Ssa, bits: u32) -> Ssa {
        let k = self.imm(bits, 32);
        self.push(Node::binary(Opcode::ShiftLeft, a, k))
    }

    /// Shift right by a constant; narrows the result by `bits`.
    pub fn shr(&mut self, a: Ssa, bits: u32) -> Ssa {
        let k = self.imm(bits, 32);
        self.push(Node::binary(Opcode::ShiftRight, a, k))
    }

    /// `a:b` concatenation, `a` in the high bits.
    pub fn cat(&mut self, a: Ssa, b: Ssa) -> Ssa {
        self.push(Node::binary(Opcode::Cat, a, b))
    }

    /// `(a >> shift) & mask(width)`.
    pub fn extract(&mut self, a: Ssa, shift: u32, width: u32) -> Ssa {
        let shift = self.imm(shift, 32);
        let width = self.imm(width, 32);
        self.push(Node::ternary(Opcode::Extract, a, shift, width))
    }

    pub fn zext(&mut self, a: Ssa, bits: u32) -> Ssa {
        let bits = self.imm(bits, 32);
        self.push(Node::binary(Opcode::Zext, a, bits))
    }

    pub fn eq(&mut self, a: Ssa, b: Ssa) -> Ssa {
        self.push(Node::binary(Opcode::Eq, a, b))
    }

    pub fn neq(&mut self, a: Ssa, b: Ssa) -> Ssa {
        self.push(Node::binary(Opcode::Neq, a, b))
    }

    pub fn ternary(&mut self, cond: Ssa, a: Ssa, b: Ssa) -> Ssa {
        self.push(Node::ternary(Opcode::Ternary, cond, a, b))
    }

    /// Evaluation-time equality check; fails the block when violated.
    pub fn assert_eq(&mut self, a: Ssa, b: Ssa) {
        self.push(Node::binary(Opcode::Assert, a, b));
    }

    // ── Device state ────────────────────────────────────────────────────

    pub fn state_read(&mut self, offset: u32, bits: u8) -> Ssa {
        let offset = self.imm(offset, 32);
        let size = self.imm(bits as u32, 8);
        self.push(Node::binary(Opcode::StateRead, offset, size))
    }

    pub fn state_write(&mut self, offset: u32, bits: u8, value: Ssa) {
        let offset = self.imm(offset, 32);
        let size = self.imm(bits as u32, 8);
        self.push(Node::ternary(Opcode::StateWrite, offset, size, value));
    }

    // ── Guest memory ────────────────────────────────────────────────────

    /// `(bus, cycle, alive)` context for one memory operation. The predicate
    /// is whatever `If` scope is active, so conditionally-emitted accesses
    /// carry their own liveness.
    fn mem_state(&mut self) -> Ssa {
        let cycle = self.get(Reg::Cycle);
        self.push(Node::ternary(Opcode::MemState, self.bus_a, cycle, self.mem_cond))
    }

    /// One byte read from guest memory at a 24-bit address.
    pub fn read(&mut self, addr: Ssa) -> Ssa {
        let ms = self.mem_state();
        self.push(Node::binary(Opcode::Load8, ms, addr))
    }

    /// One byte write to guest memory at a 24-bit address.
    pub fn write(&mut self, addr: Ssa, value: Ssa) {
        let ms = self.mem_state();
        self.push(Node::ternary(Opcode::Store8, ms, addr, value));
    }

    // ── Register bookkeeping ────────────────────────────────────────────

    pub fn inc_pc(&mut self) -> Ssa {
        let one = self.imm(1, 16);
        let pc = self.get(Reg::Pc);
        let next = self.add(pc, one);
        self.set(Reg::Pc, next);
        next
    }

    pub fn inc_cycle(&mut self) -> Ssa {
        let cycle = self.get(Reg::Cycle);
        let next = self.add_imm(cycle, 1);
        self.set(Reg::Cycle, next);
        next
    }

    // ── Conditional scopes ──────────────────────────────────────────────

    /// Run `body` under condition `cond`.
    ///
    /// Register updates made by the body become `Ternary(cond, new, old)`
    /// merges; memory operations emitted inside carry `cond` as their
    /// MemState predicate. Scopes nest; the stored predicate is the
    /// innermost condition, because outer predicates were already baked into
    /// any outer-scope memory nodes.
    pub fn if_then(&mut self, cond: Ssa, body: impl FnOnce(&mut Emitter)) {
        let snapshot = self.state;
        let saved_cond = self.mem_cond;
        self.mem_cond = cond;

        body(self);

        for slot in 0..REG_SLOTS {
            let old = snapshot[slot];
            let new = self.state[slot];
            if old != new {
                self.state[slot] = self.ternary(cond, new, old);
            }
        }
        self.mem_cond = saved_cond;
    }
}
