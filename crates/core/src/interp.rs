//! Reference interpreter for recompiled blocks.
//!
//! Evaluation is a single forward pass over the arena producing a parallel
//! `(value, width)` pair for every node. Widths follow the typing rules of
//! the IR (constants carry their declared width, comparisons are one bit,
//! `Cat`/shifts grow and shrink, everything else adopts its first operand)
//! and every value is masked to its width.
//!
//! Memory operations dispatch on the bus tag carried by their `MemState`
//! operand: bus 0 is the register file (one 64-bit slot per register), bus 1
//! is byte-addressable guest memory. `StateRead`/`StateWrite` address a third
//! namespace reserved for memory-mapped device state. All three live in an
//! [`ExecContext`] passed in by the caller; the interpreter holds no state of
//! its own, so a driver can re-enter it with an offset to evaluate only the
//! tail appended since the last call ("partial interpretation").
//!
//! Predicated memory operations still evaluate (the pass never skips
//! nodes), but a store whose `MemState` predicate is false withholds its
//! external write; that is what the predicate is for. Loads read
//! unconditionally (harmless against plain memory; their consumers are
//! merged through `Ternary` anyway). Top-level code runs under a
//! constant-true predicate.

use crate::ir::{IrBlock, Node, Opcode, Ssa};
use thiserror::Error;

/// Bus tag selecting the register file.
pub const REG_BUS: u64 = 0;
/// Bus tag selecting guest memory.
pub const MEM_BUS: u64 = 1;

#[derive(Debug, Error)]
pub enum InterpError {
    /// A baked-in invariant no longer holds, typically because the opcode
    /// byte an `Assert` guards was overwritten by a store (self-modifying
    /// code). The block is stale and must be lifted again; this is the
    /// only recoverable failure.
    #[error("assertion failed at node {node}: got {actual:#x}, expected {expected:#x}")]
    AssertFailed {
        node: usize,
        actual: u64,
        expected: u64,
    },

    #[error("memory access out of range at node {node}: {bytes} byte(s) at {addr:#08x}")]
    OutOfRange {
        node: usize,
        addr: u64,
        bytes: usize,
    },

    #[error("register file access out of range at node {node}: slot {slot}")]
    BadRegisterSlot { node: usize, slot: u64 },

    #[error("device state access out of range at node {node}: {bytes} byte(s) at {offset:#x}")]
    BadStateOffset {
        node: usize,
        offset: u64,
        bytes: usize,
    },

    #[error("unknown memory bus {bus} at node {node}")]
    UnknownBus { node: usize, bus: u64 },
}

/// The mutable world a block executes against. Callers own the arrays; the
/// interpreter only borrows them for the duration of a pass.
pub struct ExecContext<'a> {
    /// Register file: one 64-bit slot per register, addressed by ordinal.
    pub regs: &'a mut [u64],
    /// Byte-addressable guest memory.
    pub mem: &'a mut [u8],
    /// Device-state namespace for `StateRead`/`StateWrite`.
    pub mmio: &'a mut [u8],
}

/// Evaluation result: one `(value, width)` pair per node, indexed in arena
/// order. Kept by the driver across partial passes.
#[derive(Default, Debug)]
pub struct Evaluated {
    pub values: Vec<u64>,
    pub widths: Vec<u8>,
}

impl Evaluated {
    pub fn value(&self, handle: Ssa) -> u64 {
        self.values[handle.index()]
    }

    pub fn width(&self, handle: Ssa) -> u8 {
        self.widths[handle.index()]
    }
}

fn mask(width: u8) -> u64 {
    match width {
        0 => 0,
        64.. => u64::MAX,
        w => (1u64 << w) - 1,
    }
}

/// Evaluate a whole block from the start.
pub fn interpret(block: &IrBlock, ctx: &mut ExecContext<'_>) -> Result<Evaluated, InterpError> {
    let mut eval = Evaluated::default();
    partial_interpret(block, &mut eval, ctx, 0)?;
    Ok(eval)
}

fn operand(node: &Node, slot: usize) -> Ssa {
    node.arg(slot).expect("missing IR operand")
}

/// Evaluate nodes from `offset` to the end of the block, extending `eval` in
/// place. Passing the length of the previously evaluated prefix lets a
/// driver interleave emission and evaluation one instruction at a time.
pub fn partial_interpret(
    block: &IrBlock,
    eval: &mut Evaluated,
    ctx: &mut ExecContext<'_>,
    offset: usize,
) -> Result<(), InterpError> {
    eval.values.resize(block.len(), 0);
    eval.widths.resize(block.len(), 0);

    for i in offset..block.len() {
        let node = block.node_at(i);
        let (value, width) = eval_node(block, eval, ctx, i, &node)?;
        eval.values[i] = value;
        eval.widths[i] = width;
    }
    Ok(())
}

fn eval_node(
    block: &IrBlock,
    eval: &Evaluated,
    ctx: &mut ExecContext<'_>,
    index: usize,
    node: &Node,
) -> Result<(u64, u8), InterpError> {
    use Opcode::*;

    // Shorthands over the already-evaluated prefix.
    let val = |slot: usize| eval.values[operand(node, slot).index()];
    let wid = |slot: usize| eval.widths[operand(node, slot).index()];

    let result = match node.opcode() {
        Const => (node.const_value() as u64, node.const_bits()),
        Const48 => (node.wide_value(), 48),

        Not => {
            let w = wid(0);
            (!val(0) & mask(w), w)
        }
        Add => {
            // Arithmetic adopts the width of its first operand; the second
            // may be a convenience 32-bit immediate.
            let w = wid(0);
            (val(0).wrapping_add(val(1)) & mask(w), w)
        }
        Sub => {
            let w = wid(0);
            (val(0).wrapping_sub(val(1)) & mask(w), w)
        }
        And => {
            debug_assert_eq!(wid(0), wid(1), "And operand widths disagree");
            (val(0) & val(1), wid(0))
        }
        Or => {
            debug_assert_eq!(wid(0), wid(1), "Or operand widths disagree");
            (val(0) | val(1), wid(0))
        }
        Xor => {
            debug_assert_eq!(wid(0), wid(1), "Xor operand widths disagree");
            (val(0) ^ val(1), wid(0))
        }
        ShiftLeft => {
            let k = val(1) as u8;
            let w = wid(0) + k;
            debug_assert!(w <= 64, "ShiftLeft widens past 64 bits");
            ((val(0) << k) & mask(w), w)
        }
        ShiftRight => {
            let k = val(1) as u8;
            debug_assert!(k <= wid(0), "ShiftRight narrows below zero bits");
            let w = wid(0) - k;
            ((val(0) >> k) & mask(w), w)
        }
        Cat => {
            let (wa, wb) = (wid(0), wid(1));
            debug_assert!(wa as u32 + wb as u32 <= 64, "Cat widens past 64 bits");
            ((val(0) << wb) | val(1), wa + wb)
        }
        Extract => {
            let shift = val(1) as u8;
            let out = val(2) as u8;
            debug_assert!(
                shift as u32 + out as u32 <= wid(0) as u32,
                "Extract reads past its operand"
            );
            ((val(0) >> shift) & mask(out), out)
        }
        Zext => {
            let w = val(1) as u8;
            debug_assert!(w >= wid(0), "Zext narrows");
            (val(0), w)
        }
        Eq => {
            debug_assert_eq!(wid(0), wid(1), "Eq operand widths disagree");
            ((val(0) == val(1)) as u64, 1)
        }
        Neq => {
            debug_assert_eq!(wid(0), wid(1), "Neq operand widths disagree");
            ((val(0) != val(1)) as u64, 1)
        }
        Ternary => {
            if val(0) != 0 {
                (val(1), wid(1))
            } else {
                (val(2), wid(2))
            }
        }

        // The triple itself carries no value; consumers reach through it to
        // the bus operand.
        MemState => (0, 0),

        Load8 => load(block, eval, ctx, index, node, 8)?,
        Load16 => load(block, eval, ctx, index, node, 16)?,
        Load32 => load(block, eval, ctx, index, node, 32)?,
        Load64 => load(block, eval, ctx, index, node, 64)?,
        Store8 => store(block, eval, ctx, index, node, 8)?,
        Store16 => store(block, eval, ctx, index, node, 16)?,
        Store32 => store(block, eval, ctx, index, node, 32)?,
        Store64 => store(block, eval, ctx, index, node, 64)?,

        StateRead => {
            let offset = val(0);
            let bits = val(1) as u8;
            let v = read_bytes(ctx.mmio, offset, bits).ok_or(InterpError::BadStateOffset {
                node: index,
                offset,
                bytes: bits as usize / 8,
            })?;
            (v, bits)
        }
        StateWrite => {
            let offset = val(0);
            let bits = val(1) as u8;
            let v = val(2);
            write_bytes(ctx.mmio, offset, bits, v).ok_or(InterpError::BadStateOffset {
                node: index,
                offset,
                bytes: bits as usize / 8,
            })?;
            (v, bits)
        }

        Assert => {
            let (actual, expected) = (val(0), val(1));
            if actual != expected {
                return Err(InterpError::AssertFailed {
                    node: index,
                    actual,
                    expected,
                });
            }
            (0, 0)
        }
    };
    Ok(result)
}

/// Bus tag of the `MemState` consumed by a memory operation.
fn bus_of(block: &IrBlock, eval: &Evaluated, node: &Node) -> u64 {
    let state = block[operand(node, 0)];
    debug_assert_eq!(state.opcode(), Opcode::MemState);
    eval.values[operand(&state, 0).index()]
}

/// Liveness predicate of the `MemState` consumed by a memory operation.
fn alive(block: &IrBlock, eval: &Evaluated, node: &Node) -> bool {
    let state = block[operand(node, 0)];
    debug_assert_eq!(state.opcode(), Opcode::MemState);
    eval.values[operand(&state, 2).index()] != 0
}

fn load(
    block: &IrBlock,
    eval: &Evaluated,
    ctx: &mut ExecContext<'_>,
    index: usize,
    node: &Node,
    bits: u8,
) -> Result<(u64, u8), InterpError> {
    let addr = eval.values[operand(node, 1).index()];
    match bus_of(block, eval, node) {
        REG_BUS => {
            let slot = ctx
                .regs
                .get(addr as usize)
                .ok_or(InterpError::BadRegisterSlot { node: index, slot: addr })?;
            Ok((slot & mask(bits), bits))
        }
        MEM_BUS => {
            let v = read_bytes(ctx.mem, addr, bits).ok_or(InterpError::OutOfRange {
                node: index,
                addr,
                bytes: bits as usize / 8,
            })?;
            Ok((v, bits))
        }
        bus => Err(InterpError::UnknownBus { node: index, bus }),
    }
}

fn store(
    block: &IrBlock,
    eval: &Evaluated,
    ctx: &mut ExecContext<'_>,
    index: usize,
    node: &Node,
    bits: u8,
) -> Result<(u64, u8), InterpError> {
    let addr = eval.values[operand(node, 1).index()];
    let data = eval.values[operand(node, 2).index()];
    debug_assert!(
        eval.widths[operand(node, 2).index()] <= bits,
        "store data wider than the store"
    );
    // A dead predicate disables the external write; the node still carries
    // its data value for inspection.
    if !alive(block, eval, node) {
        return Ok((data, bits));
    }
    match bus_of(block, eval, node) {
        REG_BUS => {
            let slot = ctx
                .regs
                .get_mut(addr as usize)
                .ok_or(InterpError::BadRegisterSlot { node: index, slot: addr })?;
            *slot = data & mask(bits);
            Ok((data, bits))
        }
        MEM_BUS => {
            write_bytes(ctx.mem, addr, bits, data).ok_or(InterpError::OutOfRange {
                node: index,
                addr,
                bytes: bits as usize / 8,
            })?;
            Ok((data, bits))
        }
        bus => Err(InterpError::UnknownBus { node: index, bus }),
    }
}

fn read_bytes(bytes: &[u8], addr: u64, bits: u8) -> Option<u64> {
    let count = bits as usize / 8;
    let start = usize::try_from(addr).ok()?;
    let slice = bytes.get(start..start.checked_add(count)?)?;
    let mut value = 0u64;
    for (i, byte) in slice.iter().enumerate() {
        value |= (*byte as u64) << (8 * i);
    }
    Some(value)
}

fn write_bytes(bytes: &mut [u8], addr: u64, bits: u8, value: u64) -> Option<()> {
    let count = bits as usize / 8;
    let start = usize::try_from(addr).ok()?;
    let slice = bytes.get_mut(start..start.checked_add(count)?)?;
    for (i, byte) in slice.iter_mut().enumerate() {
        *byte = (value >> (8 * i)) as u8;
    }
    Some(())
}
