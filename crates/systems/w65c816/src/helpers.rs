//! Shared lifter building blocks: program-counter fetches, flag updates,
//! stack sequencing, width-aware register I/O and the memory-operation
//! application patterns used by the instruction families.
//!
//! Everything here emits IR through a borrowed [`Emitter`]; nothing touches
//! the register file or guest memory directly.

use rec_core::ir::Ssa;

use crate::emitter::Emitter;
use crate::regs::Reg;

/// An operation applied per accumulator half: receives the half register
/// (A, then B when M is clear) and the effective address of its byte.
pub type MemOp = fn(&mut Emitter, Reg, Ssa);

/// A read-modify-write body: value in, width (8 or 16), new value out.
/// Responsible for its own flag updates at the given width.
pub type RmwOp = fn(&mut Emitter, Ssa, u8) -> Ssa;

// ── Fetch ───────────────────────────────────────────────────────────────

/// Read one byte at `PBR:PC`, advancing PC and the cycle counter.
pub fn read_pc(e: &mut Emitter) -> Ssa {
    let pbr = e.get(Reg::Pbr);
    let pc = e.get(Reg::Pc);
    let addr = e.cat(pbr, pc);
    let data = e.read(addr);
    e.inc_pc();
    e.inc_cycle();
    data
}

/// Two fetches assembled little-endian into a 16-bit value.
pub fn read_pc16(e: &mut Emitter) -> Ssa {
    let low = read_pc(e);
    let high = read_pc(e);
    e.cat(high, low)
}

/// Immediate fetch whose width is governed by a width flag (M or X): the
/// high byte is only fetched (and PC only advances past it) when the flag
/// is clear. Always produces a 16-bit value; the high byte is zero in the
/// 8-bit case.
pub fn read_pc16_flagged(e: &mut Emitter, flag8: Ssa) -> Ssa {
    let low = read_pc(e);
    let mut high = e.imm(0, 8);
    let wide = e.not(flag8);
    e.if_then(wide, |e| {
        high = read_pc(e);
    });
    let zero8 = e.imm(0, 8);
    let narrow = e.cat(zero8, low);
    let full = e.cat(high, low);
    e.ternary(flag8, narrow, full)
}

// ── Flags ───────────────────────────────────────────────────────────────

/// Zero flag of an 8-bit result, chaining to 16 bits: the first half of an
/// operation stashes its zero test, the second half ANDs with the stash so Z
/// covers the whole 16-bit value. The stash resets at every opcode.
pub fn zero_flag(e: &mut Emitter, result: Ssa) {
    let zero8 = e.imm(0, 8);
    let zero = e.eq(result, zero8);
    match e.zero_lower {
        Some(lower) => {
            let both = e.and(zero, lower);
            e.set(Reg::FlagZ, both);
        }
        None => {
            e.zero_lower = Some(zero);
            e.set(Reg::FlagZ, zero);
        }
    }
}

/// N and Z from an 8-bit result, chaining Z to 16 bits.
pub fn nz_flags(e: &mut Emitter, result: Ssa) {
    let n = e.extract(result, 7, 1);
    e.set(Reg::FlagN, n);
    zero_flag(e, result);
}

/// N and Z from a full 16-bit result.
pub fn nz_flags16(e: &mut Emitter, result: Ssa) {
    let n = e.extract(result, 15, 1);
    e.set(Reg::FlagN, n);
    let zero16 = e.imm(0, 16);
    let z = e.eq(result, zero16);
    e.set(Reg::FlagZ, z);
}

/// 8-bit add with carry in/out and overflow, the ADC core. A 16-bit ADC is
/// two of these; the carry chains through Flag C between the halves.
pub fn add_carry_overflow(e: &mut Emitter, reg: Reg, val: Ssa) {
    let dst = e.get(reg);
    let sign_a = e.extract(dst, 7, 1);
    let sign_b = e.extract(val, 7, 1);

    let wide_dst = e.zext(dst, 9);
    let wide_val = e.zext(val, 9);
    let carry = e.get(Reg::FlagC);
    let wide_carry = e.zext(carry, 9);
    let partial = e.add(wide_val, wide_carry);
    let sum = e.add(wide_dst, partial);

    let carry_out = e.extract(sum, 8, 1);
    e.set(Reg::FlagC, carry_out);
    let out = e.extract(sum, 0, 8);
    e.set(reg, out);

    // Overflow when both input signs differ from the output sign.
    let sign_out = e.extract(out, 7, 1);
    let da = e.xor(sign_a, sign_out);
    let db = e.xor(sign_b, sign_out);
    let overflow = e.and(da, db);
    e.set(Reg::FlagV, overflow);
}

/// 8-bit subtract with borrow: invert the operand and reuse the adder.
pub fn subtract_borrow(e: &mut Emitter, reg: Reg, val: Ssa) {
    let ones = e.imm(0xFF, 8);
    let inverted = e.xor(val, ones);
    add_carry_overflow(e, reg, inverted);
}

/// 8-bit compare: subtract without writing the register. The borrow-in is
/// forced to 1 on the low half; the high half of a 16-bit compare chains
/// through Flag C like SBC (the zero-chain stash tells the halves apart).
/// Sets N, Z and C.
pub fn compare(e: &mut Emitter, dst: Ssa, val: Ssa) {
    let ones = e.imm(0xFF, 8);
    let inverted = e.xor(val, ones);

    let borrow_in = match e.zero_lower {
        None => {
            let one = e.imm(1, 1);
            e.zext(one, 9)
        }
        Some(_) => {
            let c = e.get(Reg::FlagC);
            e.zext(c, 9)
        }
    };

    let wide_dst = e.zext(dst, 9);
    let wide_val = e.zext(inverted, 9);
    let partial = e.add(wide_val, borrow_in);
    let sum = e.add(wide_dst, partial);

    let carry_out = e.extract(sum, 8, 1);
    e.set(Reg::FlagC, carry_out);
    let out = e.extract(sum, 0, 8);
    nz_flags(e, out);
}

// ── Stack ───────────────────────────────────────────────────────────────

/// Move S by `dir` (+1/-1). In emulation mode the high byte snaps back to
/// 0x01 after every update: the stack never leaves page one.
pub fn modify_stack(e: &mut Emitter, dir: i32) -> Ssa {
    let delta = e.imm((dir as u32) & 0xFFFF, 16);
    let s = e.get(Reg::S);
    let native = e.add(s, delta);
    let low = e.extract(native, 0, 8);
    let page_one = e.imm(0x01, 8);
    let emulated = e.cat(page_one, low);
    let flag_e = e.get(Reg::FlagE);
    let next = e.ternary(flag_e, emulated, native);
    e.set(Reg::S, next);
    next
}

/// Write one byte at the current stack pointer, then decrement.
pub fn push_byte(e: &mut Emitter, value: Ssa) {
    let bank0 = e.imm(0, 8);
    let s = e.get(Reg::S);
    let addr = e.cat(bank0, s);
    e.write(addr, value);
    modify_stack(e, -1);
    e.inc_cycle();
}

/// Increment the stack pointer, then read the byte it points at.
pub fn pull_byte(e: &mut Emitter) -> Ssa {
    modify_stack(e, 1);
    let bank0 = e.imm(0, 8);
    let s = e.get(Reg::S);
    let addr = e.cat(bank0, s);
    let data = e.read(addr);
    e.inc_cycle();
    data
}

// ── Width-aware register I/O ────────────────────────────────────────────

/// Read a register as a 16-bit value, papering over the M/X width games.
///
/// A always reads as `B:A`; the full accumulator sits on the internal bus
/// regardless of M. X and Y zero-extend their low byte while Flag X is set
/// (unless forced wide). PBR/DBR zero-extend; S and D are always 16-bit.
pub fn load_reg16(e: &mut Emitter, reg: Reg, force16: bool) -> Ssa {
    match reg {
        Reg::A => {
            let b = e.get(Reg::B);
            let a = e.get(Reg::A);
            e.cat(b, a)
        }
        Reg::X | Reg::Y => {
            let full = e.get(reg);
            if force16 {
                return full;
            }
            let low = e.extract(full, 0, 8);
            let zero8 = e.imm(0, 8);
            let narrow = e.cat(zero8, low);
            let flag_x = e.get(Reg::FlagX);
            e.ternary(flag_x, narrow, full)
        }
        Reg::Pbr | Reg::Dbr => {
            let zero8 = e.imm(0, 8);
            let v = e.get(reg);
            e.cat(zero8, v)
        }
        Reg::S | Reg::D => e.get(reg),
        _ => unreachable!("load_reg16 on {:?}", reg),
    }
}

/// Write a 16-bit value to a register, clipping per M/X and updating flags
/// the way the hardware does.
///
/// A always takes the low byte; B only changes when M is clear (or when
/// forced). X/Y keep their high byte while Flag X is set. S never updates
/// flags and snaps to page one under E. D is always 16-bit.
pub fn store_reg16(e: &mut Emitter, reg: Reg, value: Ssa, force16: bool) {
    match reg {
        Reg::A => {
            let low = e.extract(value, 0, 8);
            let high = e.extract(value, 8, 8);
            e.set(Reg::A, low);
            if force16 {
                e.set(Reg::B, high);
                nz_flags16(e, value);
                return;
            }
            nz_flags(e, low);
            let flag_m = e.get(Reg::FlagM);
            let wide = e.not(flag_m);
            e.if_then(wide, |e| {
                e.set(Reg::B, high);
                nz_flags(e, high);
            });
        }
        Reg::X | Reg::Y => {
            let old_upper = {
                let old = e.get(reg);
                e.extract(old, 8, 8)
            };
            e.set(reg, value);
            nz_flags16(e, value);
            if force16 {
                return;
            }
            // 8-bit index mode keeps the high byte and takes N from bit 7.
            let flag_x = e.get(Reg::FlagX);
            e.if_then(flag_x, |e| {
                let low = e.extract(value, 0, 8);
                let clipped = e.cat(old_upper, low);
                e.set(reg, clipped);
                nz_flags(e, low);
            });
        }
        Reg::Pbr | Reg::Dbr => {
            let low = e.extract(value, 0, 8);
            e.set(reg, low);
            nz_flags(e, low);
        }
        Reg::S => {
            // No flag updates; emulation mode locks the page.
            let low = e.extract(value, 0, 8);
            let page_one = e.imm(0x01, 8);
            let emulated = e.cat(page_one, low);
            let flag_e = e.get(Reg::FlagE);
            let next = e.ternary(flag_e, emulated, value);
            e.set(Reg::S, next);
        }
        Reg::D => {
            e.set(Reg::D, value);
            nz_flags16(e, value);
        }
        _ => unreachable!("store_reg16 on {:?}", reg),
    }
}

// ── Flag packing ────────────────────────────────────────────────────────

/// Assemble the canonical 8-bit P register: `N V M X D I Z C` from bit 7
/// down. While E is set, M and X read back as 1.
pub fn pack_flags(e: &mut Emitter) -> Ssa {
    let flag_e = e.get(Reg::FlagE);
    let one1 = e.imm(1, 1);

    let n = {
        let f = e.get(Reg::FlagN);
        e.shl(f, 7)
    };
    let v = {
        let f = e.get(Reg::FlagV);
        let s = e.shl(f, 6);
        e.zext(s, 8)
    };
    let m = {
        let f = e.get(Reg::FlagM);
        let eff = e.ternary(flag_e, one1, f);
        let s = e.shl(eff, 5);
        e.zext(s, 8)
    };
    let x = {
        let f = e.get(Reg::FlagX);
        let eff = e.ternary(flag_e, one1, f);
        let s = e.shl(eff, 4);
        e.zext(s, 8)
    };
    let d = {
        let f = e.get(Reg::FlagD);
        let s = e.shl(f, 3);
        e.zext(s, 8)
    };
    let i = {
        let f = e.get(Reg::FlagI);
        let s = e.shl(f, 2);
        e.zext(s, 8)
    };
    let z = {
        let f = e.get(Reg::FlagZ);
        let s = e.shl(f, 1);
        e.zext(s, 8)
    };
    let c = {
        let f = e.get(Reg::FlagC);
        e.zext(f, 8)
    };

    let nv = e.or(n, v);
    let mx = e.or(m, x);
    let di = e.or(d, i);
    let zc = e.or(z, c);
    let high = e.or(nv, mx);
    let low = e.or(di, zc);
    e.or(high, low)
}

/// Scatter a packed P value back into the flag registers. While E is set,
/// M and X refuse the update and keep their current values.
pub fn unpack_flags(e: &mut Emitter, value: Ssa) {
    let flag_e = e.get(Reg::FlagE);

    let n = e.extract(value, 7, 1);
    e.set(Reg::FlagN, n);
    let v = e.extract(value, 6, 1);
    e.set(Reg::FlagV, v);

    let m_new = e.extract(value, 5, 1);
    let m_cur = e.get(Reg::FlagM);
    let m = e.ternary(flag_e, m_cur, m_new);
    e.set(Reg::FlagM, m);

    let x_new = e.extract(value, 4, 1);
    let x_cur = e.get(Reg::FlagX);
    let x = e.ternary(flag_e, x_cur, x_new);
    e.set(Reg::FlagX, x);

    let d = e.extract(value, 3, 1);
    e.set(Reg::FlagD, d);
    let i = e.extract(value, 2, 1);
    e.set(Reg::FlagI, i);
    let z = e.extract(value, 1, 1);
    e.set(Reg::FlagZ, z);
    let c = e.extract(value, 0, 1);
    e.set(Reg::FlagC, c);
}

// ── Application patterns ────────────────────────────────────────────────

/// Run a per-byte operation against the accumulator halves: once for A at
/// the effective address, and again for B one byte up when M is clear.
pub fn apply_memory_operation(e: &mut Emitter, op: MemOp, address: Ssa) {
    op(e, Reg::A, address);
    e.inc_cycle();

    let flag_m = e.get(Reg::FlagM);
    let wide = e.not(flag_m);
    e.if_then(wide, |e| {
        let high_addr = e.add_imm(address, 1);
        op(e, Reg::B, high_addr);
        e.inc_cycle();
    });
}

/// Immediate-operand variant of [`apply_memory_operation`]: the effective
/// address is the program counter itself, advanced per byte consumed.
pub fn apply_immediate(e: &mut Emitter, op: MemOp) {
    let pbr = e.get(Reg::Pbr);
    let pc = e.get(Reg::Pc);
    let address = e.cat(pbr, pc);
    e.inc_pc();
    e.inc_cycle();
    op(e, Reg::A, address);

    let flag_m = e.get(Reg::FlagM);
    let wide = e.not(flag_m);
    e.if_then(wide, |e| {
        let one24 = e.imm(1, 24);
        let high_addr = e.add(address, one24);
        e.inc_pc();
        e.inc_cycle();
        op(e, Reg::B, high_addr);
    });
}

/// Apply a read-modify-write body to the accumulator, choosing the 8-bit or
/// 16-bit path by M.
pub fn apply_acc(e: &mut Emitter, op: RmwOp) {
    e.inc_cycle();

    let flag_m = e.get(Reg::FlagM);
    e.if_then(flag_m, |e| {
        let a = e.get(Reg::A);
        let result = op(e, a, 8);
        e.set(Reg::A, result);
    });

    let wide = e.not(flag_m);
    e.if_then(wide, |e| {
        let b = e.get(Reg::B);
        let a = e.get(Reg::A);
        let value = e.cat(b, a);
        let result = op(e, value, 16);
        let low = e.extract(result, 0, 8);
        let high = e.extract(result, 8, 8);
        e.set(Reg::A, low);
        e.set(Reg::B, high);
    });
}

/// Apply a read-modify-write body to memory, with the extra bus cycles each
/// width pays on hardware.
pub fn apply_modify(e: &mut Emitter, op: RmwOp, address: Ssa) {
    let low = e.read(address);
    e.inc_cycle();

    let flag_m = e.get(Reg::FlagM);
    e.if_then(flag_m, |e| {
        let result = op(e, low, 8);
        e.inc_cycle();
        e.write(address, result);
        e.inc_cycle();
    });

    let wide = e.not(flag_m);
    e.if_then(wide, |e| {
        let high_addr = e.add_imm(address, 1);
        let high = e.read(high_addr);
        e.inc_cycle();
        let value = e.cat(high, low);
        let result = op(e, value, 16);
        e.inc_cycle();
        let result_high = e.extract(result, 8, 8);
        e.write(high_addr, result_high);
        e.inc_cycle();
        let result_low = e.extract(result, 0, 8);
        e.write(address, result_low);
        e.inc_cycle();
    });
}
