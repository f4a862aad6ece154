//! Opcode lifter: one entry per 65C816 opcode, emitting the IR fragment
//! that reproduces the instruction, cycle by cycle.
//!
//! [`emit`] fetches the opcode byte through the IR (so the fetch itself is
//! part of the block), asserts it matches the opcode the block was lifted
//! against (self-modifying code trips the assertion at evaluation time and
//! forces a re-lift), then dispatches over a flat match.
//!
//! The A↔memory family (`ORA AND EOR ADC STA LDA CMP SBC`) shares one grid:
//! the low five opcode bits select the addressing mode, the high three the
//! operation, exactly as the encoding intends. Everything else is listed
//! opcode by opcode.
//!
//! Only branches, jumps and returns mark the end of a basic block; falling
//! through never does.

use rec_core::ir::Ssa;
use rec_core::logging::{log, LogCategory, LogLevel};

use crate::addressing;
use crate::emitter::Emitter;
use crate::helpers::{
    add_carry_overflow, apply_acc, apply_immediate, apply_memory_operation, apply_modify, compare,
    load_reg16, nz_flags, pack_flags, pull_byte, push_byte, read_pc, read_pc16, read_pc16_flagged,
    store_reg16, subtract_borrow, unpack_flags, zero_flag,
};
use crate::regs::Reg;

/// Lift one instruction at the current PC into the block.
///
/// `opcode` is the byte the driver read at lift time; it is burnt into the
/// IR through an `Assert` against the fetched byte.
///
/// # Panics
///
/// Dispatching an opcode without a lifter entry is a programming error and
/// aborts. Drivers should consult [`mnemonic`] first and surface a proper
/// error with the faulting PC.
pub fn emit(e: &mut Emitter, opcode: u8) {
    let fetched = read_pc(e);
    let expected = e.imm(opcode as u32, 8);
    e.assert_eq(fetched, expected);
    e.reset_zero_chain();

    match opcode {
        // ── Flag set/clear ─────────────────────────────────────────────
        0x18 => set_flag(e, Reg::FlagC, 0), // CLC
        0x38 => set_flag(e, Reg::FlagC, 1), // SEC
        0x58 => set_flag(e, Reg::FlagI, 0), // CLI
        0x78 => set_flag(e, Reg::FlagI, 1), // SEI
        0xB8 => set_flag(e, Reg::FlagV, 0), // CLV
        0xD8 => set_flag(e, Reg::FlagD, 0), // CLD
        0xF8 => set_flag(e, Reg::FlagD, 1), // SED

        0xC2 => rep_sep(e, false), // REP #imm
        0xE2 => rep_sep(e, true),  // SEP #imm

        0xEA => {
            // NOP
            e.inc_cycle();
        }

        0xEB => xba(e),
        0xFB => xce(e),

        // ── Transfers ──────────────────────────────────────────────────
        0xAA => transfer(e, Reg::A, Reg::X, false), // TAX
        0xA8 => transfer(e, Reg::A, Reg::Y, false), // TAY
        0xBA => transfer(e, Reg::S, Reg::X, false), // TSX
        0x8A => transfer(e, Reg::X, Reg::A, false), // TXA
        0x9A => transfer(e, Reg::X, Reg::S, false), // TXS
        0x9B => transfer(e, Reg::X, Reg::Y, false), // TXY
        0x98 => transfer(e, Reg::Y, Reg::A, false), // TYA
        0xBB => transfer(e, Reg::Y, Reg::X, false), // TYX
        0x5B => transfer(e, Reg::A, Reg::D, true),  // TCD
        0x1B => transfer(e, Reg::A, Reg::S, true),  // TCS
        0x7B => transfer(e, Reg::D, Reg::A, true),  // TDC
        0x3B => transfer(e, Reg::S, Reg::A, true),  // TSC

        // ── Implicit index inc/dec ─────────────────────────────────────
        0xE8 => step_index(e, Reg::X, 1),  // INX
        0xC8 => step_index(e, Reg::Y, 1),  // INY
        0xCA => step_index(e, Reg::X, -1), // DEX
        0x88 => step_index(e, Reg::Y, -1), // DEY

        // ── Shift / rotate / inc / dec RMW ─────────────────────────────
        0x06 | 0x0A | 0x0E | 0x16 | 0x1E => rmw(e, opcode, rmw_asl),
        0x26 | 0x2A | 0x2E | 0x36 | 0x3E => rmw(e, opcode, rmw_rol),
        0x46 | 0x4A | 0x4E | 0x56 | 0x5E => rmw(e, opcode, rmw_lsr),
        0x66 | 0x6A | 0x6E | 0x76 | 0x7E => rmw(e, opcode, rmw_ror),
        0x1A => apply_acc(e, rmw_inc), // INC A (irregular encoding)
        0x3A => apply_acc(e, rmw_dec), // DEC A (irregular encoding)
        0xE6 | 0xEE | 0xF6 | 0xFE => rmw(e, opcode, rmw_inc),
        0xC6 | 0xCE | 0xD6 | 0xDE => rmw(e, opcode, rmw_dec),

        // ── BIT ────────────────────────────────────────────────────────
        0x24 => {
            let addr = addressing::direct(e);
            apply_memory_operation(e, op_bit, addr);
        }
        0x2C => {
            let addr = addressing::absolute(e);
            apply_memory_operation(e, op_bit, addr);
        }
        0x34 => {
            let addr = addressing::direct_index(e, Reg::X);
            apply_memory_operation(e, op_bit, addr);
        }
        0x3C => {
            let addr = addressing::absolute_index(e, Reg::X, false);
            apply_memory_operation(e, op_bit, addr);
        }
        0x89 => apply_immediate(e, op_bit_imm), // BIT #imm: Z only

        // ── STZ ────────────────────────────────────────────────────────
        0x64 => {
            let addr = addressing::direct(e);
            apply_memory_operation(e, op_stz, addr);
        }
        0x74 => {
            let addr = addressing::direct_index(e, Reg::X);
            apply_memory_operation(e, op_stz, addr);
        }
        0x9C => {
            let addr = addressing::absolute(e);
            apply_memory_operation(e, op_stz, addr);
        }
        0x9E => {
            let addr = addressing::absolute_index(e, Reg::X, true);
            apply_memory_operation(e, op_stz, addr);
        }

        // ── Index register ↔ memory ────────────────────────────────────
        0xA2 => {
            // LDX #imm; width follows Flag X
            let flag_x = e.get(Reg::FlagX);
            let value = read_pc16_flagged(e, flag_x);
            store_reg16(e, Reg::X, value, false);
        }
        0xA0 => {
            // LDY #imm
            let flag_x = e.get(Reg::FlagX);
            let value = read_pc16_flagged(e, flag_x);
            store_reg16(e, Reg::Y, value, false);
        }
        0xA6 => {
            let addr = addressing::direct(e);
            index_load(e, Reg::X, addr);
        }
        0xAE => {
            let addr = addressing::absolute(e);
            index_load(e, Reg::X, addr);
        }
        0xB6 => {
            let addr = addressing::direct_index(e, Reg::Y);
            index_load(e, Reg::X, addr);
        }
        0xBE => {
            let addr = addressing::absolute_index(e, Reg::Y, false);
            index_load(e, Reg::X, addr);
        }
        0xA4 => {
            let addr = addressing::direct(e);
            index_load(e, Reg::Y, addr);
        }
        0xAC => {
            let addr = addressing::absolute(e);
            index_load(e, Reg::Y, addr);
        }
        0xB4 => {
            let addr = addressing::direct_index(e, Reg::X);
            index_load(e, Reg::Y, addr);
        }
        0xBC => {
            let addr = addressing::absolute_index(e, Reg::X, false);
            index_load(e, Reg::Y, addr);
        }

        0x86 => {
            let addr = addressing::direct(e);
            index_store(e, Reg::X, addr);
        }
        0x8E => {
            let addr = addressing::absolute(e);
            index_store(e, Reg::X, addr);
        }
        0x96 => {
            let addr = addressing::direct_index(e, Reg::Y);
            index_store(e, Reg::X, addr);
        }
        0x84 => {
            let addr = addressing::direct(e);
            index_store(e, Reg::Y, addr);
        }
        0x8C => {
            let addr = addressing::absolute(e);
            index_store(e, Reg::Y, addr);
        }
        0x94 => {
            let addr = addressing::direct_index(e, Reg::X);
            index_store(e, Reg::Y, addr);
        }

        0xE0 => {
            // CPX #imm
            let flag_x = e.get(Reg::FlagX);
            let value = read_pc16_flagged(e, flag_x);
            index_compare_value(e, Reg::X, value);
        }
        0xC0 => {
            // CPY #imm
            let flag_x = e.get(Reg::FlagX);
            let value = read_pc16_flagged(e, flag_x);
            index_compare_value(e, Reg::Y, value);
        }
        0xE4 => {
            let addr = addressing::direct(e);
            index_compare(e, Reg::X, addr);
        }
        0xEC => {
            let addr = addressing::absolute(e);
            index_compare(e, Reg::X, addr);
        }
        0xC4 => {
            let addr = addressing::direct(e);
            index_compare(e, Reg::Y, addr);
        }
        0xCC => {
            let addr = addressing::absolute(e);
            index_compare(e, Reg::Y, addr);
        }

        // ── Stack push/pull ────────────────────────────────────────────
        0x08 => {
            // PHP
            let p = pack_flags(e);
            e.inc_cycle();
            push_byte(e, p);
        }
        0x28 => {
            // PLP
            e.inc_cycle();
            e.inc_cycle();
            let p = pull_byte(e);
            unpack_flags(e, p);
        }
        0x48 => {
            // PHA: high byte first, and only when M is clear
            e.inc_cycle();
            let flag_m = e.get(Reg::FlagM);
            let wide = e.not(flag_m);
            e.if_then(wide, |e| {
                let b = e.get(Reg::B);
                push_byte(e, b);
            });
            let a = e.get(Reg::A);
            push_byte(e, a);
        }
        0x68 => {
            // PLA: low byte first; flags per width
            e.inc_cycle();
            e.inc_cycle();
            let a = pull_byte(e);
            e.set(Reg::A, a);
            nz_flags(e, a);
            let flag_m = e.get(Reg::FlagM);
            let wide = e.not(flag_m);
            e.if_then(wide, |e| {
                let b = pull_byte(e);
                e.set(Reg::B, b);
                nz_flags(e, b);
            });
        }
        0xDA => push_index(e, Reg::X), // PHX
        0x5A => push_index(e, Reg::Y), // PHY
        0xFA => pull_index(e, Reg::X), // PLX
        0x7A => pull_index(e, Reg::Y), // PLY
        0x0B => {
            // PHD
            e.inc_cycle();
            let d = e.get(Reg::D);
            let hi = e.extract(d, 8, 8);
            push_byte(e, hi);
            let lo = e.extract(d, 0, 8);
            push_byte(e, lo);
        }
        0x2B => {
            // PLD
            e.inc_cycle();
            e.inc_cycle();
            let lo = pull_byte(e);
            let hi = pull_byte(e);
            let value = e.cat(hi, lo);
            store_reg16(e, Reg::D, value, true);
        }
        0x4B => {
            // PHK
            e.inc_cycle();
            let pbr = e.get(Reg::Pbr);
            push_byte(e, pbr);
        }
        0x8B => {
            // PHB
            e.inc_cycle();
            let dbr = e.get(Reg::Dbr);
            push_byte(e, dbr);
        }
        0xAB => {
            // PLB
            e.inc_cycle();
            e.inc_cycle();
            let v = pull_byte(e);
            e.set(Reg::Dbr, v);
            nz_flags(e, v);
        }

        // ── Jumps and calls ────────────────────────────────────────────
        0x4C => {
            // JMP a
            let target = read_pc16(e);
            e.set(Reg::Pc, target);
            e.ending = true;
        }
        0x5C => {
            // JMP al
            let target = read_pc16(e);
            let bank = read_pc(e);
            e.set(Reg::Pc, target);
            e.set(Reg::Pbr, bank);
            e.ending = true;
        }
        0x6C => {
            // JMP (a)
            let target = addressing::indirect_absolute(e);
            e.set(Reg::Pc, target);
            e.ending = true;
        }
        0x20 => {
            // JSR a: pushes the address of the last operand byte
            let target = read_pc16(e);
            e.inc_cycle();
            let pc = e.get(Reg::Pc);
            let one16 = e.imm(1, 16);
            let ret = e.sub(pc, one16);
            let hi = e.extract(ret, 8, 8);
            push_byte(e, hi);
            let lo = e.extract(ret, 0, 8);
            push_byte(e, lo);
            e.set(Reg::Pc, target);
            e.ending = true;
        }

        // ── Returns ────────────────────────────────────────────────────
        0x60 => {
            // RTS
            e.inc_cycle();
            e.inc_cycle();
            let lo = pull_byte(e);
            let hi = pull_byte(e);
            e.inc_cycle();
            let addr = e.cat(hi, lo);
            let one16 = e.imm(1, 16);
            let target = e.add(addr, one16);
            e.set(Reg::Pc, target);
            e.ending = true;
        }
        0x40 => {
            // RTI: flags, then PC; native mode also pulls PBR
            e.inc_cycle();
            e.inc_cycle();
            let p = pull_byte(e);
            unpack_flags(e, p);
            let lo = pull_byte(e);
            let hi = pull_byte(e);
            let target = e.cat(hi, lo);
            e.set(Reg::Pc, target);
            let flag_e = e.get(Reg::FlagE);
            let native = e.not(flag_e);
            e.if_then(native, |e| {
                let bank = pull_byte(e);
                e.set(Reg::Pbr, bank);
            });
            e.ending = true;
        }

        // ── Conditional branches ───────────────────────────────────────
        0x10 => {
            let n = e.get(Reg::FlagN);
            let cond = e.not(n);
            branch_on(e, cond); // BPL
        }
        0x30 => {
            let cond = e.get(Reg::FlagN);
            branch_on(e, cond); // BMI
        }
        0x50 => {
            let v = e.get(Reg::FlagV);
            let cond = e.not(v);
            branch_on(e, cond); // BVC
        }
        0x70 => {
            let cond = e.get(Reg::FlagV);
            branch_on(e, cond); // BVS
        }
        0x80 => {
            let cond = e.imm(1, 1);
            branch_on(e, cond); // BRA
        }
        0x90 => {
            let c = e.get(Reg::FlagC);
            let cond = e.not(c);
            branch_on(e, cond); // BCC
        }
        0xB0 => {
            let cond = e.get(Reg::FlagC);
            branch_on(e, cond); // BCS
        }
        0xD0 => {
            let z = e.get(Reg::FlagZ);
            let cond = e.not(z);
            branch_on(e, cond); // BNE
        }
        0xF0 => {
            let cond = e.get(Reg::FlagZ);
            branch_on(e, cond); // BEQ
        }

        // ── Universal A↔memory grid ────────────────────────────────────
        _ => {
            let base = opcode & 0xE0;
            let mode = opcode & 0x1F;
            let op: Option<crate::helpers::MemOp> = match base {
                0x00 => Some(op_ora),
                0x20 => Some(op_and),
                0x40 => Some(op_eor),
                0x60 => Some(op_adc),
                0x80 => Some(op_sta),
                0xA0 => Some(op_lda),
                0xC0 => Some(op_cmp),
                0xE0 => Some(op_sbc),
                _ => None,
            };
            let is_store = base == 0x80;
            match (op, universal_mode_ok(mode, is_store)) {
                (Some(op), true) => universal(e, op, mode, is_store),
                _ => {
                    log(LogCategory::Dispatch, LogLevel::Error, || {
                        format!(
                            "no lifter for opcode {:02X} in block at {:06X}",
                            opcode,
                            e.block_pc()
                        )
                    });
                    panic!(
                        "unimplemented opcode {:02X} in block at {:06X}",
                        opcode,
                        e.block_pc()
                    );
                }
            }
        }
    }
}

/// Addressing-mode offsets the universal grid supports. `(d,s),y` (0x13)
/// and `[d],y` (0x17) are deliberately unlifted.
fn universal_mode_ok(mode: u8, is_store: bool) -> bool {
    match mode {
        0x09 => !is_store, // no STA #imm
        0x01 | 0x03 | 0x05 | 0x07 | 0x0D | 0x0F | 0x11 | 0x12 | 0x15 | 0x19 | 0x1D | 0x1F => true,
        _ => false,
    }
}

fn universal(e: &mut Emitter, op: crate::helpers::MemOp, mode: u8, is_store: bool) {
    let address = match mode {
        0x09 => {
            apply_immediate(e, op);
            return;
        }
        0x0D => addressing::absolute(e),
        0x1D => addressing::absolute_index(e, Reg::X, is_store),
        0x19 => addressing::absolute_index(e, Reg::Y, is_store),
        0x0F => addressing::absolute_long(e),
        0x1F => addressing::absolute_long_x(e),
        0x05 => addressing::direct(e),
        0x15 => addressing::direct_index(e, Reg::X),
        0x03 => addressing::stack_relative(e),
        0x12 => addressing::indirect_direct(e),
        0x07 => addressing::indirect_direct_long(e),
        0x01 => addressing::indirect_direct_index_x(e),
        0x11 => addressing::index_y_indirect_direct(e, is_store),
        _ => unreachable!("unhandled universal mode {:02X}", mode),
    };
    apply_memory_operation(e, op, address);
}

// ── Universal inner operations (run per accumulator half) ───────────────

fn op_ora(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let val = e.read(addr);
    let cur = e.get(reg);
    let result = e.or(cur, val);
    e.set(reg, result);
    nz_flags(e, result);
}

fn op_and(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let val = e.read(addr);
    let cur = e.get(reg);
    let result = e.and(cur, val);
    e.set(reg, result);
    nz_flags(e, result);
}

fn op_eor(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let val = e.read(addr);
    let cur = e.get(reg);
    let result = e.xor(cur, val);
    e.set(reg, result);
    nz_flags(e, result);
}

fn op_adc(e: &mut Emitter, reg: Reg, addr: Ssa) {
    // Decimal mode is intentionally not applied here.
    let val = e.read(addr);
    add_carry_overflow(e, reg, val);
    let result = e.get(reg);
    nz_flags(e, result);
}

fn op_sbc(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let val = e.read(addr);
    subtract_borrow(e, reg, val);
    let result = e.get(reg);
    nz_flags(e, result);
}

fn op_sta(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let val = e.get(reg);
    e.write(addr, val);
}

fn op_lda(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let val = e.read(addr);
    e.set(reg, val);
    nz_flags(e, val);
}

fn op_cmp(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let val = e.read(addr);
    let cur = e.get(reg);
    compare(e, cur, val);
}

fn op_bit(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let val = e.read(addr);
    let cur = e.get(reg);
    let masked = e.and(cur, val);
    // N and V mirror the operand; Z tests the AND.
    let n = e.extract(val, 7, 1);
    e.set(Reg::FlagN, n);
    let v = e.extract(val, 6, 1);
    e.set(Reg::FlagV, v);
    zero_flag(e, masked);
}

fn op_bit_imm(e: &mut Emitter, reg: Reg, addr: Ssa) {
    // Immediate BIT only affects Z.
    let val = e.read(addr);
    let cur = e.get(reg);
    let masked = e.and(cur, val);
    zero_flag(e, masked);
}

fn op_stz(e: &mut Emitter, _reg: Reg, addr: Ssa) {
    let zero = e.imm(0, 8);
    e.write(addr, zero);
}

// ── RMW bodies ──────────────────────────────────────────────────────────

fn rmw_flags(e: &mut Emitter, out: Ssa, bits: u8) {
    if bits == 8 {
        nz_flags(e, out);
    } else {
        let n = e.extract(out, 15, 1);
        e.set(Reg::FlagN, n);
        let zero16 = e.imm(0, 16);
        let z = e.eq(out, zero16);
        e.set(Reg::FlagZ, z);
    }
}

fn rmw_asl(e: &mut Emitter, value: Ssa, bits: u8) -> Ssa {
    let shifted = e.shl(value, 1);
    let carry = e.extract(shifted, bits as u32, 1);
    e.set(Reg::FlagC, carry);
    let out = e.extract(shifted, 0, bits as u32);
    rmw_flags(e, out, bits);
    out
}

fn rmw_rol(e: &mut Emitter, value: Ssa, bits: u8) -> Ssa {
    let shifted = e.shl(value, 1);
    let carry_in = e.get(Reg::FlagC);
    let wide_carry = e.zext(carry_in, bits as u32 + 1);
    let rotated = e.or(shifted, wide_carry);
    let carry = e.extract(rotated, bits as u32, 1);
    e.set(Reg::FlagC, carry);
    let out = e.extract(rotated, 0, bits as u32);
    rmw_flags(e, out, bits);
    out
}

fn rmw_lsr(e: &mut Emitter, value: Ssa, bits: u8) -> Ssa {
    let carry = e.extract(value, 0, 1);
    e.set(Reg::FlagC, carry);
    let narrowed = e.shr(value, 1);
    let out = e.zext(narrowed, bits as u32);
    let zero1 = e.imm(0, 1);
    e.set(Reg::FlagN, zero1);
    let zero = e.imm(0, bits);
    let z = e.eq(out, zero);
    e.set(Reg::FlagZ, z);
    out
}

fn rmw_ror(e: &mut Emitter, value: Ssa, bits: u8) -> Ssa {
    let carry_in = e.get(Reg::FlagC);
    let carry = e.extract(value, 0, 1);
    e.set(Reg::FlagC, carry);
    let narrowed = e.shr(value, 1);
    let shifted = e.zext(narrowed, bits as u32);
    let top = e.shl(carry_in, bits as u32 - 1);
    let out = e.or(shifted, top);
    let n = e.extract(out, bits as u32 - 1, 1);
    e.set(Reg::FlagN, n);
    let zero = e.imm(0, bits);
    let z = e.eq(out, zero);
    e.set(Reg::FlagZ, z);
    out
}

fn rmw_inc(e: &mut Emitter, value: Ssa, bits: u8) -> Ssa {
    let one = e.imm(1, bits);
    let out = e.add(value, one);
    rmw_flags(e, out, bits);
    out
}

fn rmw_dec(e: &mut Emitter, value: Ssa, bits: u8) -> Ssa {
    let one = e.imm(1, bits);
    let out = e.sub(value, one);
    rmw_flags(e, out, bits);
    out
}

/// Shared mode grid of the RMW families: `d`, accumulator, `a`, `d,x`,
/// `a,x`. RMW against `a,x` always pays the indexing cycle.
fn rmw(e: &mut Emitter, opcode: u8, op: crate::helpers::RmwOp) {
    match opcode & 0x1F {
        0x0A => apply_acc(e, op),
        0x06 => {
            let addr = addressing::direct(e);
            apply_modify(e, op, addr);
        }
        0x0E => {
            let addr = addressing::absolute(e);
            apply_modify(e, op, addr);
        }
        0x16 => {
            let addr = addressing::direct_index(e, Reg::X);
            apply_modify(e, op, addr);
        }
        0x1E => {
            let addr = addressing::absolute_index(e, Reg::X, true);
            apply_modify(e, op, addr);
        }
        mode => unreachable!("unhandled RMW mode {:02X}", mode),
    }
}

// ── Index register plumbing ─────────────────────────────────────────────

/// LDX/LDY from memory: low byte always, high byte when the index is wide.
fn index_load(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let low = e.read(addr);
    e.inc_cycle();
    let mut high = e.imm(0, 8);
    let flag_x = e.get(Reg::FlagX);
    let wide = e.not(flag_x);
    e.if_then(wide, |e| {
        let high_addr = e.add_imm(addr, 1);
        high = e.read(high_addr);
        e.inc_cycle();
    });
    let value = e.cat(high, low);
    store_reg16(e, reg, value, false);
}

/// STX/STY to memory.
fn index_store(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let full = e.get(reg);
    let low = e.extract(full, 0, 8);
    e.write(addr, low);
    e.inc_cycle();
    let flag_x = e.get(Reg::FlagX);
    let wide = e.not(flag_x);
    e.if_then(wide, |e| {
        let high_addr = e.add_imm(addr, 1);
        let high = e.extract(full, 8, 8);
        e.write(high_addr, high);
        e.inc_cycle();
    });
}

/// CPX/CPY against memory.
fn index_compare(e: &mut Emitter, reg: Reg, addr: Ssa) {
    let mem_low = e.read(addr);
    e.inc_cycle();
    let full = e.get(reg);
    let low = e.extract(full, 0, 8);
    compare(e, low, mem_low);
    let flag_x = e.get(Reg::FlagX);
    let wide = e.not(flag_x);
    e.if_then(wide, |e| {
        let high_addr = e.add_imm(addr, 1);
        let mem_high = e.read(high_addr);
        e.inc_cycle();
        let high = e.extract(full, 8, 8);
        compare(e, high, mem_high);
    });
}

/// CPX/CPY against an already-fetched 16-bit value.
fn index_compare_value(e: &mut Emitter, reg: Reg, value: Ssa) {
    let full = e.get(reg);
    let low = e.extract(full, 0, 8);
    let mem_low = e.extract(value, 0, 8);
    compare(e, low, mem_low);
    let flag_x = e.get(Reg::FlagX);
    let wide = e.not(flag_x);
    e.if_then(wide, |e| {
        let high = e.extract(full, 8, 8);
        let mem_high = e.extract(value, 8, 8);
        compare(e, high, mem_high);
    });
}

/// INX/INY/DEX/DEY: always-16-bit arithmetic, clipped on store per Flag X.
fn step_index(e: &mut Emitter, reg: Reg, dir: i32) {
    let cur = e.get(reg);
    let one = e.imm(1, 16);
    let next = if dir > 0 { e.add(cur, one) } else { e.sub(cur, one) };
    store_reg16(e, reg, next, false);
    e.inc_cycle();
}

/// PHX/PHY.
fn push_index(e: &mut Emitter, reg: Reg) {
    e.inc_cycle();
    let full = e.get(reg);
    let flag_x = e.get(Reg::FlagX);
    let wide = e.not(flag_x);
    e.if_then(wide, |e| {
        let high = e.extract(full, 8, 8);
        push_byte(e, high);
    });
    let low = e.extract(full, 0, 8);
    push_byte(e, low);
}

/// PLX/PLY.
fn pull_index(e: &mut Emitter, reg: Reg) {
    e.inc_cycle();
    e.inc_cycle();
    let low = pull_byte(e);
    let mut high = e.imm(0, 8);
    let flag_x = e.get(Reg::FlagX);
    let wide = e.not(flag_x);
    e.if_then(wide, |e| {
        high = pull_byte(e);
    });
    let value = e.cat(high, low);
    store_reg16(e, reg, value, false);
}

// ── Singles ─────────────────────────────────────────────────────────────

fn set_flag(e: &mut Emitter, reg: Reg, bit: u32) {
    let v = e.imm(bit, 1);
    e.set(reg, v);
    e.inc_cycle();
}

/// REP/SEP: clear or set flag bits through the canonical P layout. M and X
/// refuse the update while E is set, as on PLP.
fn rep_sep(e: &mut Emitter, set: bool) {
    let mask = read_pc(e);
    e.inc_cycle();
    let flag_e = e.get(Reg::FlagE);
    let positions = [
        (Reg::FlagN, 7u32),
        (Reg::FlagV, 6),
        (Reg::FlagM, 5),
        (Reg::FlagX, 4),
        (Reg::FlagD, 3),
        (Reg::FlagI, 2),
        (Reg::FlagZ, 1),
        (Reg::FlagC, 0),
    ];
    for (reg, bit) in positions {
        let selected = e.extract(mask, bit, 1);
        let cur = e.get(reg);
        let next = if set {
            e.or(cur, selected)
        } else {
            let keep = e.not(selected);
            e.and(cur, keep)
        };
        let next = if matches!(reg, Reg::FlagM | Reg::FlagX) {
            e.ternary(flag_e, cur, next)
        } else {
            next
        };
        e.set(reg, next);
    }
}

/// XBA: swap the accumulator halves; N/Z from the new low byte.
fn xba(e: &mut Emitter) {
    e.inc_cycle();
    e.inc_cycle();
    let a = e.get(Reg::A);
    let b = e.get(Reg::B);
    e.set(Reg::A, b);
    e.set(Reg::B, a);
    nz_flags(e, b);
}

/// XCE: exchange carry and emulation. Entering emulation forces M=X=1 and
/// snaps the stack into page one.
fn xce(e: &mut Emitter) {
    let c = e.get(Reg::FlagC);
    let old_e = e.get(Reg::FlagE);
    e.set(Reg::FlagC, old_e);
    e.set(Reg::FlagE, c);
    e.if_then(c, |e| {
        let one = e.imm(1, 1);
        e.set(Reg::FlagM, one);
        e.set(Reg::FlagX, one);
        let s = e.get(Reg::S);
        let low = e.extract(s, 0, 8);
        let page_one = e.imm(0x01, 8);
        let locked = e.cat(page_one, low);
        e.set(Reg::S, locked);
    });
    e.inc_cycle();
}

fn transfer(e: &mut Emitter, src: Reg, dst: Reg, force16: bool) {
    let value = load_reg16(e, src, force16);
    store_reg16(e, dst, value, force16);
    e.inc_cycle();
}

/// Shared tail of every conditional branch: signed 8-bit displacement, one
/// cycle when taken, one more when an emulation-mode branch crosses a page.
/// Every branch ends the block regardless of direction.
fn branch_on(e: &mut Emitter, cond: Ssa) {
    let disp = read_pc(e);
    e.if_then(cond, |e| {
        e.inc_cycle();
        let old_pc = e.get(Reg::Pc);
        let sign = e.extract(disp, 7, 1);
        let ones = e.imm(0xFF, 8);
        let zero8 = e.imm(0, 8);
        let ext = e.ternary(sign, ones, zero8);
        let disp16 = e.cat(ext, disp);
        let new_pc = e.add(old_pc, disp16);
        e.set(Reg::Pc, new_pc);

        let mask = e.imm(0xFF00, 16);
        let new_page = e.and(new_pc, mask);
        let old_page = e.and(old_pc, mask);
        let crossed = e.neq(new_page, old_page);
        let flag_e = e.get(Reg::FlagE);
        let crossed_e = e.and(crossed, flag_e);
        e.if_then(crossed_e, |e| {
            e.inc_cycle();
        });
    });
    e.ending = true;
}

/// Mnemonic of a lifted opcode, `None` for empty dispatch slots. Doubles as
/// the table-density oracle for drivers and tests.
pub fn mnemonic(opcode: u8) -> Option<&'static str> {
    let base = opcode & 0xE0;
    let mode = opcode & 0x1F;
    if universal_mode_ok(mode, base == 0x80) {
        return Some(match base {
            0x00 => "ORA",
            0x20 => "AND",
            0x40 => "EOR",
            0x60 => "ADC",
            0x80 => "STA",
            0xA0 => "LDA",
            0xC0 => "CMP",
            _ => "SBC",
        });
    }
    Some(match opcode {
        0x06 | 0x0A | 0x0E | 0x16 | 0x1E => "ASL",
        0x26 | 0x2A | 0x2E | 0x36 | 0x3E => "ROL",
        0x46 | 0x4A | 0x4E | 0x56 | 0x5E => "LSR",
        0x66 | 0x6A | 0x6E | 0x76 | 0x7E => "ROR",
        0x1A | 0xE6 | 0xEE | 0xF6 | 0xFE => "INC",
        0x3A | 0xC6 | 0xCE | 0xD6 | 0xDE => "DEC",
        0x24 | 0x2C | 0x34 | 0x3C | 0x89 => "BIT",
        0x64 | 0x74 | 0x9C | 0x9E => "STZ",
        0xA2 | 0xA6 | 0xAE | 0xB6 | 0xBE => "LDX",
        0xA0 | 0xA4 | 0xAC | 0xB4 | 0xBC => "LDY",
        0x86 | 0x8E | 0x96 => "STX",
        0x84 | 0x8C | 0x94 => "STY",
        0xE0 | 0xE4 | 0xEC => "CPX",
        0xC0 | 0xC4 | 0xCC => "CPY",
        0xE8 => "INX",
        0xC8 => "INY",
        0xCA => "DEX",
        0x88 => "DEY",
        0xAA => "TAX",
        0xA8 => "TAY",
        0xBA => "TSX",
        0x8A => "TXA",
        0x9A => "TXS",
        0x9B => "TXY",
        0x98 => "TYA",
        0xBB => "TYX",
        0x5B => "TCD",
        0x1B => "TCS",
        0x7B => "TDC",
        0x3B => "TSC",
        0xEB => "XBA",
        0xFB => "XCE",
        0x18 => "CLC",
        0x38 => "SEC",
        0x58 => "CLI",
        0x78 => "SEI",
        0xB8 => "CLV",
        0xD8 => "CLD",
        0xF8 => "SED",
        0xC2 => "REP",
        0xE2 => "SEP",
        0x08 => "PHP",
        0x28 => "PLP",
        0x48 => "PHA",
        0x68 => "PLA",
        0xDA => "PHX",
        0xFA => "PLX",
        0x5A => "PHY",
        0x7A => "PLY",
        0x0B => "PHD",
        0x2B => "PLD",
        0x4B => "PHK",
        0x8B => "PHB",
        0xAB => "PLB",
        0x4C | 0x5C | 0x6C => "JMP",
        0x20 => "JSR",
        0x60 => "RTS",
        0x40 => "RTI",
        0x10 => "BPL",
        0x30 => "BMI",
        0x50 => "BVC",
        0x70 => "BVS",
        0x80 => "BRA",
        0x90 => "BCC",
        0xB0 => "BCS",
        0xD0 => "BNE",
        0xF0 => "BEQ",
        0xEA => "NOP",
        _ => return None,
    })
}
