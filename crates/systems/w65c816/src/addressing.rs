//! Effective-address computation, one function per 65C816 addressing mode.
//!
//! Each mode emits its own operand fetches, internal cycles and penalty
//! cycles, and returns the SSA handle of a 24-bit effective address
//! (bank:8 | offset:16), except `indirect_absolute`, which feeds JMP and
//! returns the bare 16-bit target.
//!
//! `is_store` selects the store timing: stores pay the indexing cycle
//! unconditionally instead of the page-cross penalty reads pay.

use rec_core::ir::Ssa;

use crate::emitter::Emitter;
use crate::helpers::{load_reg16, read_pc, read_pc16};
use crate::regs::Reg;

/// Index register value as used in address arithmetic: masked to 8 bits
/// while Flag X is set.
fn index_value(e: &mut Emitter, reg: Reg) -> Ssa {
    load_reg16(e, reg, false)
}

/// Add an index register to a 16-bit address.
///
/// Reads take one extra cycle when the page changes or the index is 16-bit;
/// stores always take it.
fn add_index_reg(e: &mut Emitter, reg: Reg, address: Ssa, is_store: bool) -> Ssa {
    let index = index_value(e, reg);
    let new_address = e.add(address, index);

    if is_store {
        e.inc_cycle();
    } else {
        let mask = e.imm(0xFF00, 16);
        let new_page = e.and(new_address, mask);
        let old_page = e.and(address, mask);
        let page_cross = e.neq(new_page, old_page);
        let flag_x = e.get(Reg::FlagX);
        let wide_index = e.not(flag_x);
        let penalty = e.or(page_cross, wide_index);
        e.if_then(penalty, |e| {
            // TODO: issue the dummy read at DBR,AAH,AAL+XL here once the
            // device namespace starts caring about bus contention.
            e.inc_cycle();
        });
    }
    new_address
}

/// Add with an optional page wrap: when `wrap` holds, the high byte of the
/// sum is taken from the unwrapped base instead. Both outcomes are emitted;
/// a `Ternary` picks at run time.
fn add_wrapped(e: &mut Emitter, base: Ssa, offset: Ssa, wrap: Ssa) -> Ssa {
    let sum = e.add(base, offset);
    let hi_mask = e.imm(0xFF00, 16);
    let lo_mask = e.imm(0x00FF, 16);
    let base_page = e.and(base, hi_mask);
    let sum_low = e.and(sum, lo_mask);
    let wrapped = e.or(base_page, sum_low);
    e.ternary(wrap, wrapped, sum)
}

/// `a`: two operand fetches, bank from DBR.
pub fn absolute(e: &mut Emitter) -> Ssa {
    let offset = read_pc16(e);
    let dbr = e.get(Reg::Dbr);
    e.cat(dbr, offset)
}

/// `al`: three operand fetches form the full 24-bit address.
pub fn absolute_long(e: &mut Emitter) -> Ssa {
    let low = read_pc16(e);
    let high = read_pc(e);
    e.cat(high, low)
}

/// `a,x` / `a,y`.
pub fn absolute_index(e: &mut Emitter, reg: Reg, is_store: bool) -> Ssa {
    let offset = read_pc16(e);
    let indexed = add_index_reg(e, reg, offset, is_store);
    let dbr = e.get(Reg::Dbr);
    e.cat(dbr, indexed)
}

/// `al,x`: 24-bit add, no page-cross logic.
pub fn absolute_long_x(e: &mut Emitter) -> Ssa {
    let base = absolute_long(e);
    let zero8 = e.imm(0, 8);
    let index = index_value(e, Reg::X);
    let wide_index = e.cat(zero8, index);
    e.add(base, wide_index)
}

/// Direct-page operand: fetch the offset, pay a cycle when D's low byte is
/// set, and return the 16-bit bank-0 address with the DL-penalty condition.
fn direct_base(e: &mut Emitter) -> (Ssa, Ssa) {
    let offset = read_pc(e);
    let lo_mask = e.imm(0x00FF, 16);
    let d = e.get(Reg::D);
    let d_low = e.and(d, lo_mask);
    let zero16 = e.imm(0, 16);
    let overflow = e.neq(zero16, d_low);
    e.if_then(overflow, |e| {
        e.inc_cycle();
    });
    let base = e.add(d, offset);
    (base, overflow)
}

/// `d`.
pub fn direct(e: &mut Emitter) -> Ssa {
    let (base, _) = direct_base(e);
    let zero8 = e.imm(0, 8);
    e.cat(zero8, base)
}

/// `d,x` / `d,y`: the index add wraps inside the direct page when E is set
/// and D is page-aligned.
pub fn direct_index(e: &mut Emitter, reg: Reg) -> Ssa {
    let offset = read_pc(e);
    let lo_mask = e.imm(0x00FF, 16);
    let d = e.get(Reg::D);
    let d_low = e.and(d, lo_mask);
    let zero16 = e.imm(0, 16);
    let overflow = e.neq(zero16, d_low);
    let aligned = e.not(overflow);
    let flag_e = e.get(Reg::FlagE);
    let wrap = e.and(aligned, flag_e);

    let base = e.add(d, offset);
    let index = index_value(e, reg);
    let address = add_wrapped(e, base, index, wrap);
    e.inc_cycle();
    e.if_then(overflow, |e| {
        e.inc_cycle();
    });
    let zero8 = e.imm(0, 8);
    e.cat(zero8, address)
}

/// Pointer location for the `(d)` family, plus the E-mode wrap condition
/// its increments obey.
fn direct_pointer(e: &mut Emitter) -> (Ssa, Ssa) {
    let (base, overflow) = direct_base(e);
    let aligned = e.not(overflow);
    let flag_e = e.get(Reg::FlagE);
    let wrap = e.and(aligned, flag_e);
    (base, wrap)
}

/// `(d)`: two pointer reads in bank 0, bank from DBR.
pub fn indirect_direct(e: &mut Emitter) -> Ssa {
    let (loc, wrap) = direct_pointer(e);
    let zero8 = e.imm(0, 8);
    let lo_addr = e.cat(zero8, loc);
    let lo = e.read(lo_addr);
    e.inc_cycle();
    let one16 = e.imm(1, 16);
    let next = add_wrapped(e, loc, one16, wrap);
    let hi_addr = e.cat(zero8, next);
    let hi = e.read(hi_addr);
    e.inc_cycle();
    let pointer = e.cat(hi, lo);
    let dbr = e.get(Reg::Dbr);
    e.cat(dbr, pointer)
}

/// `[d]`: three pointer reads assemble a 24-bit address. Long pointers do
/// not wrap inside the page.
pub fn indirect_direct_long(e: &mut Emitter) -> Ssa {
    let (loc, _) = direct_base(e);
    let zero8 = e.imm(0, 8);

    let lo_addr = e.cat(zero8, loc);
    let lo = e.read(lo_addr);
    e.inc_cycle();

    let mid_loc = e.add_imm(loc, 1);
    let mid_addr = e.cat(zero8, mid_loc);
    let mid = e.read(mid_addr);
    e.inc_cycle();

    let hi_loc = e.add_imm(loc, 2);
    let hi_addr = e.cat(zero8, hi_loc);
    let hi = e.read(hi_addr);
    e.inc_cycle();

    let low16 = e.cat(mid, lo);
    e.cat(hi, low16)
}

/// `(d,x)`: X joins the pointer location before the two reads.
pub fn indirect_direct_index_x(e: &mut Emitter) -> Ssa {
    let (base, wrap) = direct_pointer(e);
    let index = index_value(e, Reg::X);
    let loc = add_wrapped(e, base, index, wrap);
    e.inc_cycle();

    let zero8 = e.imm(0, 8);
    let lo_addr = e.cat(zero8, loc);
    let lo = e.read(lo_addr);
    e.inc_cycle();
    let one16 = e.imm(1, 16);
    let next = add_wrapped(e, loc, one16, wrap);
    let hi_addr = e.cat(zero8, next);
    let hi = e.read(hi_addr);
    e.inc_cycle();

    let pointer = e.cat(hi, lo);
    let dbr = e.get(Reg::Dbr);
    e.cat(dbr, pointer)
}

/// `(d),y`: Y joins after the pointer reads, with the usual index timing.
pub fn index_y_indirect_direct(e: &mut Emitter, is_store: bool) -> Ssa {
    let (loc, wrap) = direct_pointer(e);
    let zero8 = e.imm(0, 8);
    let lo_addr = e.cat(zero8, loc);
    let lo = e.read(lo_addr);
    e.inc_cycle();
    let one16 = e.imm(1, 16);
    let next = add_wrapped(e, loc, one16, wrap);
    let hi_addr = e.cat(zero8, next);
    let hi = e.read(hi_addr);
    e.inc_cycle();

    let pointer = e.cat(hi, lo);
    let indexed = add_index_reg(e, Reg::Y, pointer, is_store);
    let dbr = e.get(Reg::Dbr);
    e.cat(dbr, indexed)
}

/// `(a)`, JMP only: the pointer lives in bank 0; returns the 16-bit
/// target.
pub fn indirect_absolute(e: &mut Emitter) -> Ssa {
    let pointer = read_pc16(e);
    let zero8 = e.imm(0, 8);
    let lo_addr = e.cat(zero8, pointer);
    let lo = e.read(lo_addr);
    e.inc_cycle();
    let next = e.add_imm(pointer, 1);
    let hi_addr = e.cat(zero8, next);
    let hi = e.read(hi_addr);
    e.inc_cycle();
    e.cat(hi, lo)
}

/// `d,s`: 16-bit operand added to the stack pointer, one internal cycle.
pub fn stack_relative(e: &mut Emitter) -> Ssa {
    let offset = read_pc16(e);
    e.inc_cycle();
    let s = e.get(Reg::S);
    let sum = e.add(s, offset);
    let zero8 = e.imm(0, 8);
    e.cat(zero8, sum)
}
