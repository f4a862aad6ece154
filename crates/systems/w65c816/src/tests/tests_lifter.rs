//! Single-instruction behavior of the lifter, executed through the
//! reference interpreter: write program bytes, run one instruction, assert
//! registers, memory and the cycle counter.

use super::{native_mode, reg, run_one, set, with_program};
use crate::regs::Reg;

// ── Loads and the universal grid ────────────────────────────────────────

#[test]
fn lda_immediate_8bit() {
    let mut sys = with_program(&[0xA9, 0x42]);
    assert!(!run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC002);
    assert_eq!(reg(&sys, Reg::A), 0x42);
    assert_eq!(reg(&sys, Reg::FlagN), 0);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    assert_eq!(reg(&sys, Reg::Cycle), 2);
}

#[test]
fn lda_immediate_16bit() {
    let mut sys = with_program(&[0xA9, 0x34, 0x12]);
    native_mode(&mut sys, 0, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Pc), 0xC003);
    assert_eq!(reg(&sys, Reg::A), 0x34);
    assert_eq!(reg(&sys, Reg::B), 0x12);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    assert_eq!(reg(&sys, Reg::FlagN), 0);
}

#[test]
fn lda_16bit_zero_chain_needs_both_halves() {
    let mut sys = with_program(&[0xA9, 0x00, 0x80]);
    native_mode(&mut sys, 0, 1);
    run_one(&mut sys);
    // Low byte zero, high byte 0x80: not zero, negative.
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    assert_eq!(reg(&sys, Reg::FlagN), 1);

    let mut sys = with_program(&[0xA9, 0x00, 0x00]);
    native_mode(&mut sys, 0, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);
    assert_eq!(reg(&sys, Reg::FlagN), 0);
}

#[test]
fn lda_direct() {
    let mut sys = with_program(&[0xA5, 0x10]);
    sys.mem[0x0010] = 0x80;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x80);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

#[test]
fn lda_direct_pays_for_unaligned_d() {
    let mut sys = with_program(&[0xA5, 0x10]);
    set(&mut sys, Reg::D, 0x0001);
    sys.mem[0x0011] = 0x7E;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x7E);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn lda_absolute() {
    let mut sys = with_program(&[0xAD, 0x34, 0x12]);
    sys.mem[0x1234] = 0x99;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x99);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn lda_absolute_long_uses_its_own_bank_byte() {
    let mut sys = with_program(&[0xAF, 0x34, 0x12, 0x00]);
    set(&mut sys, Reg::Dbr, 0x12); // must be ignored by the long mode
    sys.mem[0x1234] = 0x5C;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x5C);
    assert_eq!(reg(&sys, Reg::Cycle), 5);
}

#[test]
fn lda_absolute_x_page_cross_costs_a_cycle() {
    let mut sys = with_program(&[0xBD, 0xFF, 0x20]);
    set(&mut sys, Reg::X, 0x01);
    sys.mem[0x2100] = 0x11;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x11);
    assert_eq!(reg(&sys, Reg::Cycle), 5);

    let mut sys = with_program(&[0xBD, 0x00, 0x21]);
    set(&mut sys, Reg::X, 0x01);
    sys.mem[0x2101] = 0x22;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x22);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn lda_absolute_y_wide_index_always_pays() {
    let mut sys = with_program(&[0xB9, 0x00, 0x21]);
    native_mode(&mut sys, 1, 0);
    set(&mut sys, Reg::Y, 0x0102);
    sys.mem[0x2202] = 0x33;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x33);
    assert_eq!(reg(&sys, Reg::Cycle), 5);
}

#[test]
fn lda_direct_x_wraps_inside_the_page_under_e() {
    let mut sys = with_program(&[0xB5, 0xFE]);
    set(&mut sys, Reg::X, 0x05);
    sys.mem[0x0003] = 0x77; // (0xFE + 5) & 0xFF
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x77);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn lda_direct_x_no_wrap_in_native_mode() {
    let mut sys = with_program(&[0xB5, 0xFE]);
    native_mode(&mut sys, 1, 1);
    set(&mut sys, Reg::X, 0x05);
    sys.mem[0x0103] = 0x66;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x66);
}

#[test]
fn lda_indirect_direct() {
    let mut sys = with_program(&[0xB2, 0x20]);
    sys.mem[0x0020] = 0x34;
    sys.mem[0x0021] = 0x12;
    sys.mem[0x1234] = 0x4D;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x4D);
    assert_eq!(reg(&sys, Reg::Cycle), 5);
}

#[test]
fn lda_indirect_direct_pointer_wraps_under_e() {
    // Pointer at 0xFF: the high byte comes from 0x00, not 0x100.
    let mut sys = with_program(&[0xB2, 0xFF]);
    sys.mem[0x00FF] = 0x34;
    sys.mem[0x0000] = 0x12;
    sys.mem[0x0100] = 0x56; // the wrong byte if the wrap is missed
    sys.mem[0x1234] = 0x42;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x42);
}

#[test]
fn lda_indirect_direct_long() {
    let mut sys = with_program(&[0xA7, 0x20]);
    sys.mem[0x0020] = 0x45;
    sys.mem[0x0021] = 0x23;
    sys.mem[0x0022] = 0x00; // bank 0: memory model is one bank wide
    sys.mem[0x2345] = 0x6B;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x6B);
    assert_eq!(reg(&sys, Reg::Cycle), 6);
}

#[test]
fn lda_indirect_direct_x() {
    let mut sys = with_program(&[0xA1, 0x20]);
    set(&mut sys, Reg::X, 0x04);
    sys.mem[0x0024] = 0x34;
    sys.mem[0x0025] = 0x12;
    sys.mem[0x1234] = 0x29;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x29);
    assert_eq!(reg(&sys, Reg::Cycle), 6);
}

#[test]
fn lda_indirect_y() {
    let mut sys = with_program(&[0xB1, 0x20]);
    set(&mut sys, Reg::Y, 0x10);
    sys.mem[0x0020] = 0x00;
    sys.mem[0x0021] = 0x40;
    sys.mem[0x4010] = 0x83;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x83);
    assert_eq!(reg(&sys, Reg::Cycle), 5);
}

#[test]
fn lda_stack_relative_reads_a_16bit_offset() {
    let mut sys = with_program(&[0xA3, 0x01, 0x00]);
    set(&mut sys, Reg::S, 0x01F0);
    sys.mem[0x01F1] = 0x3D;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x3D);
    assert_eq!(reg(&sys, Reg::Cycle), 5);
}

#[test]
fn sta_absolute_8bit_leaves_the_high_byte_alone() {
    let mut sys = with_program(&[0x8D, 0x00, 0x20]);
    set(&mut sys, Reg::A, 0x42);
    set(&mut sys, Reg::B, 0x99);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x2000], 0x42);
    assert_eq!(sys.mem[0x2001], 0x00);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn sta_absolute_16bit_writes_both_halves() {
    let mut sys = with_program(&[0x8D, 0x00, 0x20]);
    native_mode(&mut sys, 0, 1);
    set(&mut sys, Reg::A, 0x42);
    set(&mut sys, Reg::B, 0x99);
    run_one(&mut sys);
    assert_eq!(&sys.mem[0x2000..0x2002], &[0x42, 0x99]);
    assert_eq!(reg(&sys, Reg::Cycle), 5);
}

#[test]
fn sta_absolute_x_always_pays_the_index_cycle() {
    let mut sys = with_program(&[0x9D, 0x00, 0x20]);
    set(&mut sys, Reg::A, 0x17);
    set(&mut sys, Reg::X, 0x01);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x2001], 0x17);
    assert_eq!(reg(&sys, Reg::Cycle), 5);
}

// ── Logic and arithmetic ────────────────────────────────────────────────

#[test]
fn ora_and_eor_immediate() {
    let mut sys = with_program(&[0x09, 0x0F]);
    set(&mut sys, Reg::A, 0xF0);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0xFF);
    assert_eq!(reg(&sys, Reg::FlagN), 1);

    let mut sys = with_program(&[0x29, 0x0F]);
    set(&mut sys, Reg::A, 0xF0);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x00);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);

    let mut sys = with_program(&[0x49, 0xFF]);
    set(&mut sys, Reg::A, 0x0F);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0xF0);
}

#[test]
fn adc_immediate_signed_overflow() {
    let mut sys = with_program(&[0x69, 0x01]);
    set(&mut sys, Reg::A, 0x7F);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x80);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::FlagV), 1);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    assert_eq!(reg(&sys, Reg::FlagC), 0);
    assert_eq!(reg(&sys, Reg::Cycle), 2);
}

#[test]
fn adc_16bit_chains_carry_between_halves() {
    let mut sys = with_program(&[0x69, 0x01, 0x00]);
    native_mode(&mut sys, 0, 1);
    set(&mut sys, Reg::A, 0xFF);
    set(&mut sys, Reg::B, 0x00);
    run_one(&mut sys);
    // 0x00FF + 0x0001 = 0x0100
    assert_eq!(reg(&sys, Reg::A), 0x00);
    assert_eq!(reg(&sys, Reg::B), 0x01);
    assert_eq!(reg(&sys, Reg::FlagC), 0);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
}

#[test]
fn sbc_immediate() {
    let mut sys = with_program(&[0xE9, 0x10]);
    set(&mut sys, Reg::A, 0x50);
    set(&mut sys, Reg::FlagC, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x40);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
}

#[test]
fn cmp_immediate() {
    let mut sys = with_program(&[0xC9, 0x30]);
    set(&mut sys, Reg::A, 0x40);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x40, "CMP must not write A");
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    assert_eq!(reg(&sys, Reg::FlagN), 0);

    let mut sys = with_program(&[0xC9, 0x40]);
    set(&mut sys, Reg::A, 0x40);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
}

#[test]
fn cmp_16bit_borrow_crosses_the_halves() {
    // 0x0100 vs 0x00FF: greater, so C=1 and Z=0, which only holds if the high
    // half consumes the low half's borrow.
    let mut sys = with_program(&[0xC9, 0xFF, 0x00]);
    native_mode(&mut sys, 0, 1);
    set(&mut sys, Reg::A, 0x00);
    set(&mut sys, Reg::B, 0x01);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
}

// ── RMW family ──────────────────────────────────────────────────────────

#[test]
fn asl_accumulator() {
    let mut sys = with_program(&[0x0A]);
    set(&mut sys, Reg::A, 0x81);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x02);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::FlagN), 0);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    assert_eq!(reg(&sys, Reg::Cycle), 2);
}

#[test]
fn asl_accumulator_16bit_takes_n_from_bit_15() {
    let mut sys = with_program(&[0x0A]);
    native_mode(&mut sys, 0, 1);
    set(&mut sys, Reg::A, 0x00);
    set(&mut sys, Reg::B, 0x40);
    run_one(&mut sys);
    // 0x4000 << 1 = 0x8000
    assert_eq!(reg(&sys, Reg::A), 0x00);
    assert_eq!(reg(&sys, Reg::B), 0x80);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::FlagC), 0);
    assert_eq!(reg(&sys, Reg::Cycle), 2);
}

#[test]
fn rol_and_ror_move_the_carry() {
    let mut sys = with_program(&[0x2A]);
    set(&mut sys, Reg::A, 0x80);
    set(&mut sys, Reg::FlagC, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x01);
    assert_eq!(reg(&sys, Reg::FlagC), 1);

    let mut sys = with_program(&[0x6A]);
    set(&mut sys, Reg::A, 0x01);
    set(&mut sys, Reg::FlagC, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x80);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
}

#[test]
fn lsr_clears_negative() {
    let mut sys = with_program(&[0x4A]);
    set(&mut sys, Reg::A, 0x01);
    set(&mut sys, Reg::FlagN, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x00);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);
    assert_eq!(reg(&sys, Reg::FlagN), 0);
}

#[test]
fn inc_absolute_read_modify_write() {
    let mut sys = with_program(&[0xEE, 0x00, 0x20]);
    sys.mem[0x2000] = 0xFF;
    run_one(&mut sys);
    assert_eq!(sys.mem[0x2000], 0x00);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);
    assert_eq!(reg(&sys, Reg::Cycle), 6);
}

#[test]
fn dec_accumulator_irregular_encoding() {
    let mut sys = with_program(&[0x3A]);
    set(&mut sys, Reg::A, 0x01);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x00);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);

    let mut sys = with_program(&[0x1A]);
    set(&mut sys, Reg::A, 0x7F);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x80);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
}

// ── BIT and STZ ─────────────────────────────────────────────────────────

#[test]
fn bit_direct_sets_n_v_from_memory_and_z_from_the_and() {
    let mut sys = with_program(&[0x24, 0x10]);
    sys.mem[0x0010] = 0xC0;
    set(&mut sys, Reg::A, 0x0F);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::FlagV), 1);
    assert_eq!(reg(&sys, Reg::FlagZ), 1); // 0x0F & 0xC0 == 0
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

#[test]
fn bit_immediate_only_touches_z() {
    let mut sys = with_program(&[0x89, 0xC0]);
    set(&mut sys, Reg::A, 0x40);
    set(&mut sys, Reg::FlagN, 1);
    set(&mut sys, Reg::FlagV, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    // N and V keep whatever they held.
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::FlagV), 1);
}

#[test]
fn stz_writes_zero() {
    let mut sys = with_program(&[0x9C, 0x00, 0x20]);
    sys.mem[0x2000] = 0xAA;
    run_one(&mut sys);
    assert_eq!(sys.mem[0x2000], 0x00);
}

// ── Index registers ─────────────────────────────────────────────────────

#[test]
fn ldx_immediate_width_follows_flag_x() {
    let mut sys = with_program(&[0xA2, 0x55]);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::X), 0x55);
    assert_eq!(reg(&sys, Reg::Pc), 0xC002);
    assert_eq!(reg(&sys, Reg::Cycle), 2);

    let mut sys = with_program(&[0xA2, 0x34, 0x12]);
    native_mode(&mut sys, 1, 0);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::X), 0x1234);
    assert_eq!(reg(&sys, Reg::Pc), 0xC003);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

#[test]
fn ldy_absolute_16bit() {
    let mut sys = with_program(&[0xAC, 0x00, 0x20]);
    native_mode(&mut sys, 1, 0);
    sys.mem[0x2000] = 0xCD;
    sys.mem[0x2001] = 0xAB;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Y), 0xABCD);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::Cycle), 5);
}

#[test]
fn stx_direct_8bit() {
    let mut sys = with_program(&[0x86, 0x10]);
    set(&mut sys, Reg::X, 0xAB42);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x0010], 0x42);
    assert_eq!(sys.mem[0x0011], 0x00);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

#[test]
fn cpx_immediate_8bit_uses_the_low_byte() {
    let mut sys = with_program(&[0xE0, 0x10]);
    set(&mut sys, Reg::X, 0xFF10); // stale high byte must not matter
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
}

#[test]
fn inx_clips_to_8_bits_under_flag_x() {
    let mut sys = with_program(&[0xE8]);
    set(&mut sys, Reg::X, 0xABFF);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::X), 0xAB00);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);
    assert_eq!(reg(&sys, Reg::Cycle), 2);
}

#[test]
fn dey_wraps_16bit_in_native_mode() {
    let mut sys = with_program(&[0x88]);
    native_mode(&mut sys, 1, 0);
    set(&mut sys, Reg::Y, 0x0000);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Y), 0xFFFF);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
}

// ── Transfers ───────────────────────────────────────────────────────────

#[test]
fn tax_respects_index_width() {
    let mut sys = with_program(&[0xAA]);
    set(&mut sys, Reg::A, 0x34);
    set(&mut sys, Reg::B, 0x12);
    set(&mut sys, Reg::X, 0xFF00);
    run_one(&mut sys);
    // 8-bit index mode: only the low byte lands, high byte kept.
    assert_eq!(reg(&sys, Reg::X), 0xFF34);
    assert_eq!(reg(&sys, Reg::Cycle), 2);
}

#[test]
fn txa_8bit_keeps_b() {
    let mut sys = with_program(&[0x8A]);
    set(&mut sys, Reg::X, 0x1234);
    set(&mut sys, Reg::B, 0x77);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x34);
    assert_eq!(reg(&sys, Reg::B), 0x77);
}

#[test]
fn txs_updates_no_flags_and_locks_the_page_under_e() {
    let mut sys = with_program(&[0x9A]);
    set(&mut sys, Reg::X, 0x42);
    set(&mut sys, Reg::FlagZ, 1);
    set(&mut sys, Reg::FlagN, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::S), 0x0142);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
}

#[test]
fn tcd_is_always_16_bit() {
    let mut sys = with_program(&[0x5B]);
    set(&mut sys, Reg::A, 0x34);
    set(&mut sys, Reg::B, 0x12);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::D), 0x1234);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    assert_eq!(reg(&sys, Reg::FlagN), 0);
}

#[test]
fn tsc_and_tcs() {
    let mut sys = with_program(&[0x3B]);
    set(&mut sys, Reg::S, 0x01FD);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0xFD);
    assert_eq!(reg(&sys, Reg::B), 0x01);

    let mut sys = with_program(&[0x1B]);
    set(&mut sys, Reg::A, 0x34);
    set(&mut sys, Reg::B, 0x12);
    run_one(&mut sys);
    // E is set: the page lock wins over the transferred high byte.
    assert_eq!(reg(&sys, Reg::S), 0x0134);
}

// ── XBA / XCE ───────────────────────────────────────────────────────────

#[test]
fn xba_swaps_halves_and_flags_track_new_a() {
    let mut sys = with_program(&[0xEB]);
    set(&mut sys, Reg::A, 0x12);
    set(&mut sys, Reg::B, 0x80);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x80);
    assert_eq!(reg(&sys, Reg::B), 0x12);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

#[test]
fn xce_swaps_carry_and_emulation() {
    let mut sys = with_program(&[0xFB]);
    set(&mut sys, Reg::FlagE, 1);
    set(&mut sys, Reg::FlagC, 0);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagE), 0);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::Cycle), 2);
}

#[test]
fn xce_entering_emulation_forces_widths_and_stack_page() {
    let mut sys = with_program(&[0xFB]);
    native_mode(&mut sys, 0, 0);
    set(&mut sys, Reg::FlagC, 1);
    set(&mut sys, Reg::S, 0x2345);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagE), 1);
    assert_eq!(reg(&sys, Reg::FlagC), 0);
    assert_eq!(reg(&sys, Reg::FlagM), 1);
    assert_eq!(reg(&sys, Reg::FlagX), 1);
    assert_eq!(reg(&sys, Reg::S), 0x0145);
}

// ── Flag instructions ───────────────────────────────────────────────────

#[test]
fn single_bit_flag_instructions() {
    for (program, flag, expected) in [
        ([0x18], Reg::FlagC, 0u64),
        ([0x38], Reg::FlagC, 1),
        ([0x58], Reg::FlagI, 0),
        ([0x78], Reg::FlagI, 1),
        ([0xB8], Reg::FlagV, 0),
        ([0xD8], Reg::FlagD, 0),
        ([0xF8], Reg::FlagD, 1),
    ] {
        let mut sys = with_program(&program);
        set(&mut sys, flag, 1 - expected.min(1));
        run_one(&mut sys);
        assert_eq!(reg(&sys, flag), expected, "program {program:02X?}");
        assert_eq!(reg(&sys, Reg::Cycle), 2);
    }
}

#[test]
fn rep_sep_toggle_flag_bits() {
    let mut sys = with_program(&[0xC2, 0x30]);
    native_mode(&mut sys, 1, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagM), 0);
    assert_eq!(reg(&sys, Reg::FlagX), 0);
    assert_eq!(reg(&sys, Reg::Cycle), 3);

    let mut sys = with_program(&[0xE2, 0x21]);
    native_mode(&mut sys, 0, 0);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagM), 1);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::FlagX), 0);
}

#[test]
fn rep_cannot_clear_widths_in_emulation_mode() {
    let mut sys = with_program(&[0xC2, 0x30]);
    run_one(&mut sys); // E=1
    assert_eq!(reg(&sys, Reg::FlagM), 1);
    assert_eq!(reg(&sys, Reg::FlagX), 1);
}

// ── Stack instructions ──────────────────────────────────────────────────

#[test]
fn php_packs_the_canonical_layout() {
    let mut sys = with_program(&[0x08]);
    set(&mut sys, Reg::FlagN, 1);
    set(&mut sys, Reg::FlagC, 1);
    run_one(&mut sys);
    // E=1 forces M and X in the packed byte.
    assert_eq!(sys.mem[0x01FD], 0b1011_0001);
    assert_eq!(reg(&sys, Reg::S), 0x01FC);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

#[test]
fn plp_restores_flags() {
    let mut sys = with_program(&[0x28]);
    native_mode(&mut sys, 1, 1);
    set(&mut sys, Reg::S, 0x01FC);
    sys.mem[0x01FD] = 0b1100_0011; // N V ... Z C
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::FlagV), 1);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::FlagM), 0);
    assert_eq!(reg(&sys, Reg::S), 0x01FD);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn pha_pla_8bit_round_trip() {
    let mut sys = with_program(&[0x48]);
    set(&mut sys, Reg::A, 0x42);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x01FD], 0x42);
    assert_eq!(reg(&sys, Reg::S), 0x01FC);
    assert_eq!(reg(&sys, Reg::Cycle), 3);

    set(&mut sys, Reg::A, 0x00);
    sys.mem[0xC001] = 0x68; // PLA
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x42);
    assert_eq!(reg(&sys, Reg::S), 0x01FD);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
}

#[test]
fn pha_16bit_pushes_high_then_low() {
    let mut sys = with_program(&[0x48]);
    native_mode(&mut sys, 0, 1);
    set(&mut sys, Reg::A, 0x34);
    set(&mut sys, Reg::B, 0x12);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x01FD], 0x12);
    assert_eq!(sys.mem[0x01FC], 0x34);
    assert_eq!(reg(&sys, Reg::S), 0x01FB);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn plx_respects_index_width() {
    let mut sys = with_program(&[0xFA]);
    set(&mut sys, Reg::S, 0x01FC);
    set(&mut sys, Reg::X, 0xAB00);
    sys.mem[0x01FD] = 0x42;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::X), 0xAB42);
    assert_eq!(reg(&sys, Reg::S), 0x01FD);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn phd_pld_are_always_16_bit() {
    let mut sys = with_program(&[0x0B]);
    set(&mut sys, Reg::D, 0x1234);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x01FD], 0x12);
    assert_eq!(sys.mem[0x01FC], 0x34);
    assert_eq!(reg(&sys, Reg::Cycle), 4);

    set(&mut sys, Reg::D, 0);
    sys.mem[0xC001] = 0x2B; // PLD
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::D), 0x1234);
    assert_eq!(reg(&sys, Reg::Cycle), 9);
}

#[test]
fn phk_phb_plb() {
    let mut sys = with_program(&[0x4B]);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x01FD], 0x00); // PBR of the test block

    let mut sys = with_program(&[0x8B]);
    set(&mut sys, Reg::Dbr, 0x7E);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x01FD], 0x7E);

    let mut sys = with_program(&[0xAB]);
    set(&mut sys, Reg::S, 0x01FC);
    sys.mem[0x01FD] = 0x80;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Dbr), 0x80);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
}

// ── Jumps, calls, returns ───────────────────────────────────────────────

#[test]
fn jmp_absolute_ends_the_block() {
    let mut sys = with_program(&[0x4C, 0x00, 0xC2]);
    assert!(run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC200);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

#[test]
fn jmp_absolute_long_sets_the_bank() {
    let mut sys = with_program(&[0x5C, 0x00, 0xC2, 0x00]);
    assert!(run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC200);
    assert_eq!(reg(&sys, Reg::Pbr), 0x00);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn jmp_indirect_reads_the_pointer_from_bank_zero() {
    let mut sys = with_program(&[0x6C, 0x00, 0x03]);
    sys.mem[0x0300] = 0x00;
    sys.mem[0x0301] = 0xC2;
    assert!(run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC200);
    assert_eq!(reg(&sys, Reg::Cycle), 5);
}

#[test]
fn jsr_pushes_the_return_address() {
    let mut sys = with_program(&[0x20, 0x00, 0xC2]);
    assert!(run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC200);
    assert_eq!(reg(&sys, Reg::S), 0x01FB);
    assert_eq!(sys.mem[0x01FD], 0xC0);
    assert_eq!(sys.mem[0x01FC], 0x02);
    assert_eq!(reg(&sys, Reg::Cycle), 6);
}

#[test]
fn rts_resumes_after_the_call() {
    let mut sys = with_program(&[0x60]);
    set(&mut sys, Reg::S, 0x01FB);
    sys.mem[0x01FC] = 0x02;
    sys.mem[0x01FD] = 0xC0;
    assert!(run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC003);
    assert_eq!(reg(&sys, Reg::S), 0x01FD);
    assert_eq!(reg(&sys, Reg::Cycle), 6);
}

#[test]
fn rti_emulation_pulls_three_bytes() {
    let mut sys = with_program(&[0x40]);
    set(&mut sys, Reg::S, 0x01FA);
    sys.mem[0x01FB] = 0b0000_0001; // P: carry set
    sys.mem[0x01FC] = 0x00;
    sys.mem[0x01FD] = 0xC2;
    assert!(run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC200);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::S), 0x01FD);
    assert_eq!(reg(&sys, Reg::Cycle), 6);
}

#[test]
fn rti_native_also_pulls_the_bank() {
    let mut sys = with_program(&[0x40]);
    native_mode(&mut sys, 1, 1);
    set(&mut sys, Reg::S, 0x01F9);
    sys.mem[0x01FA] = 0x00; // P
    sys.mem[0x01FB] = 0x00;
    sys.mem[0x01FC] = 0xC2;
    sys.mem[0x01FD] = 0x00; // PBR (bank 0: single-bank memory model)
    assert!(run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC200);
    assert_eq!(reg(&sys, Reg::Pbr), 0x00);
    assert_eq!(reg(&sys, Reg::S), 0x01FD);
    assert_eq!(reg(&sys, Reg::Cycle), 7);
}

// ── Branches ────────────────────────────────────────────────────────────

#[test]
fn beq_taken_without_page_cross() {
    let mut sys = with_program(&[]);
    sys.mem[0xC010] = 0xF0;
    sys.mem[0xC011] = 0x02;
    set(&mut sys, Reg::Pc, 0xC010);
    set(&mut sys, Reg::FlagZ, 1);
    assert!(run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC014);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

#[test]
fn beq_not_taken_still_ends_the_block() {
    let mut sys = with_program(&[0xF0, 0x02]);
    set(&mut sys, Reg::FlagZ, 0);
    assert!(run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC002);
    assert_eq!(reg(&sys, Reg::Cycle), 2);
}

#[test]
fn branch_page_cross_costs_extra_under_e() {
    let mut sys = with_program(&[]);
    sys.mem[0xC0F0] = 0xD0; // BNE
    sys.mem[0xC0F1] = 0x20;
    set(&mut sys, Reg::Pc, 0xC0F0);
    set(&mut sys, Reg::FlagZ, 0);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Pc), 0xC112);
    assert_eq!(reg(&sys, Reg::Cycle), 4);

    // Same branch in native mode: no page-cross cycle.
    let mut sys = with_program(&[]);
    sys.mem[0xC0F0] = 0xD0;
    sys.mem[0xC0F1] = 0x20;
    native_mode(&mut sys, 1, 1);
    set(&mut sys, Reg::Pc, 0xC0F0);
    set(&mut sys, Reg::FlagZ, 0);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Pc), 0xC112);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

#[test]
fn branch_backwards_sign_extends() {
    let mut sys = with_program(&[0x80, 0xFE]); // BRA $-2: jump to itself
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Pc), 0xC000);
    assert_eq!(reg(&sys, Reg::Cycle), 3);
}

// ── Remaining family corners ────────────────────────────────────────────

#[test]
fn and_eor_absolute_forms() {
    let mut sys = with_program(&[0x2D, 0x00, 0x20]);
    sys.mem[0x2000] = 0x0F;
    set(&mut sys, Reg::A, 0xFF);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x0F);
    assert_eq!(reg(&sys, Reg::Cycle), 4);

    let mut sys = with_program(&[0x4D, 0x00, 0x20]);
    sys.mem[0x2000] = 0xFF;
    set(&mut sys, Reg::A, 0xF0);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0x0F);
}

#[test]
fn sbc_16bit_borrows_across_halves() {
    // 0x0100 - 0x0001 with carry set: 0x00FF.
    let mut sys = with_program(&[0xE9, 0x01, 0x00]);
    native_mode(&mut sys, 0, 1);
    set(&mut sys, Reg::A, 0x00);
    set(&mut sys, Reg::B, 0x01);
    set(&mut sys, Reg::FlagC, 1);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::A), 0xFF);
    assert_eq!(reg(&sys, Reg::B), 0x00);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
}

#[test]
fn sty_direct_and_cpy_absolute() {
    let mut sys = with_program(&[0x84, 0x22]);
    set(&mut sys, Reg::Y, 0x7711);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x0022], 0x11);

    let mut sys = with_program(&[0xCC, 0x00, 0x20]);
    sys.mem[0x2000] = 0x31;
    set(&mut sys, Reg::Y, 0x30);
    run_one(&mut sys);
    // Y < memory operand: borrow, negative result.
    assert_eq!(reg(&sys, Reg::FlagC), 0);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn ldy_direct_x_uses_the_x_index() {
    let mut sys = with_program(&[0xB4, 0x10]);
    set(&mut sys, Reg::X, 0x02);
    sys.mem[0x0012] = 0x44;
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Y), 0x44);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn ror_memory_form() {
    let mut sys = with_program(&[0x6E, 0x00, 0x20]);
    sys.mem[0x2000] = 0x03;
    set(&mut sys, Reg::FlagC, 0);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x2000], 0x01);
    assert_eq!(reg(&sys, Reg::FlagC), 1);
    assert_eq!(reg(&sys, Reg::Cycle), 6);
}

#[test]
fn inc_absolute_16bit_pays_the_wide_cycles() {
    let mut sys = with_program(&[0xEE, 0x00, 0x20]);
    native_mode(&mut sys, 0, 1);
    sys.mem[0x2000] = 0xFF;
    sys.mem[0x2001] = 0x00;
    run_one(&mut sys);
    assert_eq!(&sys.mem[0x2000..0x2002], &[0x00, 0x01]);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
    assert_eq!(reg(&sys, Reg::Cycle), 8);
}

#[test]
fn phy_ply_round_trip_in_wide_index_mode() {
    let mut sys = with_program(&[0x5A]);
    native_mode(&mut sys, 1, 0);
    set(&mut sys, Reg::Y, 0x1234);
    run_one(&mut sys);
    assert_eq!(sys.mem[0x01FD], 0x12);
    assert_eq!(sys.mem[0x01FC], 0x34);
    assert_eq!(reg(&sys, Reg::S), 0x01FB);
    assert_eq!(reg(&sys, Reg::Cycle), 4);

    set(&mut sys, Reg::Y, 0);
    sys.mem[0xC001] = 0x7A; // PLY
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Y), 0x1234);
    assert_eq!(reg(&sys, Reg::S), 0x01FD);
    assert_eq!(reg(&sys, Reg::Cycle), 9);
}

#[test]
fn txy_and_tyx_move_whole_registers_in_wide_mode() {
    let mut sys = with_program(&[0x9B]);
    native_mode(&mut sys, 1, 0);
    set(&mut sys, Reg::X, 0x8001);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::Y), 0x8001);
    assert_eq!(reg(&sys, Reg::FlagN), 1);

    let mut sys = with_program(&[0xBB]);
    native_mode(&mut sys, 1, 0);
    set(&mut sys, Reg::Y, 0x0000);
    set(&mut sys, Reg::X, 0x1234);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::X), 0x0000);
    assert_eq!(reg(&sys, Reg::FlagZ), 1);
}

#[test]
fn bit_absolute_x_reads_through_the_index() {
    let mut sys = with_program(&[0x3C, 0x00, 0x20]);
    set(&mut sys, Reg::X, 0x04);
    sys.mem[0x2004] = 0x80;
    set(&mut sys, Reg::A, 0x80);
    run_one(&mut sys);
    assert_eq!(reg(&sys, Reg::FlagN), 1);
    assert_eq!(reg(&sys, Reg::FlagV), 0);
    assert_eq!(reg(&sys, Reg::FlagZ), 0);
}

#[test]
fn stz_direct_x_is_store_timed() {
    let mut sys = with_program(&[0x74, 0x10]);
    set(&mut sys, Reg::X, 0x01);
    sys.mem[0x0011] = 0x55;
    run_one(&mut sys);
    assert_eq!(sys.mem[0x0011], 0x00);
    assert_eq!(reg(&sys, Reg::Cycle), 4);
}

#[test]
fn nop_takes_two_cycles() {
    let mut sys = with_program(&[0xEA]);
    assert!(!run_one(&mut sys));
    assert_eq!(reg(&sys, Reg::Pc), 0xC001);
    assert_eq!(reg(&sys, Reg::Cycle), 2);
}
