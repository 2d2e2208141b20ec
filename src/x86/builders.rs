// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction encoders.
//!
//! Mnemonics map to a closed set of builder shapes through a static table.
//! Two-operand ALU opcodes pack as `base << 2 | direction << 1 | word`; the
//! direction bit says whether the register field is the destination.

use crate::assembler::symbols::Symbol;
use crate::assembler::Assembler;
use crate::core::error::{AsmError, AsmErrorKind};

use super::encoding::OperandSize;
use super::operand::{Operand, SymbolRefKind};
use super::registers::Register;

#[derive(Debug, Clone, Copy)]
pub enum Builder {
    /// Fixed byte sequence, no operands.
    Simple(&'static [u8]),
    /// `opcode|w` with a ModRM extension field, one r/m operand.
    Unary { opcode: u8, ext: u8 },
    /// `0F <cond>` with /0, one byte-sized r/m operand.
    SetCond(u8),
    /// Two-operand ALU family; `ext` selects the immediate form's ModRM
    /// extension and `base` the register form's packed opcode.
    Binary { base: u8, ext: u8 },
    Mov,
    Xchg,
    Test,
    Lea,
    /// `movsx`/`movzx`: `0F (base<<2|2|w)` where w comes from the source.
    MovExtend { base: u8 },
    Imul,
    /// Shift/rotate group: `ext` is the ModRM extension.
    Shift(u8),
    Push,
    Pop,
    Int,
    Enter,
    Ret,
    Call,
    Jump,
    /// Conditional jump; the payload is the short-form opcode `0x70|cc`.
    JumpCond(u8),
}

pub struct Entry {
    pub mnemonic: &'static str,
    pub builder: Builder,
}

macro_rules! entry {
    ($mnemonic:literal, $builder:expr) => {
        Entry {
            mnemonic: $mnemonic,
            builder: $builder,
        }
    };
}

pub static INSTRUCTION_TABLE: &[Entry] = &[
    entry!("nop", Builder::Simple(&[0x90])),
    entry!("pause", Builder::Simple(&[0xf3, 0x90])),
    entry!("hlt", Builder::Simple(&[0xf4])),
    entry!("clc", Builder::Simple(&[0xf8])),
    entry!("cld", Builder::Simple(&[0xfc])),
    entry!("cli", Builder::Simple(&[0xfa])),
    entry!("cmc", Builder::Simple(&[0xf5])),
    entry!("clts", Builder::Simple(&[0x0f, 0x06])),
    entry!("stc", Builder::Simple(&[0xf9])),
    entry!("std", Builder::Simple(&[0xfd])),
    entry!("sti", Builder::Simple(&[0xfb])),
    entry!("sahf", Builder::Simple(&[0x9e])),
    entry!("lahf", Builder::Simple(&[0x9f])),
    entry!("lock", Builder::Simple(&[0xf0])),
    entry!("iret", Builder::Simple(&[0xcf])),
    entry!("iretd", Builder::Simple(&[0xcf])),
    entry!("leave", Builder::Simple(&[0xc9])),
    entry!("pusha", Builder::Simple(&[0x60])),
    entry!("popa", Builder::Simple(&[0x61])),
    entry!("not", Builder::Unary { opcode: 0xf6, ext: 2 }),
    entry!("neg", Builder::Unary { opcode: 0xf6, ext: 3 }),
    entry!("mul", Builder::Unary { opcode: 0xf6, ext: 4 }),
    entry!("div", Builder::Unary { opcode: 0xf6, ext: 6 }),
    entry!("idiv", Builder::Unary { opcode: 0xf6, ext: 7 }),
    entry!("inc", Builder::Unary { opcode: 0xfe, ext: 0 }),
    entry!("dec", Builder::Unary { opcode: 0xfe, ext: 1 }),
    entry!("add", Builder::Binary { base: 0x00, ext: 0 }),
    entry!("or", Builder::Binary { base: 0x02, ext: 1 }),
    entry!("adc", Builder::Binary { base: 0x04, ext: 2 }),
    entry!("sbb", Builder::Binary { base: 0x06, ext: 3 }),
    entry!("and", Builder::Binary { base: 0x08, ext: 4 }),
    entry!("sub", Builder::Binary { base: 0x0a, ext: 5 }),
    entry!("xor", Builder::Binary { base: 0x0c, ext: 6 }),
    entry!("cmp", Builder::Binary { base: 0x0e, ext: 7 }),
    entry!("mov", Builder::Mov),
    entry!("xchg", Builder::Xchg),
    entry!("test", Builder::Test),
    entry!("lea", Builder::Lea),
    entry!("movsx", Builder::MovExtend { base: 0x2f }),
    entry!("movzx", Builder::MovExtend { base: 0x2d }),
    entry!("imul", Builder::Imul),
    entry!("shl", Builder::Shift(4)),
    entry!("sal", Builder::Shift(4)),
    entry!("shr", Builder::Shift(5)),
    entry!("sar", Builder::Shift(7)),
    entry!("push", Builder::Push),
    entry!("pop", Builder::Pop),
    entry!("int", Builder::Int),
    entry!("enter", Builder::Enter),
    entry!("ret", Builder::Ret),
    entry!("call", Builder::Call),
    entry!("jmp", Builder::Jump),
    entry!("jo", Builder::JumpCond(0x70)),
    entry!("jno", Builder::JumpCond(0x71)),
    entry!("jb", Builder::JumpCond(0x72)),
    entry!("jc", Builder::JumpCond(0x72)),
    entry!("jnae", Builder::JumpCond(0x72)),
    entry!("jae", Builder::JumpCond(0x73)),
    entry!("jnb", Builder::JumpCond(0x73)),
    entry!("jnc", Builder::JumpCond(0x73)),
    entry!("je", Builder::JumpCond(0x74)),
    entry!("jz", Builder::JumpCond(0x74)),
    entry!("jne", Builder::JumpCond(0x75)),
    entry!("jnz", Builder::JumpCond(0x75)),
    entry!("jbe", Builder::JumpCond(0x76)),
    entry!("jna", Builder::JumpCond(0x76)),
    entry!("ja", Builder::JumpCond(0x77)),
    entry!("jnbe", Builder::JumpCond(0x77)),
    entry!("js", Builder::JumpCond(0x78)),
    entry!("jns", Builder::JumpCond(0x79)),
    entry!("jp", Builder::JumpCond(0x7a)),
    entry!("jpe", Builder::JumpCond(0x7a)),
    entry!("jnp", Builder::JumpCond(0x7b)),
    entry!("jpo", Builder::JumpCond(0x7b)),
    entry!("jl", Builder::JumpCond(0x7c)),
    entry!("jnge", Builder::JumpCond(0x7c)),
    entry!("jge", Builder::JumpCond(0x7d)),
    entry!("jnl", Builder::JumpCond(0x7d)),
    entry!("jle", Builder::JumpCond(0x7e)),
    entry!("jng", Builder::JumpCond(0x7e)),
    entry!("jg", Builder::JumpCond(0x7f)),
    entry!("jnle", Builder::JumpCond(0x7f)),
    entry!("seto", Builder::SetCond(0x90)),
    entry!("setno", Builder::SetCond(0x91)),
    entry!("setb", Builder::SetCond(0x92)),
    entry!("setc", Builder::SetCond(0x92)),
    entry!("setnae", Builder::SetCond(0x92)),
    entry!("setae", Builder::SetCond(0x93)),
    entry!("setnb", Builder::SetCond(0x93)),
    entry!("setnc", Builder::SetCond(0x93)),
    entry!("sete", Builder::SetCond(0x94)),
    entry!("setz", Builder::SetCond(0x94)),
    entry!("setne", Builder::SetCond(0x95)),
    entry!("setnz", Builder::SetCond(0x95)),
    entry!("setbe", Builder::SetCond(0x96)),
    entry!("setna", Builder::SetCond(0x96)),
    entry!("seta", Builder::SetCond(0x97)),
    entry!("setnbe", Builder::SetCond(0x97)),
    entry!("sets", Builder::SetCond(0x98)),
    entry!("setns", Builder::SetCond(0x99)),
    entry!("setp", Builder::SetCond(0x9a)),
    entry!("setpe", Builder::SetCond(0x9a)),
    entry!("setnp", Builder::SetCond(0x9b)),
    entry!("setpo", Builder::SetCond(0x9b)),
    entry!("setl", Builder::SetCond(0x9c)),
    entry!("setnge", Builder::SetCond(0x9c)),
    entry!("setge", Builder::SetCond(0x9d)),
    entry!("setnl", Builder::SetCond(0x9d)),
    entry!("setle", Builder::SetCond(0x9e)),
    entry!("setng", Builder::SetCond(0x9e)),
    entry!("setg", Builder::SetCond(0x9f)),
    entry!("setnle", Builder::SetCond(0x9f)),
];

pub fn lookup(mnemonic: &str) -> Option<&'static Entry> {
    INSTRUCTION_TABLE
        .iter()
        .find(|entry| entry.mnemonic == mnemonic)
}

/// Encode one instruction into the assembler's output buffer.
pub fn encode(mnemonic: &str, args: &[Operand], asm: &mut Assembler) -> Result<(), AsmError> {
    let entry = lookup(mnemonic).ok_or_else(|| {
        AsmError::new(
            AsmErrorKind::Instruction,
            format!("Unknown instruction '{mnemonic}'."),
        )
    })?;
    for arg in args {
        if let Operand::Register(reg) = arg {
            if reg.is_segment {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Segment register '{}' cannot be used with '{mnemonic}'.", reg.name),
                ));
            }
        }
    }
    match entry.builder {
        Builder::Simple(bytes) => {
            expect_arity(mnemonic, args, 0)?;
            asm.write(bytes);
            Ok(())
        }
        Builder::Unary { opcode, ext } => {
            expect_arity(mnemonic, args, 1)?;
            build_unary(asm, mnemonic, opcode, ext, &args[0])
        }
        Builder::SetCond(cond) => {
            expect_arity(mnemonic, args, 1)?;
            build_set_cond(asm, mnemonic, cond, &args[0])
        }
        Builder::Binary { base, ext } => {
            expect_arity(mnemonic, args, 2)?;
            if args[1].is_immediate() {
                build_binary_immediate(asm, mnemonic, ext, &args[0], &args[1])
            } else {
                build_binary_register(asm, mnemonic, base, &args[0], &args[1])
            }
        }
        Builder::Mov => {
            expect_arity(mnemonic, args, 2)?;
            build_mov(asm, mnemonic, &args[0], &args[1])
        }
        Builder::Xchg => {
            expect_arity(mnemonic, args, 2)?;
            build_undirected(asm, mnemonic, 0x86, &args[0], &args[1])
        }
        Builder::Test => {
            expect_arity(mnemonic, args, 2)?;
            build_test(asm, mnemonic, &args[0], &args[1])
        }
        Builder::Lea => {
            expect_arity(mnemonic, args, 2)?;
            build_lea(asm, mnemonic, &args[0], &args[1])
        }
        Builder::MovExtend { base } => {
            expect_arity(mnemonic, args, 2)?;
            build_mov_extend(asm, mnemonic, base, &args[0], &args[1])
        }
        Builder::Imul => build_imul(asm, mnemonic, args),
        Builder::Shift(ext) => {
            expect_arity(mnemonic, args, 2)?;
            build_shift(asm, mnemonic, ext, &args[0], &args[1])
        }
        Builder::Push => {
            expect_arity(mnemonic, args, 1)?;
            build_push(asm, mnemonic, &args[0])
        }
        Builder::Pop => {
            expect_arity(mnemonic, args, 1)?;
            build_pop(asm, mnemonic, &args[0])
        }
        Builder::Int => {
            expect_arity(mnemonic, args, 1)?;
            build_int(asm, mnemonic, &args[0])
        }
        Builder::Enter => build_enter(asm, mnemonic, args),
        Builder::Ret => build_ret(asm, mnemonic, args),
        Builder::Call => {
            expect_arity(mnemonic, args, 1)?;
            build_call(asm, mnemonic, &args[0])
        }
        Builder::Jump => {
            expect_arity(mnemonic, args, 1)?;
            build_jump(asm, mnemonic, &args[0])
        }
        Builder::JumpCond(short_opcode) => {
            expect_arity(mnemonic, args, 1)?;
            build_jump_cond(asm, mnemonic, short_opcode, &args[0])
        }
    }
}

fn expect_arity(mnemonic: &str, args: &[Operand], want: usize) -> Result<(), AsmError> {
    if args.len() != want {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!(
                "Instruction '{mnemonic}' expects {want} operand(s), got {}.",
                args.len()
            ),
        ));
    }
    Ok(())
}

fn word_bit(operand: &Operand) -> u8 {
    (operand.size() > OperandSize::Size8) as u8
}

fn is_memory(operand: &Operand) -> bool {
    matches!(operand, Operand::Memory { .. } | Operand::Sib { .. })
}

/// Write the ModRM byte plus any SIB/displacement trailer for `rm`.
fn write_modrm(asm: &mut Assembler, reg: u8, rm: &Operand) -> Result<(), AsmError> {
    let mode = rm.addressing_mode()? as u8;
    asm.write(&[(mode << 6) | (reg << 3) | rm.rm_index()?]);
    asm.write_operand(rm)
}

fn check_fits(mnemonic: &str, imm: &Operand, size: OperandSize) -> Result<(), AsmError> {
    let Operand::Immediate { value, .. } = imm else {
        // Symbolic immediates are dword-sized; only a byte/word target can
        // reject them, handled by the size comparison below.
        if imm.size() > size {
            return Err(AsmError::new(
                AsmErrorKind::Instruction,
                format!("Immediate operand of '{mnemonic}' does not fit the destination."),
            ));
        }
        return Ok(());
    };
    let ok = match size {
        OperandSize::Size0 => *value == 0,
        OperandSize::Size8 => (-128..=255).contains(value),
        OperandSize::Size16 => (-32768..=65535).contains(value),
        OperandSize::Size32 => (-(1i64 << 31)..(1i64 << 32)).contains(value),
    };
    if !ok {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Immediate operand of '{mnemonic}' does not fit the destination."),
        ));
    }
    Ok(())
}

fn fits_i8(operand: &Operand) -> bool {
    matches!(operand, Operand::Immediate { value, .. } if (-128..=127).contains(value))
}

fn build_unary(
    asm: &mut Assembler,
    mnemonic: &str,
    opcode: u8,
    ext: u8,
    arg: &Operand,
) -> Result<(), AsmError> {
    if arg.is_immediate() {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' cannot take an immediate operand."),
        ));
    }
    asm.write(&[opcode | word_bit(arg)]);
    write_modrm(asm, ext, arg)
}

fn build_set_cond(
    asm: &mut Assembler,
    mnemonic: &str,
    cond: u8,
    arg: &Operand,
) -> Result<(), AsmError> {
    if arg.is_immediate() {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' cannot take an immediate operand."),
        ));
    }
    // Memory that was never size-cast counts as byte here.
    let declared = match arg {
        Operand::Memory { size, .. } | Operand::Sib { size, .. } => *size,
        _ => arg.size(),
    };
    if declared > OperandSize::Size8 {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a byte operand."),
        ));
    }
    asm.write(&[0x0f, cond]);
    write_modrm(asm, 0, arg)
}

/// Immediate form of the ALU family: `0x80|s<<1|w /ext`. A sign-extendable
/// byte against a word destination takes the short form.
fn build_binary_immediate(
    asm: &mut Assembler,
    mnemonic: &str,
    ext: u8,
    dest: &Operand,
    imm: &Operand,
) -> Result<(), AsmError> {
    if dest.is_immediate() {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a register or memory destination."),
        ));
    }
    let w = word_bit(dest);
    let dest_size = dest.size();
    if dest_size == OperandSize::Size8 {
        check_fits(mnemonic, imm, OperandSize::Size8)?;
        asm.write(&[0x80]);
        write_modrm(asm, ext, dest)?;
        asm.write_value(&imm.cast(OperandSize::Size8))
    } else if fits_i8(imm) {
        asm.write(&[0x80 | 2 | w]);
        write_modrm(asm, ext, dest)?;
        asm.write_value(&imm.cast(OperandSize::Size8))
    } else {
        check_fits(mnemonic, imm, dest_size)?;
        asm.write(&[0x80 | w]);
        write_modrm(asm, ext, dest)?;
        asm.write_value(&imm.cast(dest_size))
    }
}

/// Register form of the ALU family. With two plain registers the
/// destination sits in r/m, so `op a, b` encodes with direction 0.
fn build_binary_register(
    asm: &mut Assembler,
    mnemonic: &str,
    base: u8,
    dest: &Operand,
    src: &Operand,
) -> Result<(), AsmError> {
    let (reg, rm, dir): (&'static Register, &Operand, u8) = match (dest, src) {
        (Operand::Register(d), Operand::Register(s)) => {
            if d.size != s.size {
                return Err(size_mismatch(mnemonic));
            }
            (s, dest, 0)
        }
        (Operand::Register(d), _) if is_memory(src) => (d, src, 2),
        (_, Operand::Register(s)) if is_memory(dest) => (s, dest, 0),
        _ => {
            return Err(AsmError::new(
                AsmErrorKind::Instruction,
                format!("Instruction '{mnemonic}' needs at least one register operand."),
            ))
        }
    };
    let w = (reg.size > OperandSize::Size8) as u8;
    asm.write(&[(base << 2) | dir | w]);
    write_modrm(asm, reg.index, rm)
}

fn size_mismatch(mnemonic: &str) -> AsmError {
    AsmError::new(
        AsmErrorKind::Instruction,
        format!("Operand size mismatch for '{mnemonic}'."),
    )
}

fn build_mov(
    asm: &mut Assembler,
    mnemonic: &str,
    dest: &Operand,
    src: &Operand,
) -> Result<(), AsmError> {
    if !src.is_immediate() {
        return build_binary_register(asm, mnemonic, 0x22, dest, src);
    }
    match dest {
        Operand::Register(reg) => {
            check_fits(mnemonic, src, reg.size)?;
            let w = (reg.size > OperandSize::Size8) as u8;
            asm.write(&[0xb0 | (w << 3) | reg.index]);
            asm.write_value(&src.cast(reg.size))
        }
        _ if is_memory(dest) => {
            check_fits(mnemonic, src, dest.size())?;
            asm.write(&[0xc6 | word_bit(dest)]);
            write_modrm(asm, 0, dest)?;
            asm.write_value(&src.cast(dest.size()))
        }
        _ => Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a register or memory destination."),
        )),
    }
}

/// `xchg`-style encoding: no direction bit, one register plus one r/m.
fn build_undirected(
    asm: &mut Assembler,
    mnemonic: &str,
    opcode: u8,
    a: &Operand,
    b: &Operand,
) -> Result<(), AsmError> {
    let (reg, rm) = undirected_pair(mnemonic, a, b)?;
    let w = (reg.size > OperandSize::Size8) as u8;
    asm.write(&[opcode | w]);
    write_modrm(asm, reg.index, rm)
}

fn undirected_pair<'a>(
    mnemonic: &str,
    a: &'a Operand,
    b: &'a Operand,
) -> Result<(&'static Register, &'a Operand), AsmError> {
    match (a, b) {
        (Operand::Register(x), Operand::Register(y)) => {
            if x.size != y.size {
                return Err(size_mismatch(mnemonic));
            }
            Ok((x, b))
        }
        (Operand::Register(reg), _) if is_memory(b) => Ok((reg, b)),
        (_, Operand::Register(reg)) if is_memory(a) => Ok((reg, a)),
        _ => Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a register and an r/m operand."),
        )),
    }
}

fn build_test(
    asm: &mut Assembler,
    mnemonic: &str,
    dest: &Operand,
    src: &Operand,
) -> Result<(), AsmError> {
    if !src.is_immediate() {
        return build_undirected(asm, mnemonic, 0x84, dest, src);
    }
    if dest.is_immediate() {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a register or memory destination."),
        ));
    }
    check_fits(mnemonic, src, dest.size())?;
    let w = word_bit(dest);
    // The accumulator gets the compact form without a ModRM byte.
    if matches!(dest, Operand::Register(reg) if reg.index == 0) {
        asm.write(&[0xa8 | w]);
    } else {
        asm.write(&[0xf6 | w]);
        write_modrm(asm, 0, dest)?;
    }
    asm.write_value(&src.cast(dest.size()))
}

fn build_lea(
    asm: &mut Assembler,
    mnemonic: &str,
    dest: &Operand,
    src: &Operand,
) -> Result<(), AsmError> {
    let Operand::Register(reg) = dest else {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a register destination."),
        ));
    };
    if !is_memory(src) {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a memory source."),
        ));
    }
    asm.write(&[0x8d]);
    write_modrm(asm, reg.index, src)
}

fn build_mov_extend(
    asm: &mut Assembler,
    mnemonic: &str,
    base: u8,
    dest: &Operand,
    src: &Operand,
) -> Result<(), AsmError> {
    let Operand::Register(reg) = dest else {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a register destination."),
        ));
    };
    if src.is_immediate() || !(matches!(src, Operand::Register(_)) || is_memory(src)) {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a register or memory source."),
        ));
    }
    // The source decides the w bit; it must be strictly narrower than the
    // destination. Memory sources default to dword, so they need a cast.
    let src_size = src.size();
    if is_memory(src) && src_size >= reg.size {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs an explicit size on a memory source."),
        ));
    }
    if src_size >= reg.size {
        return Err(size_mismatch(mnemonic));
    }
    let w = (src_size > OperandSize::Size8) as u8;
    asm.write(&[0x0f, (base << 2) | 2 | w]);
    write_modrm(asm, reg.index, src)
}

fn build_imul(asm: &mut Assembler, mnemonic: &str, args: &[Operand]) -> Result<(), AsmError> {
    match args {
        [arg] => build_unary(asm, mnemonic, 0xf6, 5, arg),
        [dest, src] if !src.is_immediate() => {
            let Operand::Register(reg) = dest else {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs a register destination."),
                ));
            };
            if reg.size == OperandSize::Size8 {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs a word-sized destination."),
                ));
            }
            if matches!(src, Operand::Register(s) if s.size != reg.size) {
                return Err(size_mismatch(mnemonic));
            }
            asm.write(&[0x0f, 0xaf]);
            write_modrm(asm, reg.index, src)
        }
        // `imul r, imm` is shorthand for `imul r, r, imm`.
        [dest, imm] => {
            let args = [dest.clone(), dest.clone(), imm.clone()];
            build_imul(asm, mnemonic, &args)
        }
        [dest, src, imm] => {
            let Operand::Register(reg) = dest else {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs a register destination."),
                ));
            };
            if reg.size == OperandSize::Size8 {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs a word-sized destination."),
                ));
            }
            if !imm.is_immediate() {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs an immediate last operand."),
                ));
            }
            if !(matches!(src, Operand::Register(_)) || is_memory(src)) {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs a register or memory source."),
                ));
            }
            let w = 1;
            if fits_i8(imm) {
                asm.write(&[0x68 | 2 | w]);
                write_modrm(asm, reg.index, src)?;
                asm.write_value(&imm.cast(OperandSize::Size8))
            } else {
                check_fits(mnemonic, imm, reg.size)?;
                asm.write(&[0x68 | w]);
                write_modrm(asm, reg.index, src)?;
                asm.write_value(&imm.cast(reg.size))
            }
        }
        _ => Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!(
                "Instruction '{mnemonic}' expects 1 to 3 operand(s), got {}.",
                args.len()
            ),
        )),
    }
}

fn build_shift(
    asm: &mut Assembler,
    mnemonic: &str,
    ext: u8,
    dest: &Operand,
    count: &Operand,
) -> Result<(), AsmError> {
    if dest.is_immediate() {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a register or memory destination."),
        ));
    }
    let w = word_bit(dest);
    match count {
        Operand::Register(reg) if reg.name == "cl" => {
            asm.write(&[0xd2 | w]);
            write_modrm(asm, ext, dest)
        }
        Operand::Immediate { value, .. } => {
            let amount = (value & 31) as u8;
            if amount == 1 {
                asm.write(&[0xd0 | w]);
                write_modrm(asm, ext, dest)
            } else {
                asm.write(&[0xc0 | w]);
                write_modrm(asm, ext, dest)?;
                asm.write(&[amount]);
                Ok(())
            }
        }
        _ => Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Shift count for '{mnemonic}' must be a constant or 'cl'."),
        )),
    }
}

fn build_push(asm: &mut Assembler, mnemonic: &str, arg: &Operand) -> Result<(), AsmError> {
    match arg {
        Operand::Register(reg) => {
            if reg.size == OperandSize::Size8 {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs a word-sized register."),
                ));
            }
            asm.write(&[0x50 + reg.index]);
            Ok(())
        }
        _ if is_memory(arg) => {
            asm.write(&[0xff]);
            write_modrm(asm, 6, arg)
        }
        _ if arg.is_immediate() => {
            if fits_i8(arg) {
                asm.write(&[0x6a]);
                asm.write_value(&arg.cast(OperandSize::Size8))
            } else {
                asm.write(&[0x68]);
                asm.write_value(&arg.cast(OperandSize::Size32))
            }
        }
        _ => Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' cannot encode this operand."),
        )),
    }
}

fn build_pop(asm: &mut Assembler, mnemonic: &str, arg: &Operand) -> Result<(), AsmError> {
    match arg {
        Operand::Register(reg) => {
            if reg.size == OperandSize::Size8 {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs a word-sized register."),
                ));
            }
            asm.write(&[0x58 + reg.index]);
            Ok(())
        }
        _ if is_memory(arg) => {
            asm.write(&[0x8f]);
            write_modrm(asm, 0, arg)
        }
        _ => Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' cannot take an immediate operand."),
        )),
    }
}

fn build_int(asm: &mut Assembler, mnemonic: &str, arg: &Operand) -> Result<(), AsmError> {
    let Operand::Immediate { value, .. } = arg else {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a constant vector."),
        ));
    };
    if !(0..=255).contains(value) {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Interrupt vector for '{mnemonic}' must fit in a byte."),
        ));
    }
    asm.write(&[0xcd, *value as u8]);
    Ok(())
}

fn build_enter(asm: &mut Assembler, mnemonic: &str, args: &[Operand]) -> Result<(), AsmError> {
    let (frame, nesting) = match args {
        [frame] => (frame, 0i64),
        [frame, nesting] => {
            let Operand::Immediate { value, .. } = nesting else {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs constant operands."),
                ));
            };
            (frame, *value)
        }
        _ => {
            return Err(AsmError::new(
                AsmErrorKind::Instruction,
                format!(
                    "Instruction '{mnemonic}' expects 1 or 2 operand(s), got {}.",
                    args.len()
                ),
            ))
        }
    };
    let Operand::Immediate { value: size, .. } = frame else {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs constant operands."),
        ));
    };
    if !(0..=65535).contains(size) || !(0..=255).contains(&nesting) {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Operands of '{mnemonic}' are out of range."),
        ));
    }
    asm.write(&[0xc8]);
    asm.write(&OperandSize::Size16.encode(*size));
    asm.write(&[nesting as u8]);
    Ok(())
}

fn build_ret(asm: &mut Assembler, mnemonic: &str, args: &[Operand]) -> Result<(), AsmError> {
    match args {
        [] => {
            asm.write(&[0xc3]);
            Ok(())
        }
        [arg] => {
            let Operand::Immediate { value, .. } = arg else {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Instruction '{mnemonic}' needs a constant pop count."),
                ));
            };
            if *value == 0 {
                asm.write(&[0xc3]);
                return Ok(());
            }
            if !(0..=65535).contains(value) {
                return Err(AsmError::new(
                    AsmErrorKind::Instruction,
                    format!("Pop count for '{mnemonic}' must fit in a word."),
                ));
            }
            asm.write(&[0xc2]);
            asm.write(&OperandSize::Size16.encode(*value));
            Ok(())
        }
        _ => Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!(
                "Instruction '{mnemonic}' expects 0 or 1 operand(s), got {}.",
                args.len()
            ),
        )),
    }
}

/// Where a control transfer lands.
enum JumpTarget {
    Fixed(i64),
    Symbolic { name: String, external: bool },
}

fn jump_target(asm: &Assembler, mnemonic: &str, arg: &Operand) -> Result<JumpTarget, AsmError> {
    match arg {
        Operand::Immediate { value, .. } => Ok(JumpTarget::Fixed(*value)),
        Operand::Label { name, .. } | Operand::Symbol { name, .. } => match asm.symbol(name) {
            Some(Symbol::Local {
                offset: Some(target),
                ..
            }) => Ok(JumpTarget::Fixed(*target)),
            Some(Symbol::External { .. }) => Ok(JumpTarget::Symbolic {
                name: name.clone(),
                external: true,
            }),
            _ => Ok(JumpTarget::Symbolic {
                name: name.clone(),
                external: false,
            }),
        },
        _ => Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a code target."),
        )),
    }
}

fn check_word_rm(mnemonic: &str, arg: &Operand) -> Result<(), AsmError> {
    if matches!(arg, Operand::Register(reg) if reg.size == OperandSize::Size8) {
        return Err(AsmError::new(
            AsmErrorKind::Instruction,
            format!("Instruction '{mnemonic}' needs a word-sized register."),
        ));
    }
    Ok(())
}

fn build_call(asm: &mut Assembler, mnemonic: &str, arg: &Operand) -> Result<(), AsmError> {
    if matches!(arg, Operand::Register(_)) || is_memory(arg) {
        check_word_rm(mnemonic, arg)?;
        asm.write(&[0xff]);
        return write_modrm(asm, 2, arg);
    }
    let anchor = asm.offset() + 5;
    match jump_target(asm, mnemonic, arg)? {
        JumpTarget::Fixed(target) => {
            asm.write(&[0xe8]);
            asm.write(&OperandSize::Size32.encode(target - anchor));
            Ok(())
        }
        JumpTarget::Symbolic { name, .. } => {
            asm.write(&[0xe8]);
            asm.write_value(&Operand::Symbol {
                name,
                kind: SymbolRefKind::Relative { to: anchor },
                size: OperandSize::Size32,
            })
        }
    }
}

/// Unconditional jump. A target that resolves now picks the exact
/// short/long form; an unseen local reserves the short form and the patch
/// pass reports a range error if the final displacement overflows.
fn build_jump(asm: &mut Assembler, mnemonic: &str, arg: &Operand) -> Result<(), AsmError> {
    if matches!(arg, Operand::Register(_)) || is_memory(arg) {
        check_word_rm(mnemonic, arg)?;
        asm.write(&[0xff]);
        return write_modrm(asm, 4, arg);
    }
    let index = asm.offset();
    match jump_target(asm, mnemonic, arg)? {
        JumpTarget::Fixed(target) => {
            let short = target - (index + 2);
            if (-128..=127).contains(&short) {
                asm.write(&[0xeb, short as u8]);
            } else {
                asm.write(&[0xe9]);
                asm.write(&OperandSize::Size32.encode(target - (index + 5)));
            }
            Ok(())
        }
        JumpTarget::Symbolic {
            name,
            external: true,
        } => {
            asm.write(&[0xe9]);
            asm.write_value(&Operand::Symbol {
                name,
                kind: SymbolRefKind::Relative { to: index + 5 },
                size: OperandSize::Size32,
            })
        }
        JumpTarget::Symbolic { name, .. } => {
            asm.write(&[0xeb]);
            asm.write_value(&Operand::Symbol {
                name,
                kind: SymbolRefKind::Relative { to: index + 2 },
                size: OperandSize::Size8,
            })
        }
    }
}

fn build_jump_cond(
    asm: &mut Assembler,
    mnemonic: &str,
    short_opcode: u8,
    arg: &Operand,
) -> Result<(), AsmError> {
    let index = asm.offset();
    let long_opcode = short_opcode + 0x10;
    match jump_target(asm, mnemonic, arg)? {
        JumpTarget::Fixed(target) => {
            let short = target - (index + 2);
            if (-128..=127).contains(&short) {
                asm.write(&[short_opcode, short as u8]);
            } else {
                asm.write(&[0x0f, long_opcode]);
                asm.write(&OperandSize::Size32.encode(target - (index + 6)));
            }
            Ok(())
        }
        JumpTarget::Symbolic {
            name,
            external: true,
        } => {
            asm.write(&[0x0f, long_opcode]);
            asm.write_value(&Operand::Symbol {
                name,
                kind: SymbolRefKind::Relative { to: index + 6 },
                size: OperandSize::Size32,
            })
        }
        JumpTarget::Symbolic { name, .. } => {
            asm.write(&[short_opcode]);
            asm.write_value(&Operand::Symbol {
                name,
                kind: SymbolRefKind::Relative { to: index + 2 },
                size: OperandSize::Size8,
            })
        }
    }
}
