// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Operand model and expression lowering.
//!
//! Syntax trees are lowered into a closed set of operand variants. Binary
//! nodes over two immediates constant-fold; anything else stays symbolic.
//! Bracketed memory expressions are decomposed into base / scaled-index /
//! displacement form here.

use crate::assembler::Assembler;
use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::parser::{BinaryOp, Expr};

use super::encoding::OperandSize;
use super::registers::{self, Register};

/// ModRM addressing-mode field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Memory = 0,
    MemoryByteOffset = 1,
    MemoryWordOffset = 2,
    Register = 3,
}

/// How a symbol reference is to be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolRefKind {
    /// The symbol's final address (base offset + unit offset).
    Absolute,
    /// Displacement from a fixed anchor offset (the referencing
    /// instruction's end).
    Relative { to: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register(&'static Register),
    Immediate {
        value: i64,
        size: OperandSize,
    },
    /// A name not yet looked up in the symbol table; becomes a `Symbol`
    /// reference the first time it is placed in the output stream.
    Label {
        name: String,
        size: OperandSize,
    },
    Symbol {
        name: String,
        kind: SymbolRefKind,
        size: OperandSize,
    },
    Memory {
        base: &'static Register,
        disp: Box<Operand>,
        size: OperandSize,
    },
    Sib {
        base: &'static Register,
        index: &'static Register,
        shift: u8,
        disp: Box<Operand>,
        size: OperandSize,
    },
    /// Intermediate for address decomposition; never directly encodable.
    Binary {
        left: Box<Operand>,
        op: BinaryOp,
        right: Box<Operand>,
    },
}

impl Operand {
    /// Immediate with the smallest signed size that fits.
    pub fn immediate_signed(value: i64) -> Self {
        Operand::Immediate {
            value,
            size: OperandSize::smallest_signed(value),
        }
    }

    /// Immediate with the smallest unsigned size that fits.
    pub fn immediate_unsigned(value: i64) -> Self {
        Operand::Immediate {
            value,
            size: OperandSize::smallest_unsigned(value),
        }
    }

    /// The elidable zero displacement.
    pub fn zero() -> Self {
        Operand::Immediate {
            value: 0,
            size: OperandSize::Size0,
        }
    }

    pub fn size(&self) -> OperandSize {
        match self {
            Operand::Register(reg) => reg.size,
            Operand::Immediate { size, .. }
            | Operand::Label { size, .. }
            | Operand::Symbol { size, .. } => *size,
            // Memory is dword until cast; Size0 marks "never cast".
            Operand::Memory { size, .. } | Operand::Sib { size, .. } => {
                if *size == OperandSize::Size0 {
                    OperandSize::Size32
                } else {
                    *size
                }
            }
            Operand::Binary { left, right, .. } => left.size().max(right.size()),
        }
    }

    /// True for operands encoded as immediate data: literal values and
    /// symbol/label references.
    pub fn is_immediate(&self) -> bool {
        matches!(
            self,
            Operand::Immediate { .. } | Operand::Label { .. } | Operand::Symbol { .. }
        )
    }

    pub fn is_register(&self) -> bool {
        matches!(self, Operand::Register(_))
    }

    /// A size-cast copy. Registers cannot be re-sized; callers reject the
    /// size mismatch before casting.
    pub fn cast(&self, size: OperandSize) -> Operand {
        match self {
            Operand::Immediate { value, .. } => Operand::Immediate { value: *value, size },
            Operand::Label { name, .. } => Operand::Label {
                name: name.clone(),
                size,
            },
            Operand::Symbol { name, kind, .. } => Operand::Symbol {
                name: name.clone(),
                kind: *kind,
                size,
            },
            Operand::Memory { base, disp, .. } => Operand::Memory {
                base,
                disp: disp.clone(),
                size,
            },
            Operand::Sib {
                base,
                index,
                shift,
                disp,
                ..
            } => Operand::Sib {
                base,
                index,
                shift: *shift,
                disp: disp.clone(),
                size,
            },
            Operand::Binary { left, op, right } => Operand::Binary {
                left: Box::new(left.cast(size)),
                op: *op,
                right: Box::new(right.cast(size)),
            },
            Operand::Register(reg) => Operand::Register(reg),
        }
    }

    /// ModRM addressing-mode field for register/memory operands.
    pub fn addressing_mode(&self) -> Result<AddressingMode, AsmError> {
        match self {
            Operand::Register(_) => Ok(AddressingMode::Register),
            Operand::Memory { base, disp, .. } => {
                // [ebp] has no zero-displacement encoding (its slot means
                // [disp32]); force a one-byte displacement.
                if disp.size() == OperandSize::Size8
                    || (base.index == 5 && disp.size() == OperandSize::Size0)
                {
                    Ok(AddressingMode::MemoryByteOffset)
                } else if disp.size() == OperandSize::Size0 {
                    Ok(AddressingMode::Memory)
                } else {
                    Ok(AddressingMode::MemoryWordOffset)
                }
            }
            Operand::Sib { base, disp, .. } => {
                if disp.size() == OperandSize::Size8
                    || (base.index == 5 && disp.size() == OperandSize::Size0)
                {
                    Ok(AddressingMode::MemoryByteOffset)
                } else if disp.size() == OperandSize::Size0 {
                    Ok(AddressingMode::Memory)
                } else {
                    Ok(AddressingMode::MemoryWordOffset)
                }
            }
            _ => Err(AsmError::new(
                AsmErrorKind::Instruction,
                "Expected a register or memory operand.",
            )),
        }
    }

    /// The 3-bit r/m field index. SIB operands always use the escape
    /// index 4.
    pub fn rm_index(&self) -> Result<u8, AsmError> {
        match self {
            Operand::Register(reg) => Ok(reg.index),
            Operand::Memory { base, .. } => Ok(base.index),
            Operand::Sib { .. } => Ok(4),
            _ => Err(AsmError::new(
                AsmErrorKind::Instruction,
                "Expected a register or memory operand.",
            )),
        }
    }

    /// Whether this operand's bytes can be produced right now.
    pub fn can_resolve(&self, asm: &Assembler) -> bool {
        match self {
            Operand::Immediate { .. } => true,
            Operand::Symbol { name, kind, .. } => match kind {
                SymbolRefKind::Relative { .. } => asm.defined_local_offset(name).is_some(),
                SymbolRefKind::Absolute => {
                    asm.defined_local_offset(name).is_some()
                        && asm.base_offset().is_some()
                        && asm.relocate_absolutes()
                }
            },
            // Labels must be placed (pinned to an offset) first.
            Operand::Label { .. } => false,
            _ => false,
        }
    }

    /// Concrete bytes for a resolvable immediate/symbol operand.
    pub fn encode(&self, asm: &Assembler) -> Result<Vec<u8>, AsmError> {
        match self {
            Operand::Immediate { value, size } => Ok(size.encode(*value)),
            Operand::Symbol { name, kind, size } => {
                let target = asm.defined_local_offset(name).ok_or_else(|| {
                    AsmError::new(
                        AsmErrorKind::Symbol,
                        format!("Symbol '{name}' is not defined."),
                    )
                })?;
                let value = match kind {
                    SymbolRefKind::Relative { to } => {
                        let disp = target - to;
                        if *size == OperandSize::Size8 && !(-128..=127).contains(&disp) {
                            return Err(AsmError::new(
                                AsmErrorKind::Instruction,
                                format!("Relative reference to '{name}' is out of range."),
                            ));
                        }
                        disp
                    }
                    SymbolRefKind::Absolute => {
                        target + asm.base_offset().unwrap_or(0)
                    }
                };
                Ok(size.encode(value))
            }
            _ => Err(AsmError::new(
                AsmErrorKind::Instruction,
                "Operand has no direct byte encoding.",
            )),
        }
    }
}

/// Lower a parsed expression into an operand. Identifiers resolve to
/// registers first, then to label references.
pub fn lower_expr(expr: &Expr) -> Result<Operand, AsmError> {
    match expr {
        Expr::Integer(value, _) => Ok(Operand::immediate_unsigned(*value)),
        Expr::Identifier(name, _) => match registers::lookup(name) {
            Some(reg) => Ok(Operand::Register(reg)),
            None => Ok(Operand::Label {
                name: name.clone(),
                size: OperandSize::Size32,
            }),
        },
        Expr::Paren(inner, _) => lower_expr(inner),
        Expr::Cast { size, expr, .. } => {
            let inner = lower_expr(expr)?;
            if inner.is_register() {
                return Err(AsmError::new(
                    AsmErrorKind::Expression,
                    "A size cast cannot be applied to a register.",
                ));
            }
            Ok(inner.cast(OperandSize::from_keyword(*size)))
        }
        Expr::Binary { op, left, right } => {
            let left = lower_expr(left)?;
            let right = lower_expr(right)?;
            match (&left, &right) {
                (
                    Operand::Immediate { value: l, .. },
                    Operand::Immediate { value: r, .. },
                ) => Ok(Operand::immediate_signed(fold(*op, *l, *r)?)),
                _ => Ok(Operand::Binary {
                    left: Box::new(left),
                    op: *op,
                    right: Box::new(right),
                }),
            }
        }
        Expr::Memory { addr, .. } => {
            let inner = lower_expr(addr)?;
            decompose_memory(&inner)
        }
    }
}

fn fold(op: BinaryOp, l: i64, r: i64) -> Result<i64, AsmError> {
    Ok(match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Div => {
            if r == 0 {
                return Err(AsmError::new(
                    AsmErrorKind::Expression,
                    "Division by zero in constant expression.",
                ));
            }
            l / r
        }
        BinaryOp::Mod => {
            if r == 0 {
                return Err(AsmError::new(
                    AsmErrorKind::Expression,
                    "Modulo by zero in constant expression.",
                ));
            }
            l % r
        }
        BinaryOp::Shl => l.wrapping_shl((r & 0x1f) as u32),
        BinaryOp::Shr => ((l as u64).wrapping_shr((r & 0x1f) as u32)) as i64,
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
    })
}

/// One register term of an address expression: the register plus its scale
/// shift (0 means "base candidate").
struct AddressParts {
    regs: Vec<(&'static Register, u8)>,
    disp: i64,
}

fn bad_memory_operand() -> AsmError {
    AsmError::new(AsmErrorKind::Expression, "Bad memory operand.")
}

fn invalid_scale(value: i64) -> AsmError {
    AsmError::new(
        AsmErrorKind::Expression,
        format!("Invalid scale {value} in memory operand."),
    )
}

/// Decompose a (folded) address expression into Direct- or SIB-memory form.
pub fn decompose_memory(operand: &Operand) -> Result<Operand, AsmError> {
    let mut parts = AddressParts {
        regs: Vec::new(),
        disp: 0,
    };
    collect_address(operand, &mut parts, 1)?;

    let bases: Vec<&'static Register> = parts
        .regs
        .iter()
        .filter(|(_, shift)| *shift == 0)
        .map(|(reg, _)| *reg)
        .collect();
    let indices: Vec<(&'static Register, u8)> = parts
        .regs
        .iter()
        .filter(|(_, shift)| *shift != 0)
        .copied()
        .collect();

    let disp = displacement_operand(parts.disp);
    match (bases.as_slice(), indices.as_slice()) {
        ([base], []) => Ok(Operand::Memory {
            base,
            disp: Box::new(disp),
            size: OperandSize::Size0,
        }),
        ([base, index], []) => Ok(Operand::Sib {
            base,
            index,
            shift: 0,
            disp: Box::new(disp),
            size: OperandSize::Size0,
        }),
        ([base], [(index, shift)]) => Ok(Operand::Sib {
            base,
            index,
            shift: *shift,
            disp: Box::new(disp),
            size: OperandSize::Size0,
        }),
        _ => Err(bad_memory_operand()),
    }
}

fn collect_address(
    operand: &Operand,
    parts: &mut AddressParts,
    sign: i64,
) -> Result<(), AsmError> {
    match operand {
        Operand::Immediate { value, .. } => {
            parts.disp += sign * value;
            Ok(())
        }
        Operand::Register(reg) => {
            if sign < 0 {
                return Err(AsmError::new(
                    AsmErrorKind::Expression,
                    "Registers cannot be subtracted in a memory operand.",
                ));
            }
            push_address_register(parts, reg, 0)
        }
        Operand::Binary { left, op, right } => match op {
            BinaryOp::Add => {
                collect_address(left, parts, sign)?;
                collect_address(right, parts, sign)
            }
            BinaryOp::Sub => {
                collect_address(left, parts, sign)?;
                collect_address(right, parts, -sign)
            }
            BinaryOp::Mul => {
                let (reg, factor) = match (left.as_ref(), right.as_ref()) {
                    (Operand::Register(reg), Operand::Immediate { value, .. })
                    | (Operand::Immediate { value, .. }, Operand::Register(reg)) => {
                        (*reg, *value)
                    }
                    _ => return Err(bad_memory_operand()),
                };
                if sign < 0 {
                    return Err(AsmError::new(
                        AsmErrorKind::Expression,
                        "Registers cannot be subtracted in a memory operand.",
                    ));
                }
                let shift = match factor {
                    1 => 0,
                    2 => 1,
                    4 => 2,
                    8 => 3,
                    other => return Err(invalid_scale(other)),
                };
                push_address_register(parts, reg, shift)
            }
            BinaryOp::Shl => {
                let (Operand::Register(reg), Operand::Immediate { value, .. }) =
                    (left.as_ref(), right.as_ref())
                else {
                    return Err(bad_memory_operand());
                };
                if sign < 0 {
                    return Err(AsmError::new(
                        AsmErrorKind::Expression,
                        "Registers cannot be subtracted in a memory operand.",
                    ));
                }
                if !(0..=3).contains(value) {
                    return Err(invalid_scale(*value));
                }
                push_address_register(parts, reg, *value as u8)
            }
            _ => Err(bad_memory_operand()),
        },
        _ => Err(bad_memory_operand()),
    }
}

fn push_address_register(
    parts: &mut AddressParts,
    reg: &'static Register,
    shift: u8,
) -> Result<(), AsmError> {
    if reg.size != OperandSize::Size32 || reg.is_segment {
        return Err(AsmError::new(
            AsmErrorKind::Expression,
            format!("Only 32-bit registers may address memory, not '{}'.", reg.name),
        ));
    }
    if reg.index == 4 {
        // esp's r/m slot is the SIB escape; it cannot address memory here.
        return Err(AsmError::new(
            AsmErrorKind::Expression,
            "'esp' cannot be used in a memory operand.",
        ));
    }
    parts.regs.push((reg, shift));
    Ok(())
}

fn displacement_operand(disp: i64) -> Operand {
    if disp == 0 {
        Operand::zero()
    } else {
        // Addressing has no 16-bit displacement form; anything beyond a
        // signed byte is encoded as a dword.
        let size = if (-128..=127).contains(&disp) {
            OperandSize::Size8
        } else {
            OperandSize::Size32
        };
        Operand::Immediate { value: disp, size }
    }
}
