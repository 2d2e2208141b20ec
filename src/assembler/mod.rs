// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The assembler engine.
//!
//! Output is a buffer of tagged slots: a slot is either a literal byte or a
//! pending operand of known width. Instruction lengths are therefore fixed
//! the moment a statement is encoded; the final `patch` pass fills pending
//! slots in with resolved values or emits relocation records for them.

pub mod cli;
pub mod output;
pub mod symbols;

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use crate::core::error::{AsmError, AsmErrorKind, Diagnostic};
use crate::core::lexer;
use crate::core::parser::{self, Directive, Statement};
use crate::x86::builders;
use crate::x86::encoding::OperandSize;
use crate::x86::operand::{lower_expr, Operand, SymbolRefKind};

use symbols::Symbol;

/// One position in the output buffer.
#[derive(Debug, Clone)]
pub enum Slot {
    Literal(u8),
    Pending { operand: Operand, width: usize },
}

impl Slot {
    pub fn width(&self) -> usize {
        match self {
            Slot::Literal(_) => 1,
            Slot::Pending { width, .. } => *width,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    Absolute,
    Relative,
}

impl RelocationKind {
    pub fn label(self) -> &'static str {
        match self {
            RelocationKind::Absolute => "absolute",
            RelocationKind::Relative => "relative",
        }
    }
}

/// A fixup the consuming linker must apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub offset: i64,
    pub symbol: String,
    pub kind: RelocationKind,
    pub width: usize,
}

pub struct Assembler {
    slots: Vec<Slot>,
    cursor: i64,
    base_offset: Option<i64>,
    relocate_absolutes: bool,
    /// Symbol names in first-mention order.
    names: Vec<String>,
    symbols: HashMap<String, Symbol>,
    relocations: Vec<Relocation>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            cursor: 0,
            base_offset: None,
            relocate_absolutes: true,
            names: Vec::new(),
            symbols: HashMap::new(),
            relocations: Vec::new(),
        }
    }

    /// Load address of the unit. Absolute references to local symbols only
    /// resolve in-place once this is known.
    pub fn set_base_offset(&mut self, base: i64) {
        self.base_offset = Some(base);
    }

    pub fn base_offset(&self) -> Option<i64> {
        self.base_offset
    }

    /// When false, absolute references are never resolved in-place; every
    /// one becomes a relocation record (object-file mode).
    pub fn set_relocate_absolutes(&mut self, relocate: bool) {
        self.relocate_absolutes = relocate;
    }

    pub fn relocate_absolutes(&self) -> bool {
        self.relocate_absolutes
    }

    /// Current offset within the unit.
    pub fn offset(&self) -> i64 {
        self.cursor
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    /// Symbols in first-mention order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.names.iter().map(|name| &self.symbols[name])
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn defined_local_offset(&self, name: &str) -> Option<i64> {
        self.symbols.get(name).and_then(Symbol::offset)
    }

    /// The public `main` symbol's offset, if the unit has one.
    pub fn entry_point(&self) -> Option<i64> {
        self.symbols
            .get("main")
            .filter(|symbol| symbol.is_public())
            .and_then(Symbol::offset)
    }

    /// Record a mention of `name`, creating a forward reference on first
    /// sight.
    pub fn reference_symbol(&mut self, name: &str) {
        if !self.symbols.contains_key(name) {
            self.names.push(name.to_string());
            self.symbols
                .insert(name.to_string(), Symbol::reference(name));
        }
    }

    /// Add a symbol, merging with any existing entry of the same name.
    pub fn define_symbol(&mut self, symbol: Symbol) -> Result<(), AsmError> {
        match self.symbols.get_mut(symbol.name()) {
            Some(existing) => existing.merge(symbol),
            None => {
                self.names.push(symbol.name().to_string());
                self.symbols.insert(symbol.name().to_string(), symbol);
                Ok(())
            }
        }
    }

    /// Append literal bytes.
    pub fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.slots.push(Slot::Literal(byte));
        }
        self.cursor += bytes.len() as i64;
    }

    /// Write a register/memory operand's trailing bytes (SIB and
    /// displacement) or an immediate-class operand's data.
    pub fn write_operand(&mut self, operand: &Operand) -> Result<(), AsmError> {
        match operand {
            Operand::Register(_) => Ok(()),
            Operand::Memory { base, disp, .. } => {
                if base.index == 5 && disp.size() == OperandSize::Size0 {
                    // [ebp] is encoded as [ebp + 0].
                    self.write(&[0]);
                    Ok(())
                } else {
                    self.write_value(disp)
                }
            }
            Operand::Sib {
                base,
                index,
                shift,
                disp,
                ..
            } => {
                self.write(&[(shift << 6) | (index.index << 3) | base.index]);
                if base.index == 5 && disp.size() == OperandSize::Size0 {
                    self.write(&[0]);
                    Ok(())
                } else {
                    self.write_value(disp)
                }
            }
            other => self.write_value(other),
        }
    }

    /// Write an immediate-class operand: resolved now if possible, as a
    /// pending slot otherwise.
    pub fn write_value(&mut self, operand: &Operand) -> Result<(), AsmError> {
        let placed = self.place(operand)?;
        if placed.can_resolve(self) {
            let bytes = placed.encode(self)?;
            self.write(&bytes);
        } else {
            let width = placed.size().byte_count();
            self.cursor += width as i64;
            self.slots.push(Slot::Pending {
                operand: placed,
                width,
            });
        }
        Ok(())
    }

    /// Pin a value operand to the symbol table: labels become absolute
    /// symbol references and every named reference is recorded.
    fn place(&mut self, operand: &Operand) -> Result<Operand, AsmError> {
        match operand {
            Operand::Label { name, size } => {
                self.reference_symbol(name);
                Ok(Operand::Symbol {
                    name: name.clone(),
                    kind: SymbolRefKind::Absolute,
                    size: *size,
                })
            }
            Operand::Symbol { name, .. } => {
                self.reference_symbol(name);
                Ok(operand.clone())
            }
            Operand::Immediate { .. } => Ok(operand.clone()),
            _ => Err(AsmError::new(
                AsmErrorKind::Instruction,
                "Operand has no direct byte encoding.",
            )),
        }
    }

    /// Assemble one statement. A failed statement contributes nothing to
    /// the output buffer.
    pub fn process(&mut self, statement: &Statement) -> Result<(), AsmError> {
        let slots_len = self.slots.len();
        let cursor = self.cursor;
        let result = self.process_inner(statement);
        if result.is_err() {
            self.slots.truncate(slots_len);
            self.cursor = cursor;
        }
        result
    }

    fn process_inner(&mut self, statement: &Statement) -> Result<(), AsmError> {
        match statement {
            Statement::Label { name, .. } => {
                let offset = self.cursor;
                self.define_symbol(Symbol::defined(name, offset))
            }
            Statement::Directive { directive, .. } => self.process_directive(directive),
            Statement::Instruction { mnemonic, args, .. } => {
                let operands = args
                    .iter()
                    .map(lower_expr)
                    .collect::<Result<Vec<_>, _>>()?;
                builders::encode(mnemonic, &operands, self)
            }
        }
    }

    fn process_directive(&mut self, directive: &Directive) -> Result<(), AsmError> {
        match directive {
            Directive::Global(name) => self.define_symbol(Symbol::public(name)),
            Directive::Extern(name) => self.define_symbol(Symbol::external(name)),
            Directive::Data { size, values } => {
                let size = OperandSize::from_keyword(*size);
                for expr in values {
                    let operand = lower_expr(expr)?;
                    self.write_data_value(&operand, size)?;
                }
                Ok(())
            }
            Directive::Array { size, count, value } => {
                let size = OperandSize::from_keyword(*size);
                let count = match lower_expr(count)? {
                    Operand::Immediate { value, .. } if value >= 0 => value,
                    _ => {
                        return Err(AsmError::new(
                            AsmErrorKind::Directive,
                            "Array count must be a non-negative constant.",
                        ))
                    }
                };
                let operand = lower_expr(value)?;
                for _ in 0..count {
                    self.write_data_value(&operand, size)?;
                }
                Ok(())
            }
        }
    }

    fn write_data_value(
        &mut self,
        operand: &Operand,
        size: OperandSize,
    ) -> Result<(), AsmError> {
        if !operand.is_immediate() {
            return Err(AsmError::new(
                AsmErrorKind::Directive,
                "Data directives take immediate values.",
            ));
        }
        self.write_value(&operand.cast(size))
    }

    /// Final resolution pass. Pending slots become literal bytes where the
    /// target is known, relocation records otherwise. Slots that fail stay
    /// pending, so repeated calls neither change resolved bytes nor emit
    /// duplicate relocations.
    pub fn patch(&mut self) -> Result<(), AsmError> {
        let slots = std::mem::take(&mut self.slots);
        let mut patched = Vec::with_capacity(slots.len());
        let mut offset: i64 = 0;
        let mut first_error: Option<AsmError> = None;
        for slot in slots {
            match slot {
                Slot::Literal(byte) => {
                    patched.push(Slot::Literal(byte));
                    offset += 1;
                }
                Slot::Pending { operand, width } => {
                    match self.resolve_pending(&operand, offset, width) {
                        Ok(bytes) => {
                            patched.extend(bytes.into_iter().map(Slot::Literal));
                        }
                        Err(error) => {
                            if first_error.is_none() {
                                first_error = Some(error);
                            }
                            patched.push(Slot::Pending { operand, width });
                        }
                    }
                    offset += width as i64;
                }
            }
        }
        self.slots = patched;
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn resolve_pending(
        &mut self,
        operand: &Operand,
        offset: i64,
        width: usize,
    ) -> Result<Vec<u8>, AsmError> {
        let Operand::Symbol { name, kind, size } = operand else {
            // Pending immediates cannot occur; encode anyway if one does.
            return operand.encode(self);
        };
        let symbol = self.symbols.get(name).cloned().ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::Symbol,
                format!("Symbol '{name}' is not in the symbol table."),
            )
        })?;
        match (kind, &symbol) {
            (
                SymbolRefKind::Relative { to },
                Symbol::Local {
                    offset: Some(target),
                    ..
                },
            ) => {
                let disp = target - to;
                if *size == OperandSize::Size8 && !(-128..=127).contains(&disp) {
                    return Err(AsmError::new(
                        AsmErrorKind::Instruction,
                        format!("Relative reference to '{name}' is out of range."),
                    ));
                }
                Ok(size.encode(disp))
            }
            (SymbolRefKind::Relative { .. }, Symbol::Local { offset: None, .. }) => {
                Err(AsmError::new(
                    AsmErrorKind::Symbol,
                    format!("Symbol '{name}' is never defined."),
                ))
            }
            (SymbolRefKind::Relative { .. }, Symbol::External { .. }) => {
                // The field sits right before its anchor, so the stored
                // addend is zero and the record carries everything else.
                self.relocations.push(Relocation {
                    offset,
                    symbol: name.clone(),
                    kind: RelocationKind::Relative,
                    width,
                });
                Ok(vec![0; width])
            }
            (
                SymbolRefKind::Absolute,
                Symbol::Local {
                    offset: Some(target),
                    ..
                },
            ) => match self.base_offset {
                Some(base) if self.relocate_absolutes => Ok(size.encode(target + base)),
                _ => {
                    // Unit offset goes in the field as the addend.
                    self.relocations.push(Relocation {
                        offset,
                        symbol: name.clone(),
                        kind: RelocationKind::Absolute,
                        width,
                    });
                    Ok(size.encode(*target))
                }
            },
            (SymbolRefKind::Absolute, _) => {
                self.relocations.push(Relocation {
                    offset,
                    symbol: name.clone(),
                    kind: RelocationKind::Absolute,
                    width,
                });
                Ok(vec![0; width])
            }
        }
    }

    /// The fully resolved output bytes. Errors if any slot is still
    /// pending.
    pub fn code_bytes(&self) -> Result<Vec<u8>, AsmError> {
        let mut bytes = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            match slot {
                Slot::Literal(byte) => bytes.push(*byte),
                Slot::Pending { operand, .. } => {
                    let what = match operand {
                        Operand::Symbol { name, .. } => format!("symbol '{name}'"),
                        other => format!("{other:?}"),
                    };
                    return Err(AsmError::new(
                        AsmErrorKind::Symbol,
                        format!("Unresolved reference to {what} in output."),
                    ));
                }
            }
        }
        Ok(bytes)
    }
}

/// Lex, parse, and assemble a whole source unit into `asm`. Per-line
/// failures become diagnostics; a lexer error aborts the unit.
pub fn assemble(source: &str, asm: &mut Assembler) -> Result<Vec<Diagnostic>, AsmError> {
    let tokens = lexer::lex(source)?;
    let (statements, mut diagnostics) = parser::parse_all(&tokens);
    for statement in &statements {
        if let Err(error) = asm.process(statement) {
            diagnostics.push(Diagnostic::error(statement.line(), error));
        }
    }
    // Parser and encoder diagnostics come from separate passes; report
    // them in source order.
    diagnostics.sort_by_key(|diagnostic| diagnostic.line);
    Ok(diagnostics)
}
