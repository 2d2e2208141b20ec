// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Symbols and their merge rules.
//!
//! Every mention of a name (label definition, `.globl`, `.extern`, or a use
//! inside an instruction) produces a symbol; repeated mentions merge into
//! the existing entry. A symbol may be defined at most once, visibility only
//! widens, and a name can never be both local and external.

use crate::core::error::{AsmError, AsmErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Local {
        name: String,
        /// Offset within the unit once the defining label has been seen.
        offset: Option<i64>,
        is_public: bool,
    },
    External {
        name: String,
    },
}

impl Symbol {
    /// A forward reference: mentioned but not yet defined.
    pub fn reference(name: impl Into<String>) -> Self {
        Symbol::Local {
            name: name.into(),
            offset: None,
            is_public: false,
        }
    }

    pub fn defined(name: impl Into<String>, offset: i64) -> Self {
        Symbol::Local {
            name: name.into(),
            offset: Some(offset),
            is_public: false,
        }
    }

    pub fn public(name: impl Into<String>) -> Self {
        Symbol::Local {
            name: name.into(),
            offset: None,
            is_public: true,
        }
    }

    pub fn external(name: impl Into<String>) -> Self {
        Symbol::External { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Symbol::Local { name, .. } | Symbol::External { name } => name,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Symbol::External { .. })
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Symbol::Local { is_public: true, .. })
    }

    pub fn offset(&self) -> Option<i64> {
        match self {
            Symbol::Local { offset, .. } => *offset,
            Symbol::External { .. } => None,
        }
    }

    /// Merge a later mention of the same name into this entry.
    pub fn merge(&mut self, other: Symbol) -> Result<(), AsmError> {
        let name = self.name().to_string();
        match (&mut *self, other) {
            (Symbol::Local { .. }, Symbol::External { .. }) => Err(AsmError::new(
                AsmErrorKind::Symbol,
                format!("Symbol '{name}' is already local and cannot be made external."),
            )),
            (Symbol::External { .. }, Symbol::Local { is_public: true, .. }) => {
                Err(AsmError::new(
                    AsmErrorKind::Symbol,
                    format!("External symbol '{name}' cannot be made global."),
                ))
            }
            (Symbol::External { .. }, Symbol::Local { offset: Some(_), .. }) => {
                Err(AsmError::new(
                    AsmErrorKind::Symbol,
                    format!("External symbol '{name}' cannot be defined here."),
                ))
            }
            (Symbol::External { .. }, Symbol::Local { .. }) => Ok(()),
            (Symbol::External { .. }, Symbol::External { .. }) => Ok(()),
            (
                Symbol::Local { offset: Some(_), .. },
                Symbol::Local { offset: Some(_), .. },
            ) => Err(AsmError::new(
                AsmErrorKind::Symbol,
                format!("Symbol '{name}' is defined more than once."),
            )),
            (
                Symbol::Local { offset, is_public, .. },
                Symbol::Local {
                    offset: new_offset,
                    is_public: new_public,
                    ..
                },
            ) => {
                if new_offset.is_some() {
                    *offset = new_offset;
                }
                *is_public = *is_public || new_public;
                Ok(())
            }
        }
    }
}
