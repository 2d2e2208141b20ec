// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types, diagnostics, and reporting for the assembler.

use std::fmt;

use serde_json::json;

/// Categories of assembler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    Cli,
    Directive,
    Expression,
    Instruction,
    Io,
    Lexer,
    Parser,
    Symbol,
}

impl AsmErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            AsmErrorKind::Cli => "cli",
            AsmErrorKind::Directive => "directive",
            AsmErrorKind::Expression => "expression",
            AsmErrorKind::Instruction => "instruction",
            AsmErrorKind::Io => "io",
            AsmErrorKind::Lexer => "lexer",
            AsmErrorKind::Parser => "parser",
            AsmErrorKind::Symbol => "symbol",
        }
    }
}

/// An assembler error with a kind and message.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A diagnostic message with source location context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub line: u32,
    pub column: Option<usize>,
    pub severity: Severity,
    pub error: AsmError,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, error: AsmError) -> Self {
        Self {
            line,
            column: None,
            severity,
            error,
        }
    }

    pub fn with_column(line: u32, column: usize, severity: Severity, error: AsmError) -> Self {
        Self {
            line,
            column: Some(column),
            severity,
            error,
        }
    }

    pub fn error(line: u32, error: AsmError) -> Self {
        Self::new(line, Severity::Error, error)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render as a single text line: `line N[:C]: error: message`.
    pub fn render_text(&self) -> String {
        match self.column {
            Some(col) => format!(
                "line {}:{}: {}: {}",
                self.line,
                col,
                self.severity.label(),
                self.error
            ),
            None => format!("line {}: {}: {}", self.line, self.severity.label(), self.error),
        }
    }

    /// Render as a machine-readable JSON object.
    pub fn render_json(&self) -> serde_json::Value {
        json!({
            "line": self.line,
            "column": self.column,
            "severity": self.severity.label(),
            "kind": self.error.kind().label(),
            "message": self.error.message(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_text_includes_line_and_kind_message() {
        let diag = Diagnostic::error(3, AsmError::new(AsmErrorKind::Parser, "expected ']'"));
        assert_eq!(diag.render_text(), "line 3: error: expected ']'");
    }

    #[test]
    fn diagnostic_json_carries_kind_label() {
        let diag = Diagnostic::with_column(
            7,
            12,
            Severity::Error,
            AsmError::new(AsmErrorKind::Symbol, "duplicate"),
        );
        let value = diag.render_json();
        assert_eq!(value["line"], 7);
        assert_eq!(value["column"], 12);
        assert_eq!(value["kind"], "symbol");
    }
}
