// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Statement and expression parser.
//!
//! Statements are line-oriented: a leading `.` starts a directive, an
//! identifier followed by `:` declares a label, anything else is a mnemonic
//! with a comma-separated argument list. Expressions use precedence
//! climbing; the operator levels, tightest first, are `* / %`, `+ -`,
//! `<< >>`, `&`, `|`.

use crate::core::error::{AsmError, AsmErrorKind, Diagnostic};
use crate::core::lexer::{Span, Token, TokenClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
        }
    }
}

/// Explicit operand-size keyword (`byte`, `word`, `dword`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeKeyword {
    Byte,
    Word,
    Dword,
}

impl SizeKeyword {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "byte" => Some(SizeKeyword::Byte),
            "word" => Some(SizeKeyword::Word),
            "dword" => Some(SizeKeyword::Dword),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Integer(i64, Span),
    Identifier(String, Span),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Paren(Box<Expr>, Span),
    Cast {
        size: SizeKeyword,
        expr: Box<Expr>,
        span: Span,
    },
    Memory {
        addr: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Integer(_, span)
            | Expr::Identifier(_, span)
            | Expr::Paren(_, span)
            | Expr::Cast { span, .. }
            | Expr::Memory { span, .. } => *span,
            Expr::Binary { left, .. } => left.span(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Directive {
    Global(String),
    Extern(String),
    Data {
        size: SizeKeyword,
        values: Vec<Expr>,
    },
    Array {
        size: SizeKeyword,
        count: Expr,
        value: Expr,
    },
}

#[derive(Debug, Clone)]
pub enum Statement {
    Label {
        name: String,
        line: u32,
    },
    Instruction {
        mnemonic: String,
        args: Vec<Expr>,
        line: u32,
    },
    Directive {
        directive: Directive,
        line: u32,
    },
}

impl Statement {
    pub fn line(&self) -> u32 {
        match self {
            Statement::Label { line, .. }
            | Statement::Instruction { line, .. }
            | Statement::Directive { line, .. } => *line,
        }
    }
}

/// Cursor over one line's tokens with trivia skipping.
pub struct TokenStream<'a> {
    tokens: &'a [Token],
    index: usize,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, index: 0 }
    }

    fn skip_trivia(&mut self) {
        while self
            .tokens
            .get(self.index)
            .is_some_and(|token| token.is_trivia())
        {
            self.index += 1;
        }
    }

    /// True when only trivia remains.
    pub fn at_end(&self) -> bool {
        self.tokens[self.index..].iter().all(|token| token.is_trivia())
    }

    pub fn peek(&mut self) -> Option<&'a Token> {
        self.skip_trivia();
        self.tokens.get(self.index)
    }

    pub fn next(&mut self) -> Result<&'a Token, AsmError> {
        self.skip_trivia();
        let token = self.tokens.get(self.index).ok_or_else(|| {
            AsmError::new(AsmErrorKind::Parser, "Unexpected end of statement.")
        })?;
        self.index += 1;
        Ok(token)
    }

    pub fn expect(&mut self, class: TokenClass, what: &str) -> Result<&'a Token, AsmError> {
        let token = self.next()?;
        if token.class != class {
            return Err(AsmError::new(
                AsmErrorKind::Parser,
                format!("Expected {what}, found '{}'.", token.text),
            ));
        }
        Ok(token)
    }
}

/// Parse every line of a token list. Failed lines contribute a diagnostic
/// and are skipped; all other lines still produce statements.
pub fn parse_all(tokens: &[Token]) -> (Vec<Statement>, Vec<Diagnostic>) {
    let mut statements = Vec::new();
    let mut diagnostics = Vec::new();
    for line in split_lines(tokens) {
        match parse_line(line) {
            Ok(mut parsed) => statements.append(&mut parsed),
            Err(error) => {
                let line_no = line.first().map_or(1, |token| token.span.line);
                diagnostics.push(Diagnostic::error(line_no, error));
            }
        }
    }
    (statements, diagnostics)
}

fn split_lines(tokens: &[Token]) -> Vec<&[Token]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.class == TokenClass::Newline {
            lines.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    lines.push(&tokens[start..]);
    lines
}

/// Parse one line's statements (a line may carry labels plus an
/// instruction or directive).
pub fn parse_line(tokens: &[Token]) -> Result<Vec<Statement>, AsmError> {
    let mut stream = TokenStream::new(tokens);
    let mut statements = Vec::new();
    while !stream.at_end() {
        statements.push(parse_statement(&mut stream)?);
    }
    Ok(statements)
}

pub fn parse_statement(stream: &mut TokenStream<'_>) -> Result<Statement, AsmError> {
    let first = stream.next()?;
    match first.class {
        TokenClass::Dot => {
            let directive = parse_directive(stream)?;
            Ok(Statement::Directive {
                directive,
                line: first.span.line,
            })
        }
        TokenClass::Identifier => {
            if stream.peek().is_some_and(|t| t.class == TokenClass::Colon) {
                stream.next()?;
                return Ok(Statement::Label {
                    name: first.text.clone(),
                    line: first.span.line,
                });
            }
            let args = parse_argument_list(stream)?;
            if !stream.at_end() {
                let token = stream.next()?;
                return Err(AsmError::new(
                    AsmErrorKind::Parser,
                    format!("Unexpected '{}' after instruction arguments.", token.text),
                ));
            }
            Ok(Statement::Instruction {
                mnemonic: first.text.to_ascii_lowercase(),
                args,
                line: first.span.line,
            })
        }
        _ => Err(AsmError::new(
            AsmErrorKind::Parser,
            format!(
                "Expected a directive, label or instruction, found '{}'.",
                first.text
            ),
        )),
    }
}

fn parse_directive(stream: &mut TokenStream<'_>) -> Result<Directive, AsmError> {
    let name_token = stream.expect(TokenClass::Identifier, "a directive name")?;
    let name = name_token.text.to_ascii_lowercase();
    match name.as_str() {
        "globl" | "global" => {
            let symbol = stream.expect(TokenClass::Identifier, "a symbol name")?;
            Ok(Directive::Global(symbol.text.clone()))
        }
        "extern" | "extrn" => {
            let symbol = stream.expect(TokenClass::Identifier, "a symbol name")?;
            Ok(Directive::Extern(symbol.text.clone()))
        }
        _ => {
            let size = SizeKeyword::from_name(&name).ok_or_else(|| {
                AsmError::new(
                    AsmErrorKind::Directive,
                    format!("Unknown directive '.{name}'."),
                )
            })?;
            if stream
                .peek()
                .is_some_and(|t| t.class == TokenClass::Identifier && t.text == "array")
            {
                stream.next()?;
                let count = parse_expr(stream)?;
                let value = parse_expr(stream)?;
                return Ok(Directive::Array { size, count, value });
            }
            let values = parse_argument_list(stream)?;
            if values.is_empty() {
                return Err(AsmError::new(
                    AsmErrorKind::Directive,
                    format!("Data directive '.{name}' needs at least one value."),
                ));
            }
            Ok(Directive::Data { size, values })
        }
    }
}

fn parse_argument_list(stream: &mut TokenStream<'_>) -> Result<Vec<Expr>, AsmError> {
    let mut args = Vec::new();
    if stream.at_end() {
        return Ok(args);
    }
    args.push(parse_expr(stream)?);
    while stream.peek().is_some_and(|t| t.class == TokenClass::Comma) {
        stream.next()?;
        args.push(parse_expr(stream)?);
    }
    Ok(args)
}

const PRECEDENCE_LEVELS: usize = 5;

fn op_at_level(class: TokenClass, level: usize) -> Option<BinaryOp> {
    match (level, class) {
        (0, TokenClass::Pipe) => Some(BinaryOp::BitOr),
        (1, TokenClass::Amp) => Some(BinaryOp::BitAnd),
        (2, TokenClass::Shl) => Some(BinaryOp::Shl),
        (2, TokenClass::Shr) => Some(BinaryOp::Shr),
        (3, TokenClass::Plus) => Some(BinaryOp::Add),
        (3, TokenClass::Minus) => Some(BinaryOp::Sub),
        (4, TokenClass::Star) => Some(BinaryOp::Mul),
        (4, TokenClass::Slash) => Some(BinaryOp::Div),
        (4, TokenClass::Percent) => Some(BinaryOp::Mod),
        _ => None,
    }
}

pub fn parse_expr(stream: &mut TokenStream<'_>) -> Result<Expr, AsmError> {
    parse_level(stream, 0)
}

fn parse_level(stream: &mut TokenStream<'_>, level: usize) -> Result<Expr, AsmError> {
    if level == PRECEDENCE_LEVELS {
        return parse_primary(stream);
    }
    let mut left = parse_level(stream, level + 1)?;
    while let Some(op) = stream
        .peek()
        .and_then(|token| op_at_level(token.class, level))
    {
        stream.next()?;
        let right = parse_level(stream, level + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_primary(stream: &mut TokenStream<'_>) -> Result<Expr, AsmError> {
    let token = stream.next()?;
    match token.class {
        TokenClass::LParen => {
            let inner = parse_expr(stream)?;
            stream.expect(TokenClass::RParen, "')'")?;
            Ok(Expr::Paren(Box::new(inner), token.span))
        }
        TokenClass::LBracket => {
            let addr = parse_expr(stream)?;
            stream.expect(TokenClass::RBracket, "']'")?;
            Ok(Expr::Memory {
                addr: Box::new(addr),
                span: token.span,
            })
        }
        TokenClass::Integer => {
            let value: i64 = token.text.parse().map_err(|_| {
                AsmError::new(
                    AsmErrorKind::Expression,
                    format!("Integer literal '{}' is out of range.", token.text),
                )
            })?;
            Ok(Expr::Integer(value, token.span))
        }
        TokenClass::Identifier => {
            if let Some(size) = SizeKeyword::from_name(&token.text) {
                // `byte [eax]` or `byte ptr [eax]`: an explicit size cast.
                if stream
                    .peek()
                    .is_some_and(|t| t.class == TokenClass::Identifier && t.text == "ptr")
                {
                    stream.next()?;
                }
                let inner = parse_primary(stream)?;
                return Ok(Expr::Cast {
                    size,
                    expr: Box::new(inner),
                    span: token.span,
                });
            }
            Ok(Expr::Identifier(token.text.clone(), token.span))
        }
        _ => Err(AsmError::new(
            AsmErrorKind::Parser,
            format!("Expected an expression, found '{}'.", token.text),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lexer::lex;

    fn parse_source(text: &str) -> Vec<Statement> {
        let tokens = lex(text).unwrap();
        let (statements, diagnostics) = parse_all(&tokens);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        statements
    }

    #[test]
    fn label_and_instruction_on_one_line() {
        let statements = parse_source("start: mov eax, 1");
        assert_eq!(statements.len(), 2);
        assert!(matches!(&statements[0], Statement::Label { name, .. } if name == "start"));
        assert!(matches!(
            &statements[1],
            Statement::Instruction { mnemonic, args, .. }
                if mnemonic == "mov" && args.len() == 2
        ));
    }

    #[test]
    fn directives_parse() {
        let statements = parse_source(".globl main\n.extern printf\n.byte 1, 2\n.word array 4 0");
        assert!(matches!(
            &statements[0],
            Statement::Directive { directive: Directive::Global(name), .. } if name == "main"
        ));
        assert!(matches!(
            &statements[1],
            Statement::Directive { directive: Directive::Extern(name), .. } if name == "printf"
        ));
        assert!(matches!(
            &statements[2],
            Statement::Directive { directive: Directive::Data { size: SizeKeyword::Byte, values }, .. }
                if values.len() == 2
        ));
        assert!(matches!(
            &statements[3],
            Statement::Directive { directive: Directive::Array { size: SizeKeyword::Word, .. }, .. }
        ));
    }

    #[test]
    fn unknown_directive_is_reported() {
        let tokens = lex(".data 1").unwrap();
        let (_, diagnostics) = parse_all(&tokens);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].error.message().contains(".data"));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let statements = parse_source("push 1 + 2 * 3");
        let Statement::Instruction { args, .. } = &statements[0] else {
            panic!("expected instruction");
        };
        let Expr::Binary { op, right, .. } = &args[0] else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn shifts_bind_looser_than_addition() {
        let statements = parse_source("push 1 << 2 + 3");
        let Statement::Instruction { args, .. } = &statements[0] else {
            panic!("expected instruction");
        };
        assert!(matches!(&args[0], Expr::Binary { op: BinaryOp::Shl, .. }));
    }

    #[test]
    fn cast_with_and_without_ptr() {
        let statements = parse_source("inc dword ptr [eax]\ninc byte [eax]");
        for statement in &statements {
            let Statement::Instruction { args, .. } = statement else {
                panic!("expected instruction");
            };
            assert!(matches!(args[0], Expr::Cast { .. }));
        }
    }

    #[test]
    fn memory_operand_parses_brackets() {
        let statements = parse_source("mov eax, [ebx + 4]");
        let Statement::Instruction { args, .. } = &statements[0] else {
            panic!("expected instruction");
        };
        assert!(matches!(args[1], Expr::Memory { .. }));
    }

    #[test]
    fn error_poisons_only_its_line() {
        let tokens = lex("mov eax,\nret").unwrap();
        let (statements, diagnostics) = parse_all(&tokens);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(statements.len(), 1);
        assert!(matches!(
            &statements[0],
            Statement::Instruction { mnemonic, .. } if mnemonic == "ret"
        ));
    }
}
