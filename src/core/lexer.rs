// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Lexer for assembly source.
//!
//! The scanner projects each source byte onto a small character-class
//! alphabet (letters become `c`, digits become `n`) so the token acceptors
//! only ever see a handful of distinct symbols. At every position all token
//! classes are tried and the longest accepted run wins; ties go to the class
//! registered first. A zero-length best match is promoted to a
//! single-character `Undefined` token, so scanning always makes progress.

use std::sync::OnceLock;

use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::matcher::TokenPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Identifier,
    Integer,
    Whitespace,
    Newline,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pipe,
    Amp,
    Shl,
    Shr,
    Dot,
    Colon,
    Semicolon,
    Quote,
    Comment,
    Undefined,
}

/// Source span of a token: line/column for diagnostics plus absolute byte
/// offsets so post-passes can re-scan the raw source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col_start: usize,
    pub col_end: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub class: TokenClass,
    pub span: Span,
}

impl Token {
    pub fn is_trivia(&self) -> bool {
        matches!(
            self.class,
            TokenClass::Whitespace | TokenClass::Newline | TokenClass::Comment
        )
    }
}

/// Token grammar over the projected alphabet. Order matters: it breaks
/// length ties.
const TOKEN_GRAMMAR: &[(TokenClass, &str)] = &[
    (TokenClass::Identifier, "[_c][_cn]*"),
    (TokenClass::Integer, "n+"),
    (TokenClass::Whitespace, "[ \t\r]+"),
    (TokenClass::Newline, "\n+"),
    (TokenClass::LParen, r"\("),
    (TokenClass::RParen, r"\)"),
    (TokenClass::LBracket, r"\["),
    (TokenClass::RBracket, r"\]"),
    (TokenClass::Comma, ","),
    (TokenClass::Plus, r"\+"),
    (TokenClass::Minus, "-"),
    (TokenClass::Star, r"\*"),
    (TokenClass::Slash, "/"),
    (TokenClass::Percent, "%"),
    (TokenClass::Pipe, r"\|"),
    (TokenClass::Amp, "&"),
    (TokenClass::Shl, "<<"),
    (TokenClass::Shr, ">>"),
    (TokenClass::Dot, r"\."),
    (TokenClass::Colon, ":"),
    (TokenClass::Semicolon, ";"),
    (TokenClass::Quote, "\""),
];

fn grammar() -> &'static Vec<(TokenClass, TokenPattern)> {
    static GRAMMAR: OnceLock<Vec<(TokenClass, TokenPattern)>> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        TOKEN_GRAMMAR
            .iter()
            .map(|(class, pattern)| {
                let compiled = TokenPattern::compile(pattern)
                    .unwrap_or_else(|err| panic!("token grammar: {err}"));
                (*class, compiled)
            })
            .collect()
    })
}

fn project(byte: u8) -> u8 {
    if byte.is_ascii_alphabetic() {
        b'c'
    } else if byte.is_ascii_digit() {
        b'n'
    } else {
        byte
    }
}

/// Lex a source unit into tokens, including the comment-coalescing and
/// string-expansion post-passes. Only an unterminated string is fatal.
pub fn lex(text: &str) -> Result<Vec<Token>, AsmError> {
    post_process(text, scan(text))
}

fn scan(text: &str) -> Vec<Token> {
    let projected: Vec<u8> = text.bytes().map(project).collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut line: u32 = 1;
    let mut col: usize = 1;

    while pos < projected.len() {
        let mut best_class = TokenClass::Undefined;
        let mut best_end = pos;
        for (class, pattern) in grammar() {
            if let Some(end) = pattern.longest_match(&projected, pos) {
                if end > best_end {
                    best_class = *class;
                    best_end = end;
                }
            }
        }
        if best_end == pos {
            // No class accepted anything; take one character as undefined.
            best_end = pos + 1;
            while best_end < text.len() && !text.is_char_boundary(best_end) {
                best_end += 1;
            }
        }

        let slice = &text[pos..best_end];
        let col_start = col;
        let start_line = line;
        for ch in slice.chars() {
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        tokens.push(Token {
            text: slice.to_string(),
            class: best_class,
            span: Span {
                line: start_line,
                col_start,
                col_end: col,
                start: pos,
                end: best_end,
            },
        });
        pos = best_end;
    }
    tokens
}

/// Single left-to-right pass over the raw token list: a `;` run through the
/// next newline collapses into one comment token, and a `"` expands the
/// quoted literal into comma-separated integer tokens (one per byte).
fn post_process(source: &str, tokens: Vec<Token>) -> Result<Vec<Token>, AsmError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].class {
            TokenClass::Semicolon => {
                let mut text = String::new();
                let first = tokens[i].span;
                let mut last = first;
                while i < tokens.len() && tokens[i].class != TokenClass::Newline {
                    text.push_str(&tokens[i].text);
                    last = tokens[i].span;
                    i += 1;
                }
                out.push(Token {
                    text,
                    class: TokenClass::Comment,
                    span: Span {
                        line: first.line,
                        col_start: first.col_start,
                        col_end: last.col_end,
                        start: first.start,
                        end: last.end,
                    },
                });
                // The terminating newline stays a token of its own.
                continue;
            }
            TokenClass::Quote => {
                let quote_span = tokens[i].span;
                let (bytes, resume) = decode_string(source, quote_span)?;
                for (k, byte) in bytes.iter().enumerate() {
                    if k > 0 {
                        out.push(Token {
                            text: ",".to_string(),
                            class: TokenClass::Comma,
                            span: quote_span,
                        });
                    }
                    out.push(Token {
                        text: byte.to_string(),
                        class: TokenClass::Integer,
                        span: quote_span,
                    });
                }
                i += 1;
                while i < tokens.len() && tokens[i].span.start < resume {
                    i += 1;
                }
                continue;
            }
            _ => out.push(tokens[i].clone()),
        }
        i += 1;
    }
    Ok(out)
}

/// Decode a quoted string starting right after the opening quote. Returns
/// the decoded bytes and the offset just past the closing quote.
fn decode_string(source: &str, quote: Span) -> Result<(Vec<u8>, usize), AsmError> {
    let bytes = source.as_bytes();
    let mut decoded = Vec::new();
    let mut j = quote.end;
    loop {
        if j >= bytes.len() || bytes[j] == b'\n' {
            return Err(AsmError::new(
                AsmErrorKind::Lexer,
                format!("Unterminated string literal at line {}.", quote.line),
            ));
        }
        match bytes[j] {
            b'"' => return Ok((decoded, j + 1)),
            b'\\' => {
                let escape = bytes.get(j + 1).copied().ok_or_else(|| {
                    AsmError::new(
                        AsmErrorKind::Lexer,
                        format!("Unterminated string literal at line {}.", quote.line),
                    )
                })?;
                decoded.push(match escape {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    b'0' => 0,
                    b'\\' => b'\\',
                    b'"' => b'"',
                    other => {
                        return Err(AsmError::new(
                            AsmErrorKind::Lexer,
                            format!("Unknown string escape '\\{}'.", other as char),
                        ))
                    }
                });
                j += 2;
            }
            byte => {
                decoded.push(byte);
                j += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(text: &str) -> Vec<TokenClass> {
        lex(text)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| t.class)
            .collect()
    }

    #[test]
    fn basic_instruction_tokens() {
        let tokens = lex("mov eax, 42").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["mov", " ", "eax", ",", " ", "42"]);
        assert_eq!(tokens[0].class, TokenClass::Identifier);
        assert_eq!(tokens[5].class, TokenClass::Integer);
    }

    #[test]
    fn identifier_wins_over_integer_by_length() {
        let tokens = lex("a1 1a").unwrap();
        let got: Vec<(TokenClass, &str)> = tokens
            .iter()
            .filter(|t| !t.is_trivia())
            .map(|t| (t.class, t.text.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (TokenClass::Identifier, "a1"),
                (TokenClass::Integer, "1"),
                (TokenClass::Identifier, "a"),
            ]
        );
    }

    #[test]
    fn shift_operators_are_two_characters() {
        assert_eq!(
            classes("ebx << 2 >> 1"),
            vec![
                TokenClass::Identifier,
                TokenClass::Shl,
                TokenClass::Integer,
                TokenClass::Shr,
                TokenClass::Integer,
            ]
        );
    }

    #[test]
    fn lone_angle_bracket_is_undefined() {
        assert_eq!(classes("a > b")[1], TokenClass::Undefined);
    }

    #[test]
    fn comment_runs_to_end_of_line() {
        let tokens = lex("nop ; trailing, [junk]\nret").unwrap();
        let comment = tokens
            .iter()
            .find(|t| t.class == TokenClass::Comment)
            .unwrap();
        assert_eq!(comment.text, "; trailing, [junk]");
        assert!(comment.is_trivia());
        assert!(tokens.iter().any(|t| t.text == "ret"));
    }

    #[test]
    fn comment_keeps_the_newline_that_ends_it() {
        let tokens = lex("nop ; note\nret").unwrap();
        let comment = tokens
            .iter()
            .position(|t| t.class == TokenClass::Comment)
            .unwrap();
        assert_eq!(tokens[comment + 1].class, TokenClass::Newline);
    }

    #[test]
    fn string_expands_to_integer_tokens() {
        let got: Vec<String> = lex("\"AB\"")
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(got, vec!["65", ",", "66"]);
    }

    #[test]
    fn string_escapes_decode() {
        let got: Vec<String> = lex(r#""\n\0""#)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(got, vec!["10", ",", "0"]);
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = lex("\"abc").unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::Lexer);
        assert!(err.message().contains("Unterminated"));
    }

    #[test]
    fn line_numbers_advance_on_newlines() {
        let tokens = lex("nop\nret").unwrap();
        let ret = tokens.iter().find(|t| t.text == "ret").unwrap();
        assert_eq!(ret.span.line, 2);
    }
}
