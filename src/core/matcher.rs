// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pattern-matcher seam used by the lexer.
//!
//! Each token class is recognized by a compiled finite-state acceptor. The
//! lexer only ever asks one question: starting at a given offset, how long
//! is the longest accepted run? The regex engine behind this answer is kept
//! out of the lexer entirely.

use regex_automata::dfa::{dense, Automaton};
use regex_automata::{Anchored, Input, MatchKind};

use crate::core::error::{AsmError, AsmErrorKind};

/// A compiled acceptor for one token class.
#[derive(Debug)]
pub struct TokenPattern {
    dfa: dense::DFA<Vec<u32>>,
}

impl TokenPattern {
    /// Compile a regular expression into a longest-match acceptor.
    pub fn compile(pattern: &str) -> Result<Self, AsmError> {
        let dfa = dense::DFA::builder()
            .configure(dense::DFA::config().match_kind(MatchKind::All))
            .build(pattern)
            .map_err(|err| {
                AsmError::new(
                    AsmErrorKind::Lexer,
                    format!("Cannot compile token pattern '{pattern}': {err}"),
                )
            })?;
        Ok(Self { dfa })
    }

    /// End offset of the longest run accepted from `start`, if any.
    pub fn longest_match(&self, haystack: &[u8], start: usize) -> Option<usize> {
        let input = Input::new(haystack).range(start..).anchored(Anchored::Yes);
        match self.dfa.try_search_fwd(&input) {
            Ok(Some(half)) => Some(half.offset()),
            _ => None,
        }
    }
}
