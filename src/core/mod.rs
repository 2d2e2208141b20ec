// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! CPU-agnostic core: diagnostics, token matching, lexing, parsing.

pub mod error;
pub mod lexer;
pub mod matcher;
pub mod parser;
