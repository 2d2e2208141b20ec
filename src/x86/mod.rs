// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! 32-bit x86 instruction encoding.

pub mod builders;
pub mod encoding;
pub mod operand;
pub mod registers;
