// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! 32-bit x86 assembler producing relocatable units.

pub mod assembler;
pub mod core;
pub mod x86;
