// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The x86 register table.
//!
//! 8-, 16- and 32-bit aliases of the same physical register share a 3-bit
//! index and differ only in size.

use super::encoding::OperandSize;

#[derive(Debug, PartialEq, Eq)]
pub struct Register {
    pub name: &'static str,
    pub index: u8,
    pub size: OperandSize,
    pub is_segment: bool,
}

impl Register {
    pub fn is_word(&self) -> bool {
        self.size > OperandSize::Size8
    }
}

macro_rules! reg {
    ($name:literal, $index:expr, $size:ident, $segment:expr) => {
        Register {
            name: $name,
            index: $index,
            size: OperandSize::$size,
            is_segment: $segment,
        }
    };
}

pub static REGISTER_TABLE: &[Register] = &[
    reg!("eax", 0, Size32, false),
    reg!("ecx", 1, Size32, false),
    reg!("edx", 2, Size32, false),
    reg!("ebx", 3, Size32, false),
    reg!("esp", 4, Size32, false),
    reg!("ebp", 5, Size32, false),
    reg!("esi", 6, Size32, false),
    reg!("edi", 7, Size32, false),
    reg!("ax", 0, Size16, false),
    reg!("cx", 1, Size16, false),
    reg!("dx", 2, Size16, false),
    reg!("bx", 3, Size16, false),
    reg!("sp", 4, Size16, false),
    reg!("bp", 5, Size16, false),
    reg!("si", 6, Size16, false),
    reg!("di", 7, Size16, false),
    reg!("al", 0, Size8, false),
    reg!("cl", 1, Size8, false),
    reg!("dl", 2, Size8, false),
    reg!("bl", 3, Size8, false),
    reg!("ah", 4, Size8, false),
    reg!("ch", 5, Size8, false),
    reg!("dh", 6, Size8, false),
    reg!("bh", 7, Size8, false),
    reg!("es", 0, Size16, true),
    reg!("cs", 1, Size16, true),
    reg!("ss", 2, Size16, true),
    reg!("ds", 3, Size16, true),
    reg!("fs", 4, Size16, true),
    reg!("gs", 5, Size16, true),
];

/// Look a register up by name, case-insensitively.
pub fn lookup(name: &str) -> Option<&'static Register> {
    let lowered = name.to_ascii_lowercase();
    REGISTER_TABLE.iter().find(|reg| reg.name == lowered)
}
