// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Operand sizes and little-endian byte encoding.

use crate::core::parser::SizeKeyword;

/// An operand's encoded width. `Size0` stands for an elidable zero value;
/// every other size encodes fixed-width little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OperandSize {
    Size0,
    Size8,
    Size16,
    Size32,
}

impl OperandSize {
    pub fn byte_count(self) -> usize {
        match self {
            OperandSize::Size0 => 0,
            OperandSize::Size8 => 1,
            OperandSize::Size16 => 2,
            OperandSize::Size32 => 4,
        }
    }

    /// Little-endian encoding of `value` at this width.
    pub fn encode(self, value: i64) -> Vec<u8> {
        let count = self.byte_count();
        (0..count).map(|i| (value >> (8 * i)) as u8).collect()
    }

    pub fn from_keyword(keyword: SizeKeyword) -> Self {
        match keyword {
            SizeKeyword::Byte => OperandSize::Size8,
            SizeKeyword::Word => OperandSize::Size16,
            SizeKeyword::Dword => OperandSize::Size32,
        }
    }

    /// Smallest size able to hold `value` as a signed quantity.
    pub fn smallest_signed(value: i64) -> Self {
        if (-128..=127).contains(&value) {
            OperandSize::Size8
        } else if (-(1 << 15)..(1 << 15)).contains(&value) {
            OperandSize::Size16
        } else {
            OperandSize::Size32
        }
    }

    /// Smallest size able to hold `value` as an unsigned quantity.
    pub fn smallest_unsigned(value: i64) -> Self {
        if (0..=0xff).contains(&value) {
            OperandSize::Size8
        } else if (0..=0xffff).contains(&value) {
            OperandSize::Size16
        } else {
            OperandSize::Size32
        }
    }
}
