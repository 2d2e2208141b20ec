// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Output rendering: hex dumps, flat binaries, and the JSON object unit.

use serde_json::json;

use crate::core::error::AsmError;
use crate::x86::encoding::OperandSize;

use super::{Assembler, Slot};

/// Brace-wrapped hex dump, two uppercase digits per byte.
pub fn hex_dump(bytes: &[u8]) -> String {
    let cells: Vec<String> = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
    format!("{{ {} }}", cells.join(", "))
}

/// Hex dump of a slot range; pending slots show as `??` per byte.
pub fn render_slots(slots: &[Slot]) -> String {
    let mut cells = Vec::new();
    for slot in slots {
        match slot {
            Slot::Literal(byte) => cells.push(format!("{byte:02X}")),
            Slot::Pending { width, .. } => {
                for _ in 0..*width {
                    cells.push("??".to_string());
                }
            }
        }
    }
    format!("{{ {} }}", cells.join(", "))
}

/// Contiguous lowercase hex, two digits per byte.
pub fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// The flat binary image. A unit whose public `main` sits past offset zero
/// gets a jump to it prepended, so execution can start at the first byte.
pub fn flat_binary(asm: &Assembler) -> Result<Vec<u8>, AsmError> {
    let code = asm.code_bytes()?;
    match asm.entry_point() {
        Some(entry) if entry != 0 => {
            let mut image = Vec::with_capacity(code.len() + 5);
            image.push(0xe9);
            image.extend(OperandSize::Size32.encode(entry));
            image.extend(code);
            Ok(image)
        }
        _ => Ok(code),
    }
}

/// The relocatable object unit as a JSON document: code bytes, the symbol
/// table in first-mention order, and relocation records.
pub fn object_payload(asm: &Assembler) -> Result<serde_json::Value, AsmError> {
    let code = asm.code_bytes()?;
    let symbols: Vec<serde_json::Value> = asm
        .symbols()
        .map(|symbol| {
            json!({
                "name": symbol.name(),
                "offset": symbol.offset(),
                "public": symbol.is_public(),
                "external": symbol.is_external(),
            })
        })
        .collect();
    let relocations: Vec<serde_json::Value> = asm
        .relocations()
        .iter()
        .map(|reloc| {
            json!({
                "offset": reloc.offset,
                "symbol": reloc.symbol,
                "kind": reloc.kind.label(),
                "width": reloc.width,
            })
        })
        .collect();
    Ok(json!({
        "code": hex_string(&code),
        "symbols": symbols,
        "relocations": relocations,
    }))
}
