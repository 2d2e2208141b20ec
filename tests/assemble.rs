// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! End-to-end assembly of small programs through the library API.

use forge86::assembler::{assemble, output, Assembler, RelocationKind};

fn assemble_at(source: &str, base: i64) -> Assembler {
    let mut asm = Assembler::new();
    asm.set_base_offset(base);
    let diagnostics = assemble(source, &mut asm).unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    asm.patch().unwrap();
    asm
}

#[test]
fn countdown_loop_assembles_to_the_expected_image() {
    let source = "\
.globl main
main:
    mov ecx, 5
loop_top:
    dec ecx
    jnz loop_top
    ret
";
    let asm = assemble_at(source, 0);
    assert_eq!(
        asm.code_bytes().unwrap(),
        [
            0xb9, 0x05, 0x00, 0x00, 0x00, // mov ecx, 5
            0xff, 0xc9, // dec ecx
            0x75, 0xfc, // jnz loop_top
            0xc3, // ret
        ]
    );
    // main is at offset zero, so no entry jump is prepended.
    assert_eq!(output::flat_binary(&asm).unwrap(), asm.code_bytes().unwrap());
}

#[test]
fn data_and_code_share_one_address_space() {
    let source = "\
message:
    .byte \"Hi\\0\"
read_first:
    movzx eax, byte [esi]
    ret
";
    let asm = assemble_at(source, 0);
    assert_eq!(
        asm.code_bytes().unwrap(),
        [0x48, 0x69, 0x00, 0x0f, 0xb6, 0x06, 0xc3]
    );
    assert_eq!(asm.defined_local_offset("read_first"), Some(3));
}

#[test]
fn entry_jump_is_prepended_when_main_is_not_first() {
    let source = "\
helper:
    inc eax
    ret
.globl main
main:
    call helper
    ret
";
    let asm = assemble_at(source, 0);
    let image = output::flat_binary(&asm).unwrap();
    assert_eq!(image[0], 0xe9);
    assert_eq!(&image[1..5], &3i32.to_le_bytes());
    // call helper: anchor is offset 8, helper at 0.
    assert_eq!(&image[5..], &[0xff, 0xc0, 0xc3, 0xe8, 0xf8, 0xff, 0xff, 0xff, 0xc3]);
}

#[test]
fn object_unit_round_trips_through_json() {
    let source = "\
.extern putchar
.globl main
main:
    push 65
    call putchar
    add esp, 4
    ret
table:
    .dword main
";
    let mut asm = Assembler::new();
    asm.set_relocate_absolutes(false);
    let diagnostics = assemble(source, &mut asm).unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    asm.patch().unwrap();

    let payload = output::object_payload(&asm).unwrap();
    let symbols = payload["symbols"].as_array().unwrap();
    let names: Vec<&str> = symbols
        .iter()
        .map(|symbol| symbol["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["putchar", "main", "table"]);
    assert_eq!(symbols[0]["external"], true);
    assert_eq!(symbols[1]["public"], true);

    let relocations = payload["relocations"].as_array().unwrap();
    assert_eq!(relocations.len(), 2);
    assert_eq!(relocations[0]["symbol"], "putchar");
    assert_eq!(relocations[0]["kind"], "relative");
    assert_eq!(relocations[1]["symbol"], "main");
    assert_eq!(relocations[1]["kind"], "absolute");
}

#[test]
fn base_offset_shifts_absolute_references_only() {
    let source = "\
start:
    mov eax, data
    jmp start
data:
    .dword 7
";
    let low = assemble_at(source, 0);
    let high = assemble_at(source, 0x1000);
    let low_bytes = low.code_bytes().unwrap();
    let high_bytes = high.code_bytes().unwrap();
    // mov eax, data picks up the base.
    assert_eq!(&low_bytes[1..5], &7i32.to_le_bytes());
    assert_eq!(&high_bytes[1..5], &0x1007i32.to_le_bytes());
    // The relative jump does not.
    assert_eq!(low_bytes[5..], high_bytes[5..]);
}

#[test]
fn errors_leave_the_remaining_program_intact() {
    let source = "\
mov eax, [esp + 4]
nop
badness: : :
ret
";
    let mut asm = Assembler::new();
    asm.set_base_offset(0);
    let diagnostics = assemble(source, &mut asm).unwrap();
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0].line, 1);
    assert_eq!(diagnostics[1].line, 3);
    asm.patch().unwrap();
    assert_eq!(asm.code_bytes().unwrap(), [0x90, 0xc3]);
}

#[test]
fn relative_relocation_width_matches_the_field() {
    let mut asm = Assembler::new();
    let diagnostics = assemble(".extern stop\njz stop\n", &mut asm).unwrap();
    assert!(diagnostics.is_empty());
    asm.patch().unwrap();
    // External conditional jumps take the six-byte long form.
    assert_eq!(
        asm.code_bytes().unwrap(),
        [0x0f, 0x84, 0x00, 0x00, 0x00, 0x00]
    );
    let reloc = &asm.relocations()[0];
    assert_eq!(reloc.offset, 2);
    assert_eq!(reloc.width, 4);
    assert_eq!(reloc.kind, RelocationKind::Relative);
}
