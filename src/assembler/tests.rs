// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::{assemble, Assembler, RelocationKind};
use crate::core::error::{AsmErrorKind, Diagnostic};

/// Assemble with a base of zero and expect a clean run.
fn bytes(source: &str) -> Vec<u8> {
    let mut asm = Assembler::new();
    asm.set_base_offset(0);
    let diagnostics = assemble(source, &mut asm).unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    asm.patch().unwrap();
    asm.code_bytes().unwrap()
}

fn diagnostics(source: &str) -> Vec<Diagnostic> {
    let mut asm = Assembler::new();
    asm.set_base_offset(0);
    let diagnostics = assemble(source, &mut asm).unwrap();
    assert!(!diagnostics.is_empty(), "expected a diagnostic");
    diagnostics
}

#[test]
fn mov_immediate_to_register() {
    assert_eq!(bytes("mov eax, 5"), [0xb8, 0x05, 0x00, 0x00, 0x00]);
    assert_eq!(bytes("mov eax, 70000"), [0xb8, 0x70, 0x11, 0x01, 0x00]);
    assert_eq!(bytes("mov bl, 7"), [0xb3, 0x07]);
    assert_eq!(bytes("mov al, 255"), [0xb0, 0xff]);
}

#[test]
fn mov_register_to_register_puts_destination_in_rm() {
    assert_eq!(bytes("mov eax, ebx"), [0x89, 0xd8]);
    assert_eq!(bytes("mov al, bl"), [0x88, 0xd8]);
}

#[test]
fn mov_between_register_and_memory() {
    assert_eq!(bytes("mov [ebx], eax"), [0x89, 0x03]);
    assert_eq!(bytes("mov eax, [ebx]"), [0x8b, 0x03]);
    assert_eq!(bytes("mov [ebx], 7"), [0xc7, 0x03, 0x07, 0x00, 0x00, 0x00]);
    assert_eq!(bytes("mov byte [ebx], 7"), [0xc6, 0x03, 0x07]);
}

#[test]
fn mov_rejects_oversized_immediates() {
    let diags = diagnostics("mov al, 300");
    assert_eq!(diags[0].error.kind(), AsmErrorKind::Instruction);
    assert!(diags[0].error.message().contains("does not fit"));
}

#[test]
fn alu_immediates_pick_short_form_for_signed_bytes() {
    assert_eq!(bytes("add eax, 5"), [0x83, 0xc0, 0x05]);
    assert_eq!(bytes("add eax, 300"), [0x81, 0xc0, 0x2c, 0x01, 0x00, 0x00]);
    assert_eq!(bytes("add al, 5"), [0x80, 0xc0, 0x05]);
    assert_eq!(bytes("sub esp, 16"), [0x83, 0xec, 0x10]);
    assert_eq!(bytes("cmp dword [eax], 1"), [0x83, 0x38, 0x01]);
}

#[test]
fn alu_register_forms() {
    assert_eq!(bytes("add eax, ebx"), [0x01, 0xd8]);
    assert_eq!(bytes("xor ecx, ecx"), [0x31, 0xc9]);
    assert_eq!(bytes("and al, bl"), [0x20, 0xd8]);
    assert_eq!(bytes("cmp eax, [ebx]"), [0x3b, 0x03]);
    assert_eq!(bytes("sbb [ebx], eax"), [0x19, 0x03]);
}

#[test]
fn alu_size_mismatch_is_rejected() {
    let diags = diagnostics("add eax, bl");
    assert!(diags[0].error.message().contains("size mismatch"));
}

#[test]
fn memory_addressing_modes() {
    assert_eq!(bytes("inc dword [eax]"), [0xff, 0x00]);
    assert_eq!(bytes("inc dword [eax + 4]"), [0xff, 0x40, 0x04]);
    assert_eq!(
        bytes("inc dword [eax + 300]"),
        [0xff, 0x80, 0x2c, 0x01, 0x00, 0x00]
    );
    // [ebp] has no displacement-free slot; it becomes [ebp + 0].
    assert_eq!(bytes("inc dword [ebp]"), [0xff, 0x45, 0x00]);
}

#[test]
fn sib_addressing() {
    assert_eq!(bytes("mov eax, [ebx + ecx*4]"), [0x8b, 0x04, 0x8b]);
    assert_eq!(
        bytes("mov eax, [ebx + ecx*4 + 8]"),
        [0x8b, 0x44, 0x8b, 0x08]
    );
    assert_eq!(bytes("mov eax, [ebx + ecx]"), [0x8b, 0x04, 0x0b]);
    assert_eq!(bytes("mov eax, [ebx + (ecx << 1)]"), [0x8b, 0x04, 0x4b]);
    assert_eq!(bytes("mov eax, [ebp + ecx*2]"), [0x8b, 0x44, 0x4d, 0x00]);
}

#[test]
fn unary_group() {
    assert_eq!(bytes("not eax"), [0xf7, 0xd0]);
    assert_eq!(bytes("neg byte [eax]"), [0xf6, 0x18]);
    assert_eq!(bytes("inc eax"), [0xff, 0xc0]);
    assert_eq!(bytes("dec dl"), [0xfe, 0xca]);
    assert_eq!(bytes("mul ebx"), [0xf7, 0xe3]);
    assert_eq!(bytes("idiv ecx"), [0xf7, 0xf9]);
}

#[test]
fn unary_rejects_immediates() {
    let diags = diagnostics("neg 5");
    assert!(diags[0].error.message().contains("immediate"));
}

#[test]
fn set_condition_bytes() {
    assert_eq!(bytes("setz al"), [0x0f, 0x94, 0xc0]);
    assert_eq!(bytes("setg byte [ebx]"), [0x0f, 0x9f, 0x03]);
    // Uncast memory is byte here; a wider cast is a contradiction.
    assert_eq!(bytes("setz [ebx]"), [0x0f, 0x94, 0x03]);
    let diags = diagnostics("setz eax\nsetnz dword [ebx]\n");
    assert!(diags[0].error.message().contains("byte"));
    assert!(diags[1].error.message().contains("byte"));
}

#[test]
fn shift_forms() {
    assert_eq!(bytes("shl eax, 1"), [0xd1, 0xe0]);
    assert_eq!(bytes("shl eax, 4"), [0xc1, 0xe0, 0x04]);
    assert_eq!(bytes("shr ebx, cl"), [0xd3, 0xeb]);
    assert_eq!(bytes("sar edx, 1"), [0xd1, 0xfa]);
    // Counts wrap modulo 32, like the hardware.
    assert_eq!(bytes("shl eax, 33"), [0xd1, 0xe0]);
}

#[test]
fn test_instruction_forms() {
    assert_eq!(bytes("test al, 1"), [0xa8, 0x01]);
    assert_eq!(bytes("test ebx, 5"), [0xf7, 0xc3, 0x05, 0x00, 0x00, 0x00]);
    assert_eq!(bytes("test eax, ebx"), [0x85, 0xc3]);
}

#[test]
fn xchg_has_no_direction() {
    assert_eq!(bytes("xchg eax, ebx"), [0x87, 0xc3]);
    assert_eq!(bytes("xchg [ebx], eax"), [0x87, 0x03]);
    assert_eq!(bytes("xchg eax, [ebx]"), [0x87, 0x03]);
}

#[test]
fn lea_needs_register_and_memory() {
    assert_eq!(bytes("lea eax, [ebx + 4]"), [0x8d, 0x43, 0x04]);
    assert_eq!(
        bytes("lea edx, [ebx + ecx*4]"),
        [0x8d, 0x14, 0x8b]
    );
    assert!(diagnostics("lea eax, ebx")[0]
        .error
        .message()
        .contains("memory"));
}

#[test]
fn widening_moves() {
    assert_eq!(bytes("movzx eax, bl"), [0x0f, 0xb6, 0xc3]);
    assert_eq!(bytes("movsx eax, bx"), [0x0f, 0xbf, 0xc3]);
    assert_eq!(bytes("movzx eax, byte [esi]"), [0x0f, 0xb6, 0x06]);
    // A bare memory source defaults to dword, which cannot widen.
    assert!(diagnostics("movzx eax, [esi]")[0]
        .error
        .message()
        .contains("size"));
}

#[test]
fn imul_forms() {
    assert_eq!(bytes("imul ebx"), [0xf7, 0xeb]);
    assert_eq!(bytes("imul eax, ebx"), [0x0f, 0xaf, 0xc3]);
    assert_eq!(bytes("imul eax, ebx, 3"), [0x6b, 0xc3, 0x03]);
    assert_eq!(
        bytes("imul eax, 300"),
        [0x69, 0xc0, 0x2c, 0x01, 0x00, 0x00]
    );
}

#[test]
fn stack_operations() {
    assert_eq!(bytes("push eax"), [0x50]);
    assert_eq!(bytes("push ebp"), [0x55]);
    assert_eq!(bytes("pop edi"), [0x5f]);
    assert_eq!(bytes("push dword [eax]"), [0xff, 0x30]);
    assert_eq!(bytes("pop dword [ebx]"), [0x8f, 0x03]);
    assert_eq!(bytes("push 5"), [0x6a, 0x05]);
    assert_eq!(bytes("push 300"), [0x68, 0x2c, 0x01, 0x00, 0x00]);
}

#[test]
fn interrupts_and_frames() {
    assert_eq!(bytes("int 128"), [0xcd, 0x80]);
    assert!(diagnostics("int 256")[0].error.message().contains("byte"));
    assert_eq!(bytes("enter 16"), [0xc8, 0x10, 0x00, 0x00]);
    assert_eq!(bytes("enter 16, 1"), [0xc8, 0x10, 0x00, 0x01]);
    assert_eq!(bytes("leave"), [0xc9]);
}

#[test]
fn returns() {
    assert_eq!(bytes("ret"), [0xc3]);
    assert_eq!(bytes("ret 8"), [0xc2, 0x08, 0x00]);
    // A zero pop count degenerates to the plain form.
    assert_eq!(bytes("ret 0"), [0xc3]);
}

#[test]
fn simple_opcodes() {
    assert_eq!(bytes("nop"), [0x90]);
    assert_eq!(bytes("pause"), [0xf3, 0x90]);
    assert_eq!(bytes("clts"), [0x0f, 0x06]);
    assert_eq!(bytes("pusha\npopa"), [0x60, 0x61]);
}

#[test]
fn backward_jump_is_short() {
    assert_eq!(bytes("start: nop\njmp start"), [0x90, 0xeb, 0xfd]);
}

#[test]
fn forward_jump_reserves_short_form() {
    assert_eq!(bytes("jmp done\nnop\ndone: ret"), [0xeb, 0x01, 0x90, 0xc3]);
}

#[test]
fn numeric_jump_boundary() {
    assert_eq!(bytes("jmp 129"), [0xeb, 0x7f]);
    assert_eq!(bytes("jmp 130"), [0xe9, 0x7d, 0x00, 0x00, 0x00]);
}

#[test]
fn conditional_jumps() {
    assert_eq!(bytes("loop_top: dec eax\njnz loop_top"), [0xff, 0xc8, 0x75, 0xfc]);
    assert_eq!(bytes("jz 300"), [0x0f, 0x84, 0x26, 0x01, 0x00, 0x00]);
}

#[test]
fn forward_jump_out_of_range_fails_in_patch() {
    let mut asm = Assembler::new();
    asm.set_base_offset(0);
    let source = "jmp far_away\n.byte array 200 0\nfar_away: ret\n";
    let diags = assemble(source, &mut asm).unwrap();
    assert!(diags.is_empty());
    let err = asm.patch().unwrap_err();
    assert!(err.message().contains("out of range"));
}

#[test]
fn indirect_jump_and_call() {
    assert_eq!(bytes("jmp eax"), [0xff, 0xe0]);
    assert_eq!(bytes("jmp [eax]"), [0xff, 0x20]);
    assert_eq!(bytes("call ebx"), [0xff, 0xd3]);
}

#[test]
fn call_is_always_near_relative() {
    assert_eq!(
        bytes("f: ret\ncall f"),
        [0xc3, 0xe8, 0xfa, 0xff, 0xff, 0xff]
    );
}

#[test]
fn external_calls_emit_relative_relocations() {
    let mut asm = Assembler::new();
    let diags = assemble(".extern puts\ncall puts\n", &mut asm).unwrap();
    assert!(diags.is_empty());
    asm.patch().unwrap();
    assert_eq!(asm.code_bytes().unwrap(), [0xe8, 0x00, 0x00, 0x00, 0x00]);
    let relocs = asm.relocations();
    assert_eq!(relocs.len(), 1);
    assert_eq!(relocs[0].offset, 1);
    assert_eq!(relocs[0].symbol, "puts");
    assert_eq!(relocs[0].kind, RelocationKind::Relative);
    assert_eq!(relocs[0].width, 4);
}

#[test]
fn jump_to_external_takes_the_long_form() {
    let mut asm = Assembler::new();
    let diags = assemble(".extern exit_stub\njmp exit_stub\n", &mut asm).unwrap();
    assert!(diags.is_empty());
    asm.patch().unwrap();
    assert_eq!(asm.code_bytes().unwrap(), [0xe9, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(asm.relocations()[0].kind, RelocationKind::Relative);
}

#[test]
fn data_directives_emit_little_endian() {
    assert_eq!(bytes(".byte 1, 2, 3"), [1, 2, 3]);
    assert_eq!(bytes(".word 258"), [0x02, 0x01]);
    assert_eq!(bytes(".dword 1"), [0x01, 0x00, 0x00, 0x00]);
    assert_eq!(bytes(".byte array 4 255"), [0xff, 0xff, 0xff, 0xff]);
}

#[test]
fn string_literals_expand_to_bytes() {
    assert_eq!(bytes(".byte \"Hi\\0\""), [0x48, 0x69, 0x00]);
    assert_eq!(bytes("push \"A\""), [0x6a, 0x41]);
}

#[test]
fn label_addresses_resolve_against_the_base() {
    assert_eq!(
        bytes(".dword msg\nmsg: nop"),
        [0x04, 0x00, 0x00, 0x00, 0x90]
    );
    let mut asm = Assembler::new();
    asm.set_base_offset(0x100);
    let diags = assemble("mov eax, msg\nmsg: ret\n", &mut asm).unwrap();
    assert!(diags.is_empty());
    asm.patch().unwrap();
    assert_eq!(
        asm.code_bytes().unwrap(),
        [0xb8, 0x05, 0x01, 0x00, 0x00, 0xc3]
    );
}

#[test]
fn absolute_references_without_a_base_become_relocations() {
    let mut asm = Assembler::new();
    let diags = assemble(".dword msg\nmsg: nop\n", &mut asm).unwrap();
    assert!(diags.is_empty());
    asm.patch().unwrap();
    // Local offset stays in the field as the addend.
    assert_eq!(asm.code_bytes().unwrap(), [0x04, 0x00, 0x00, 0x00, 0x90]);
    let relocs = asm.relocations();
    assert_eq!(relocs.len(), 1);
    assert_eq!(relocs[0].kind, RelocationKind::Absolute);
    assert_eq!(relocs[0].offset, 0);
}

#[test]
fn object_mode_relocates_even_with_a_base() {
    let mut asm = Assembler::new();
    asm.set_base_offset(0x100);
    asm.set_relocate_absolutes(false);
    let diags = assemble(".dword msg\nmsg: nop\n", &mut asm).unwrap();
    assert!(diags.is_empty());
    asm.patch().unwrap();
    assert_eq!(asm.relocations().len(), 1);
    assert_eq!(asm.code_bytes().unwrap(), [0x04, 0x00, 0x00, 0x00, 0x90]);
}

#[test]
fn patch_is_idempotent() {
    let mut asm = Assembler::new();
    let diags = assemble(".extern puts\ncall puts\n", &mut asm).unwrap();
    assert!(diags.is_empty());
    asm.patch().unwrap();
    let first = asm.code_bytes().unwrap();
    asm.patch().unwrap();
    assert_eq!(asm.code_bytes().unwrap(), first);
    assert_eq!(asm.relocations().len(), 1);
}

#[test]
fn double_definition_is_a_symbol_error() {
    let diags = diagnostics("twice: nop\ntwice: nop");
    assert_eq!(diags[0].error.kind(), AsmErrorKind::Symbol);
    assert_eq!(diags[0].line, 2);
}

#[test]
fn extern_after_local_use_is_rejected() {
    let diags = diagnostics("jmp helper\n.extern helper\nhelper: ret");
    assert_eq!(diags[0].error.kind(), AsmErrorKind::Symbol);
}

#[test]
fn globl_marks_a_symbol_public() {
    let mut asm = Assembler::new();
    asm.set_base_offset(0);
    let diags = assemble(".globl main\nmain: ret\n", &mut asm).unwrap();
    assert!(diags.is_empty());
    let main = asm.symbol("main").unwrap();
    assert!(main.is_public());
    assert_eq!(main.offset(), Some(0));
}

#[test]
fn undefined_relative_reference_is_fatal_in_patch() {
    let mut asm = Assembler::new();
    asm.set_base_offset(0);
    let diags = assemble("jmp nowhere\n", &mut asm).unwrap();
    assert!(diags.is_empty());
    let err = asm.patch().unwrap_err();
    assert!(err.message().contains("never defined"));
}

#[test]
fn failed_statements_contribute_no_bytes() {
    let mut asm = Assembler::new();
    asm.set_base_offset(0);
    let diags = assemble("add eax, ebx, ecx\nret\n", &mut asm).unwrap();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].line, 1);
    asm.patch().unwrap();
    assert_eq!(asm.code_bytes().unwrap(), [0xc3]);
}

#[test]
fn constant_expressions_fold_in_operands() {
    assert_eq!(bytes("mov eax, 2 + 3 * 4"), [0xb8, 0x0e, 0x00, 0x00, 0x00]);
    assert_eq!(bytes("push (1 | 2)"), [0x6a, 0x03]);
    assert_eq!(bytes("push 1 << 4"), [0x6a, 0x10]);
}

#[test]
fn division_by_zero_is_reported_per_line() {
    let diags = diagnostics("mov eax, 10 / 0\nret");
    assert_eq!(diags[0].error.kind(), AsmErrorKind::Expression);
    assert_eq!(diags[0].line, 1);
}

#[test]
fn unknown_mnemonics_are_reported() {
    let diags = diagnostics("fadd st0");
    assert!(diags[0].error.message().contains("fadd"));
}

#[test]
fn segment_registers_are_rejected_in_instructions() {
    let diags = diagnostics("mov ds, eax");
    assert!(diags[0].error.message().contains("Segment register"));
}

#[test]
fn comments_and_blank_lines_are_ignored() {
    assert_eq!(bytes("; top comment\nnop ; inline\n\nret\n"), [0x90, 0xc3]);
}

#[test]
fn trailing_comment_does_not_join_statements() {
    // The line after a commented statement must parse on its own.
    assert_eq!(bytes("nop ; first\nret"), [0x90, 0xc3]);
    assert_eq!(
        bytes("start: ; entry\n    mov eax, 1\n    jmp start ; again\n    ret\n"),
        [0xb8, 0x01, 0x00, 0x00, 0x00, 0xeb, 0xf9, 0xc3]
    );
}

#[test]
fn diagnostics_come_out_in_source_order() {
    let diags = diagnostics("mov eax, [esp]\nnop\nbad: : :\nmov al, 70000\n");
    let lines: Vec<u32> = diags.iter().map(|diag| diag.line).collect();
    assert_eq!(lines, [1, 3, 4]);
}
