// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for forge86.

use std::fs;
use std::io::{self, BufRead, IsTerminal};
use std::process::ExitCode;

use clap::Parser;
use serde_json::json;

use forge86::assembler::cli::{parse_base, Cli, OutputFormat, VERSION};
use forge86::assembler::{assemble, output, Assembler};
use forge86::core::error::{AsmError, AsmErrorKind, Diagnostic};
use forge86::core::{lexer, parser};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<bool, AsmError> {
    let mut asm = Assembler::new();
    match parse_base(cli.base.as_deref())? {
        Some(base) => asm.set_base_offset(base),
        // A flat binary without an explicit base loads at zero.
        None if cli.bin.is_some() => asm.set_base_offset(0),
        None => {}
    }
    if cli.obj.is_some() {
        asm.set_relocate_absolutes(false);
    }

    let interactive = cli.repl || (cli.input.is_none() && io::stdin().is_terminal());
    let (diagnostics, already_reported) = if interactive {
        (run_repl(cli, &mut asm)?, true)
    } else {
        let source = read_source(cli)?;
        (assemble(&source, &mut asm)?, false)
    };
    finalize(cli, &mut asm, diagnostics, already_reported)
}

fn read_source(cli: &Cli) -> Result<String, AsmError> {
    match &cli.input {
        Some(path) => fs::read_to_string(path).map_err(|err| {
            AsmError::new(AsmErrorKind::Io, format!("Cannot read '{path}': {err}."))
        }),
        None => io::read_to_string(io::stdin()).map_err(|err| {
            AsmError::new(AsmErrorKind::Io, format!("Cannot read standard input: {err}."))
        }),
    }
}

/// Line-at-a-time interactive session. Each successful line prints the
/// bytes it produced, with `??` standing in for unresolved references.
fn run_repl(cli: &Cli, asm: &mut Assembler) -> Result<Vec<Diagnostic>, AsmError> {
    println!("forge86 {VERSION} interactive session; end input to assemble the unit.");
    let stdin = io::stdin();
    let mut diagnostics = Vec::new();
    let mut line_no: u32 = 0;
    for line in stdin.lock().lines() {
        let line = line.map_err(|err| {
            AsmError::new(AsmErrorKind::Io, format!("Cannot read standard input: {err}."))
        })?;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let tokens = match lexer::lex(&line) {
            Ok(tokens) => tokens,
            Err(error) => {
                let diagnostic = Diagnostic::error(line_no, error);
                eprintln!("{}", diagnostic.render_text());
                diagnostics.push(diagnostic);
                continue;
            }
        };
        if cli.debug {
            let texts: Vec<&str> = tokens
                .iter()
                .filter(|token| !token.is_trivia())
                .map(|token| token.text.as_str())
                .collect();
            println!("tokens: {texts:?}");
        }
        let statements = match parser::parse_line(&tokens) {
            Ok(statements) => statements,
            Err(error) => {
                let diagnostic = Diagnostic::error(line_no, error);
                eprintln!("{}", diagnostic.render_text());
                diagnostics.push(diagnostic);
                continue;
            }
        };
        if cli.debug {
            println!("parsed: {statements:?}");
        }
        let mark = asm.slot_count();
        let mut failed = false;
        for statement in &statements {
            if let Err(error) = asm.process(statement) {
                let diagnostic = Diagnostic::error(line_no, error);
                eprintln!("{}", diagnostic.render_text());
                diagnostics.push(diagnostic);
                failed = true;
                break;
            }
        }
        if !failed && asm.slot_count() > mark {
            println!("{}", output::render_slots(&asm.slots()[mark..]));
        }
    }
    Ok(diagnostics)
}

/// Patch the unit, report diagnostics, and write the requested outputs.
fn finalize(
    cli: &Cli,
    asm: &mut Assembler,
    diagnostics: Vec<Diagnostic>,
    already_reported: bool,
) -> Result<bool, AsmError> {
    let mut unit_errors = Vec::new();
    if let Err(error) = asm.patch() {
        unit_errors.push(error);
    }
    let ok = diagnostics.iter().all(|diag| !diag.is_error()) && unit_errors.is_empty();

    match cli.format {
        OutputFormat::Text => {
            if !already_reported {
                for diagnostic in &diagnostics {
                    eprintln!("{}", diagnostic.render_text());
                }
            }
            for error in &unit_errors {
                eprintln!("error: {error}");
            }
            if ok && !cli.quiet {
                println!("{}", output::hex_dump(&asm.code_bytes()?));
            }
        }
        OutputFormat::Json => {
            let mut entries: Vec<serde_json::Value> =
                diagnostics.iter().map(Diagnostic::render_json).collect();
            entries.extend(unit_errors.iter().map(|error| {
                json!({
                    "line": serde_json::Value::Null,
                    "column": serde_json::Value::Null,
                    "severity": "error",
                    "kind": error.kind().label(),
                    "message": error.message(),
                })
            }));
            let code = if ok {
                serde_json::Value::String(output::hex_string(&asm.code_bytes()?))
            } else {
                serde_json::Value::Null
            };
            println!("{}", json!({ "diagnostics": entries, "code": code }));
        }
    }

    if ok {
        if let Some(path) = &cli.bin {
            let image = output::flat_binary(asm)?;
            fs::write(path, image).map_err(|err| write_error(path, err))?;
        }
        if let Some(path) = &cli.obj {
            let payload = output::object_payload(asm)?;
            let mut text = serde_json::to_string_pretty(&payload).map_err(|err| {
                AsmError::new(AsmErrorKind::Io, format!("Cannot serialize object unit: {err}."))
            })?;
            text.push('\n');
            fs::write(path, text).map_err(|err| write_error(path, err))?;
        }
    }
    Ok(ok)
}

fn write_error(path: &str, err: io::Error) -> AsmError {
    AsmError::new(AsmErrorKind::Io, format!("Cannot write '{path}': {err}."))
}
