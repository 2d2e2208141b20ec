// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use clap::{ArgAction, Parser, ValueEnum};

use crate::core::error::{AsmError, AsmErrorKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "32-bit x86 assembler producing relocatable units.

Reads one source file (or standard input) and assembles it into bytes,
symbols, and relocation records. Without a FILE on a terminal the assembler
starts an interactive session that assembles each line as it is entered.
Use -b/--bin for a flat binary image, --obj for a JSON object unit, and
--base to place the unit at a load address.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "forge86",
    version = VERSION,
    about = "32-bit x86 assembler producing relocatable units",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        value_name = "FILE",
        long_help = "Assembly source file. When omitted, source is read from standard input; on a terminal this starts the interactive session instead."
    )]
    pub input: Option<String>,
    #[arg(
        short = 'b',
        long = "bin",
        value_name = "FILE",
        long_help = "Write a flat binary image to FILE. If the unit exports a `main` entry point past offset zero, a jump to it is prepended."
    )]
    pub bin: Option<String>,
    #[arg(
        long = "obj",
        value_name = "FILE",
        long_help = "Write a relocatable JSON object unit to FILE. Absolute references stay as relocation records instead of resolving in place."
    )]
    pub obj: Option<String>,
    #[arg(
        long = "base",
        value_name = "HEX",
        long_help = "Load address of the unit, in hexadecimal (a 0x prefix is accepted). Absolute references to local symbols resolve in place against it."
    )]
    pub base: Option<String>,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select diagnostic output format. text is default; json emits one machine-readable document."
    )]
    pub format: OutputFormat,
    #[arg(
        short = 'd',
        long = "debug",
        action = ArgAction::SetTrue,
        long_help = "In the interactive session, also print the tokens and parsed statements for each line."
    )]
    pub debug: bool,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress the hex dump for successful runs. Diagnostics are still reported."
    )]
    pub quiet: bool,
    #[arg(
        long = "repl",
        action = ArgAction::SetTrue,
        conflicts_with = "input",
        long_help = "Force the interactive session even when standard input is not a terminal."
    )]
    pub repl: bool,
}

/// Parse the --base argument as a hexadecimal load address.
pub fn parse_base(base: Option<&str>) -> Result<Option<i64>, AsmError> {
    let Some(text) = base else {
        return Ok(None);
    };
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let value = i64::from_str_radix(digits, 16).map_err(|_| {
        AsmError::new(
            AsmErrorKind::Cli,
            format!("Invalid base address '{text}': expected a hexadecimal value."),
        )
    })?;
    if !(0..=0xffff_ffff).contains(&value) {
        return Err(AsmError::new(
            AsmErrorKind::Cli,
            format!("Base address '{text}' does not fit in 32 bits."),
        ));
    }
    Ok(Some(value))
}
