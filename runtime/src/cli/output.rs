// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Output mode flags shared by every command.
//!
//! `main` exports the global `--json` and `--quiet` flags as environment
//! variables so commands can check them without threading arguments.

pub fn is_json() -> bool {
    std::env::var_os("STATEFLOW_JSON").is_some()
}

pub fn is_quiet() -> bool {
    std::env::var_os("STATEFLOW_QUIET").is_some()
}

/// Print a value as pretty JSON on stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}
