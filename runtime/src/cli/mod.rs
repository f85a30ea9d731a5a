// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the `stateflow` binary.

pub mod crawl_cmd;
pub mod output;

/// Install the global tracing subscriber. Logs go to stderr so `--json`
/// output on stdout stays machine-readable.
pub fn init_tracing(verbose: bool, log_json: bool) {
    let default = if verbose { "stateflow=debug,stateflow_runtime=debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("STATEFLOW_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}
