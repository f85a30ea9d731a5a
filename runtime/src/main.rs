// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use stateflow_runtime::selector::SelectionStrategy;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(
    name = "stateflow",
    about = "Stateflow: explore the state space of a web application",
    version,
    after_help = "Run 'stateflow <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a web application from its entry URL
    Crawl {
        /// Entry URL; reloading it must always show the same initial state
        url: String,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop after this many states (0 = unlimited)
        #[arg(long)]
        max_states: Option<usize>,
        /// Longest action chain from the entry URL (0 = unlimited)
        #[arg(long)]
        max_depth: Option<usize>,
        /// Time budget in seconds (0 = unlimited)
        #[arg(long)]
        max_runtime: Option<u64>,
        /// Number of browsers crawling in parallel
        #[arg(long)]
        browsers: Option<usize>,
        /// Pick states with a selection strategy instead of parallel branching
        #[arg(long, value_enum)]
        strategy: Option<SelectionStrategy>,
        /// Write the state-flow graph as JSON
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Append run statistics to this file
        #[arg(long)]
        stats_file: Option<PathBuf>,
        /// Seed for the random strategy
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("STATEFLOW_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("STATEFLOW_QUIET", "1");
    }
    cli::init_tracing(cli.verbose, cli.log_json);

    let result = match cli.command {
        Commands::Crawl {
            url,
            config,
            max_states,
            max_depth,
            max_runtime,
            browsers,
            strategy,
            output,
            stats_file,
            seed,
        } => {
            cli::crawl_cmd::run(cli::crawl_cmd::CrawlArgs {
                url,
                config,
                max_states,
                max_depth,
                max_runtime,
                browsers,
                strategy,
                output,
                stats_file,
                seed,
            })
            .await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "stateflow", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
