// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! `stateflow crawl <url>`: explore a web application's state space.

use crate::cli::output;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use stateflow_runtime::config::CrawlConfig;
use stateflow_runtime::controller::CrawlController;
use stateflow_runtime::events::{CrawlEvent, EventBus};
use stateflow_runtime::renderer::chromium::ChromiumRenderer;
use stateflow_runtime::selector::SelectionStrategy;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Flags of the crawl command. Each one overrides the config file and the
/// environment.
#[derive(Debug, Default)]
pub struct CrawlArgs {
    pub url: String,
    pub config: Option<PathBuf>,
    pub max_states: Option<usize>,
    pub max_depth: Option<usize>,
    pub max_runtime: Option<u64>,
    pub browsers: Option<usize>,
    pub strategy: Option<SelectionStrategy>,
    pub output: Option<PathBuf>,
    pub stats_file: Option<PathBuf>,
    pub seed: Option<u64>,
}

/// Config file, then `STATEFLOW_*` variables, then flags.
pub fn resolve_config(args: &CrawlArgs) -> Result<CrawlConfig> {
    let mut config = match &args.config {
        Some(path) => CrawlConfig::load(path)?,
        None => CrawlConfig::default(),
    };
    config.apply_env()?;
    config.url = args.url.clone();
    if let Some(n) = args.max_states {
        config.max_states = n;
    }
    if let Some(n) = args.max_depth {
        config.max_depth = n;
    }
    if let Some(secs) = args.max_runtime {
        config.max_runtime_secs = secs;
    }
    if let Some(n) = args.browsers {
        config.browsers = n;
    }
    if args.strategy.is_some() {
        config.strategy = args.strategy;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;
    Ok(config)
}

/// Run the crawl command.
pub async fn run(args: CrawlArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let renderer = ChromiumRenderer::new(config.chromium_path.clone())
        .await
        .context("failed to launch Chromium (run with STATEFLOW_CHROMIUM_PATH set?)")?;

    let events = Arc::new(EventBus::default());
    let mut controller = CrawlController::new(config, Arc::new(renderer))?.with_events(Arc::clone(&events));
    if let Some(path) = &args.stats_file {
        controller = controller.with_stats_file(path.clone());
    }

    let progress = (!output::is_quiet() && !output::is_json()).then(|| spinner(&events));
    let result = controller.run().await;
    if let Some((bar, listener)) = progress {
        listener.abort();
        bar.finish_and_clear();
    }
    let report = result?;

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&report.graph.snapshot())?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write graph to {}", path.display()))?;
    }

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "stats": report.stats,
            "termination": report.termination,
            "paths": report.paths,
        }));
        return Ok(());
    }
    if !output::is_quiet() {
        eprintln!();
        for line in report.stats.lines() {
            eprintln!("  {line}");
        }
        if let Some(path) = &args.output {
            eprintln!("  Graph written to {}", path.display());
        }
    }
    Ok(())
}

/// Spinner fed by crawl events.
fn spinner(events: &EventBus) -> (ProgressBar, tokio::task::JoinHandle<()>) {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("  {spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message("loading entry URL");

    let mut rx = events.subscribe();
    let handle = {
        let bar = bar.clone();
        tokio::spawn(async move {
            let mut states = 1usize;
            let mut fired = 0usize;
            loop {
                match rx.recv().await {
                    Ok(CrawlEvent::StateDiscovered { .. }) => states += 1,
                    Ok(CrawlEvent::ActionFired { .. }) => fired += 1,
                    Ok(CrawlEvent::ConstraintReached { constraint }) => {
                        bar.println(format!("  {constraint}"));
                    }
                    Ok(CrawlEvent::CrawlComplete { .. }) | Err(RecvError::Closed) => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                }
                bar.set_message(format!("{states} states, {fired} events fired"));
            }
        })
    };
    (bar, handle)
}
