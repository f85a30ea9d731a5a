// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crawl configuration.
//!
//! Resolved in three layers: a JSON file (`--config`), `STATEFLOW_*`
//! environment variables, then command-line flags.

use crate::condition::{CrawlCondition, ElementCondition, Invariant};
use crate::selector::{DiversityWeights, SelectionStrategy};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use stateflow::{FormInput, GraphOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a crawl needs besides the browser itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Entry URL. Reloading it must always produce the root state.
    pub url: String,
    /// Number of browsers, and so of concurrent crawlers.
    pub browsers: usize,
    /// Stop once this many states exist. 0 means unlimited.
    pub max_states: usize,
    /// Longest action chain from the root. 0 means unlimited.
    pub max_depth: usize,
    /// Wall-clock budget in seconds. 0 means unlimited.
    pub max_runtime_secs: u64,
    pub wait_after_event_ms: u64,
    pub wait_after_reload_ms: u64,
    pub page_load_timeout_ms: u64,
    /// CSS selectors of elements to fire.
    pub include_selectors: Vec<String>,
    /// CSS selectors of elements never to fire.
    pub exclude_selectors: Vec<String>,
    /// Fire each element once across all states.
    pub click_once: bool,
    /// Values filled into forms around a fired element.
    pub form_inputs: Vec<FormInput>,
    /// Regexes removed from the DOM before state comparison.
    pub strip_patterns: Vec<String>,
    pub crawl_conditions: Vec<CrawlCondition>,
    pub invariants: Vec<Invariant>,
    pub element_conditions: Vec<ElementCondition>,
    /// Guided crawling strategy. `None` runs the parallel work-queue crawl.
    pub strategy: Option<SelectionStrategy>,
    pub weights: DiversityWeights,
    /// Seed for the random strategy.
    pub seed: Option<u64>,
    /// Script returning a numeric coverage sample from the page.
    pub coverage_script: Option<String>,
    /// Claim candidates in order of past productivity.
    pub efficient_crawling: bool,
    /// Known size of the state space, for estimator reports.
    pub actual_state_space: Option<usize>,
    /// Path enumeration limits. Diversity caches are only kept for the
    /// diversity strategy, whatever `track_diversity` says.
    pub graph: GraphOptions,
    pub chromium_path: Option<PathBuf>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            browsers: 1,
            max_states: 0,
            max_depth: 0,
            max_runtime_secs: 3600,
            wait_after_event_ms: 500,
            wait_after_reload_ms: 500,
            page_load_timeout_ms: 30_000,
            include_selectors: vec![
                "a".into(),
                "button".into(),
                "input[type=submit]".into(),
                "input[type=button]".into(),
            ],
            exclude_selectors: vec!["a[href^='mailto:']".into()],
            click_once: true,
            form_inputs: Vec::new(),
            strip_patterns: Vec::new(),
            crawl_conditions: Vec::new(),
            invariants: Vec::new(),
            element_conditions: Vec::new(),
            strategy: None,
            weights: DiversityWeights::default(),
            seed: None,
            coverage_script: None,
            efficient_crawling: false,
            actual_state_space: None,
            graph: GraphOptions::default(),
            chromium_path: None,
        }
    }
}

impl CrawlConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Apply `STATEFLOW_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|k| std::env::var(k).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("STATEFLOW_MAX_STATES") {
            self.max_states = parse_var("STATEFLOW_MAX_STATES", &v)?;
        }
        if let Some(v) = var("STATEFLOW_MAX_DEPTH") {
            self.max_depth = parse_var("STATEFLOW_MAX_DEPTH", &v)?;
        }
        if let Some(v) = var("STATEFLOW_MAX_RUNTIME") {
            self.max_runtime_secs = parse_var("STATEFLOW_MAX_RUNTIME", &v)?;
        }
        if let Some(v) = var("STATEFLOW_BROWSERS") {
            self.browsers = parse_var("STATEFLOW_BROWSERS", &v)?;
        }
        if let Some(v) = var("STATEFLOW_CHROMIUM_PATH") {
            self.chromium_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("no entry URL configured");
        }
        url::Url::parse(&self.url).with_context(|| format!("invalid entry URL: {}", self.url))?;
        if self.browsers == 0 {
            bail!("at least one browser is required");
        }
        for pattern in &self.include_selectors {
            scraper::Selector::parse(pattern)
                .map_err(|e| anyhow::anyhow!("invalid include selector {pattern}: {e}"))?;
        }
        for pattern in &self.exclude_selectors {
            scraper::Selector::parse(pattern)
                .map_err(|e| anyhow::anyhow!("invalid exclude selector {pattern}: {e}"))?;
        }
        for rule in self.crawl_conditions.iter().chain(self.invariants.iter()) {
            rule.validate()
                .with_context(|| format!("condition '{}'", rule.description))?;
        }
        for ec in &self.element_conditions {
            for c in &ec.conditions {
                c.validate()?;
            }
        }
        Ok(())
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        (self.max_runtime_secs > 0).then(|| Duration::from_secs(self.max_runtime_secs))
    }

    pub fn wait_after_event(&self) -> Duration {
        Duration::from_millis(self.wait_after_event_ms)
    }

    pub fn wait_after_reload(&self) -> Duration {
        Duration::from_millis(self.wait_after_reload_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {name}={value}: {e}"))
}
