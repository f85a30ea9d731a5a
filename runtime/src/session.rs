// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crawl paths and the session shared by every crawler of one run.

use crate::config::CrawlConfig;
use crate::constraints::ConstraintViolation;
use crate::coverage::CoverageProbe;
use crate::events::{CrawlEvent, EventBus};
use crate::extraction::CandidateExtractor;
use crate::productivity::EventProductivity;
use crate::strip::DomStripper;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use stateflow::{Eventable, StateFlowGraph, StateId};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Ordered actions fired since the last reload of the entry URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrawlPath(Vec<Eventable>);

impl CrawlPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Eventable) {
        self.0.push(action);
    }

    pub fn pop(&mut self) -> Option<Eventable> {
        self.0.pop()
    }

    pub fn last_mut(&mut self) -> Option<&mut Eventable> {
        self.0.last_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn actions(&self) -> &[Eventable] {
        &self.0
    }

    /// Copy of this path without its final action.
    pub fn without_last(&self) -> CrawlPath {
        let mut copy = self.0.clone();
        copy.pop();
        CrawlPath(copy)
    }
}

impl From<Vec<Eventable>> for CrawlPath {
    fn from(actions: Vec<Eventable>) -> Self {
        Self(actions)
    }
}

impl fmt::Display for CrawlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(Eventable::name).collect();
        f.write_str(&names.join(" -> "))
    }
}

/// Pluggable pieces of a crawl.
#[derive(Clone)]
pub struct CrawlPlugins {
    pub extractor: Arc<dyn CandidateExtractor>,
    pub stripper: Arc<dyn DomStripper>,
    pub coverage: Option<Arc<dyn CoverageProbe>>,
}

/// State shared by every crawler of one run.
pub struct CrawlSession {
    run_id: String,
    config: Arc<CrawlConfig>,
    graph: Arc<StateFlowGraph>,
    events: Arc<EventBus>,
    plugins: CrawlPlugins,
    productivity: EventProductivity,
    started: Instant,
    paths: Mutex<Vec<CrawlPath>>,
    checked_elements: DashSet<String>,
    pending_siblings: DashSet<StateId>,
    examined: AtomicUsize,
    fired: AtomicUsize,
    termination: Mutex<Option<ConstraintViolation>>,
}

impl CrawlSession {
    pub fn new(
        config: Arc<CrawlConfig>,
        graph: Arc<StateFlowGraph>,
        events: Arc<EventBus>,
        plugins: CrawlPlugins,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            config,
            graph,
            events,
            plugins,
            productivity: EventProductivity::new(),
            started: Instant::now(),
            paths: Mutex::new(Vec::new()),
            checked_elements: DashSet::new(),
            pending_siblings: DashSet::new(),
            examined: AtomicUsize::new(0),
            fired: AtomicUsize::new(0),
            termination: Mutex::new(None),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<StateFlowGraph> {
        &self.graph
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn emit(&self, event: CrawlEvent) {
        self.events.emit(event);
    }

    pub fn plugins(&self) -> &CrawlPlugins {
        &self.plugins
    }

    pub fn productivity(&self) -> &EventProductivity {
        &self.productivity
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    // ── Crawl paths ──

    /// Keep a finished crawl path for the run report.
    pub fn record_path(&self, path: CrawlPath) {
        if !path.is_empty() {
            self.paths
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(path);
        }
    }

    /// Fork the current crawl path at a clone: the branch is kept as its own
    /// path while the crawler that found it stops.
    pub fn branch_path(&self, path: &CrawlPath) {
        self.record_path(path.clone());
    }

    pub fn paths(&self) -> Vec<CrawlPath> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Counters ──

    /// Mark an element as fired. Returns false if it was already marked.
    pub fn check_element(&self, key: &str) -> bool {
        self.checked_elements.insert(key.to_string())
    }

    /// Reserve the single pending sibling slot for `state`.
    pub fn reserve_sibling(&self, state: StateId) -> bool {
        self.pending_siblings.insert(state)
    }

    pub fn release_sibling(&self, state: StateId) {
        self.pending_siblings.remove(&state);
    }

    pub fn add_examined(&self, n: usize) {
        self.examined.fetch_add(n, Ordering::Relaxed);
    }

    pub fn examined(&self) -> usize {
        self.examined.load(Ordering::Relaxed)
    }

    pub fn record_fired(&self) {
        self.fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::Relaxed)
    }

    // ── Termination ──

    /// Record why the crawl is stopping. The first reason wins.
    pub fn terminate(&self, reason: ConstraintViolation) -> bool {
        let mut slot = self
            .termination
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason);
        true
    }

    pub fn termination(&self) -> Option<ConstraintViolation> {
        self.termination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
