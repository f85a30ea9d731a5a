// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Guided crawling.
//!
//! A single crawler expands one action at a time and then asks the
//! selector which frontier state to work on next. Moving to another state
//! always reloads the entry URL and replays that state's recorded path.

use crate::crawler::{CrawlOutcome, Crawler};
use crate::error::{CrawlError, CrawlResult};
use crate::renderer::BrowserContext;
use crate::selector::{select_next, DiversityWeights, SelectionStrategy};
use rand::rngs::StdRng;
use rand::SeedableRng;
use stateflow::StateId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Replay failures after which a state is no longer selected.
const MAX_REPLAY_FAILURES: u32 = 3;

pub struct GuidedCrawler {
    crawler: Crawler,
    strategy: SelectionStrategy,
    weights: DiversityWeights,
    rng: StdRng,
    /// The browser is on the cursor state.
    positioned: bool,
    too_deep: HashSet<StateId>,
    unreachable: HashSet<StateId>,
    replay_failures: HashMap<StateId, u32>,
}

impl GuidedCrawler {
    /// `crawler` must have its browser on the root state.
    pub fn new(
        crawler: Crawler,
        strategy: SelectionStrategy,
        weights: DiversityWeights,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            crawler,
            strategy,
            weights,
            rng,
            positioned: true,
            too_deep: HashSet::new(),
            unreachable: HashSet::new(),
            replay_failures: HashMap::new(),
        }
    }

    pub fn crawler(&self) -> &Crawler {
        &self.crawler
    }

    pub fn into_crawler(self) -> Crawler {
        self.crawler
    }

    /// Swap in a fresh browser. The next selection relocates it.
    pub fn replace_browser(&mut self, browser: Box<dyn BrowserContext>) -> Box<dyn BrowserContext> {
        self.positioned = false;
        self.crawler.replace_browser(browser)
    }

    /// Crawl until the frontier runs dry or a limit is reached.
    pub async fn run(&mut self) -> CrawlResult<CrawlOutcome> {
        let mut skip_once: Option<StateId> = None;
        loop {
            if let Some(violation) = self.crawler.check_constraints() {
                self.finish_path();
                return Ok(CrawlOutcome::Terminated(violation));
            }

            if self.positioned {
                let current = Arc::clone(self.crawler.machine().current());
                if self.crawler.depth_reached() {
                    debug!(state = %current.name(), "too deep, no longer selectable");
                    self.too_deep.insert(current.id());
                } else if let Some(result) = self.crawler.expand_once().await? {
                    debug!(state = %current.name(), ?result, "expanded");
                }
            }

            let mut excluded: HashSet<StateId> =
                self.too_deep.union(&self.unreachable).copied().collect();
            if let Some(id) = skip_once.take() {
                excluded.insert(id);
            }
            let graph = Arc::clone(self.crawler.session().graph());
            let Some(next) = select_next(&graph, self.strategy, &self.weights, &mut self.rng, &excluded)
            else {
                if self.has_selectable(&graph) {
                    continue;
                }
                info!(strategy = %self.strategy, "frontier exhausted");
                self.finish_path();
                return Ok(CrawlOutcome::Exhausted);
            };

            if self.positioned && next.id() == self.crawler.machine().current().id() {
                continue;
            }

            self.finish_path();
            match self.crawler.relocate(&next).await {
                Ok(()) => {
                    self.positioned = true;
                    self.replay_failures.remove(&next.id());
                }
                Err(e @ CrawlError::Replay { .. }) => {
                    warn!(state = %next.name(), "relocation failed: {e}");
                    self.positioned = false;
                    skip_once = Some(next.id());
                    let failures = self.replay_failures.entry(next.id()).or_default();
                    *failures += 1;
                    if *failures >= MAX_REPLAY_FAILURES {
                        warn!(state = %next.name(), "giving up on unreachable state");
                        self.unreachable.insert(next.id());
                    }
                }
                Err(e) => {
                    self.positioned = false;
                    return Err(e);
                }
            }
        }
    }

    /// Frontier states that may still be selected in a later round.
    fn has_selectable(&self, graph: &stateflow::StateFlowGraph) -> bool {
        graph
            .frontier()
            .iter()
            .any(|s| !self.too_deep.contains(&s.id()) && !self.unreachable.contains(&s.id()))
    }

    fn finish_path(&mut self) {
        let path = self.crawler.take_path();
        self.crawler.session().record_path(path);
    }
}
