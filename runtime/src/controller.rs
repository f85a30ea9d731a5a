// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crawl controller: builds the graph from the entry URL, runs the workers
//! and collects the run report.
//!
//! Without a selection strategy, N workers (one per browser) pull tasks from
//! a shared [`CrawlQueue`] until it closes. With a strategy, one
//! [`GuidedCrawler`] does all the work.

use crate::config::CrawlConfig;
use crate::constraints::ConstraintViolation;
use crate::coverage::{CoverageProbe, ScriptCoverageProbe};
use crate::crawler::{CrawlOutcome, Crawler};
use crate::error::CrawlError;
use crate::events::{now_timestamp, CrawlEvent, EventBus};
use crate::extraction::{CandidateExtractor, HtmlCandidateExtractor};
use crate::guided::GuidedCrawler;
use crate::pool::BrowserPool;
use crate::queue::{CrawlQueue, CrawlTask};
use crate::renderer::{BrowserContext, Renderer};
use crate::selector::SelectionStrategy;
use crate::session::{CrawlPath, CrawlPlugins, CrawlSession};
use crate::stats::CrawlStats;
use crate::strip::{DomStripper, RegexStripper};
use anyhow::{Context, Result};
use stateflow::{Eventable, StateFlowGraph, StateId, StateSnapshot};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Browser replacements one worker may use before it gives up.
const MAX_BROWSER_REPLACEMENTS: usize = 3;

/// Everything a finished crawl produced.
pub struct CrawlReport {
    pub graph: Arc<StateFlowGraph>,
    pub stats: CrawlStats,
    pub paths: Vec<CrawlPath>,
    pub termination: Option<ConstraintViolation>,
}

pub struct CrawlController {
    config: Arc<CrawlConfig>,
    pool: Arc<BrowserPool>,
    plugins: CrawlPlugins,
    events: Arc<EventBus>,
    stats_file: Option<PathBuf>,
}

impl CrawlController {
    /// Validate the configuration and set up the default plugins.
    pub fn new(config: CrawlConfig, renderer: Arc<dyn Renderer>) -> Result<Self> {
        config.validate()?;
        let extractor: Arc<dyn CandidateExtractor> =
            Arc::new(HtmlCandidateExtractor::from_config(&config)?);
        let stripper: Arc<dyn DomStripper> = Arc::new(RegexStripper::new(&config.strip_patterns)?);
        let coverage = config
            .coverage_script
            .as_ref()
            .map(|script| Arc::new(ScriptCoverageProbe::new(script.clone())) as Arc<dyn CoverageProbe>);

        Ok(Self {
            config: Arc::new(config),
            pool: Arc::new(BrowserPool::new(renderer)),
            plugins: CrawlPlugins {
                extractor,
                stripper,
                coverage,
            },
            events: Arc::new(EventBus::default()),
            stats_file: None,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn CandidateExtractor>) -> Self {
        self.plugins.extractor = extractor;
        self
    }

    pub fn with_stripper(mut self, stripper: Arc<dyn DomStripper>) -> Self {
        self.plugins.stripper = stripper;
        self
    }

    pub fn with_coverage_probe(mut self, probe: Arc<dyn CoverageProbe>) -> Self {
        self.plugins.coverage = Some(probe);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Append the plain-text statistics to `path` when the crawl ends.
    pub fn with_stats_file(mut self, path: PathBuf) -> Self {
        self.stats_file = Some(path);
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Run the crawl to completion.
    pub async fn run(self) -> Result<CrawlReport> {
        let mut first = self.pool.acquire().await?;
        let root = match self.load_root(first.as_mut()).await {
            Ok(root) => root,
            Err(e) => {
                self.pool.release(first).await;
                self.pool.shutdown().await;
                return Err(e);
            }
        };

        // Only the diversity selector reads the pairwise caches.
        let mut options = self.config.graph.clone();
        options.track_diversity = self.config.strategy == Some(SelectionStrategy::Diversity);
        let graph = Arc::new(StateFlowGraph::with_options(root, options));
        if let Some(probe) = &self.plugins.coverage {
            match probe.sample(first.as_ref()).await {
                Ok(sample) => graph.record_initial_coverage(sample),
                Err(e) => warn!("initial coverage sample failed: {e:#}"),
            }
        }

        let session = Arc::new(CrawlSession::new(
            Arc::clone(&self.config),
            Arc::clone(&graph),
            Arc::clone(&self.events),
            self.plugins.clone(),
        ));
        session.emit(CrawlEvent::CrawlStarted {
            run_id: session.run_id().to_string(),
            url: self.config.url.clone(),
            browsers: self.config.browsers,
            timestamp: now_timestamp(),
        });
        info!(
            "crawling {} (browsers={}, strategy={})",
            self.config.url,
            self.config.browsers,
            self.config
                .strategy
                .map_or_else(|| "parallel".to_string(), |s| s.to_string())
        );

        match self.config.strategy {
            Some(strategy) => self.run_guided(first, &session, strategy).await,
            None => self.run_parallel(first, &session).await,
        }
        self.pool.shutdown().await;
        debug!(
            created = self.pool.created(),
            replaced = self.pool.replaced(),
            "browser pool closed"
        );

        let stats = CrawlStats::collect(&session);
        for line in stats.lines() {
            info!("{line}");
        }
        if let Some(path) = &self.stats_file {
            stats.append_to(path)?;
        }
        session.emit(CrawlEvent::CrawlComplete {
            run_id: session.run_id().to_string(),
            states: stats.states,
            edges: stats.clickables,
            elapsed_ms: stats.duration_ms,
        });

        Ok(CrawlReport {
            graph,
            paths: session.paths(),
            termination: session.termination(),
            stats,
        })
    }

    async fn load_root(&self, browser: &mut dyn BrowserContext) -> Result<StateSnapshot> {
        browser
            .navigate(&self.config.url, self.config.page_load_timeout_ms)
            .await
            .with_context(|| format!("failed to load {}", self.config.url))?;
        tokio::time::sleep(self.config.wait_after_reload()).await;
        let dom = browser.dom().await.context("failed to read the root DOM")?;
        let url = browser.current_url().await?;
        let stripped = self.plugins.stripper.strip(&dom);
        Ok(StateSnapshot::new(url, dom, stripped))
    }

    async fn run_guided(
        &self,
        browser: Box<dyn BrowserContext>,
        session: &Arc<CrawlSession>,
        strategy: SelectionStrategy,
    ) {
        if self.config.browsers > 1 {
            info!("guided crawling uses a single browser");
        }
        let crawler = Crawler::new(0, browser, Arc::clone(session), None);
        let mut guided =
            GuidedCrawler::new(crawler, strategy, self.config.weights, self.config.seed);

        let mut replacements = 0;
        loop {
            match guided.run().await {
                Ok(outcome) => {
                    debug!(?outcome, "guided crawl finished");
                    break;
                }
                Err(e) => {
                    warn!("guided crawler failed: {e}");
                    session.emit(CrawlEvent::CrawlerFailed {
                        crawler: 0,
                        error: e.to_string(),
                    });
                    if !e.is_connection() || replacements >= MAX_BROWSER_REPLACEMENTS {
                        break;
                    }
                    replacements += 1;
                    match self.pool.replace().await {
                        Ok(fresh) => {
                            let old = guided.replace_browser(fresh);
                            self.pool.release(old).await;
                        }
                        Err(e) => {
                            warn!("no replacement browser: {e:#}");
                            break;
                        }
                    }
                }
            }
        }
        self.pool.release(guided.into_crawler().into_browser()).await;
    }

    async fn run_parallel(&self, first: Box<dyn BrowserContext>, session: &Arc<CrawlSession>) {
        let queue = Arc::new(CrawlQueue::new());
        queue.submit(CrawlTask::root());

        let mut first = Some(first);
        let mut handles = Vec::with_capacity(self.config.browsers);
        for id in 0..self.config.browsers {
            let browser = match first.take() {
                Some(browser) => browser,
                None => match self.pool.acquire().await {
                    Ok(browser) => browser,
                    Err(e) => {
                        warn!(crawler = id, "could not open a browser: {e:#}");
                        continue;
                    }
                },
            };
            let crawler = Crawler::new(id, browser, Arc::clone(session), Some(Arc::clone(&queue)));
            handles.push(tokio::spawn(worker(
                crawler,
                Arc::clone(&queue),
                Arc::clone(&self.pool),
            )));
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("crawler task panicked: {e}");
            }
        }
    }
}

/// Task continuing the state a crawler was on when its browser died. The
/// action that was in flight has no target yet and is dropped. A crawler
/// that died before its replay got back to the task's target resumes the
/// task itself.
fn resume_task(session: &CrawlSession, task: &CrawlTask, error: &CrawlError) -> Option<CrawlTask> {
    let CrawlError::BrowserConnection { path, .. } = error else {
        return None;
    };
    let replayable: Vec<Eventable> = path
        .actions()
        .iter()
        .take_while(|a| a.target.is_some())
        .cloned()
        .collect();
    let (path, target) = if replayable.len() < task.path.len() {
        (task.path.clone(), task.target)
    } else {
        let target = replayable.last().and_then(|a| a.target).unwrap_or(StateId::ROOT);
        (CrawlPath::from(replayable), target)
    };
    let state = session.graph().state(target)?;
    if state.remaining_actions() == 0 || !session.reserve_sibling(target) {
        return None;
    }
    Some(CrawlTask::new(path, target))
}

/// Marks the task finished however the worker leaves the loop body.
struct TaskDone<'a>(&'a CrawlQueue);

impl Drop for TaskDone<'_> {
    fn drop(&mut self) {
        self.0.task_done();
    }
}

async fn worker(mut crawler: Crawler, queue: Arc<CrawlQueue>, pool: Arc<BrowserPool>) {
    let id = crawler.id();
    let mut replacements = 0;
    while let Some(task) = queue.next().await {
        let _done = TaskDone(&queue);
        match crawler.run_task(task.clone()).await {
            Ok(CrawlOutcome::Terminated(reason)) => {
                debug!(crawler = id, "{reason}");
                queue.close();
            }
            Ok(outcome) => debug!(crawler = id, ?outcome, "task finished"),
            Err(e) => {
                warn!(crawler = id, "task aborted: {e}");
                crawler.session().emit(CrawlEvent::CrawlerFailed {
                    crawler: id,
                    error: e.to_string(),
                });
                if !e.is_connection() {
                    continue;
                }
                if let Some(resume) = resume_task(crawler.session(), &task, &e) {
                    let target = resume.target;
                    if !queue.submit(resume) {
                        crawler.session().release_sibling(target);
                    }
                }
                if replacements >= MAX_BROWSER_REPLACEMENTS {
                    warn!(crawler = id, "too many browser failures, crawler exits");
                    break;
                }
                replacements += 1;
                match pool.replace().await {
                    Ok(fresh) => {
                        let old = crawler.replace_browser(fresh);
                        pool.release(old).await;
                    }
                    Err(e) => {
                        warn!(crawler = id, "no replacement browser, crawler exits: {e:#}");
                        break;
                    }
                }
            }
        }
    }
    pool.release(crawler.into_browser()).await;
}
