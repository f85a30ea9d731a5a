// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crawler: drives one browser through the state space.
//!
//! Each iteration claims one untried action of the current state, fires it
//! and classifies what happened:
//!
//! - **DomUnchanged**: the DOM did not change (or the action could not be
//!   fired). Claim the next action of the same state.
//! - **NewState**: the crawler follows the new state one level deeper and
//!   queues a sibling task that keeps working on the state it left.
//! - **CloneDetected**: an existing state was reached. The path is branched
//!   into the session, a sibling is queued and this chain ends.

use crate::constraints::{ConstraintViolation, Constraints};
use crate::error::{CrawlError, CrawlResult};
use crate::events::CrawlEvent;
use crate::queue::{CrawlQueue, CrawlTask};
use crate::renderer::BrowserContext;
use crate::session::{CrawlPath, CrawlSession};
use crate::state_machine::StateMachine;
use stateflow::{CandidateAction, Eventable, How, Identification, State, StateId, StateSnapshot};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of firing one claimed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickResult {
    DomUnchanged,
    CloneDetected,
    NewState,
}

/// Why a crawl chain ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// The current state has no unclaimed actions left.
    Exhausted,
    /// An action led to an existing state.
    CloneReached,
    /// The path reached the configured depth limit.
    DepthReached,
    /// A global limit stopped the crawl.
    Terminated(ConstraintViolation),
}

pub struct Crawler {
    id: usize,
    browser: Box<dyn BrowserContext>,
    session: Arc<CrawlSession>,
    queue: Option<Arc<CrawlQueue>>,
    constraints: Constraints,
    machine: StateMachine,
    path: CrawlPath,
}

impl Crawler {
    /// A crawler without a queue never spawns sibling tasks.
    pub fn new(
        id: usize,
        browser: Box<dyn BrowserContext>,
        session: Arc<CrawlSession>,
        queue: Option<Arc<CrawlQueue>>,
    ) -> Self {
        let constraints = Constraints::from_config(session.config());
        let machine = StateMachine::new(
            Arc::clone(session.graph()),
            session.config().invariants.clone(),
        );
        Self {
            id,
            browser,
            session,
            queue,
            constraints,
            machine,
            path: CrawlPath::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn session(&self) -> &Arc<CrawlSession> {
        &self.session
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn path(&self) -> &CrawlPath {
        &self.path
    }

    /// Hand the current path over, leaving an empty one.
    pub fn take_path(&mut self) -> CrawlPath {
        std::mem::take(&mut self.path)
    }

    pub fn browser(&self) -> &dyn BrowserContext {
        self.browser.as_ref()
    }

    /// Swap in a fresh browser after a connection failure. Returns the old one.
    pub fn replace_browser(&mut self, browser: Box<dyn BrowserContext>) -> Box<dyn BrowserContext> {
        self.path.clear();
        self.machine.rewind();
        std::mem::replace(&mut self.browser, browser)
    }

    pub fn into_browser(self) -> Box<dyn BrowserContext> {
        self.browser
    }

    fn lost(&self, source: anyhow::Error) -> CrawlError {
        CrawlError::BrowserConnection {
            path: self.path.clone(),
            source,
        }
    }

    // ── Tasks ──

    /// Replay the task's path from the entry URL, then crawl from there.
    pub async fn run_task(&mut self, task: CrawlTask) -> CrawlResult<CrawlOutcome> {
        self.session.release_sibling(task.target);
        debug!(crawler = self.id, target = %task.target, path = %task.path, "task started");
        self.go_to_initial_url().await?;
        self.go_back_exact(task.path.actions(), task.target).await?;
        let outcome = self.crawl().await?;
        if outcome != CrawlOutcome::CloneReached {
            let path = self.take_path();
            self.session.record_path(path);
        }
        Ok(outcome)
    }

    /// Reload the entry URL and put the cursor back on the root.
    pub async fn go_to_initial_url(&mut self) -> CrawlResult<()> {
        let url = self.session.config().url.clone();
        let timeout_ms = self.session.config().page_load_timeout_ms;
        self.machine.rewind();
        self.path.clear();
        self.browser
            .navigate(&url, timeout_ms)
            .await
            .map_err(|e| self.lost(e))?;
        tokio::time::sleep(self.session.config().wait_after_reload()).await;
        Ok(())
    }

    /// Fire `actions` in order from the root, checking crawl conditions
    /// before and after every step.
    pub async fn go_back_exact(&mut self, actions: &[Eventable], target: StateId) -> CrawlResult<()> {
        let graph = Arc::clone(self.session.graph());
        for (step, action) in actions.iter().enumerate() {
            self.check_crawl_conditions(step).await?;
            if !self.fire(action).await? {
                return Err(CrawlError::Replay {
                    step,
                    reason: format!("could not fire {}", action.name()),
                });
            }
            let next = action
                .target
                .and_then(|id| graph.state(id))
                .ok_or_else(|| CrawlError::Replay {
                    step,
                    reason: format!("{} has no known target state", action.name()),
                })?;
            self.path.push(action.clone());
            if !self.machine.change_state(&next) {
                self.machine.change_to_new_state(next);
            }
            self.check_crawl_conditions(step).await?;
        }

        if self.machine.current().id() != target {
            if let Some(state) = graph.state(target) {
                self.machine.change_to_new_state(state);
            }
        }
        if !actions.is_empty() {
            let snapshot = self.snapshot().await?;
            if !self.machine.current().matches(&snapshot) {
                warn!(
                    crawler = self.id,
                    state = %self.machine.current().name(),
                    "replay reached a different DOM than recorded"
                );
            }
        }
        Ok(())
    }

    async fn check_crawl_conditions(&self, step: usize) -> CrawlResult<()> {
        let rules = &self.session.config().crawl_conditions;
        if let Some(rule) = crate::condition::first_failing(rules, self.browser.as_ref())
            .await
            .map_err(|e| self.lost(e))?
        {
            return Err(CrawlError::Replay {
                step,
                reason: format!("crawl condition '{}' does not hold", rule.description),
            });
        }
        Ok(())
    }

    // ── Crawling ──

    /// Global limits. The first crawler to hit one reports it.
    pub fn check_constraints(&self) -> Option<ConstraintViolation> {
        let violation = self
            .constraints
            .check(self.session.graph(), self.session.elapsed())?;
        if self.session.terminate(violation.clone()) {
            info!(crawler = self.id, "{violation}, stopping crawl");
            self.session.emit(CrawlEvent::ConstraintReached {
                constraint: violation.to_string(),
            });
        }
        Some(violation)
    }

    pub fn depth_reached(&self) -> bool {
        self.constraints.depth_reached(self.path.len())
    }

    /// Keep claiming actions of the current state until the chain ends.
    pub async fn crawl(&mut self) -> CrawlResult<CrawlOutcome> {
        loop {
            if let Some(violation) = self.check_constraints() {
                return Ok(CrawlOutcome::Terminated(violation));
            }
            if self.depth_reached() {
                debug!(crawler = self.id, depth = self.path.len(), "depth limit reached");
                return Ok(CrawlOutcome::DepthReached);
            }

            let origin = Arc::clone(self.machine.current());
            match self.expand_once().await? {
                None => return Ok(CrawlOutcome::Exhausted),
                Some(ClickResult::DomUnchanged) => {}
                Some(ClickResult::NewState) => self.queue_sibling(&origin),
                Some(ClickResult::CloneDetected) => {
                    self.session.branch_path(&self.path);
                    self.queue_sibling(&origin);
                    return Ok(CrawlOutcome::CloneReached);
                }
            }
        }
    }

    /// Let another crawler continue on `origin` while this one goes deeper.
    fn queue_sibling(&self, origin: &Arc<State>) {
        let Some(queue) = &self.queue else {
            return;
        };
        if origin.remaining_actions() == 0 || !self.session.reserve_sibling(origin.id()) {
            return;
        }
        let task = CrawlTask::new(self.path.without_last(), origin.id());
        if queue.submit(task) {
            debug!(crawler = self.id, state = %origin.name(), "sibling queued");
        } else {
            self.session.release_sibling(origin.id());
        }
    }

    /// Claim and fire one action of the current state. `None` once the state
    /// has nothing left to claim.
    pub async fn expand_once(&mut self) -> CrawlResult<Option<ClickResult>> {
        let state = Arc::clone(self.machine.current());
        self.ensure_candidates(&state).await?;

        loop {
            let Some(claimed) = state.claim_action() else {
                self.session.graph().remove_from_frontier(state.id());
                return Ok(None);
            };
            if claimed.exhausted {
                self.session.graph().remove_from_frontier(state.id());
            }

            let candidate = claimed.action;
            if self.session.config().click_once && !self.session.check_element(&checked_key(&candidate)) {
                debug!(crawler = self.id, element = %candidate.identification, "already fired elsewhere");
                continue;
            }
            self.session.add_examined(1);
            return self.crawl_action(&state, candidate).await.map(Some);
        }
    }

    async fn ensure_candidates(&self, state: &State) -> CrawlResult<()> {
        if !state.needs_candidates() {
            return Ok(());
        }
        let mut candidates = self
            .session
            .plugins()
            .extractor
            .extract(self.browser.as_ref(), state)
            .await
            .map_err(|e| CrawlError::Extraction(format!("{e:#}")))?;
        if self.session.config().efficient_crawling {
            self.session.productivity().order(&mut candidates);
        }
        let count = candidates.len();
        if state.set_candidates(candidates) {
            debug!(crawler = self.id, state = %state.name(), count, "candidates extracted");
        }
        Ok(())
    }

    async fn crawl_action(&mut self, origin: &Arc<State>, candidate: CandidateAction) -> CrawlResult<ClickResult> {
        let session = Arc::clone(&self.session);

        for condition in session
            .config()
            .element_conditions
            .iter()
            .filter(|c| c.applies_to(&candidate.identification))
        {
            if !condition
                .holds(self.browser.as_ref())
                .await
                .map_err(|e| self.lost(e))?
            {
                debug!(crawler = self.id, element = %candidate.identification, "element condition not satisfied");
                return Ok(ClickResult::DomUnchanged);
            }
        }

        let action = self.correct_identification(candidate.to_eventable()).await?;
        self.path.push(action.clone());
        let fired = self.fire(&action).await?;
        session.emit(CrawlEvent::ActionFired {
            crawler: self.id,
            state: origin.name().to_string(),
            action: action.name(),
            fired,
        });
        if !fired {
            self.path.pop();
            debug!(crawler = self.id, action = %action.name(), "could not fire");
            return Ok(ClickResult::DomUnchanged);
        }
        session.record_fired();

        self.sample_coverage().await;
        let snapshot = self.snapshot().await?;
        let element_key = candidate.element_key();

        if origin.matches(&snapshot) {
            self.path.pop();
            session.graph().add_edge(origin.id(), origin.id(), action)?;
            session.productivity().record(&element_key, false);
            return Ok(ClickResult::DomUnchanged);
        }

        let is_new = self
            .machine
            .update(action, snapshot, self.browser.as_ref(), &session)
            .await?;
        let reached = self.machine.current().id();
        if let Some(last) = self.path.last_mut() {
            last.source = Some(origin.id());
            last.target = Some(reached);
        }
        session.productivity().record(&element_key, is_new);

        if is_new {
            self.machine
                .current()
                .set_replay_path_if_empty(self.path.actions().to_vec());
            Ok(ClickResult::NewState)
        } else {
            Ok(ClickResult::CloneDetected)
        }
    }

    /// Ask the browser for a more robust XPath of the element.
    async fn correct_identification(&self, action: Eventable) -> CrawlResult<Eventable> {
        if action.identification.how != How::XPath {
            return Ok(action);
        }
        let resolved = self
            .browser
            .resolve_xpath(&action.identification)
            .await
            .map_err(|e| self.lost(e))?;
        Ok(match resolved {
            Some(xpath) if xpath != action.identification.value => {
                debug!(from = %action.identification.value, to = %xpath, "identification corrected");
                action.with_identification(Identification::xpath(xpath))
            }
            _ => action,
        })
    }

    async fn fire(&mut self, action: &Eventable) -> CrawlResult<bool> {
        let fired = self
            .browser
            .fire_event(action)
            .await
            .map_err(|e| self.lost(e))?;
        if fired {
            tokio::time::sleep(self.session.config().wait_after_event()).await;
        }
        Ok(fired)
    }

    async fn sample_coverage(&self) {
        let Some(probe) = &self.session.plugins().coverage else {
            return;
        };
        match probe.sample(self.browser.as_ref()).await {
            Ok(sample) => self.session.graph().record_coverage(sample),
            Err(e) => warn!(crawler = self.id, "coverage sample failed: {e:#}"),
        }
    }

    /// Current page as a state candidate.
    pub async fn snapshot(&self) -> CrawlResult<StateSnapshot> {
        let dom = self.browser.dom().await.map_err(|e| self.lost(e))?;
        let url = self.browser.current_url().await.map_err(|e| self.lost(e))?;
        let stripped = self.session.plugins().stripper.strip(&dom);
        Ok(StateSnapshot::new(url, dom, stripped))
    }

    // ── Relocation ──

    /// Reload the entry URL and replay the recorded path of `target`. The
    /// cursor ends on `target` even if a replayed step was not connected.
    pub async fn relocate(&mut self, target: &Arc<State>) -> CrawlResult<()> {
        self.go_to_initial_url().await?;
        let path = target.replay_path();
        self.go_back_exact(&path, target.id()).await?;
        if self.machine.current().id() != target.id() {
            self.machine.change_to_new_state(Arc::clone(target));
        }
        debug!(crawler = self.id, state = %target.name(), steps = path.len(), "relocated");
        Ok(())
    }
}

/// Click-once key: the same element in every state it appears in.
fn checked_key(candidate: &CandidateAction) -> String {
    format!("{}|{}", candidate.element_key(), candidate.text)
}
