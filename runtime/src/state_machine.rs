// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-crawler cursor over the shared state-flow graph.

use crate::condition::Invariant;
use crate::error::{CrawlError, CrawlResult};
use crate::events::CrawlEvent;
use crate::renderer::BrowserContext;
use crate::session::CrawlSession;
use stateflow::{AddState, Eventable, State, StateFlowGraph, StateSnapshot};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tracks which state one crawler's browser is in, with the two states
/// before it.
pub struct StateMachine {
    graph: Arc<StateFlowGraph>,
    initial: Arc<State>,
    current: Arc<State>,
    previous: Option<Arc<State>>,
    previous_previous: Option<Arc<State>>,
    invariants: Vec<Invariant>,
}

impl StateMachine {
    pub fn new(graph: Arc<StateFlowGraph>, invariants: Vec<Invariant>) -> Self {
        let initial = graph.root();
        Self {
            graph,
            current: Arc::clone(&initial),
            initial,
            previous: None,
            previous_previous: None,
            invariants,
        }
    }

    pub fn current(&self) -> &Arc<State> {
        &self.current
    }

    pub fn previous(&self) -> Option<&Arc<State>> {
        self.previous.as_ref()
    }

    pub fn previous_previous(&self) -> Option<&Arc<State>> {
        self.previous_previous.as_ref()
    }

    pub fn initial(&self) -> &Arc<State> {
        &self.initial
    }

    /// Move to `next` if an edge connects it to the current state in either
    /// direction.
    pub fn change_state(&mut self, next: &Arc<State>) -> bool {
        if !self.graph.can_go_to(self.current.id(), next.id()) {
            debug!(from = %self.current.name(), to = %next.name(), "no edge, state change refused");
            return false;
        }
        self.shift(Arc::clone(next));
        true
    }

    /// Move to `next` unconditionally.
    pub fn change_to_new_state(&mut self, next: Arc<State>) {
        self.shift(next);
    }

    fn shift(&mut self, next: Arc<State>) {
        self.previous_previous = self.previous.take();
        self.previous = Some(std::mem::replace(&mut self.current, next));
    }

    /// Back to the root, forgetting history.
    pub fn rewind(&mut self) {
        self.current = Arc::clone(&self.initial);
        self.previous = None;
        self.previous_previous = None;
    }

    /// Record the transition `current --action--> snapshot` and move the
    /// cursor to the resulting state. Returns true when the state is new.
    pub async fn update(
        &mut self,
        action: Eventable,
        snapshot: StateSnapshot,
        browser: &dyn BrowserContext,
        session: &CrawlSession,
    ) -> CrawlResult<bool> {
        let origin = Arc::clone(&self.current);
        let action_name = action.name();
        let outcome = self.graph.add_transition(origin.id(), action, snapshot)?;

        let is_new = match &outcome {
            AddState::Added(state) => {
                session.emit(CrawlEvent::StateDiscovered {
                    state: state.name().to_string(),
                    url: state.url().to_string(),
                    from: origin.name().to_string(),
                    action: action_name,
                });
                true
            }
            AddState::Clone(state) => {
                info!(from = %origin.name(), to = %state.name(), "clone reached");
                session.emit(CrawlEvent::CloneDetected {
                    state: state.name().to_string(),
                    from: origin.name().to_string(),
                    action: action_name,
                });
                false
            }
        };

        let next = outcome.into_state();
        if !self.change_state(&next) {
            self.change_to_new_state(next);
        }
        self.check_invariants(browser, session).await?;
        Ok(is_new)
    }

    /// Check every invariant against the browser. Violations are logged and
    /// emitted, never fatal. Returns the number of violations.
    pub async fn check_invariants(
        &self,
        browser: &dyn BrowserContext,
        session: &CrawlSession,
    ) -> CrawlResult<usize> {
        let mut violations = 0;
        for rule in &self.invariants {
            if rule.holds(browser).await.map_err(CrawlError::Other)? {
                continue;
            }
            violations += 1;
            warn!(state = %self.current.name(), invariant = %rule.description, "invariant violated");
            session.emit(CrawlEvent::InvariantViolated {
                state: self.current.name().to_string(),
                invariant: rule.description.clone(),
            });
        }
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(body: &str) -> StateSnapshot {
        StateSnapshot::unstripped("http://localhost/", format!("<html><body>{body}</body></html>"))
    }

    #[test]
    fn test_starts_at_root() {
        let g = Arc::new(StateFlowGraph::new(snap("root")));
        let sm = StateMachine::new(Arc::clone(&g), Vec::new());
        assert_eq!(sm.current().name(), "index");
        assert!(sm.previous().is_none());
        assert!(sm.previous_previous().is_none());
    }

    #[test]
    fn test_change_state_requires_edge() {
        let g = Arc::new(StateFlowGraph::new(snap("root")));
        let s1 = g.add_state(snap("one")).into_state();
        let mut sm = StateMachine::new(Arc::clone(&g), Vec::new());
        assert!(!sm.change_state(&s1));
        assert_eq!(sm.current().id(), g.root().id());

        g.add_edge(s1.id(), g.root().id(), Eventable::click("/back")).unwrap();
        assert!(sm.change_state(&s1));
        assert_eq!(sm.current().id(), s1.id());
        assert_eq!(sm.previous().unwrap().name(), "index");
    }

    #[test]
    fn test_history_window_and_rewind() {
        let g = Arc::new(StateFlowGraph::new(snap("root")));
        let s1 = g.add_state(snap("one")).into_state();
        let s2 = g.add_state(snap("two")).into_state();
        let mut sm = StateMachine::new(Arc::clone(&g), Vec::new());
        sm.change_to_new_state(Arc::clone(&s1));
        sm.change_to_new_state(Arc::clone(&s2));
        assert_eq!(sm.current().id(), s2.id());
        assert_eq!(sm.previous().unwrap().id(), s1.id());
        assert_eq!(sm.previous_previous().unwrap().id(), g.root().id());

        sm.rewind();
        assert_eq!(sm.current().id(), g.root().id());
        assert!(sm.previous().is_none());
    }
}
