// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! States: canonicalized renderings of the application, with their queue of
//! unfired candidate actions.

use crate::dom_tree::DomTree;
use crate::types::{CandidateAction, Eventable, StateId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A rendering captured from the browser, not yet inserted into a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub url: String,
    pub dom: String,
    /// DOM after the stripping rules ran. Two renderings are the same state
    /// exactly when their stripped DOMs are equal.
    pub stripped_dom: String,
}

impl StateSnapshot {
    pub fn new(url: impl Into<String>, dom: impl Into<String>, stripped_dom: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dom: dom.into(),
            stripped_dom: stripped_dom.into(),
        }
    }

    /// Snapshot whose stripped DOM is the raw DOM.
    pub fn unstripped(url: impl Into<String>, dom: impl Into<String>) -> Self {
        let dom = dom.into();
        Self {
            url: url.into(),
            stripped_dom: dom.clone(),
            dom,
        }
    }
}

/// Result of claiming the next candidate action of a state.
#[derive(Debug, Clone)]
pub struct ClaimedAction {
    pub action: CandidateAction,
    /// True when this claim emptied the state's candidate queue.
    pub exhausted: bool,
}

#[derive(Debug, Default)]
struct CandidateQueue {
    searched: bool,
    pending: VecDeque<CandidateAction>,
    claimed: usize,
}

/// A vertex of the state-flow graph.
#[derive(Debug)]
pub struct State {
    id: StateId,
    name: String,
    url: String,
    dom: String,
    stripped_dom: String,
    tree: OnceLock<DomTree>,
    candidates: Mutex<CandidateQueue>,
    replay_path: Mutex<Vec<Eventable>>,
}

impl State {
    pub(crate) fn from_snapshot(id: StateId, name: String, snapshot: StateSnapshot) -> Self {
        Self {
            id,
            name,
            url: snapshot.url,
            dom: snapshot.dom,
            stripped_dom: snapshot.stripped_dom,
            tree: OnceLock::new(),
            candidates: Mutex::new(CandidateQueue::default()),
            replay_path: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dom(&self) -> &str {
        &self.dom
    }

    pub fn stripped_dom(&self) -> &str {
        &self.stripped_dom
    }

    /// Size of the raw DOM in bytes.
    pub fn dom_size(&self) -> usize {
        self.dom.len()
    }

    /// Parsed tree of the raw DOM, built on first use.
    pub fn dom_tree(&self) -> &DomTree {
        self.tree.get_or_init(|| DomTree::parse(&self.dom))
    }

    /// Whether a snapshot renders this same state.
    pub fn matches(&self, snapshot: &StateSnapshot) -> bool {
        self.stripped_dom == snapshot.stripped_dom
    }

    // ── Candidate actions ──

    /// True until candidates have been extracted for this state.
    pub fn needs_candidates(&self) -> bool {
        !lock(&self.candidates).searched
    }

    /// Record the candidate actions of this state. Only the first call has
    /// any effect; returns whether this call populated the queue.
    pub fn set_candidates(&self, actions: Vec<CandidateAction>) -> bool {
        let mut queue = lock(&self.candidates);
        if queue.searched {
            return false;
        }
        queue.searched = true;
        queue.pending = actions.into();
        true
    }

    /// Take the next unfired action. Each action is handed out at most once.
    pub fn claim_action(&self) -> Option<ClaimedAction> {
        let mut queue = lock(&self.candidates);
        let action = queue.pending.pop_front()?;
        queue.claimed += 1;
        Some(ClaimedAction {
            action,
            exhausted: queue.pending.is_empty(),
        })
    }

    /// Number of candidate actions not yet claimed.
    pub fn remaining_actions(&self) -> usize {
        lock(&self.candidates).pending.len()
    }

    pub fn claimed_actions(&self) -> usize {
        lock(&self.candidates).claimed
    }

    /// Searched and no unclaimed actions left.
    pub fn is_fully_expanded(&self) -> bool {
        let queue = lock(&self.candidates);
        queue.searched && queue.pending.is_empty()
    }

    // ── Replay path ──

    /// Action sequence from the root that first reached this state.
    pub fn replay_path(&self) -> Vec<Eventable> {
        lock(&self.replay_path).clone()
    }

    /// Store the replay path unless one is already set.
    pub fn set_replay_path_if_empty(&self, path: Vec<Eventable>) {
        let mut current = lock(&self.replay_path);
        if current.is_empty() {
            *current = path;
        }
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.stripped_dom == other.stripped_dom
    }
}

impl Eq for State {}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
