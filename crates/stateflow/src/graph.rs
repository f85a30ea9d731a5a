// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! The shared state-flow graph.
//!
//! A directed multigraph of [`State`] vertices and [`Eventable`] edges, plus
//! the frontier of states that still have unfired actions and the diversity
//! caches used by guided crawling. All structural state lives behind one
//! mutex; every public operation is a single locked region.

use crate::similarity::{normalized_tree_distance, path_set_diversity};
use crate::state::{lock, State, StateSnapshot};
use crate::types::{Eventable, GraphError, GraphResult, StateId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Name of the initial state.
pub const ROOT_NAME: &str = "index";

/// Tunables for the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOptions {
    /// Populate diversity caches on insertion.
    pub track_diversity: bool,
    /// Upper bound on root paths enumerated per state.
    pub max_enumerated_paths: usize,
    /// Upper bound on the number of actions in an enumerated path.
    pub max_path_length: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            track_diversity: true,
            max_enumerated_paths: 256,
            max_path_length: 64,
        }
    }
}

/// Outcome of inserting a snapshot.
#[derive(Debug, Clone)]
pub enum AddState {
    /// The snapshot was new and is now a named vertex.
    Added(Arc<State>),
    /// An equal state already existed; it is returned and nothing was inserted.
    Clone(Arc<State>),
}

impl AddState {
    pub fn state(&self) -> &Arc<State> {
        match self {
            AddState::Added(s) | AddState::Clone(s) => s,
        }
    }

    pub fn into_state(self) -> Arc<State> {
        match self {
            AddState::Added(s) | AddState::Clone(s) => s,
        }
    }

    pub fn is_clone(&self) -> bool {
        matches!(self, AddState::Clone(_))
    }
}

/// Serializable summary of a state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSummary {
    pub id: StateId,
    pub name: String,
    pub url: String,
    pub dom_size: usize,
    pub remaining_actions: usize,
}

/// Serializable view of the whole graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub states: Vec<StateSummary>,
    pub edges: Vec<Eventable>,
    pub frontier: Vec<StateId>,
}

#[derive(Default)]
struct Inner {
    graph: DiGraph<Arc<State>, Eventable>,
    by_dom: HashMap<String, StateId>,
    frontier: Vec<StateId>,
    dom_diversity: HashMap<(StateId, StateId), f64>,
    path_diversity: HashMap<(StateId, StateId), f64>,
    coverage_increase: HashMap<StateId, f64>,
    latest_coverage: f64,
    latest_increase: Option<f64>,
}

impl Inner {
    fn contains(&self, id: StateId) -> bool {
        id.index() < self.graph.node_count()
    }

    fn state(&self, id: StateId) -> Option<Arc<State>> {
        self.graph.node_weight(node(id)).cloned()
    }

    fn check(&self, id: StateId) -> GraphResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(GraphError::StateNotFound(id))
        }
    }
}

fn node(id: StateId) -> NodeIndex {
    NodeIndex::new(id.index())
}

fn state_id(idx: NodeIndex) -> StateId {
    StateId(idx.index() as u32)
}

/// The state-flow graph shared by all crawlers.
pub struct StateFlowGraph {
    inner: Mutex<Inner>,
    root: Arc<State>,
    options: GraphOptions,
}

impl StateFlowGraph {
    /// Create a graph holding only the root state.
    pub fn new(root: StateSnapshot) -> Self {
        Self::with_options(root, GraphOptions::default())
    }

    pub fn with_options(root: StateSnapshot, options: GraphOptions) -> Self {
        let root = Arc::new(State::from_snapshot(StateId::ROOT, ROOT_NAME.to_string(), root));
        let mut inner = Inner::default();
        inner.graph.add_node(Arc::clone(&root));
        inner.by_dom.insert(root.stripped_dom().to_string(), StateId::ROOT);
        inner.frontier.push(StateId::ROOT);
        Self {
            inner: Mutex::new(inner),
            root,
            options,
        }
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    // ── Insertion ──

    /// Insert a snapshot as a new state, or return the existing equal state.
    pub fn add_state(&self, snapshot: StateSnapshot) -> AddState {
        let mut inner = lock(&self.inner);
        self.insert_locked(&mut inner, snapshot, None)
    }

    /// Insert a snapshot reached from `source` by `action`, and record the
    /// edge `source -> state` in the same locked region. On a clone the edge
    /// targets the existing state.
    pub fn add_transition(
        &self,
        source: StateId,
        action: Eventable,
        snapshot: StateSnapshot,
    ) -> GraphResult<AddState> {
        let mut inner = lock(&self.inner);
        inner.check(source)?;
        Ok(self.insert_locked(&mut inner, snapshot, Some((source, action))))
    }

    fn insert_locked(
        &self,
        inner: &mut Inner,
        snapshot: StateSnapshot,
        incoming: Option<(StateId, Eventable)>,
    ) -> AddState {
        if let Some(&existing) = inner.by_dom.get(&snapshot.stripped_dom) {
            let state = Arc::clone(&inner.graph[node(existing)]);
            if let Some((source, action)) = incoming {
                add_edge_locked(inner, source, existing, action);
            }
            debug!(state = %state.name(), "clone detected");
            return AddState::Clone(state);
        }

        let id = state_id(NodeIndex::new(inner.graph.node_count()));
        let state = Arc::new(State::from_snapshot(id, format!("state{}", id.0), snapshot));
        inner.graph.add_node(Arc::clone(&state));
        inner.by_dom.insert(state.stripped_dom().to_string(), id);
        inner.frontier.push(id);
        if let Some((source, action)) = incoming {
            add_edge_locked(inner, source, id, action);
        }
        if self.options.track_diversity {
            self.cache_diversity(inner, &state);
        }

        info!(state = %state.name(), url = %state.url(), total = inner.graph.node_count(), "new state");
        AddState::Added(state)
    }

    fn cache_diversity(&self, inner: &mut Inner, state: &Arc<State>) {
        let id = state.id();
        let new_paths = all_paths_in(inner, id, &self.options);
        let peers: Vec<Arc<State>> = inner
            .graph
            .node_weights()
            .filter(|s| s.id() != id)
            .cloned()
            .collect();

        for peer in peers {
            let dd = normalized_tree_distance(peer.dom_tree(), state.dom_tree());
            let peer_paths = all_paths_in(inner, peer.id(), &self.options);
            let pd = path_set_diversity(&peer_paths, &new_paths);
            inner.dom_diversity.insert((peer.id(), id), dd);
            inner.dom_diversity.insert((id, peer.id()), dd);
            inner.path_diversity.insert((peer.id(), id), pd);
            inner.path_diversity.insert((id, peer.id()), pd);
        }

        if let Some(increase) = inner.latest_increase {
            inner.coverage_increase.insert(id, increase);
        }
    }

    /// Record an edge. Returns false when an identical action already
    /// connects `source` to `target`.
    pub fn add_edge(&self, source: StateId, target: StateId, action: Eventable) -> GraphResult<bool> {
        let mut inner = lock(&self.inner);
        inner.check(source)?;
        inner.check(target)?;
        Ok(add_edge_locked(&mut inner, source, target, action))
    }

    // ── Frontier ──

    /// Drop a state from the frontier. Returns whether it was present.
    pub fn remove_from_frontier(&self, id: StateId) -> bool {
        let mut inner = lock(&self.inner);
        match inner.frontier.iter().position(|s| *s == id) {
            Some(pos) => {
                inner.frontier.remove(pos);
                debug!(state = %id, remaining = inner.frontier.len(), "removed from frontier");
                true
            }
            None => {
                debug!(state = %id, "not in frontier");
                false
            }
        }
    }

    /// Frontier states in insertion order.
    pub fn frontier(&self) -> Vec<Arc<State>> {
        let inner = lock(&self.inner);
        inner.frontier.iter().filter_map(|id| inner.state(*id)).collect()
    }

    pub fn frontier_len(&self) -> usize {
        lock(&self.inner).frontier.len()
    }

    pub fn in_frontier(&self, id: StateId) -> bool {
        lock(&self.inner).frontier.contains(&id)
    }

    // ── Queries ──

    /// Whether an edge connects `a` and `b` in either direction.
    pub fn can_go_to(&self, a: StateId, b: StateId) -> bool {
        let inner = lock(&self.inner);
        if !inner.contains(a) || !inner.contains(b) {
            return false;
        }
        inner.graph.contains_edge(node(a), node(b)) || inner.graph.contains_edge(node(b), node(a))
    }

    pub fn root(&self) -> Arc<State> {
        Arc::clone(&self.root)
    }

    pub fn state(&self, id: StateId) -> Option<Arc<State>> {
        lock(&self.inner).state(id)
    }

    /// All states in id order.
    pub fn states(&self) -> Vec<Arc<State>> {
        lock(&self.inner).graph.node_weights().cloned().collect()
    }

    /// All recorded edges, with their endpoints filled in.
    pub fn edges(&self) -> Vec<Eventable> {
        lock(&self.inner).graph.edge_weights().cloned().collect()
    }

    pub fn state_count(&self) -> usize {
        lock(&self.inner).graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        lock(&self.inner).graph.edge_count()
    }

    pub fn outgoing(&self, id: StateId) -> Vec<Eventable> {
        self.edges_directed(id, Direction::Outgoing)
    }

    pub fn incoming(&self, id: StateId) -> Vec<Eventable> {
        self.edges_directed(id, Direction::Incoming)
    }

    fn edges_directed(&self, id: StateId, dir: Direction) -> Vec<Eventable> {
        let inner = lock(&self.inner);
        if !inner.contains(id) {
            return Vec::new();
        }
        inner
            .graph
            .edges_directed(node(id), dir)
            .map(|e| e.weight().clone())
            .collect()
    }

    pub fn target_of(&self, edge: &Eventable) -> Option<Arc<State>> {
        edge.target.and_then(|t| self.state(t))
    }

    /// Shortest action sequence from `from` to `to`, unit edge weights.
    pub fn shortest_path(&self, from: StateId, to: StateId) -> Option<Vec<Eventable>> {
        let inner = lock(&self.inner);
        if !inner.contains(from) || !inner.contains(to) {
            return None;
        }
        let goal = node(to);
        let (_, nodes) =
            petgraph::algo::astar(&inner.graph, node(from), |n| n == goal, |_| 1u32, |_| 0)?;
        nodes
            .windows(2)
            .map(|w| {
                inner
                    .graph
                    .find_edge(w[0], w[1])
                    .map(|e| inner.graph[e].clone())
            })
            .collect()
    }

    /// States reached from the root that lead nowhere new.
    pub fn deep_states(&self) -> Vec<Arc<State>> {
        let inner = lock(&self.inner);
        let mut visited = HashSet::new();
        let mut deep = Vec::new();
        let mut stack = vec![node(StateId::ROOT)];
        visited.insert(node(StateId::ROOT));
        while let Some(at) = stack.pop() {
            let fresh: Vec<NodeIndex> = inner
                .graph
                .neighbors_directed(at, Direction::Outgoing)
                .filter(|n| visited.insert(*n))
                .collect();
            if fresh.is_empty() {
                deep.push(Arc::clone(&inner.graph[at]));
            }
            stack.extend(fresh);
        }
        deep.sort_by_key(|s| s.id());
        deep
    }

    /// Mean raw DOM size in bytes.
    pub fn mean_dom_size(&self) -> usize {
        let states = self.states();
        if states.is_empty() {
            return 0;
        }
        states.iter().map(|s| s.dom_size()).sum::<usize>() / states.len()
    }

    /// Candidate actions not yet claimed, summed over all states.
    pub fn unprocessed_candidate_count(&self) -> usize {
        self.states().iter().map(|s| s.remaining_actions()).sum()
    }

    // ── Diversity ──

    /// Root paths of `target` as action-name sequences.
    pub fn all_paths(&self, target: StateId) -> Vec<Vec<String>> {
        let inner = lock(&self.inner);
        all_paths_in(&inner, target, &self.options)
    }

    pub fn path_diversity(&self, a: StateId, b: StateId) -> f64 {
        let inner = lock(&self.inner);
        if inner.graph.node_count() <= 1 {
            return 1.0;
        }
        let pa = all_paths_in(&inner, a, &self.options);
        let pb = all_paths_in(&inner, b, &self.options);
        path_set_diversity(&pa, &pb)
    }

    pub fn dom_diversity(&self, a: StateId, b: StateId) -> f64 {
        let (sa, sb) = {
            let inner = lock(&self.inner);
            if inner.graph.node_count() <= 1 {
                return 1.0;
            }
            match (inner.state(a), inner.state(b)) {
                (Some(sa), Some(sb)) => (sa, sb),
                _ => return 1.0,
            }
        };
        normalized_tree_distance(sa.dom_tree(), sb.dom_tree())
    }

    /// Smallest cached DOM diversity between `id` and any other state.
    pub fn min_dom_diversity(&self, id: StateId) -> f64 {
        let inner = lock(&self.inner);
        min_cached(&inner, &inner.dom_diversity, id)
    }

    /// Smallest cached path diversity between `id` and any other state.
    pub fn min_path_diversity(&self, id: StateId) -> f64 {
        let inner = lock(&self.inner);
        min_cached(&inner, &inner.path_diversity, id)
    }

    /// Coverage gained by the action that discovered `id`.
    pub fn coverage_increase(&self, id: StateId) -> f64 {
        lock(&self.inner)
            .coverage_increase
            .get(&id)
            .copied()
            .unwrap_or(0.0)
    }

    /// Record a coverage sample taken after firing an action.
    pub fn record_coverage(&self, sample: f64) {
        let mut inner = lock(&self.inner);
        let increase = (sample - inner.latest_coverage).max(0.0);
        inner.latest_coverage = sample;
        inner.latest_increase = Some(increase);
    }

    /// Record the coverage of the root page.
    pub fn record_initial_coverage(&self, sample: f64) {
        let mut inner = lock(&self.inner);
        let increase = (sample - inner.latest_coverage).max(0.0);
        inner.latest_coverage = sample;
        inner.latest_increase = Some(increase);
        inner.coverage_increase.insert(StateId::ROOT, increase);
    }

    pub fn latest_coverage(&self) -> f64 {
        lock(&self.inner).latest_coverage
    }

    /// Mean pairwise DOM diversity over all states.
    pub fn final_dom_diversity(&self) -> f64 {
        let states = self.states();
        mean_pairwise(&states, |a, b| normalized_tree_distance(a.dom_tree(), b.dom_tree()))
    }

    /// Mean pairwise path diversity over all states.
    pub fn final_path_diversity(&self) -> f64 {
        let states = self.states();
        let paths: HashMap<StateId, Vec<Vec<String>>> = {
            let inner = lock(&self.inner);
            states
                .iter()
                .map(|s| (s.id(), all_paths_in(&inner, s.id(), &self.options)))
                .collect()
        };
        mean_pairwise(&states, |a, b| {
            path_set_diversity(&paths[&a.id()], &paths[&b.id()])
        })
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let (states, edges, frontier) = {
            let inner = lock(&self.inner);
            (
                inner.graph.node_weights().cloned().collect::<Vec<_>>(),
                inner.graph.edge_weights().cloned().collect::<Vec<_>>(),
                inner.frontier.clone(),
            )
        };
        GraphSnapshot {
            states: states
                .iter()
                .map(|s| StateSummary {
                    id: s.id(),
                    name: s.name().to_string(),
                    url: s.url().to_string(),
                    dom_size: s.dom_size(),
                    remaining_actions: s.remaining_actions(),
                })
                .collect(),
            edges,
            frontier,
        }
    }
}

fn add_edge_locked(inner: &mut Inner, source: StateId, target: StateId, mut action: Eventable) -> bool {
    let (a, b) = (node(source), node(target));
    if inner.graph.edges_connecting(a, b).any(|e| e.weight() == &action) {
        debug!(source = %source, target = %target, action = %action.name(), "edge already recorded");
        return false;
    }
    action.source = Some(source);
    action.target = Some(target);
    inner.graph.add_edge(a, b, action);
    true
}

fn min_cached(inner: &Inner, cache: &HashMap<(StateId, StateId), f64>, id: StateId) -> f64 {
    (0..inner.graph.node_count())
        .map(|i| StateId(i as u32))
        .filter(|other| *other != id)
        .filter_map(|other| cache.get(&(id, other)).copied())
        .fold(1.0, f64::min)
}

fn mean_pairwise(states: &[Arc<State>], f: impl Fn(&State, &State) -> f64) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in states.iter().enumerate() {
        for b in &states[i + 1..] {
            total += f(a.as_ref(), b.as_ref());
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64
    }
}

fn all_paths_in(inner: &Inner, target: StateId, options: &GraphOptions) -> Vec<Vec<String>> {
    let mut paths = Vec::new();
    if !inner.contains(target) {
        return paths;
    }
    let mut on_path = vec![false; inner.graph.node_count()];
    let mut current = Vec::new();
    walk_paths(
        &inner.graph,
        node(StateId::ROOT),
        node(target),
        options,
        &mut on_path,
        &mut current,
        &mut paths,
    );
    paths
}

fn walk_paths(
    graph: &DiGraph<Arc<State>, Eventable>,
    at: NodeIndex,
    target: NodeIndex,
    options: &GraphOptions,
    on_path: &mut [bool],
    current: &mut Vec<String>,
    paths: &mut Vec<Vec<String>>,
) {
    if at == target {
        paths.push(current.clone());
        return;
    }
    if current.len() >= options.max_path_length {
        return;
    }
    on_path[at.index()] = true;
    for edge in graph.edges(at) {
        if paths.len() >= options.max_enumerated_paths {
            break;
        }
        let next = edge.target();
        if on_path[next.index()] {
            continue;
        }
        current.push(edge.weight().name());
        walk_paths(graph, next, target, options, on_path, current, paths);
        current.pop();
    }
    on_path[at.index()] = false;
}
