// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Choosing which frontier state to expand next.

use rand::Rng;
use serde::{Deserialize, Serialize};
use stateflow::{State, StateFlowGraph, StateId};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Frontier selection strategy for guided crawling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Most recently discovered state.
    Dfs,
    /// Oldest frontier state.
    Bfs,
    /// Uniformly random frontier state.
    Random,
    /// Highest weighted diversity score.
    Diversity,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectionStrategy::Dfs => "dfs",
            SelectionStrategy::Bfs => "bfs",
            SelectionStrategy::Random => "random",
            SelectionStrategy::Diversity => "diversity",
        };
        f.write_str(s)
    }
}

/// Weights of the diversity score terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityWeights {
    pub coverage: f64,
    pub path: f64,
    pub dom: f64,
}

impl Default for DiversityWeights {
    fn default() -> Self {
        Self {
            coverage: 1.0,
            path: 1.0,
            dom: 1.0,
        }
    }
}

/// `w_cov * coverage_increase + w_path * min_path_diversity + w_dom * min_dom_diversity`.
pub fn diversity_score(graph: &StateFlowGraph, id: StateId, weights: &DiversityWeights) -> f64 {
    weights.coverage * graph.coverage_increase(id)
        + weights.path * graph.min_path_diversity(id)
        + weights.dom * graph.min_dom_diversity(id)
}

/// Pick the next state to expand from the frontier, skipping `excluded`.
pub fn select_next<R: Rng + ?Sized>(
    graph: &StateFlowGraph,
    strategy: SelectionStrategy,
    weights: &DiversityWeights,
    rng: &mut R,
    excluded: &HashSet<StateId>,
) -> Option<Arc<State>> {
    let frontier: Vec<Arc<State>> = graph
        .frontier()
        .into_iter()
        .filter(|s| !excluded.contains(&s.id()))
        .collect();
    if frontier.is_empty() {
        return None;
    }

    match strategy {
        SelectionStrategy::Dfs => frontier.last().cloned(),
        SelectionStrategy::Bfs => frontier.first().cloned(),
        SelectionStrategy::Random => {
            let i = rng.gen_range(0..frontier.len());
            Some(Arc::clone(&frontier[i]))
        }
        SelectionStrategy::Diversity => {
            let mut best: Option<(f64, &Arc<State>)> = None;
            for state in &frontier {
                let score = diversity_score(graph, state.id(), weights);
                tracing::debug!(state = %state.name(), score, "diversity score");
                if best.map_or(true, |(b, _)| score > b) {
                    best = Some((score, state));
                }
            }
            best.map(|(_, s)| Arc::clone(s))
        }
    }
}
