// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-element event productivity.
//!
//! An element's ratio is the share of its firings that discovered a new
//! state. Elements never fired score 1.0, so unknown elements go first.

use dashmap::DashMap;
use stateflow::CandidateAction;

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    productive: u32,
    fired: u32,
}

/// Shared productivity table keyed by [`CandidateAction::element_key`].
#[derive(Debug, Default)]
pub struct EventProductivity {
    tallies: DashMap<String, Tally>,
}

impl EventProductivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one firing of the element.
    pub fn record(&self, element_key: &str, discovered_state: bool) {
        let mut tally = self.tallies.entry(element_key.to_string()).or_default();
        tally.fired += 1;
        if discovered_state {
            tally.productive += 1;
        }
    }

    pub fn ratio(&self, element_key: &str) -> f64 {
        match self.tallies.get(element_key) {
            Some(t) if t.fired > 0 => f64::from(t.productive) / f64::from(t.fired),
            _ => 1.0,
        }
    }

    /// Stable-sort candidates by descending ratio.
    pub fn order(&self, candidates: &mut [CandidateAction]) {
        candidates.sort_by(|a, b| {
            self.ratio(&b.element_key())
                .partial_cmp(&self.ratio(&a.element_key()))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Mean ratio over every element fired at least once.
    pub fn mean_ratio(&self) -> Option<f64> {
        let ratios: Vec<f64> = self
            .tallies
            .iter()
            .filter(|t| t.fired > 0)
            .map(|t| f64::from(t.productive) / f64::from(t.fired))
            .collect();
        if ratios.is_empty() {
            None
        } else {
            Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
        }
    }
}
