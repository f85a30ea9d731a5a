// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Estimate how much of the state space a crawl has explored.
//!
//! Every fired action that produced a new state counts as one discovery per
//! sampled action. The unexplored space is extrapolated from that rate over
//! the actions that were never fired.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Point estimate of state-space coverage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrawlEstimate {
    pub explored_states: usize,
    pub estimated_unexplored: f64,
    pub estimated_coverage: f64,
    /// Coverage against a known state-space size, when one was given.
    pub actual_coverage: Option<f64>,
}

impl fmt::Display for CrawlEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "explored={} est_unexplored={:.2} est_coverage={:.3}",
            self.explored_states, self.estimated_unexplored, self.estimated_coverage
        )?;
        if let Some(actual) = self.actual_coverage {
            write!(f, " act_coverage={actual:.3}")?;
        }
        Ok(())
    }
}

/// Coverage estimator with an optional known total.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlEstimator {
    actual_total: Option<usize>,
}

impl CrawlEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimator that also reports coverage against a known total.
    pub fn with_actual_total(total: usize) -> Self {
        Self {
            actual_total: Some(total),
        }
    }

    /// `explored_states` includes the root. `sampled_actions` were fired,
    /// `unsampled_actions` are still pending.
    pub fn estimate(
        &self,
        explored_states: usize,
        sampled_actions: usize,
        unsampled_actions: usize,
    ) -> CrawlEstimate {
        let discovered = explored_states.saturating_sub(1) as f64;
        let estimated_unexplored = if sampled_actions == 0 {
            0.0
        } else {
            discovered / sampled_actions as f64 * unsampled_actions as f64
        };
        let explored = explored_states as f64;
        let estimated_coverage = if explored + estimated_unexplored == 0.0 {
            0.0
        } else {
            explored / (explored + estimated_unexplored)
        };
        let actual_coverage = self
            .actual_total
            .filter(|t| *t > 0)
            .map(|t| (explored / t as f64).min(1.0));

        CrawlEstimate {
            explored_states,
            estimated_unexplored,
            estimated_coverage,
            actual_coverage,
        }
    }
}
