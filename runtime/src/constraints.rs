// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crawl limits checked at the top of every crawler iteration.

use crate::config::CrawlConfig;
use serde::{Deserialize, Serialize};
use stateflow::StateFlowGraph;
use std::fmt;
use std::time::Duration;

/// A limit that ends the whole crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintViolation {
    MaxStates { limit: usize },
    MaxRuntime { limit_secs: u64 },
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintViolation::MaxStates { limit } => write!(f, "max states ({limit}) reached"),
            ConstraintViolation::MaxRuntime { limit_secs } => {
                write!(f, "max runtime ({limit_secs}s) reached")
            }
        }
    }
}

/// Limits resolved from the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Constraints {
    max_states: Option<usize>,
    max_runtime: Option<Duration>,
    max_depth: Option<usize>,
}

impl Constraints {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            max_states: (config.max_states > 0).then_some(config.max_states),
            max_runtime: config.max_runtime(),
            max_depth: (config.max_depth > 0).then_some(config.max_depth),
        }
    }

    /// State-count and wall-clock limits. Either one stops the crawl.
    pub fn check(&self, graph: &StateFlowGraph, elapsed: Duration) -> Option<ConstraintViolation> {
        if let Some(limit) = self.max_states {
            if graph.state_count() >= limit {
                return Some(ConstraintViolation::MaxStates { limit });
            }
        }
        if let Some(limit) = self.max_runtime {
            if elapsed >= limit {
                return Some(ConstraintViolation::MaxRuntime {
                    limit_secs: limit.as_secs(),
                });
            }
        }
        None
    }

    /// Whether a chain of `depth` actions may not grow further.
    pub fn depth_reached(&self, depth: usize) -> bool {
        self.max_depth.is_some_and(|max| depth >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stateflow::StateSnapshot;

    fn graph() -> StateFlowGraph {
        let g = StateFlowGraph::new(StateSnapshot::unstripped("http://x/", "<p>root</p>"));
        g.add_state(StateSnapshot::unstripped("http://x/", "<p>1</p>"));
        g
    }

    #[test]
    fn test_unlimited_by_default() {
        let mut config = CrawlConfig::new("http://x/");
        config.max_runtime_secs = 0;
        let c = Constraints::from_config(&config);
        assert!(c.check(&graph(), Duration::from_secs(1_000_000)).is_none());
        assert!(!c.depth_reached(10_000));
    }

    #[test]
    fn test_max_states() {
        let mut config = CrawlConfig::new("http://x/");
        config.max_states = 2;
        let c = Constraints::from_config(&config);
        assert_eq!(
            c.check(&graph(), Duration::ZERO),
            Some(ConstraintViolation::MaxStates { limit: 2 })
        );
    }

    #[test]
    fn test_max_runtime() {
        let mut config = CrawlConfig::new("http://x/");
        config.max_runtime_secs = 5;
        let c = Constraints::from_config(&config);
        assert!(c.check(&graph(), Duration::from_secs(4)).is_none());
        let v = c.check(&graph(), Duration::from_secs(5)).unwrap();
        assert_eq!(v.to_string(), "max runtime (5s) reached");
    }

    #[test]
    fn test_depth() {
        let mut config = CrawlConfig::new("http://x/");
        config.max_depth = 2;
        let c = Constraints::from_config(&config);
        assert!(!c.depth_reached(1));
        assert!(c.depth_reached(2));
    }
}
