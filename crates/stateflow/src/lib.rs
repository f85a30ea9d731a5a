// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Stateflow: core state-flow graph for exploring dynamic web applications.
//!
//! States are canonicalized renderings of a page, edges are the actions that
//! moved the application from one rendering to another. The graph detects
//! clones, tracks which states still have unfired actions, and scores states
//! by DOM-tree and path diversity.

pub mod dom_tree;
pub mod estimator;
pub mod graph;
pub mod similarity;
pub mod state;
pub mod tree_edit;
pub mod types;

pub use dom_tree::{DomNode, DomTree};
pub use estimator::{CrawlEstimate, CrawlEstimator};
pub use graph::{AddState, GraphOptions, GraphSnapshot, StateFlowGraph, StateSummary, ROOT_NAME};
pub use similarity::{normalized_tree_distance, path_set_diversity, prefix_similarity};
pub use state::{ClaimedAction, State, StateSnapshot};
pub use tree_edit::tree_edit_distance;
pub use types::*;
