// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Candidate action extraction.
//!
//! An extractor lists the actions worth firing in a state. It runs once per
//! state; the crawler applies click-once and element conditions when it
//! claims each action.

pub mod html;

pub use html::HtmlCandidateExtractor;

use crate::renderer::BrowserContext;
use anyhow::Result;
use async_trait::async_trait;
use stateflow::{CandidateAction, State};

#[async_trait]
pub trait CandidateExtractor: Send + Sync {
    /// Candidate actions of `state`, in the order they should be fired.
    /// The browser is positioned on `state` when this is called.
    async fn extract(&self, browser: &dyn BrowserContext, state: &State) -> Result<Vec<CandidateAction>>;
}
