// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extract candidate actions by parsing the state's DOM.

use super::CandidateExtractor;
use crate::config::CrawlConfig;
use crate::renderer::BrowserContext;
use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use stateflow::{CandidateAction, FormInput, Identification, State};

const MAX_TEXT_CHARS: usize = 60;

/// Selector-driven extractor producing absolute XPath identifications.
pub struct HtmlCandidateExtractor {
    include: Vec<Selector>,
    exclude: Vec<Selector>,
    form_inputs: Vec<FormInput>,
}

impl HtmlCandidateExtractor {
    pub fn new(include: &[String], exclude: &[String], form_inputs: Vec<FormInput>) -> Result<Self> {
        Ok(Self {
            include: parse_selectors(include)?,
            exclude: parse_selectors(exclude)?,
            form_inputs,
        })
    }

    pub fn from_config(config: &CrawlConfig) -> Result<Self> {
        Self::new(
            &config.include_selectors,
            &config.exclude_selectors,
            config.form_inputs.clone(),
        )
    }

    /// Candidates in document order.
    pub fn candidates_from_html(&self, html: &str) -> Vec<CandidateAction> {
        let doc = Html::parse_document(html);
        doc.root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| self.include.iter().any(|s| s.matches(el)))
            .filter(|el| !self.exclude.iter().any(|s| s.matches(el)))
            .map(|el| self.candidate(el))
            .collect()
    }

    fn candidate(&self, el: ElementRef<'_>) -> CandidateAction {
        let mut action = CandidateAction::new(Identification::xpath(xpath_of(el)), el.value().name())
            .with_text(element_text(el));
        let in_form = el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| a.value().name() == "form");
        if in_form {
            action.related_form_inputs = self.form_inputs.clone();
        }
        action
    }
}

#[async_trait]
impl CandidateExtractor for HtmlCandidateExtractor {
    async fn extract(&self, _browser: &dyn BrowserContext, state: &State) -> Result<Vec<CandidateAction>> {
        let candidates = self.candidates_from_html(state.dom());
        tracing::debug!(state = %state.name(), count = candidates.len(), "extracted candidates");
        Ok(candidates)
    }
}

fn parse_selectors(patterns: &[String]) -> Result<Vec<Selector>> {
    patterns
        .iter()
        .map(|p| Selector::parse(p).map_err(|e| anyhow::anyhow!("invalid selector {p}: {e}")))
        .collect()
}

/// Absolute XPath of an element. Steps carry a 1-based index only when the
/// parent has more than one child with the same tag.
pub fn xpath_of(el: ElementRef<'_>) -> String {
    let mut steps = Vec::new();
    let mut current = Some(el);
    while let Some(node) = current {
        let tag = node.value().name();
        let parent = node.parent().and_then(ElementRef::wrap);
        let step = match parent {
            Some(p) => {
                let same: Vec<ElementRef<'_>> = p
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| c.value().name() == tag)
                    .collect();
                if same.len() > 1 {
                    let index = same.iter().position(|c| c.id() == node.id()).unwrap_or(0) + 1;
                    format!("{tag}[{index}]")
                } else {
                    tag.to_string()
                }
            }
            None => tag.to_string(),
        };
        steps.push(step);
        current = parent;
    }
    steps.reverse();
    format!("/{}", steps.join("/"))
}

fn element_text(el: ElementRef<'_>) -> String {
    let text = el.text().collect::<Vec<_>>().join(" ");
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    normalized.chars().take(MAX_TEXT_CHARS).collect()
}
