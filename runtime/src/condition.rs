// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Conditions evaluated against the live browser.
//!
//! The same condition shapes back three features:
//! crawl conditions (checked around every replayed step), invariants
//! (checked after every transition), and element conditions (checked before
//! a candidate action is fired).

use crate::renderer::BrowserContext;
use anyhow::{Context, Result};
use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use stateflow::Identification;
use std::sync::OnceLock;

/// A single check against the current page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Current URL contains the text.
    Url { contains: String },
    /// Current URL does not contain the text.
    NotUrl { contains: String },
    /// DOM matches the pattern, case-insensitively.
    Regex { pattern: String },
    /// DOM does not match the pattern.
    NotRegex { pattern: String },
    /// The element is displayed.
    Visible { element: Identification },
    /// The element is missing or hidden.
    NotVisible { element: Identification },
}

impl Condition {
    pub async fn check(&self, browser: &dyn BrowserContext) -> Result<bool> {
        Ok(match self {
            Condition::Url { contains } => browser.current_url().await?.contains(contains.as_str()),
            Condition::NotUrl { contains } => {
                !browser.current_url().await?.contains(contains.as_str())
            }
            Condition::Regex { pattern } => dom_matches(browser, pattern).await?,
            Condition::NotRegex { pattern } => !dom_matches(browser, pattern).await?,
            Condition::Visible { element } => browser.is_visible(element).await?,
            Condition::NotVisible { element } => !browser.is_visible(element).await?,
        })
    }

    /// Reject patterns that would never compile. Valid ones are compiled
    /// here once and reused by every check.
    pub fn validate(&self) -> Result<()> {
        if let Condition::Regex { pattern } | Condition::NotRegex { pattern } = self {
            compiled(pattern)?;
        }
        Ok(())
    }
}

fn build_regex(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid condition pattern: {pattern}"))
}

/// Compiled condition patterns, keyed by source text.
fn pattern_cache() -> &'static DashMap<String, Regex> {
    static PATTERNS: OnceLock<DashMap<String, Regex>> = OnceLock::new();
    PATTERNS.get_or_init(DashMap::new)
}

fn compiled(pattern: &str) -> Result<Regex> {
    let cache = pattern_cache();
    if let Some(re) = cache.get(pattern) {
        return Ok(re.value().clone());
    }
    let re = build_regex(pattern)?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

async fn dom_matches(browser: &dyn BrowserContext, pattern: &str) -> Result<bool> {
    let re = compiled(pattern)?;
    Ok(re.is_match(&browser.dom().await?))
}

/// A named condition, only enforced while all of its preconditions hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    pub description: String,
    pub condition: Condition,
    #[serde(default)]
    pub preconditions: Vec<Condition>,
}

/// Must hold before and after every replayed step.
pub type CrawlCondition = ConditionRule;

/// Must hold in every state reached.
pub type Invariant = ConditionRule;

impl ConditionRule {
    pub fn new(description: impl Into<String>, condition: Condition) -> Self {
        Self {
            description: description.into(),
            condition,
            preconditions: Vec::new(),
        }
    }

    pub fn with_precondition(mut self, precondition: Condition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// True when a precondition fails or the condition holds.
    pub async fn holds(&self, browser: &dyn BrowserContext) -> Result<bool> {
        for pre in &self.preconditions {
            if !pre.check(browser).await? {
                return Ok(true);
            }
        }
        self.condition.check(browser).await
    }

    pub fn validate(&self) -> Result<()> {
        self.condition.validate()?;
        self.preconditions.iter().try_for_each(Condition::validate)
    }
}

/// Conditions gating candidate actions whose XPath starts with a prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementCondition {
    pub xpath_prefix: String,
    pub conditions: Vec<Condition>,
}

impl ElementCondition {
    pub fn applies_to(&self, identification: &Identification) -> bool {
        identification.how == stateflow::How::XPath
            && identification.value.starts_with(&self.xpath_prefix)
    }

    pub async fn holds(&self, browser: &dyn BrowserContext) -> Result<bool> {
        for c in &self.conditions {
            if !c.check(browser).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Check a list of rules, returning the first one that fails.
pub async fn first_failing<'a>(
    rules: &'a [ConditionRule],
    browser: &dyn BrowserContext,
) -> Result<Option<&'a ConditionRule>> {
    for rule in rules {
        if !rule.holds(browser).await? {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}
