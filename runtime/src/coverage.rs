// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Code coverage sampling for diversity-guided crawling.

use crate::renderer::BrowserContext;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

/// Reads the application's cumulative code coverage from the browser.
#[async_trait]
pub trait CoverageProbe: Send + Sync {
    async fn sample(&self, browser: &dyn BrowserContext) -> Result<f64>;
}

/// Evaluates a script that returns a number, such as
/// `window.__coverage_ratio()` exposed by an instrumented build.
pub struct ScriptCoverageProbe {
    script: String,
}

impl ScriptCoverageProbe {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl CoverageProbe for ScriptCoverageProbe {
    async fn sample(&self, browser: &dyn BrowserContext) -> Result<f64> {
        let value = browser
            .execute_js(&self.script)
            .await
            .context("coverage script failed")?;
        match value.as_f64() {
            Some(v) if v.is_finite() => Ok(v),
            _ => bail!("coverage script returned a non-number: {value}"),
        }
    }
}
