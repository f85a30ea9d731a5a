// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for the browser driving a crawl.
//!
//! Defines the `Renderer` and `BrowserContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide).
//!
//! Errors returned by a `BrowserContext` mean the browser itself is no
//! longer usable. An element that cannot be fired is `Ok(false)`.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stateflow::{Eventable, Identification};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create browser contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn BrowserContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) owned by one crawler.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Serialized DOM of the current page.
    async fn dom(&self) -> Result<String>;
    /// Get the current URL.
    async fn current_url(&self) -> Result<String>;
    /// Fill the action's form inputs and fire its event.
    /// Returns false when the element could not be found or fired.
    async fn fire_event(&mut self, action: &Eventable) -> Result<bool>;
    /// Whether the identified element exists and is displayed.
    async fn is_visible(&self, identification: &Identification) -> Result<bool>;
    /// Absolute XPath of the identified element, if it can be located.
    async fn resolve_xpath(&self, identification: &Identification) -> Result<Option<String>>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A no-op renderer used when Chromium is unavailable.
///
/// Every crawl needs a browser, so handing out contexts always fails with a
/// message pointing at the missing binary.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn BrowserContext>> {
        Err(anyhow::anyhow!(
            "browser not available: set STATEFLOW_CHROMIUM_PATH or install Chromium"
        ))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
