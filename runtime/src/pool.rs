// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser pool: hands out one browser context per crawler and replaces
//! contexts whose connection was lost.

use crate::renderer::{BrowserContext, Renderer};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct BrowserPool {
    renderer: Arc<dyn Renderer>,
    created: AtomicUsize,
    replaced: AtomicUsize,
}

impl BrowserPool {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            renderer,
            created: AtomicUsize::new(0),
            replaced: AtomicUsize::new(0),
        }
    }

    /// Open a fresh browser context.
    pub async fn acquire(&self) -> Result<Box<dyn BrowserContext>> {
        let ctx = self
            .renderer
            .new_context()
            .await
            .context("failed to open a browser context")?;
        let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(created = n, active = self.renderer.active_contexts(), "browser acquired");
        Ok(ctx)
    }

    /// Open a context to stand in for one that lost its connection.
    pub async fn replace(&self) -> Result<Box<dyn BrowserContext>> {
        let ctx = self.acquire().await?;
        self.replaced.fetch_add(1, Ordering::Relaxed);
        Ok(ctx)
    }

    /// Close a context. Close errors are logged, a dead browser may not
    /// answer at all.
    pub async fn release(&self, ctx: Box<dyn BrowserContext>) {
        if let Err(e) = ctx.close().await {
            tracing::debug!("closing browser context failed: {e:#}");
        }
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.renderer.shutdown().await {
            tracing::warn!("renderer shutdown failed: {e:#}");
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn replaced(&self) -> usize {
        self.replaced.load(Ordering::Relaxed)
    }
}
