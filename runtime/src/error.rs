// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crawl error types.

use crate::session::CrawlPath;
use stateflow::GraphError;

/// Errors that abort a crawl task.
#[derive(thiserror::Error, Debug)]
pub enum CrawlError {
    /// The browser stopped responding. Only the crawler that owns it stops.
    #[error("browser connection lost after [{path}]: {source:#}")]
    BrowserConnection {
        path: CrawlPath,
        #[source]
        source: anyhow::Error,
    },

    /// Replaying a recorded path did not reach its target.
    #[error("replay failed at step {step}: {reason}")]
    Replay { step: usize, reason: String },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("candidate extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    pub fn is_connection(&self) -> bool {
        matches!(self, CrawlError::BrowserConnection { .. })
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;
