// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run statistics reported at the end of a crawl.

use crate::session::CrawlSession;
use anyhow::{Context, Result};
use serde::Serialize;
use stateflow::{CrawlEstimate, CrawlEstimator};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct CrawlStats {
    pub run_id: String,
    pub url: String,
    pub duration_ms: u64,
    pub examined_elements: usize,
    /// Number of edges in the graph.
    pub clickables: usize,
    pub states: usize,
    pub fired_events: usize,
    pub crawl_paths: usize,
    /// Mean raw DOM size in bytes.
    pub mean_dom_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_diversity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_diversity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub productivity: Option<f64>,
    pub estimate: CrawlEstimate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<String>,
}

impl CrawlStats {
    pub fn collect(session: &CrawlSession) -> Self {
        let graph = session.graph();
        let diversity = graph.options().track_diversity;
        let estimator = match session.config().actual_state_space {
            Some(total) => CrawlEstimator::with_actual_total(total),
            None => CrawlEstimator::new(),
        };
        let estimate = estimator.estimate(
            graph.state_count(),
            session.fired(),
            graph.unprocessed_candidate_count(),
        );

        Self {
            run_id: session.run_id().to_string(),
            url: session.config().url.clone(),
            duration_ms: session.elapsed().as_millis() as u64,
            examined_elements: session.examined(),
            clickables: graph.edge_count(),
            states: graph.state_count(),
            fired_events: session.fired(),
            crawl_paths: session.paths().len(),
            mean_dom_size: graph.mean_dom_size(),
            dom_diversity: diversity.then(|| graph.final_dom_diversity()),
            path_diversity: diversity.then(|| graph.final_path_diversity()),
            productivity: session.productivity().mean_ratio(),
            estimate,
            termination: session.termination().map(|t| t.to_string()),
        }
    }

    /// Plain-text report, one fact per line.
    pub fn lines(&self) -> Vec<String> {
        let secs = self.duration_ms / 1000;
        let mut lines = vec![
            format!(
                "Total Crawling time({}ms) ~= {} min, {} sec",
                self.duration_ms,
                secs / 60,
                secs % 60
            ),
            format!("EXAMINED ELEMENTS: {}", self.examined_elements),
            format!("CLICKABLES: {}", self.clickables),
            format!("STATES: {}", self.states),
            format!("Dom average size (byte): {}", self.mean_dom_size),
        ];
        if let Some(d) = self.dom_diversity {
            lines.push(format!("DOM diversity: {d:.4}"));
        }
        if let Some(p) = self.path_diversity {
            lines.push(format!("Path diversity: {p:.4}"));
        }
        lines.push(format!("Estimate: {}", self.estimate));
        if let Some(t) = &self.termination {
            lines.push(format!("Stopped: {t}"));
        }
        lines
    }

    /// Append the report to a stats file, creating it if needed.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open stats file {}", path.display()))?;
        writeln!(file, "# {} {}", self.run_id, self.url)?;
        for line in self.lines() {
            writeln!(file, "{line}")?;
        }
        writeln!(file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> CrawlStats {
        CrawlStats {
            run_id: "run".into(),
            url: "http://localhost/".into(),
            duration_ms: 125_500,
            examined_elements: 12,
            clickables: 7,
            states: 4,
            fired_events: 10,
            crawl_paths: 3,
            mean_dom_size: 512,
            dom_diversity: None,
            path_diversity: Some(0.5),
            productivity: None,
            estimate: CrawlEstimator::new().estimate(4, 10, 0),
            termination: None,
        }
    }

    #[test]
    fn test_report_lines() {
        let lines = stats().lines();
        assert_eq!(lines[0], "Total Crawling time(125500ms) ~= 2 min, 5 sec");
        assert_eq!(lines[1], "EXAMINED ELEMENTS: 12");
        assert_eq!(lines[2], "CLICKABLES: 7");
        assert_eq!(lines[3], "STATES: 4");
        assert_eq!(lines[4], "Dom average size (byte): 512");
        assert!(lines.iter().any(|l| l == "Path diversity: 0.5000"));
        assert!(!lines.iter().any(|l| l.starts_with("DOM diversity")));
    }

    #[test]
    fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.txt");
        stats().append_to(&path).unwrap();
        stats().append_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("STATES: 4").count(), 2);
    }

    #[test]
    fn test_json_skips_missing() {
        let json = serde_json::to_value(stats()).unwrap();
        assert!(json.get("dom_diversity").is_none());
        assert_eq!(json["states"], 4);
    }
}
