// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crawl event bus: typed events from every crawler.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`CrawlEvent`] values. Consumers (the CLI progress output, tests, log
//! sinks) subscribe independently. When no subscribers exist, events are
//! silently dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event a crawl emits. Serialized to JSON for `--json` output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CrawlEvent {
    // ── Lifecycle ─────────────────────────
    /// A crawl has started from its entry URL.
    CrawlStarted {
        run_id: String,
        url: String,
        browsers: usize,
        timestamp: String,
    },
    /// The crawl finished.
    CrawlComplete {
        run_id: String,
        states: usize,
        edges: usize,
        elapsed_ms: u64,
    },
    /// A state-count or runtime limit ended the crawl.
    ConstraintReached { constraint: String },

    // ── Exploration ───────────────────────
    /// A previously unseen state was inserted into the graph.
    StateDiscovered {
        state: String,
        url: String,
        from: String,
        action: String,
    },
    /// An action led to a state that already exists.
    CloneDetected {
        state: String,
        from: String,
        action: String,
    },
    /// An action was fired in the browser.
    ActionFired {
        crawler: usize,
        state: String,
        action: String,
        fired: bool,
    },
    /// An invariant did not hold after a transition.
    InvariantViolated { state: String, invariant: String },

    // ── Failures ──────────────────────────
    /// A crawler lost its browser or aborted a task.
    CrawlerFailed { crawler: usize, error: String },
}

/// The central event bus of a crawl.
pub struct EventBus {
    sender: broadcast::Sender<CrawlEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: CrawlEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// RFC 3339 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CrawlEvent::StateDiscovered {
            state: "state3".to_string(),
            url: "http://localhost/#/cart".to_string(),
            from: "index".to_string(),
            action: "click xpath /html/body/a[2]".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"StateDiscovered\""));
        assert!(json.contains("state3"));

        let parsed: CrawlEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            CrawlEvent::StateDiscovered { from, .. } => assert_eq!(from, "index"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(CrawlEvent::ConstraintReached {
            constraint: "max states 10".to_string(),
        });
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(CrawlEvent::CrawlerFailed {
            crawler: 2,
            error: "socket closed".to_string(),
        });

        match rx.try_recv().unwrap() {
            CrawlEvent::CrawlerFailed { crawler, .. } => assert_eq!(crawler, 2),
            _ => panic!("wrong event"),
        }
    }
}
