// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end crawls against the scripted application in `support`.

mod support;

use stateflow::{StateId, ROOT_NAME};
use stateflow_runtime::condition::{Condition, ConditionRule, ElementCondition};
use stateflow_runtime::config::CrawlConfig;
use stateflow_runtime::constraints::ConstraintViolation;
use stateflow_runtime::controller::{CrawlController, CrawlReport};
use stateflow_runtime::events::{CrawlEvent, EventBus};
use stateflow_runtime::selector::SelectionStrategy;
use std::sync::Arc;
use support::{chain_app, config, tree_app, FakeApp, FakeRenderer, COVERAGE_SCRIPT};

async fn crawl(app: FakeApp, config: CrawlConfig) -> (CrawlReport, Arc<FakeRenderer>) {
    let renderer = Arc::new(FakeRenderer::new(Arc::new(app)));
    let report = CrawlController::new(config, renderer.clone())
        .unwrap()
        .run()
        .await
        .unwrap();
    (report, renderer)
}

fn state_names(report: &CrawlReport) -> Vec<String> {
    report
        .graph
        .states()
        .iter()
        .map(|s| s.url().rsplit('/').next().unwrap_or_default().to_string())
        .collect()
}

// ── Work-queue crawling ──

#[tokio::test]
async fn test_new_state_and_self_loop() {
    // a1 reaches a new page, a2 leaves the DOM as it was
    let app = FakeApp::new().page("index", &["next", "index"]).page("next", &[]);
    let (report, _) = crawl(app, config()).await;

    let graph = &report.graph;
    assert_eq!(graph.state_count(), 2);
    assert_eq!(graph.edge_count(), 2);
    assert_eq!(graph.root().name(), ROOT_NAME);
    assert_eq!(graph.outgoing(StateId::ROOT).len(), 2);
    let self_loops = graph
        .edges()
        .iter()
        .filter(|e| e.source == Some(StateId::ROOT) && e.target == Some(StateId::ROOT))
        .count();
    assert_eq!(self_loops, 1);
    assert_eq!(graph.frontier_len(), 0);
}

#[tokio::test]
async fn test_full_crawl_empties_frontier() {
    let (report, _) = crawl(tree_app(), config()).await;

    let graph = &report.graph;
    assert_eq!(graph.state_count(), 4);
    assert_eq!(graph.edge_count(), 5);
    assert_eq!(graph.frontier_len(), 0);
    assert!(report.termination.is_none());
    let mut names = state_names(&report);
    names.sort();
    assert_eq!(names, vec!["a", "b", "c", "index"]);

    assert_eq!(report.stats.states, 4);
    assert_eq!(report.stats.clickables, 5);
    assert_eq!(report.stats.examined_elements, 5);
    assert_eq!(report.stats.fired_events, 5);
}

#[tokio::test]
async fn test_clone_edges_target_existing_state() {
    let (report, _) = crawl(tree_app(), config()).await;
    let graph = &report.graph;

    let b = graph
        .states()
        .into_iter()
        .find(|s| s.url().ends_with("/b"))
        .unwrap();
    let out = graph.outgoing(b.id());
    assert_eq!(out.len(), 1);
    let target = graph.target_of(&out[0]).unwrap();
    assert!(target.url().ends_with("/a"));
    // b reaches a by a clone, so its replay path is still the first one found
    assert_eq!(target.replay_path().len(), 1);
}

#[tokio::test]
async fn test_max_states_terminates() {
    let mut config = config();
    config.max_states = 3;
    let (report, _) = crawl(chain_app(8), config).await;

    assert_eq!(report.graph.state_count(), 3);
    assert_eq!(report.termination, Some(ConstraintViolation::MaxStates { limit: 3 }));
    assert_eq!(report.stats.termination.as_deref(), Some("max states (3) reached"));
}

#[tokio::test]
async fn test_max_depth_ends_chains_only() {
    let mut config = config();
    config.max_depth = 2;
    let (report, _) = crawl(chain_app(6), config).await;

    assert_eq!(report.graph.state_count(), 3);
    assert!(report.termination.is_none());
    // the state at the depth limit was never expanded
    assert_eq!(report.graph.frontier_len(), 1);
}

#[tokio::test]
async fn test_parallel_browsers_find_same_graph() {
    let mut config = config();
    config.browsers = 3;
    let (report, renderer) = crawl(tree_app(), config).await;

    assert_eq!(report.graph.state_count(), 4);
    assert_eq!(report.graph.edge_count(), 5);
    assert_eq!(report.graph.frontier_len(), 0);
    assert_eq!(renderer.created(), 3);
}

#[tokio::test]
async fn test_lost_browser_is_replaced() {
    // the browser dies firing a -> c; c is never reached but a -> index is
    let app = tree_app().kill_on("a", 0);
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let renderer = Arc::new(FakeRenderer::new(Arc::new(app)));
    let report = CrawlController::new(config(), renderer.clone())
        .unwrap()
        .with_events(Arc::clone(&events))
        .run()
        .await
        .unwrap();

    assert_eq!(renderer.created(), 2);
    assert_eq!(report.graph.state_count(), 3);
    assert_eq!(report.graph.edge_count(), 4);
    assert_eq!(report.graph.frontier_len(), 0);

    let mut failures = 0;
    while let Ok(event) = rx.try_recv() {
        if let CrawlEvent::CrawlerFailed { error, .. } = event {
            assert!(error.contains("connection closed"));
            failures += 1;
        }
    }
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_browser_lost_during_replay_resumes_task() {
    // the second firing of index -> a is the replay of a's sibling task
    let app = FakeApp::new()
        .page("index", &["a"])
        .page("a", &["x", "y"])
        .page("x", &[])
        .page("y", &[])
        .kill_on_firing("index", 0, 2);
    let (report, renderer) = crawl(app, config()).await;

    assert_eq!(renderer.created(), 2);
    let mut names = state_names(&report);
    names.sort();
    assert_eq!(names, vec!["a", "index", "x", "y"]);
    assert_eq!(report.graph.frontier_len(), 0);
    assert!(report.termination.is_none());
}

#[tokio::test]
async fn test_parallel_crawl_skips_diversity_caches() {
    let (report, _) = crawl(tree_app(), config()).await;
    let graph = &report.graph;

    assert!(!graph.options().track_diversity);
    assert!(report.stats.dom_diversity.is_none());
    assert!(report.stats.path_diversity.is_none());
    for state in graph.states() {
        assert_eq!(graph.min_dom_diversity(state.id()), 1.0);
        assert_eq!(graph.min_path_diversity(state.id()), 1.0);
    }
}

#[tokio::test]
async fn test_crawl_condition_aborts_replay() {
    let app = tree_app().with_markup("a", "<p>restricted</p>");
    let mut config = config();
    config.crawl_conditions = vec![ConditionRule::new(
        "stay out of a",
        Condition::NotRegex {
            pattern: "restricted".into(),
        },
    )];
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let renderer = Arc::new(FakeRenderer::new(Arc::new(app)));
    let report = CrawlController::new(config, renderer)
        .unwrap()
        .with_events(Arc::clone(&events))
        .run()
        .await
        .unwrap();

    let mut failures = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CrawlEvent::CrawlerFailed { error, .. } = event {
            failures.push(error);
        }
    }
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("replay failed at step 0"));
    assert!(failures[0].contains("crawl condition 'stay out of a' does not hold"));

    // a was reached while crawling but its sibling task never got back there
    let graph = &report.graph;
    assert_eq!(graph.state_count(), 4);
    assert_eq!(graph.edge_count(), 4);
    assert_eq!(graph.frontier_len(), 1);
    assert!(graph.frontier()[0].url().ends_with("/a"));
}

#[tokio::test]
async fn test_click_once_fires_shared_element_once() {
    // a and b both carry the same "to c" link
    let app = || {
        FakeApp::new()
            .page("index", &["a", "b"])
            .page("a", &["c"])
            .page("b", &["c"])
            .page("c", &[])
            .with_plain_labels()
    };

    let (report, _) = crawl(app(), config()).await;
    assert_eq!(report.graph.state_count(), 4);
    assert_eq!(report.graph.edge_count(), 3);
    assert_eq!(report.stats.examined_elements, 3);
    assert_eq!(report.graph.frontier_len(), 0);

    let mut config = config();
    config.click_once = false;
    let (report, _) = crawl(app(), config).await;
    assert_eq!(report.graph.state_count(), 4);
    assert_eq!(report.graph.edge_count(), 4);
    assert_eq!(report.stats.examined_elements, 4);
}

#[tokio::test]
async fn test_element_condition_gates_action() {
    // second links only fire while on the index page
    let mut config = config();
    config.element_conditions = vec![ElementCondition {
        xpath_prefix: "/html/body/a[2]".into(),
        conditions: vec![Condition::Regex {
            pattern: "<h1>index</h1>".into(),
        }],
    }];
    let (report, _) = crawl(tree_app(), config).await;
    let graph = &report.graph;

    assert_eq!(graph.state_count(), 4);
    assert_eq!(graph.edge_count(), 4);
    assert_eq!(report.stats.examined_elements, 5);
    assert_eq!(report.stats.fired_events, 4);
    let a = graph
        .states()
        .into_iter()
        .find(|s| s.url().ends_with("/a"))
        .unwrap();
    assert!(graph.outgoing(a.id()).iter().all(|e| e.target != Some(StateId::ROOT)));
    assert_eq!(graph.frontier_len(), 0);
}

#[tokio::test]
async fn test_events_and_paths() {
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let renderer = Arc::new(FakeRenderer::new(Arc::new(tree_app())));
    let report = CrawlController::new(config(), renderer)
        .unwrap()
        .with_events(Arc::clone(&events))
        .run()
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(event) = rx.try_recv() {
        received.push(event);
    }
    assert!(matches!(received.first(), Some(CrawlEvent::CrawlStarted { .. })));
    assert!(matches!(received.last(), Some(CrawlEvent::CrawlComplete { states: 4, edges: 5, .. })));
    let discovered = received
        .iter()
        .filter(|e| matches!(e, CrawlEvent::StateDiscovered { .. }))
        .count();
    let clones = received
        .iter()
        .filter(|e| matches!(e, CrawlEvent::CloneDetected { .. }))
        .count();
    assert_eq!(discovered, 3);
    assert_eq!(clones, 2);

    // index->a->c, a->index, index->b->a
    assert_eq!(report.paths.len(), 3);
    assert!(report.paths.iter().all(|p| !p.is_empty()));
}

#[tokio::test]
async fn test_invariant_violation_reported() {
    let app = tree_app().with_markup("c", "<p class=\"error\">Oops</p>");
    let mut config = config();
    config.invariants = vec![ConditionRule::new(
        "no error banner",
        Condition::NotRegex {
            pattern: "class=\"error\"".into(),
        },
    )];
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let renderer = Arc::new(FakeRenderer::new(Arc::new(app)));
    let report = CrawlController::new(config, renderer)
        .unwrap()
        .with_events(Arc::clone(&events))
        .run()
        .await
        .unwrap();

    let mut violations = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CrawlEvent::InvariantViolated { state, invariant } = event {
            violations.push((state, invariant));
        }
    }
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].1, "no error banner");
    // a violation never stops the crawl
    assert_eq!(report.graph.state_count(), 4);
}

#[tokio::test]
async fn test_stats_file_appended() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.txt");
    let renderer = Arc::new(FakeRenderer::new(Arc::new(tree_app())));
    CrawlController::new(config(), renderer)
        .unwrap()
        .with_stats_file(path.clone())
        .run()
        .await
        .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("STATES: 4"));
    assert!(text.contains("CLICKABLES: 5"));
    assert!(text.contains("EXAMINED ELEMENTS: 5"));
}

// ── Guided crawling ──

#[tokio::test]
async fn test_guided_strategies_cover_the_app() {
    for strategy in [
        SelectionStrategy::Dfs,
        SelectionStrategy::Bfs,
        SelectionStrategy::Random,
        SelectionStrategy::Diversity,
    ] {
        let mut config = config();
        config.strategy = Some(strategy);
        config.seed = Some(7);
        let (report, renderer) = crawl(tree_app(), config).await;

        assert_eq!(report.graph.state_count(), 4, "{strategy}");
        assert_eq!(report.graph.edge_count(), 5, "{strategy}");
        assert_eq!(report.graph.frontier_len(), 0, "{strategy}");
        assert_eq!(renderer.created(), 1, "{strategy}");
    }
}

#[tokio::test]
async fn test_guided_records_replay_paths() {
    let mut config = config();
    config.strategy = Some(SelectionStrategy::Bfs);
    let (report, _) = crawl(tree_app(), config).await;

    let c = report
        .graph
        .states()
        .into_iter()
        .find(|s| s.url().ends_with("/c"))
        .unwrap();
    let replay = c.replay_path();
    assert_eq!(replay.len(), 2);
    assert_eq!(replay[1].target, Some(c.id()));
}

#[tokio::test]
async fn test_guided_gives_up_on_unreachable_states() {
    // index -> a only works once, so neither a nor x can be relocated to
    let app = FakeApp::new()
        .page("index", &["a"])
        .page("a", &["x", "y"])
        .page("x", &[])
        .page("y", &[])
        .one_shot("index", 0);
    let mut config = config();
    config.strategy = Some(SelectionStrategy::Bfs);
    let (report, renderer) = crawl(app, config).await;

    let mut names = state_names(&report);
    names.sort();
    assert_eq!(names, vec!["a", "index", "x"]);
    // one firing while crawling, then three failed replays each for a and x
    assert_eq!(renderer.app().attempts("index", 0), 7);
    assert_eq!(report.graph.frontier_len(), 2);
    assert!(report.termination.is_none());
}

#[tokio::test]
async fn test_diversity_crawl_samples_coverage() {
    let app = tree_app()
        .with_coverage("index", 0.1)
        .with_coverage("a", 0.3)
        .with_coverage("b", 0.35)
        .with_coverage("c", 0.6);
    let mut config = config();
    config.strategy = Some(SelectionStrategy::Diversity);
    config.coverage_script = Some(COVERAGE_SCRIPT.into());
    let (report, _) = crawl(app, config).await;

    let graph = &report.graph;
    assert!(graph.options().track_diversity);
    assert_eq!(graph.state_count(), 4);
    assert!(graph.latest_coverage() > 0.0);
    let a = graph
        .states()
        .into_iter()
        .find(|s| s.url().ends_with("/a"))
        .unwrap();
    assert!((graph.coverage_increase(a.id()) - 0.2).abs() < 1e-9);
    assert!(report.stats.path_diversity.is_some());
}

#[tokio::test]
async fn test_efficient_crawling_still_complete() {
    let mut config = config();
    config.efficient_crawling = true;
    let (report, _) = crawl(tree_app(), config).await;
    assert_eq!(report.graph.state_count(), 4);
    assert!(report.stats.productivity.is_some());
}
