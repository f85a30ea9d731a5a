// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory web application and browser for crawl tests.
//!
//! Each page renders as `<h1>` plus one `<a>` per link, so the default HTML
//! extractor finds the links at `/html/body/a` or `/html/body/a[i]`.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use stateflow::{Eventable, Identification};
use stateflow_runtime::config::CrawlConfig;
use stateflow_runtime::renderer::{BrowserContext, NavigationResult, Renderer};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ENTRY: &str = "http://app.test/";
pub const COVERAGE_SCRIPT: &str = "window.__coverage()";

// ── Application ──

#[derive(Debug, Clone, Default)]
struct Page {
    extra: String,
    links: Vec<String>,
    coverage: f64,
}

/// Kills the browser on the `remaining`-th firing of `xpath` on `page`.
#[derive(Debug)]
struct KillSwitch {
    page: String,
    xpath: String,
    remaining: usize,
}

/// Pages by name; `index` is the entry page.
#[derive(Debug, Default)]
pub struct FakeApp {
    pages: HashMap<String, Page>,
    kill_on: Mutex<Option<KillSwitch>>,
    /// Links that only work the first time they are fired.
    one_shot: HashSet<(String, String)>,
    spent: Mutex<HashSet<(String, String)>>,
    /// Link text is `to <page>` on every page instead of `<page> to <page>`.
    plain_labels: bool,
    attempts: Mutex<HashMap<(String, String), usize>>,
    fired: AtomicUsize,
}

impl FakeApp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page linking to `links`, in order.
    pub fn page(mut self, name: &str, links: &[&str]) -> Self {
        let page = self.pages.entry(name.to_string()).or_default();
        page.links = links.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Extra markup rendered in the page body.
    pub fn with_markup(mut self, name: &str, markup: &str) -> Self {
        self.pages.entry(name.to_string()).or_default().extra = markup.to_string();
        self
    }

    /// Cumulative coverage reported while on this page.
    pub fn with_coverage(mut self, name: &str, coverage: f64) -> Self {
        self.pages.entry(name.to_string()).or_default().coverage = coverage;
        self
    }

    /// Kill the browser the first time link `index` (0-based) of `page` fires.
    pub fn kill_on(self, page: &str, index: usize) -> Self {
        self.kill_on_firing(page, index, 1)
    }

    /// Kill the browser the `nth` time link `index` of `page` fires.
    pub fn kill_on_firing(self, page: &str, index: usize, nth: usize) -> Self {
        let xpath = self.link_xpath(page, index);
        *self.kill_on.lock().unwrap() = Some(KillSwitch {
            page: page.to_string(),
            xpath,
            remaining: nth,
        });
        self
    }

    /// Link `index` of `page` stops working after it fired once.
    pub fn one_shot(mut self, page: &str, index: usize) -> Self {
        let xpath = self.link_xpath(page, index);
        self.one_shot.insert((page.to_string(), xpath));
        self
    }

    /// Label links by their destination only, so identical links on
    /// different pages look like the same element.
    pub fn with_plain_labels(mut self) -> Self {
        self.plain_labels = true;
        self
    }

    pub fn render(&self, name: &str) -> String {
        let page = &self.pages[name];
        let links: String = page
            .links
            .iter()
            .map(|to| {
                if self.plain_labels {
                    format!("<a href=\"#\">to {to}</a>")
                } else {
                    format!("<a href=\"#\">{name} to {to}</a>")
                }
            })
            .collect();
        format!(
            "<html><head></head><body><h1>{name}</h1>{}{links}</body></html>",
            page.extra
        )
    }

    pub fn link_xpath(&self, name: &str, index: usize) -> String {
        if self.pages[name].links.len() == 1 {
            "/html/body/a".to_string()
        } else {
            format!("/html/body/a[{}]", index + 1)
        }
    }

    fn follow(&self, name: &str, xpath: &str) -> Option<String> {
        let key = (name.to_string(), xpath.to_string());
        if self.one_shot.contains(&key) && self.spent.lock().unwrap().contains(&key) {
            return None;
        }
        let page = self.pages.get(name)?;
        (0..page.links.len())
            .find(|i| self.link_xpath(name, *i) == xpath)
            .map(|i| page.links[i].clone())
    }

    fn should_kill(&self, name: &str, xpath: &str) -> bool {
        let mut kill = self.kill_on.lock().unwrap();
        let Some(switch) = kill.as_mut() else {
            return false;
        };
        if switch.page != name || switch.xpath != xpath {
            return false;
        }
        switch.remaining -= 1;
        if switch.remaining == 0 {
            *kill = None;
            return true;
        }
        false
    }

    fn fired_link(&self, name: &str, xpath: &str) {
        let key = (name.to_string(), xpath.to_string());
        if self.one_shot.contains(&key) {
            self.spent.lock().unwrap().insert(key);
        }
        self.fired.fetch_add(1, Ordering::SeqCst);
    }

    /// Times link `index` of `page` was fired, successfully or not.
    pub fn attempts(&self, page: &str, index: usize) -> usize {
        let key = (page.to_string(), self.link_xpath(page, index));
        self.attempts.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    /// Events fired successfully across all browsers.
    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }
}

// ── Browser ──

pub struct FakeBrowser {
    app: Arc<FakeApp>,
    page: String,
    dead: bool,
}

impl FakeBrowser {
    fn check_alive(&self) -> Result<()> {
        if self.dead {
            bail!("connection closed");
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserContext for FakeBrowser {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        self.check_alive()?;
        self.page = "index".into();
        Ok(NavigationResult {
            final_url: url.to_string(),
            status: 200,
            load_time_ms: 1,
        })
    }

    async fn dom(&self) -> Result<String> {
        self.check_alive()?;
        Ok(self.app.render(&self.page))
    }

    async fn current_url(&self) -> Result<String> {
        self.check_alive()?;
        Ok(format!("{ENTRY}#/{}", self.page))
    }

    async fn fire_event(&mut self, action: &Eventable) -> Result<bool> {
        self.check_alive()?;
        let xpath = &action.identification.value;
        *self
            .app
            .attempts
            .lock()
            .unwrap()
            .entry((self.page.clone(), xpath.clone()))
            .or_default() += 1;
        if self.app.should_kill(&self.page, xpath) {
            self.dead = true;
            bail!("connection closed");
        }
        match self.app.follow(&self.page, xpath) {
            Some(next) => {
                self.app.fired_link(&self.page, xpath);
                self.page = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn is_visible(&self, identification: &Identification) -> Result<bool> {
        self.check_alive()?;
        Ok(self.app.follow(&self.page, &identification.value).is_some())
    }

    async fn resolve_xpath(&self, identification: &Identification) -> Result<Option<String>> {
        self.check_alive()?;
        Ok(Some(identification.value.clone()))
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.check_alive()?;
        if script == COVERAGE_SCRIPT {
            return Ok(serde_json::json!(self.app.pages[&self.page].coverage));
        }
        Ok(serde_json::Value::Null)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

pub struct FakeRenderer {
    app: Arc<FakeApp>,
    created: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(app: Arc<FakeApp>) -> Self {
        Self {
            app,
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn app(&self) -> &FakeApp {
        &self.app
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn BrowserContext>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            app: Arc::clone(&self.app),
            page: "index".into(),
            dead: false,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        0
    }
}

// ── Fixtures ──

/// Configuration with no waits.
pub fn config() -> CrawlConfig {
    let mut config = CrawlConfig::new(ENTRY);
    config.wait_after_event_ms = 0;
    config.wait_after_reload_ms = 0;
    config.max_runtime_secs = 60;
    config
}

/// index -> a, b; a -> c, index; b -> a; c is a leaf.
pub fn tree_app() -> FakeApp {
    FakeApp::new()
        .page("index", &["a", "b"])
        .page("a", &["c", "index"])
        .page("b", &["a"])
        .page("c", &[])
}

/// index -> p1 -> p2 -> ... -> p{n}.
pub fn chain_app(n: usize) -> FakeApp {
    let mut app = FakeApp::new().page("index", &["p1"]);
    for i in 1..=n {
        let next = format!("p{}", i + 1);
        let links: Vec<&str> = if i < n { vec![next.as_str()] } else { vec![] };
        app = app.page(&format!("p{i}"), &links);
    }
    app
}
