// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.
//!
//! Element lookups and events are driven through page scripts, so every
//! `How` variant goes through the same locate-then-act path.

use super::{BrowserContext, NavigationResult, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use stateflow::{EventType, Eventable, FormInput, How, Identification};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

const LOCATE: &str = "__LOCATE__";

// Page-side exceptions (a malformed locator, say) mean the element could
// not be acted on. Only a lost connection surfaces as an error.
const FIRE_JS: &str = r#"(() => {
  try {
    const el = __LOCATE__;
    if (!el) return false;
    __FILL__
    __EVENT__
    return true;
  } catch (e) {
    return false;
  }
})()"#;

const FILL_JS: &str = r#"{
    const f = __LOCATE__;
    if (f) {
      if (f.type === 'checkbox' || f.type === 'radio') { f.checked = __VALUE__ === 'true'; }
      else { f.value = __VALUE__; }
      f.dispatchEvent(new Event('input', { bubbles: true }));
      f.dispatchEvent(new Event('change', { bubbles: true }));
    }
  }"#;

const VISIBLE_JS: &str = r#"(() => {
  try {
    const el = __LOCATE__;
    if (!el) return false;
    const r = el.getBoundingClientRect();
    const s = window.getComputedStyle(el);
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
  } catch (e) {
    return false;
  }
})()"#;

const RESOLVE_XPATH_JS: &str = r#"(() => {
  let el = null;
  try { el = __LOCATE__; } catch (e) { return ''; }
  if (!el) return '';
  const steps = [];
  for (let n = el; n && n.nodeType === 1; n = n.parentNode) {
    let index = 1, same = 0;
    for (let s = n.parentNode ? n.parentNode.firstElementChild : null; s; s = s.nextElementSibling) {
      if (s.tagName === n.tagName) { same++; if (s === n) index = same; }
    }
    const tag = n.tagName.toLowerCase();
    steps.unshift(same > 1 ? `${tag}[${index}]` : tag);
  }
  return '/' + steps.join('/');
})()"#;

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Script expression evaluating to the identified element or null.
pub fn locate_js(identification: &Identification) -> String {
    let v = js_string(&identification.value);
    match identification.how {
        How::XPath => format!(
            "document.evaluate({v}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
        ),
        How::Id => format!("document.getElementById({v})"),
        How::CssSelector => format!("document.querySelector({v})"),
        How::Name => format!("(document.getElementsByName({v})[0] || null)"),
        How::LinkText => format!(
            "(Array.from(document.querySelectorAll('a')).find(a => a.textContent.trim() === {v}) || null)"
        ),
        How::Tag => format!("(document.getElementsByTagName({v})[0] || null)"),
    }
}

fn event_js(event: EventType) -> &'static str {
    match event {
        EventType::Click => {
            "el.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: window }));"
        }
        EventType::Hover => {
            "el.dispatchEvent(new MouseEvent('mouseover', { bubbles: true, cancelable: true, view: window }));"
        }
        EventType::DoubleClick => {
            "el.dispatchEvent(new MouseEvent('dblclick', { bubbles: true, cancelable: true, view: window }));"
        }
        EventType::Enter => {
            "el.dispatchEvent(new KeyboardEvent('keydown', { key: 'Enter', code: 'Enter', keyCode: 13, bubbles: true }));"
        }
    }
}

fn fill_js(input: &FormInput) -> String {
    let value = input.values.first().map(String::as_str).unwrap_or_default();
    FILL_JS
        .replace(LOCATE, &locate_js(&input.identification))
        .replace("__VALUE__", &js_string(value))
}

/// Script that fills the action's form inputs and fires its event.
pub fn fire_js(action: &Eventable) -> String {
    let fill: Vec<String> = action.related_form_inputs.iter().map(fill_js).collect();
    FIRE_JS
        .replace("__FILL__", &fill.join("\n  "))
        .replace("__EVENT__", event_js(action.event_type))
        .replace(LOCATE, &locate_js(&action.identification))
}

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. STATEFLOW_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("STATEFLOW_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.stateflow/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".stateflow/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".stateflow/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".stateflow/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".stateflow/chromium/chrome-linux64/chrome"),
                home.join(".stateflow/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Headless Chromium shared by every crawler of a run.
pub struct ChromiumRenderer {
    browser: Browser,
    open_pages: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance. An explicit path wins over
    /// the usual lookup.
    pub async fn new(chrome_path: Option<PathBuf>) -> Result<Self> {
        let chrome_path = match chrome_path {
            Some(p) => p,
            None => find_chromium()
                .context("Chromium not found. Set STATEFLOW_CHROMIUM_PATH or install Chrome.")?,
        };

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            open_pages: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn BrowserContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.open_pages.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            open_pages: Arc::clone(&self.open_pages),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        // Chromium exits when the renderer is dropped.
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.open_pages.load(Ordering::Relaxed)
    }
}

/// One Chromium tab, owned by one crawler.
pub struct ChromiumContext {
    page: Page,
    open_pages: Arc<AtomicUsize>,
}

impl ChromiumContext {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_response)) => {
                let _ = self.page.wait_for_navigation().await;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    status: 200, // chromiumoxide doesn't easily expose status
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn dom(&self) -> Result<String> {
        self.eval("document.documentElement.outerHTML")
            .await
            .context("failed to get DOM")
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .unwrap_or_default();
        Ok(url)
    }

    async fn fire_event(&mut self, action: &Eventable) -> Result<bool> {
        self.eval(&fire_js(action)).await
    }

    async fn is_visible(&self, identification: &Identification) -> Result<bool> {
        self.eval(&VISIBLE_JS.replace(LOCATE, &locate_js(identification)))
            .await
    }

    async fn resolve_xpath(&self, identification: &Identification) -> Result<Option<String>> {
        let xpath: String = self
            .eval(&RESOLVE_XPATH_JS.replace(LOCATE, &locate_js(identification)))
            .await?;
        Ok(Some(xpath).filter(|x| !x.is_empty()))
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.eval(script).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.open_pages.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}
