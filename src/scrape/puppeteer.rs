use std::{ffi::OsStr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use headless_chrome::{Browser, Element, LaunchOptions, Tab, browser::tab::NoElementFound};
use serde_json::Value;

use super::{Board, Tile};

const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct LaunchConfig {
    pub headless: bool,
    /// Chrome binary; detected on the system when `None`.
    pub path: Option<PathBuf>,
}

/// A running browser with a single tab.
///
/// Dropping the session terminates the browser process.
pub struct Session {
    browser: Browser,
    tab: Arc<Tab>,
}

impl Session {
    pub fn launch(config: &LaunchConfig) -> anyhow::Result<Self> {
        let browser = Browser::new(LaunchOptions {
            args: vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
            ],
            headless: config.headless,
            sandbox: false,
            path: config.path.clone(),
            idle_browser_timeout: IDLE_TIMEOUT,
            ..LaunchOptions::default()
        })
        .context("failed to launch chrome")?;

        let tab = first_tab(&browser)?;
        tracing::info!(target: "browser", "chrome started (pid {:?})", browser.get_process_id());

        Ok(Self { browser, tab })
    }

    /// Navigates the tab to `url` and exposes it as a board of `tile_selector` tiles.
    pub fn open(&self, url: &str, tile_selector: &'static str) -> anyhow::Result<ChromeBoard> {
        tracing::info!(target: "browser", "\x1b[33mloading\x1b[0m {url} ...");
        self.tab
            .navigate_to(url)?
            .wait_until_navigated()
            .with_context(|| format!("failed to load {url}"))?;

        Ok(ChromeBoard {
            tab: self.tab.clone(),
            tile_selector,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::info!(target: "browser", "closing chrome (pid {:?})", self.browser.get_process_id());
    }
}

#[allow(clippy::significant_drop_tightening)]
fn first_tab(browser: &Browser) -> anyhow::Result<Arc<Tab>> {
    let tab = browser.new_tab()?;

    {
        let tabs_guard = browser
            .get_tabs()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for remain in &*tabs_guard {
            if !Arc::ptr_eq(&tab, remain) {
                remain.close(true)?;
            }
        }
    }

    Ok(tab)
}

pub struct ChromeBoard {
    tab: Arc<Tab>,
    tile_selector: &'static str,
}

impl Board for ChromeBoard {
    type Tile<'a> = ChromeTile<'a>;

    fn tile_count(&self) -> anyhow::Result<usize> {
        let expression = format!(
            "document.querySelectorAll({}).length",
            serde_json::to_string(self.tile_selector)?,
        );

        match self.tab.evaluate(&expression, false)?.value {
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| anyhow::anyhow!("not a count: {n}")),
            Some(value) => anyhow::bail!("not a number: {value}"),
            None => anyhow::bail!("returned nothing"),
        }
    }

    fn scroll_to_bottom(&self) -> anyhow::Result<()> {
        self.tab
            .evaluate("window.scrollTo(0, document.body.scrollHeight);", false)
            .map(|_| ())
    }

    fn tiles(&self) -> anyhow::Result<Vec<ChromeTile<'_>>> {
        match self.tab.find_elements(self.tile_selector) {
            Ok(elements) => Ok(elements.into_iter().map(ChromeTile).collect()),
            Err(err) if err.is::<NoElementFound>() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

pub struct ChromeTile<'tab>(Element<'tab>);

impl Tile for ChromeTile<'_> {
    fn scroll_into_view(&self) -> anyhow::Result<()> {
        self.0.scroll_into_view().map(|_| ())
    }

    fn contains(&self, selector: &str) -> bool {
        self.0.find_element(selector).is_ok()
    }

    fn text(&self, selector: &str) -> anyhow::Result<String> {
        self.0.find_element(selector)?.get_inner_text()
    }

    fn href(&self, selector: &str) -> anyhow::Result<String> {
        let anchor = self.0.find_element(selector)?;
        let ret = anchor.call_js_fn("function(){return this.href}", Vec::new(), false)?;

        match ret.value {
            Some(Value::String(s)) => Ok(s),
            _ => Ok(String::new()),
        }
    }
}
