//! Chromium driver over the DevTools protocol.
//!
//! Every context is its own browser process with a throwaway profile, so
//! cookies and storage never leak between workflows. DOM work runs as
//! injected script; the locator is handed over as JSON.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use newsteps_qa_common::config::BrowserSettings;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{BrowserFactory, ElementInfo, Locator, OptionChoice, Page};
use crate::error::{HarnessError, HarnessResult};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Resource count must hold still this long to call the network idle
const IDLE_QUIET: Duration = Duration::from_millis(500);

/// Shared lookup helpers prepended to every DOM script
const PRELUDE: &str = r#"
const __norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const __hit = (loc, el) => {
  const text = __norm(el.innerText || el.textContent);
  return loc.text.mode === 'exact'
    ? text === loc.text.value
    : text.toLowerCase().includes(loc.text.value.toLowerCase());
};
const __find = (loc) => {
  let els = Array.from(document.querySelectorAll(loc.css || 'body *'));
  if (loc.text) {
    els = els.filter((el) => __hit(loc, el));
    if (!loc.css) {
      els = els.filter((el) => !Array.from(el.children).some((c) => __hit(loc, c)));
    }
  }
  if (loc.nth !== null && loc.nth !== undefined) {
    els = els[loc.nth] ? [els[loc.nth]] : [];
  }
  return els;
};
const __visible = (el) => {
  const style = getComputedStyle(el);
  const rect = el.getBoundingClientRect();
  return style.visibility !== 'hidden' && style.display !== 'none'
    && parseFloat(style.opacity || '1') > 0 && rect.width > 0 && rect.height > 0;
};
const __setValue = (el, value) => {
  const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype
    : el.tagName === 'SELECT' ? HTMLSelectElement.prototype : HTMLInputElement.prototype;
  const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
  setter.call(el, value);
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
};
"#;

fn script(locator: &Locator, extra: &Value, body: &str) -> HarnessResult<String> {
    Ok(format!(
        "(() => {{ {prelude}\nconst loc = {loc};\nconst arg = {arg};\nconst els = __find(loc);\n{body}\n}})()",
        prelude = PRELUDE,
        loc = serde_json::to_string(locator)?,
        arg = serde_json::to_string(extra)?,
        body = body,
    ))
}

impl From<CdpError> for HarnessError {
    fn from(e: CdpError) -> Self {
        HarnessError::Browser(e.to_string())
    }
}

/// Launches one headless Chromium per browsing context
pub struct ChromiumFactory {
    settings: BrowserSettings,
    request_timeout: Duration,
}

impl ChromiumFactory {
    pub fn new(settings: BrowserSettings, request_timeout: Duration) -> Self {
        Self {
            settings,
            request_timeout,
        }
    }
}

#[async_trait]
impl BrowserFactory for ChromiumFactory {
    async fn open(&self) -> HarnessResult<Box<dyn Page>> {
        let profile = tempfile::Builder::new()
            .prefix("newsteps-qa-profile-")
            .tempdir()?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .window_size(self.settings.viewport_width, self.settings.viewport_height)
            .viewport(Viewport {
                width: self.settings.viewport_width,
                height: self.settings.viewport_height,
                ..Default::default()
            })
            .request_timeout(self.request_timeout)
            .no_sandbox();
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(HarnessError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarnessError::BrowserLaunch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        info!("Opened browsing context (profile {})", profile.path().display());

        Ok(Box::new(ChromiumPage {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
            _profile: profile,
        }))
    }
}

/// A single page inside its own browser process
pub struct ChromiumPage {
    browser: Mutex<Option<Browser>>,
    page: chromiumoxide::Page,
    handler: JoinHandle<()>,
    _profile: TempDir,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, js: String) -> HarnessResult<T> {
        let result = self.page.evaluate(js).await?;
        result
            .into_value::<T>()
            .map_err(|e| HarnessError::Browser(format!("unexpected script result: {}", e)))
    }

    async fn run_on(&self, locator: &Locator, arg: Value, body: &str) -> HarnessResult<Value> {
        self.eval::<Value>(script(locator, &arg, body)?).await
    }

    async fn resource_snapshot(&self) -> HarnessResult<(bool, u64)> {
        let state: Value = self
            .eval(
                "({ complete: document.readyState === 'complete', \
                   resources: performance.getEntriesByType('resource').length })"
                    .to_string(),
            )
            .await?;
        Ok((
            state["complete"].as_bool().unwrap_or(false),
            state["resources"].as_u64().unwrap_or(0),
        ))
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> HarnessResult<()> {
        debug!("goto {}", url);
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HarnessError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(HarnessError::Navigation {
                url: url.to_string(),
                reason: format!("no load within {}s", timeout.as_secs()),
            }),
        }
    }

    async fn url(&self) -> HarnessResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn body_text(&self) -> HarnessResult<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn inspect(&self, locator: &Locator) -> HarnessResult<ElementInfo> {
        let value = self
            .run_on(
                locator,
                Value::Null,
                r#"
if (els.length === 0) { return { count: 0 }; }
const el = els[0];
return {
  count: els.length,
  visible: __visible(el),
  enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true',
  editable: !el.readOnly,
  tag: el.tagName.toLowerCase(),
  inputType: el.tagName === 'INPUT' ? (el.type || 'text').toLowerCase() : null,
  id: el.id || null,
  checked: !!el.checked,
};"#,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fill(&self, locator: &Locator, value: &str) -> HarnessResult<()> {
        let done = self
            .run_on(
                locator,
                Value::String(value.to_string()),
                r#"
if (els.length === 0) { return false; }
const el = els[0];
el.focus();
__setValue(el, arg);
el.blur();
return true;"#,
            )
            .await?;
        if done.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(HarnessError::ElementNotFound(locator.to_string()))
        }
    }

    async fn click(&self, locator: &Locator, force: bool) -> HarnessResult<()> {
        let done = self
            .run_on(
                locator,
                Value::Bool(force),
                r#"
if (els.length === 0) { return 'missing'; }
const el = els[0];
if (!arg && !__visible(el)) { return 'hidden'; }
el.scrollIntoView({ block: 'center' });
el.click();
return 'clicked';"#,
            )
            .await?;
        match done.as_str() {
            Some("clicked") => Ok(()),
            Some("hidden") => Err(HarnessError::Browser(format!("{} is not visible", locator))),
            _ => Err(HarnessError::ElementNotFound(locator.to_string())),
        }
    }

    async fn select_option(&self, locator: &Locator, choice: &OptionChoice) -> HarnessResult<bool> {
        let selected = self
            .run_on(
                locator,
                serde_json::to_value(choice)?,
                r#"
if (els.length === 0 || els[0].tagName !== 'SELECT') { return false; }
const el = els[0];
const options = Array.from(el.options);
let opt;
if (arg.by === 'value') { opt = options.find((o) => o.value === arg.value); }
else if (arg.by === 'label') { opt = options.find((o) => __norm(o.textContent) === arg.value); }
else { opt = options[arg.value]; }
if (!opt) { return false; }
__setValue(el, opt.value);
return true;"#,
            )
            .await?;
        Ok(selected.as_bool().unwrap_or(false))
    }

    async fn check(&self, locator: &Locator) -> HarnessResult<()> {
        let checked = self
            .run_on(
                locator,
                Value::Null,
                r#"
if (els.length === 0) { return null; }
const el = els[0];
if (!el.checked) { el.click(); }
return !!el.checked;"#,
            )
            .await?;
        match checked.as_bool() {
            Some(true) => Ok(()),
            Some(false) => Err(HarnessError::Browser(format!("{} did not become checked", locator))),
            None => Err(HarnessError::ElementNotFound(locator.to_string())),
        }
    }

    async fn input_value(&self, locator: &Locator) -> HarnessResult<Option<String>> {
        let value = self
            .run_on(
                locator,
                Value::Null,
                "return els.length === 0 ? null : (els[0].value ?? null);",
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> HarnessResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut last_count = None;
        let mut quiet_since = Instant::now();

        while Instant::now() < deadline {
            let (complete, count) = self.resource_snapshot().await?;
            if last_count != Some(count) {
                last_count = Some(count);
                quiet_since = Instant::now();
            } else if complete && quiet_since.elapsed() >= IDLE_QUIET {
                return Ok(true);
            }
            sleep(POLL_INTERVAL).await;
        }
        Ok(false)
    }

    async fn wait_for_detached(&self, locator: &Locator, timeout: Duration) -> HarnessResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count(locator).await? == 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn screenshot(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page.save_screenshot(params, path).await?;
        Ok(())
    }

    async fn cookie_names(&self) -> HarnessResult<Vec<String>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies.into_iter().map(|c| c.name).collect())
    }

    async fn close(&self) -> HarnessResult<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Browser exit wait failed: {}", e);
        }
        self.handler.abort();
        debug!("Closed browsing context");
        Ok(())
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
