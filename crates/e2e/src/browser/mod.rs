//! Browser seam: the page operations the harness needs, independent of the driver

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

pub mod chromium;

#[cfg(test)]
pub(crate) mod fake;

pub use chromium::{ChromiumFactory, ChromiumPage};

/// Text filter of a locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum TextMatch {
    /// Case-insensitive substring
    Contains(String),
    /// Case-sensitive, whitespace-normalized equality
    Exact(String),
}

impl TextMatch {
    pub fn matches(&self, text: &str) -> bool {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        match self {
            TextMatch::Contains(needle) => normalized
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            TextMatch::Exact(expected) => normalized == *expected,
        }
    }
}

/// A parsed element locator.
///
/// Syntax: plain CSS; `css:has-text("t")`; `text=t` (contains) or `text="t"`
/// (exact); any of those followed by `>> nth=N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    pub css: Option<String>,
    pub text: Option<TextMatch>,
    pub nth: Option<usize>,
    #[serde(skip)]
    source: String,
}

impl Locator {
    pub fn parse(source: &str) -> HarnessResult<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(HarnessError::InvalidLocator(source.to_string()));
        }

        let (body, nth) = match source.rsplit_once(">>") {
            Some((head, tail)) if tail.trim().starts_with("nth=") => {
                let index = tail.trim()["nth=".len()..]
                    .parse::<usize>()
                    .map_err(|_| HarnessError::InvalidLocator(source.to_string()))?;
                (head.trim(), Some(index))
            }
            _ => (source, None),
        };

        let (css, text) = if let Some(rest) = body.strip_prefix("text=") {
            let text = match rest.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
                Some(exact) => TextMatch::Exact(exact.to_string()),
                None => TextMatch::Contains(rest.to_string()),
            };
            (None, Some(text))
        } else if let Some((head, tail)) = body.split_once(":has-text(\"") {
            let needle = tail
                .strip_suffix("\")")
                .ok_or_else(|| HarnessError::InvalidLocator(source.to_string()))?;
            let css = if head.is_empty() { "*" } else { head };
            (Some(css.to_string()), Some(TextMatch::Contains(needle.to_string())))
        } else {
            (Some(body.to_string()), None)
        };

        if css.as_deref() == Some("") {
            return Err(HarnessError::InvalidLocator(source.to_string()));
        }

        Ok(Self {
            css,
            text,
            nth,
            source: source.to_string(),
        })
    }

    /// A plain CSS locator
    pub fn css(selector: impl Into<String>) -> Self {
        let selector = selector.into();
        Self {
            css: Some(selector.clone()),
            text: None,
            nth: None,
            source: selector,
        }
    }

    /// CSS restricted to elements whose text equals `text` exactly
    pub fn css_with_exact_text(selector: &str, text: &str) -> Self {
        Self {
            css: Some(selector.to_string()),
            text: Some(TextMatch::Exact(text.to_string())),
            nth: None,
            source: format!("{}:text-is(\"{}\")", selector, text),
        }
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self.source = format!("{} >> nth={}", self.source, index);
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.nth.is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// State of the first element a locator matches
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementInfo {
    pub count: usize,
    pub visible: bool,
    pub enabled: bool,
    /// Not read-only
    pub editable: bool,
    /// Lower-case tag name
    pub tag: String,
    pub input_type: Option<String>,
    pub id: Option<String>,
    pub checked: bool,
}

impl ElementInfo {
    pub fn is_fillable(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => !matches!(
                self.input_type.as_deref(),
                Some("checkbox" | "radio" | "submit" | "button" | "hidden" | "file" | "image" | "reset")
            ),
            _ => false,
        }
    }

    pub fn is_select(&self) -> bool {
        self.tag == "select"
    }

    pub fn is_toggle(&self) -> bool {
        self.tag == "input" && matches!(self.input_type.as_deref(), Some("checkbox" | "radio"))
    }

    pub fn interactable(&self) -> bool {
        self.visible && self.enabled
    }
}

/// How to pick an option of a native dropdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum OptionChoice {
    Value(String),
    Label(String),
    Index(usize),
}

/// One isolated browsing context with a single page
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> HarnessResult<()>;

    async fn url(&self) -> HarnessResult<String>;

    /// Visible text of the document body
    async fn body_text(&self) -> HarnessResult<String>;

    async fn inspect(&self, locator: &Locator) -> HarnessResult<ElementInfo>;

    async fn count(&self, locator: &Locator) -> HarnessResult<usize> {
        Ok(self.inspect(locator).await?.count)
    }

    async fn fill(&self, locator: &Locator, value: &str) -> HarnessResult<()>;

    /// Click the first match; `force` skips the visibility requirement
    async fn click(&self, locator: &Locator, force: bool) -> HarnessResult<()>;

    /// Returns false when the control is not a dropdown or has no such option
    async fn select_option(&self, locator: &Locator, choice: &OptionChoice) -> HarnessResult<bool>;

    async fn check(&self, locator: &Locator) -> HarnessResult<()>;

    async fn input_value(&self, locator: &Locator) -> HarnessResult<Option<String>>;

    /// Returns false when the ceiling elapsed first
    async fn wait_for_network_idle(&self, timeout: Duration) -> HarnessResult<bool>;

    /// Returns false when the element was still attached at the ceiling
    async fn wait_for_detached(&self, locator: &Locator, timeout: Duration) -> HarnessResult<bool>;

    async fn screenshot(&self, path: &Path) -> HarnessResult<()>;

    async fn cookie_names(&self) -> HarnessResult<Vec<String>>;

    async fn close(&self) -> HarnessResult<()>;
}

/// Opens fresh, isolated browsing contexts
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn open(&self) -> HarnessResult<Box<dyn Page>>;
}

/// Path component of an absolute or relative URL
pub fn url_path(url: &str) -> &str {
    let without_scheme = match url.find("://") {
        Some(i) => &url[i + 3..],
        None => return url.split(['?', '#']).next().unwrap_or(url),
    };
    match without_scheme.find('/') {
        Some(i) => without_scheme[i..].split(['?', '#']).next().unwrap_or("/"),
        None => "/",
    }
}
