//! Semantic-name → DOM interaction resolution

use newsteps_qa_common::{details, CheckRecord, Details};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::browser::{ElementInfo, Locator, OptionChoice, Page};
use crate::error::{HarnessError, HarnessResult};
use crate::registry::{Action, Registry};

const RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of resolving one semantic name
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub name: String,
    pub action: Action,
    /// The candidate that received the action
    pub selector: Option<String>,
    /// How the action landed when a fallback was needed
    pub via: Option<&'static str>,
    pub tried: Vec<String>,
}

impl Resolution {
    pub fn resolved(&self) -> bool {
        self.selector.is_some()
    }

    pub fn details(&self) -> Details {
        let mut details = details! {
            "field" => self.name,
            "action" => self.action.as_str(),
        };
        match &self.selector {
            Some(selector) => {
                details.insert("selector".into(), Value::String(selector.clone()));
                if let Some(via) = self.via {
                    details.insert("via".into(), Value::String(via.to_string()));
                }
            }
            None => {
                details.insert("tried".into(), serde_json::json!(self.tried));
                details.insert(
                    "error".into(),
                    Value::String(format!("element not found: {}", self.name)),
                );
            }
        }
        details
    }

    pub fn into_check(self) -> CheckRecord {
        let success = self.resolved();
        let details = self.details();
        CheckRecord::new(self.name, success, details)
    }

    /// The winning selector, or `ElementNotFound`
    pub fn require(self) -> HarnessResult<String> {
        self.selector.ok_or(HarnessError::ElementNotFound(self.name))
    }
}

enum Attempt {
    Done(Option<&'static str>),
    Skip(&'static str),
}

/// Walks registry candidates until one accepts the action
pub struct SelectorResolver<'r> {
    registry: &'r Registry,
    /// How long to keep re-trying the candidate list while the page renders
    patience: Duration,
}

impl<'r> SelectorResolver<'r> {
    pub fn new(registry: &'r Registry, patience: Duration) -> Self {
        Self { registry, patience }
    }

    /// Resolve `name` and apply its registered action with `value`
    pub async fn resolve(&self, page: &dyn Page, name: &str, value: &str) -> HarnessResult<Resolution> {
        let strategy = self
            .registry
            .get(name)
            .ok_or_else(|| HarnessError::InvalidLocator(format!("no strategy named {}", name)))?;

        let candidates: Vec<String> = strategy
            .candidates
            .iter()
            .map(|c| c.replace("{value}", &value.replace('"', "\\\"")))
            .collect();

        let deadline = Instant::now() + self.patience;
        loop {
            for candidate in &candidates {
                let locator = Locator::parse(candidate)?;
                match self.attempt(page, &locator, strategy.action, value).await {
                    Attempt::Done(via) => {
                        debug!("{} -> {} ({})", name, candidate, strategy.action.as_str());
                        return Ok(Resolution {
                            name: name.to_string(),
                            action: strategy.action,
                            selector: Some(candidate.clone()),
                            via,
                            tried: Vec::new(),
                        });
                    }
                    Attempt::Skip(reason) => debug!("{}: skip {} ({})", name, candidate, reason),
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(RETRY_INTERVAL).await;
        }

        warn!("element not found: {} ({} candidates)", name, candidates.len());
        Ok(Resolution {
            name: name.to_string(),
            action: strategy.action,
            selector: None,
            via: None,
            tried: candidates,
        })
    }

    /// Resolve several (name, value) pairs in order; failures do not stop the walk
    pub async fn fill_all(&self, page: &dyn Page, fields: &[(&str, String)]) -> HarnessResult<Vec<Resolution>> {
        let mut out = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            out.push(self.resolve(page, name, value).await?);
        }
        Ok(out)
    }

    async fn attempt(&self, page: &dyn Page, locator: &Locator, action: Action, value: &str) -> Attempt {
        let info = match page.inspect(locator).await {
            Ok(info) => info,
            Err(e) => {
                debug!("inspect {} failed: {}", locator, e);
                return Attempt::Skip("inspect failed");
            }
        };
        if info.count == 0 {
            return Attempt::Skip("absent");
        }
        if info.count > 1 && !locator.is_indexed() {
            return Attempt::Skip("ambiguous");
        }

        let result = match action {
            Action::Fill => self.fill(page, locator, &info, value).await,
            Action::Click => {
                if !info.interactable() {
                    return Attempt::Skip("not interactable");
                }
                page.click(locator, false).await.map(|_| Attempt::Done(None))
            }
            Action::SelectOption => self.select(page, locator, &info, value).await,
            Action::Check => self.check(page, locator, &info).await,
        };
        result.unwrap_or_else(|e| {
            debug!("{} on {} failed: {}", action.as_str(), locator, e);
            Attempt::Skip("action failed")
        })
    }

    async fn fill(&self, page: &dyn Page, locator: &Locator, info: &ElementInfo, value: &str) -> HarnessResult<Attempt> {
        if !info.is_fillable() {
            return Ok(Attempt::Skip("not a text control"));
        }
        if !info.interactable() || !info.editable {
            return Ok(Attempt::Skip("not editable"));
        }
        page.fill(locator, value).await?;
        Ok(Attempt::Done(None))
    }

    async fn select(&self, page: &dyn Page, locator: &Locator, info: &ElementInfo, value: &str) -> HarnessResult<Attempt> {
        if info.is_select() && info.interactable() {
            for choice in [
                OptionChoice::Value(value.to_string()),
                OptionChoice::Label(value.to_string()),
                OptionChoice::Index(1),
            ] {
                if page.select_option(locator, &choice).await? {
                    let via = match choice {
                        OptionChoice::Index(_) => Some("index"),
                        _ => None,
                    };
                    return Ok(Attempt::Done(via));
                }
            }
        }

        // Custom widget: open it, then pick by exact text, then by position
        if !info.interactable() {
            return Ok(Attempt::Skip("dropdown not interactable"));
        }
        page.click(locator, false).await?;
        for option in &self.registry.dropdown_options {
            let by_text = Locator::css_with_exact_text(option, value);
            if page.count(&by_text).await? > 0 {
                page.click(&by_text, false).await?;
                return Ok(Attempt::Done(Some("widget_text")));
            }
        }
        for option in &self.registry.dropdown_options {
            let second = Locator::css(*option).nth(1);
            if page.count(&second).await? > 0 {
                page.click(&second, false).await?;
                return Ok(Attempt::Done(Some("widget_index")));
            }
        }
        Ok(Attempt::Skip("no selectable option"))
    }

    async fn check(&self, page: &dyn Page, locator: &Locator, info: &ElementInfo) -> HarnessResult<Attempt> {
        if info.tag == "label" {
            if !info.interactable() {
                return Ok(Attempt::Skip("label hidden"));
            }
            page.click(locator, false).await?;
            return Ok(Attempt::Done(Some("label")));
        }
        if !info.is_toggle() {
            return Ok(Attempt::Skip("not a checkbox or radio"));
        }
        if !info.enabled {
            return Ok(Attempt::Skip("disabled"));
        }
        if info.visible {
            page.check(locator).await?;
            return Ok(Attempt::Done(None));
        }

        // Visually hidden control: label[for], enclosing label, then force
        if let Some(id) = &info.id {
            let label = Locator::css(format!("label[for=\"{}\"]", id));
            if self.click_if_visible(page, &label).await? {
                return Ok(Attempt::Done(Some("label_for")));
            }
        }
        if let (Some(css), None) = (&locator.css, &locator.text) {
            let enclosing = Locator::css(format!("label:has({})", css));
            if self.click_if_visible(page, &enclosing).await? {
                return Ok(Attempt::Done(Some("enclosing_label")));
            }
        }
        page.click(locator, true).await?;
        Ok(Attempt::Done(Some("forced")))
    }

    async fn click_if_visible(&self, page: &dyn Page, locator: &Locator) -> HarnessResult<bool> {
        let info = page.inspect(locator).await?;
        if info.count >= 1 && info.interactable() {
            page.click(locator, false).await?;
            return Ok(true);
        }
        Ok(false)
    }
}
