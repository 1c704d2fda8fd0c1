//! Scripted in-memory page for unit tests. Elements are keyed by the exact
//! locator text the code under test asks for.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{url_path, BrowserFactory, ElementInfo, Locator, OptionChoice, Page};
use crate::error::{HarnessError, HarnessResult};

/// What a click does to the page
#[derive(Debug, Clone)]
pub enum Effect {
    Navigate(String),
    SetBody(String),
    SetCookie(String),
    Reveal(String, FakeElement),
    Remove(String),
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub info: ElementInfo,
    pub value: String,
    pub options: Vec<(String, String)>,
    pub on_click: Vec<Effect>,
    /// Polls of `wait_for_detached` before the element goes away
    pub detach_after: Option<usize>,
}

impl FakeElement {
    fn base(tag: &str, input_type: Option<&str>) -> Self {
        Self {
            info: ElementInfo {
                count: 1,
                visible: true,
                enabled: true,
                editable: true,
                tag: tag.to_string(),
                input_type: input_type.map(str::to_string),
                id: None,
                checked: false,
            },
            value: String::new(),
            options: Vec::new(),
            on_click: Vec::new(),
            detach_after: None,
        }
    }

    pub fn input() -> Self {
        Self::base("input", Some("text"))
    }

    pub fn textarea() -> Self {
        Self::base("textarea", None)
    }

    pub fn button() -> Self {
        Self::base("button", None)
    }

    pub fn div() -> Self {
        Self::base("div", None)
    }

    pub fn label() -> Self {
        Self::base("label", None)
    }

    pub fn radio() -> Self {
        Self::base("input", Some("radio"))
    }

    pub fn checkbox() -> Self {
        Self::base("input", Some("checkbox"))
    }

    /// Native dropdown; options are (value, label)
    pub fn select(options: &[(&str, &str)]) -> Self {
        let mut el = Self::base("select", None);
        el.options = options
            .iter()
            .map(|(v, l)| (v.to_string(), l.to_string()))
            .collect();
        el
    }

    pub fn hidden(mut self) -> Self {
        self.info.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.info.enabled = false;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.info.editable = false;
        self
    }

    pub fn count(mut self, n: usize) -> Self {
        self.info.count = n;
        self
    }

    pub fn id(mut self, id: &str) -> Self {
        self.info.id = Some(id.to_string());
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    pub fn detach_after(mut self, polls: usize) -> Self {
        self.detach_after = Some(polls);
        self
    }
}

/// Content served when the fake navigates to a path
#[derive(Debug, Clone, Default)]
pub struct FakeRoute {
    pub body: String,
    pub elements: Vec<(String, FakeElement)>,
    pub redirect: Option<String>,
}

impl FakeRoute {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            ..Default::default()
        }
    }

    pub fn element(mut self, locator: &str, element: FakeElement) -> Self {
        self.elements.push((locator.to_string(), element));
        self
    }

    pub fn redirect(mut self, path: &str) -> Self {
        self.redirect = Some(path.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    url: String,
    body: String,
    elements: HashMap<String, FakeElement>,
    routes: HashMap<String, FakeRoute>,
    cookies: Vec<String>,
    log: Vec<String>,
    network_idle: bool,
    closed: bool,
    screenshots: Vec<String>,
}

impl FakeState {
    fn load(&mut self, path: &str) {
        let mut path = path.to_string();
        for _ in 0..4 {
            match self.routes.get(&path).and_then(|r| r.redirect.clone()) {
                Some(next) => path = next,
                None => break,
            }
        }
        self.url = format!("http://fake.test{}", path);
        self.elements.clear();
        match self.routes.get(&path).cloned() {
            Some(route) => {
                self.body = route.body;
                self.elements = route.elements.into_iter().collect();
            }
            None => self.body = "404 This page could not be found".to_string(),
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Navigate(path) => self.load(&path),
                Effect::SetBody(body) => self.body = body,
                Effect::SetCookie(name) => self.cookies.push(name),
                Effect::Reveal(locator, element) => {
                    self.elements.insert(locator, element);
                }
                Effect::Remove(locator) => {
                    self.elements.remove(&locator);
                }
            }
        }
    }
}

/// Cloning shares state so tests can inspect the page after handing it off
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new() -> Self {
        let page = Self::default();
        page.state.lock().network_idle = true;
        page
    }

    pub fn route(self, path: &str, route: FakeRoute) -> Self {
        self.state.lock().routes.insert(path.to_string(), route);
        self
    }

    /// Add an element to the currently loaded document
    pub fn element(self, locator: &str, element: FakeElement) -> Self {
        self.state.lock().elements.insert(locator.to_string(), element);
        self
    }

    pub fn with_body(self, body: &str) -> Self {
        self.state.lock().body = body.to_string();
        self
    }

    pub fn busy_network(self) -> Self {
        self.state.lock().network_idle = false;
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    pub fn value_of(&self, locator: &str) -> Option<String> {
        self.state.lock().elements.get(locator).map(|e| e.value.clone())
    }

    pub fn is_checked(&self, locator: &str) -> bool {
        self.state
            .lock()
            .elements
            .get(locator)
            .map(|e| e.info.checked)
            .unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.state.lock().screenshots.clone()
    }

    pub fn current_path(&self) -> String {
        url_path(&self.state.lock().url).to_string()
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> HarnessResult<()> {
        let mut state = self.state.lock();
        state.log.push(format!("goto:{}", url_path(url)));
        state.load(url_path(url));
        Ok(())
    }

    async fn url(&self) -> HarnessResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn body_text(&self) -> HarnessResult<String> {
        Ok(self.state.lock().body.clone())
    }

    async fn inspect(&self, locator: &Locator) -> HarnessResult<ElementInfo> {
        Ok(self
            .state
            .lock()
            .elements
            .get(locator.as_str())
            .map(|e| e.info.clone())
            .unwrap_or_default())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> HarnessResult<()> {
        let mut state = self.state.lock();
        let el = state
            .elements
            .get_mut(locator.as_str())
            .ok_or_else(|| HarnessError::ElementNotFound(locator.to_string()))?;
        el.value = value.to_string();
        state.log.push(format!("fill:{}={}", locator, value));
        Ok(())
    }

    async fn click(&self, locator: &Locator, force: bool) -> HarnessResult<()> {
        let mut state = self.state.lock();
        let el = state
            .elements
            .get_mut(locator.as_str())
            .ok_or_else(|| HarnessError::ElementNotFound(locator.to_string()))?;
        if !force && !el.info.visible {
            return Err(HarnessError::Browser(format!("{} is not visible", locator)));
        }
        if el.info.tag == "input" && el.info.input_type.as_deref() == Some("radio") {
            el.info.checked = true;
        }
        let effects = el.on_click.clone();
        let verb = if force { "force-click" } else { "click" };
        state.log.push(format!("{}:{}", verb, locator));
        state.apply(effects);
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, choice: &OptionChoice) -> HarnessResult<bool> {
        let mut state = self.state.lock();
        let Some(el) = state.elements.get_mut(locator.as_str()) else {
            return Ok(false);
        };
        if el.info.tag != "select" {
            return Ok(false);
        }
        let picked = match choice {
            OptionChoice::Value(v) => el.options.iter().find(|(value, _)| value == v),
            OptionChoice::Label(l) => el.options.iter().find(|(_, label)| label == l),
            OptionChoice::Index(i) => el.options.get(*i),
        }
        .map(|(value, _)| value.clone());
        match picked {
            Some(value) => {
                el.value = value.clone();
                state.log.push(format!("select:{}={}", locator, value));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn check(&self, locator: &Locator) -> HarnessResult<()> {
        let mut state = self.state.lock();
        let el = state
            .elements
            .get_mut(locator.as_str())
            .ok_or_else(|| HarnessError::ElementNotFound(locator.to_string()))?;
        el.info.checked = true;
        state.log.push(format!("check:{}", locator));
        Ok(())
    }

    async fn input_value(&self, locator: &Locator) -> HarnessResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .elements
            .get(locator.as_str())
            .map(|e| e.value.clone()))
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> HarnessResult<bool> {
        let idle = self.state.lock().network_idle;
        if !idle {
            tokio::time::sleep(timeout).await;
        }
        Ok(idle)
    }

    async fn wait_for_detached(&self, locator: &Locator, timeout: Duration) -> HarnessResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock();
                let gone = match state.elements.get_mut(locator.as_str()) {
                    None => true,
                    Some(el) => match el.detach_after.as_mut() {
                        Some(0) => true,
                        Some(n) => {
                            *n -= 1;
                            false
                        }
                        None => false,
                    },
                };
                if gone {
                    state.elements.remove(locator.as_str());
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn screenshot(&self, path: &Path) -> HarnessResult<()> {
        self.state
            .lock()
            .screenshots
            .push(path.display().to_string());
        Ok(())
    }

    async fn cookie_names(&self) -> HarnessResult<Vec<String>> {
        Ok(self.state.lock().cookies.clone())
    }

    async fn close(&self) -> HarnessResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Hands out pre-built pages in order, then a blank page
#[derive(Default)]
pub struct FakeFactory {
    pages: Mutex<Vec<FakePage>>,
    pub opened: Mutex<Vec<FakePage>>,
}

impl FakeFactory {
    pub fn new(pages: Vec<FakePage>) -> Self {
        let mut pages = pages;
        pages.reverse();
        Self {
            pages: Mutex::new(pages),
            opened: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BrowserFactory for FakeFactory {
    async fn open(&self) -> HarnessResult<Box<dyn Page>> {
        let page = self.pages.lock().pop().unwrap_or_else(FakePage::new);
        self.opened.lock().push(page.clone());
        Ok(Box::new(page))
    }
}
