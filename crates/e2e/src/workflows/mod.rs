//! Registered New Steps workflows and the context they run against

use async_trait::async_trait;
use chrono::Utc;
use newsteps_qa_common::reference::find_reference;
use newsteps_qa_common::{details, Credentials, Details, HarnessConfig, ReferenceKind};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::browser::{BrowserFactory, Page};
use crate::error::{HarnessError, HarnessResult};
use crate::probe::HttpProbe;
use crate::registry::{find_token, Registry};
use crate::selectors::SelectorResolver;
use crate::session::SessionManager;
use crate::wait::DynamicWaitPolicy;
use crate::workflow::{StepFuture, StepHost, StepOutcome, Workflow};

pub mod account;
pub mod admin;
pub mod public;
pub mod scenario;
pub mod status;

/// Step details under this key are lifted into the layer's issue list
pub const ISSUE_KEY: &str = "issue";

/// Per-workflow state. Each workflow gets a fresh one; nothing is shared
/// between workflows except credentials handed over explicitly.
pub struct WorkflowContext {
    pub config: Arc<HarnessConfig>,
    pub registry: &'static Registry,
    browsers: Option<Arc<dyn BrowserFactory>>,
    page: Option<Box<dyn Page>>,
    secondary: Option<Box<dyn Page>>,
    /// Visitor/user API session
    pub api: HttpProbe,
    /// Administrator API session
    pub admin_api: HttpProbe,
    pub credentials: Option<Credentials>,
    pub shared: Details,
    waiter: DynamicWaitPolicy,
    cancel: CancellationToken,
}

impl WorkflowContext {
    pub fn new(
        config: Arc<HarnessConfig>,
        registry: &'static Registry,
        browsers: Option<Arc<dyn BrowserFactory>>,
        cancel: CancellationToken,
    ) -> HarnessResult<Self> {
        let api = HttpProbe::new(config.base(), config.timeouts.http())?;
        let admin_api = HttpProbe::new(config.base(), config.timeouts.http())?;
        let waiter = DynamicWaitPolicy::from_config(&config.timeouts, registry);
        Ok(Self {
            config,
            registry,
            browsers,
            page: None,
            secondary: None,
            api,
            admin_api,
            credentials: None,
            shared: Details::new(),
            waiter,
            cancel,
        })
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Open the primary browsing context
    pub async fn open_browser(&mut self) -> HarnessResult<()> {
        if self.page.is_some() {
            return Ok(());
        }
        let factory = self
            .browsers
            .as_ref()
            .ok_or_else(|| HarnessError::BrowserLaunch("no browser configured".into()))?;
        self.page = Some(factory.open().await?);
        Ok(())
    }

    /// Open a second, independent browsing context (another actor)
    pub async fn open_secondary(&mut self) -> HarnessResult<()> {
        if self.secondary.is_some() {
            return Ok(());
        }
        let factory = self
            .browsers
            .as_ref()
            .ok_or_else(|| HarnessError::BrowserLaunch("no browser configured".into()))?;
        self.secondary = Some(factory.open().await?);
        Ok(())
    }

    pub fn page(&self) -> HarnessResult<&dyn Page> {
        self.page
            .as_deref()
            .ok_or_else(|| HarnessError::BrowserLaunch("no browsing context open".into()))
    }

    pub fn secondary(&self) -> HarnessResult<&dyn Page> {
        self.secondary
            .as_deref()
            .ok_or_else(|| HarnessError::BrowserLaunch("no secondary context open".into()))
    }

    pub fn resolver(&self) -> SelectorResolver<'static> {
        SelectorResolver::new(self.registry, self.config.timeouts.element())
    }

    /// Resolver that gives up after one pass over the candidates
    pub fn quick_resolver(&self) -> SelectorResolver<'static> {
        SelectorResolver::new(self.registry, std::time::Duration::ZERO)
    }

    pub fn waiter(&self) -> &DynamicWaitPolicy {
        &self.waiter
    }

    pub fn sessions(&self) -> SessionManager<'_> {
        SessionManager::new(&self.config, self.registry)
    }

    /// Navigate `page` to `path` and let it settle
    pub async fn visit_on(&self, page: &dyn Page, path: &str) -> HarnessResult<Details> {
        let url = self.config.url(path);
        page.goto(&url, self.config.timeouts.navigation()).await?;
        let wait = self.waiter.settle(page).await;
        let landed = page.url().await?;
        let mut details = details! { "url" => landed };
        if !wait.observed.is_empty() {
            details.insert("loading_indicators".into(), serde_json::json!(wait.observed));
        }
        if !wait.complete() {
            details.insert("wait_incomplete".into(), Value::Bool(true));
        }
        Ok(details)
    }

    pub async fn visit(&self, path: &str) -> HarnessResult<Details> {
        self.visit_on(self.page()?, path).await
    }

    /// Close every open browsing context. Errors are logged.
    pub async fn close(&mut self) {
        for page in [self.page.take(), self.secondary.take()].into_iter().flatten() {
            if let Err(e) = page.close().await {
                warn!("Closing browsing context failed: {}", e);
            }
        }
    }

    pub fn epoch() -> i64 {
        Utc::now().timestamp()
    }
}

#[async_trait]
impl StepHost for WorkflowContext {
    fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn capture_failure(&mut self, workflow: &str, step: &str) -> Option<String> {
        let page = self.page.as_deref()?;
        let file = format!(
            "{}_{}_{}.png",
            workflow,
            step.replace(|c: char| !c.is_ascii_alphanumeric() && c != '_', "_"),
            Self::epoch()
        );
        let path = self.config.screenshot_dir.join(file);
        match page.screenshot(&path).await {
            Ok(()) => {
                debug!("Saved failure screenshot {}", path.display());
                Some(path.display().to_string())
            }
            Err(e) => {
                warn!("Failure screenshot for {}::{} not saved: {}", workflow, step, e);
                None
            }
        }
    }
}

/// Fill `fields` in order; passes only when every field resolved
pub(crate) async fn fill_fields(ctx: &WorkflowContext, fields: &[(&str, String)]) -> HarnessResult<StepOutcome> {
    let page = ctx.page()?;
    let resolutions = ctx.resolver().fill_all(page, fields).await?;
    let filled: Vec<&str> = resolutions
        .iter()
        .filter(|r| r.resolved())
        .map(|r| r.name.as_str())
        .collect();
    let missing: Vec<&str> = resolutions
        .iter()
        .filter(|r| !r.resolved())
        .map(|r| r.name.as_str())
        .collect();
    let error = format!("element not found: {}", missing.join(", "));
    let details = details! { "filled" => filled, "missing" => missing };
    Ok(StepOutcome::verdict(missing.is_empty(), error, details))
}

/// Resolve one semantic field with its registered action
pub(crate) async fn act(ctx: &WorkflowContext, name: &str, value: &str) -> HarnessResult<StepOutcome> {
    let resolution = ctx.resolver().resolve(ctx.page()?, name, value).await?;
    Ok(resolution.into_check().into())
}

/// Click the submit control and let the result render
pub(crate) fn submit(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let page = ctx.page()?;
        let selector = ctx.resolver().resolve(page, "submit", "").await?.require()?;
        ctx.waiter().settle(page).await;
        let url = page.url().await?;
        Ok(StepOutcome::pass(details! { "selector" => selector, "url" => url }))
    })
}

/// Classify the page after a submission: success text or a reference ID.
/// A reference of `expected` kind is stored in `shared[store_as]`.
pub(crate) async fn confirm_submission(
    ctx: &mut WorkflowContext,
    expected: ReferenceKind,
    store_as: &str,
) -> HarnessResult<StepOutcome> {
    let body = ctx.page()?.body_text().await?;
    let token = find_token(&body, &ctx.registry.submission_tokens);
    let reference = find_reference(&body);

    let mut details = details! { "token" => token };
    if let Some(reference) = &reference {
        details.insert("reference".into(), Value::String(reference.id.clone()));
        details.insert("reference_kind".into(), Value::String(reference.kind.to_string()));
        if reference.kind == expected {
            ctx.shared
                .insert(store_as.to_string(), Value::String(reference.id.clone()));
        }
    }
    Ok(StepOutcome::verdict(
        token.is_some() || reference.is_some(),
        "no success text or reference id on page",
        details,
    ))
}

/// Identity fields for public forms, from the session user when there is one
pub(crate) fn identity(ctx: &WorkflowContext) -> Vec<(&'static str, String)> {
    let (first, last, email, phone) = match &ctx.credentials {
        Some(c) => (
            c.first_name.clone(),
            c.last_name.clone(),
            c.email.clone(),
            c.phone.clone(),
        ),
        None => (
            "Test".to_string(),
            "User".to_string(),
            "test@example.com".to_string(),
            "555-123-4567".to_string(),
        ),
    };
    vec![
        ("firstName", first),
        ("lastName", last),
        ("email", email),
        ("phone", phone),
    ]
}

pub(crate) fn address() -> Vec<(&'static str, String)> {
    vec![
        ("street", "123 Test St".to_string()),
        ("city", "San Francisco".to_string()),
        ("state", "CA".to_string()),
        ("zipCode", "94102".to_string()),
    ]
}

/// Every workflow run in the workflow layer, in order
pub fn catalog() -> Vec<Workflow<WorkflowContext>> {
    vec![
        public::visitor_browse(),
        public::contact_form(),
        public::shoe_donation(),
        public::money_donation(),
        public::volunteer_application(),
        account::user_registration(),
        account::authenticated_request(),
        admin::admin_dashboard(),
        admin::admin_inventory_add(),
        status::status_transitions(),
    ]
}

/// Multi-actor scenarios run after the probe layers
pub fn scenarios() -> Vec<Workflow<WorkflowContext>> {
    vec![scenario::visitor_to_admin_handoff()]
}
