//! Workflow engine: ordered steps, gates, and threshold verdicts

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use newsteps_qa_common::{CheckRecord, Details, WorkflowRecord};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

pub const DEFAULT_THRESHOLD: f64 = 0.7;
pub const STRICT_THRESHOLD: f64 = 0.8;
pub const PREREQUISITE_FAILED: &str = "prerequisite failed";

/// What a step reports back
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub success: bool,
    pub details: Details,
}

impl StepOutcome {
    pub fn pass(details: Details) -> Self {
        Self {
            success: true,
            details,
        }
    }

    pub fn fail(error: impl std::fmt::Display, mut details: Details) -> Self {
        details.insert("error".into(), Value::String(error.to_string()));
        Self {
            success: false,
            details,
        }
    }

    /// Pass or fail on `ok`; `error` is only recorded on failure
    pub fn verdict(ok: bool, error: impl std::fmt::Display, details: Details) -> Self {
        if ok {
            Self::pass(details)
        } else {
            Self::fail(error, details)
        }
    }
}

impl From<CheckRecord> for StepOutcome {
    fn from(check: CheckRecord) -> Self {
        Self {
            success: check.success,
            details: check.details,
        }
    }
}

pub type StepFuture<'a> = BoxFuture<'a, HarnessResult<StepOutcome>>;
pub type StepFn<C> = for<'a> fn(&'a mut C) -> StepFuture<'a>;
pub type ParamStepFn<C> = for<'a> fn(&'a mut C, &'static str) -> StepFuture<'a>;

pub enum StepAction<C> {
    Plain(StepFn<C>),
    /// One function reused across a fixed list, e.g. admin sub-surfaces
    With(ParamStepFn<C>, &'static str),
}

pub struct Step<C> {
    pub name: String,
    pub gate: bool,
    /// The workflow fails when this step fails, whatever the rate
    pub required: bool,
    /// Drives the browser; failures get a screenshot
    pub browser: bool,
    pub action: StepAction<C>,
}

/// Hooks the engine needs from the context it runs against
#[async_trait]
pub trait StepHost: Send {
    fn cancel_token(&self) -> CancellationToken;

    /// Capture failure evidence; returns the saved path
    async fn capture_failure(&mut self, workflow: &str, step: &str) -> Option<String>;
}

pub struct Workflow<C> {
    pub name: &'static str,
    pub threshold: f64,
    pub steps: Vec<Step<C>>,
    /// Workflows whose success this one depends on
    pub requires: Vec<&'static str>,
    pub needs_browser: bool,
}

impl<C: StepHost> Workflow<C> {
    pub fn new(name: &'static str, threshold: f64) -> Self {
        Self {
            name,
            threshold,
            steps: Vec::new(),
            requires: Vec::new(),
            needs_browser: true,
        }
    }

    fn push(mut self, name: impl Into<String>, gate: bool, action: StepAction<C>) -> Self {
        let browser = self.needs_browser;
        self.steps.push(Step {
            name: name.into(),
            gate,
            required: false,
            browser,
            action,
        });
        self
    }

    pub fn step(self, name: &str, f: StepFn<C>) -> Self {
        self.push(name, false, StepAction::Plain(f))
    }

    pub fn gate(self, name: &str, f: StepFn<C>) -> Self {
        self.push(name, true, StepAction::Plain(f))
    }

    /// A step whose failure fails the workflow on its own
    pub fn required(mut self, name: &str, f: StepFn<C>) -> Self {
        self = self.push(name, false, StepAction::Plain(f));
        if let Some(step) = self.steps.last_mut() {
            step.required = true;
        }
        self
    }

    pub fn step_with(self, name: impl Into<String>, f: ParamStepFn<C>, arg: &'static str) -> Self {
        self.push(name, false, StepAction::With(f, arg))
    }

    pub fn requires(mut self, workflow: &'static str) -> Self {
        self.requires.push(workflow);
        self
    }

    /// HTTP-only workflow: no browsing context, no screenshots
    pub fn api_only(mut self) -> Self {
        self.needs_browser = false;
        for step in &mut self.steps {
            step.browser = false;
        }
        self
    }

    /// Every step recorded as failed without running
    pub fn skipped(&self, reason: &str) -> WorkflowRecord {
        let steps = self
            .steps
            .iter()
            .map(|s| CheckRecord::fail(&s.name, reason, Details::new()))
            .collect();
        WorkflowRecord::from_steps(self.name, self.threshold, steps)
    }

    /// Run every step in order. Only an interrupt escapes as `Err`.
    pub async fn run(&self, ctx: &mut C) -> HarnessResult<WorkflowRecord> {
        let token = ctx.cancel_token();
        let started = Instant::now();
        info!("▶ workflow {}", self.name);

        let mut records = Vec::with_capacity(self.steps.len());
        let mut gate_failed: Option<&str> = None;
        let mut required_failed = false;

        for step in &self.steps {
            if let Some(gate) = gate_failed {
                debug!("{}::{} skipped, gate {} failed", self.name, step.name, gate);
                records.push(CheckRecord::fail(&step.name, PREREQUISITE_FAILED, Details::new()));
                continue;
            }

            let future = match &step.action {
                StepAction::Plain(f) => f(ctx),
                StepAction::With(f, arg) => f(ctx, *arg),
            };
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(HarnessError::Interrupted),
                result = AssertUnwindSafe(future).catch_unwind() => result,
            };

            let mut outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(HarnessError::Interrupted)) => return Err(HarnessError::Interrupted),
                Ok(Err(e)) => StepOutcome::fail(&e, Details::new()),
                Err(panic) => StepOutcome::fail(
                    format!("internal error: {}", panic_message(panic.as_ref())),
                    Details::new(),
                ),
            };

            if outcome.success {
                debug!("  ✓ {}", step.name);
            } else {
                let error = outcome
                    .details
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("failed");
                warn!("  ✗ {}::{}: {}", self.name, step.name, error);
                if step.browser {
                    if let Some(path) = ctx.capture_failure(self.name, &step.name).await {
                        outcome.details.insert("screenshot".into(), Value::String(path));
                    }
                }
                if step.gate {
                    gate_failed = Some(step.name.as_str());
                }
                required_failed |= step.required;
            }

            records.push(CheckRecord::new(&step.name, outcome.success, outcome.details));
        }

        let mut record = WorkflowRecord::from_steps(self.name, self.threshold, records);
        if required_failed {
            record.success = false;
        }
        info!(
            "{} workflow {}: {}/{} steps in {:.1}s",
            if record.success { "✅" } else { "❌" },
            self.name,
            record.passed_steps(),
            record.steps.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(record)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "panic"
    }
}
