//! Layer orchestrator: runs the selected layers in order and assembles the report

use chrono::Utc;
use newsteps_qa_common::{Credentials, HarnessConfig, LayerId, LayerResult, Report, WorkflowRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::{BrowserFactory, ChromiumFactory};
use crate::error::{HarnessError, HarnessResult};
use crate::layers::{build_layer, health_layer, integration_layer};
use crate::probe::HttpProbe;
use crate::registry::{registry, Registry};
use crate::workflow::{Workflow, PREREQUISITE_FAILED};
use crate::workflows::{self, WorkflowContext, ISSUE_KEY};

/// Named selections of layers and workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    /// All four layers plus the multi-actor scenario
    Full,
    /// HTTP only: L1, L2, L4, and the API-driven status workflow
    Api,
    /// L1 and the visitor workflows
    Public,
    /// L1, registration, and the authenticated request
    User,
    /// L1 and the administrator workflows
    Admin,
}

impl Suite {
    pub const ALL: [Suite; 5] = [Suite::Full, Suite::Api, Suite::Public, Suite::User, Suite::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Suite::Full => "full",
            Suite::Api => "api",
            Suite::Public => "public",
            Suite::User => "user",
            Suite::Admin => "admin",
        }
    }

    /// Artifact tag: `<tag>_<epoch>.json`
    pub fn tag(&self) -> String {
        format!("{}_acceptance", self.as_str())
    }

    pub fn layers(&self) -> Vec<LayerId> {
        match self {
            Suite::Full | Suite::Api => LayerId::ALL.to_vec(),
            Suite::Public | Suite::User | Suite::Admin => vec![LayerId::Build, LayerId::Workflow],
        }
    }

    fn includes(&self, workflow: &str) -> bool {
        match self {
            Suite::Full => true,
            Suite::Api => workflow == "status_transitions",
            Suite::Public => matches!(
                workflow,
                "visitor_browse" | "contact_form" | "shoe_donation" | "money_donation" | "volunteer_application"
            ),
            Suite::User => matches!(workflow, "user_registration" | "authenticated_request"),
            Suite::Admin => matches!(
                workflow,
                "admin_dashboard" | "admin_inventory_add" | "status_transitions"
            ),
        }
    }

    /// Workflows of the workflow layer, in catalog order
    pub fn workflows(&self) -> Vec<Workflow<WorkflowContext>> {
        workflows::catalog()
            .into_iter()
            .filter(|w| self.includes(w.name))
            .collect()
    }

    pub fn scenarios(&self) -> Vec<Workflow<WorkflowContext>> {
        match self {
            Suite::Full => workflows::scenarios(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Suite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Suite::ALL
            .into_iter()
            .find(|suite| suite.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown suite '{}' (expected one of: {})",
                    s,
                    Suite::ALL.map(|s| s.as_str()).join(", ")
                )
            })
    }
}

pub struct Orchestrator {
    config: Arc<HarnessConfig>,
    suite: Suite,
    registry: &'static Registry,
    browsers: Arc<dyn BrowserFactory>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: Arc<HarnessConfig>, suite: Suite) -> Self {
        let browsers: Arc<dyn BrowserFactory> = Arc::new(ChromiumFactory::new(
            config.browser.clone(),
            config.timeouts.navigation(),
        ));
        Self {
            config,
            suite,
            registry: registry(),
            browsers,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the browser backend
    pub fn with_browsers(mut self, browsers: Arc<dyn BrowserFactory>) -> Self {
        self.browsers = browsers;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn suite(&self) -> Suite {
        self.suite
    }

    /// Run L1 → L2 → L3 → L4 → scenarios and finalize the report.
    /// An interrupt discards everything gathered so far.
    pub async fn run(&self) -> HarnessResult<Report> {
        let started = Instant::now();
        let mut report = Report::new(self.config.base(), Utc::now());
        let probe = HttpProbe::new(self.config.base(), self.config.timeouts.http())?;

        info!("🚀 New Steps acceptance run: suite {} against {}", self.suite, self.config.base());

        for layer in self.suite.layers() {
            info!("── {} ──", layer.title());
            let result = match layer {
                LayerId::Build => self.guard(build_layer(&probe, self.registry)).await?,
                LayerId::Integration => self.guard(integration_layer(&probe)).await?,
                LayerId::Workflow => self.workflow_layer().await?,
                LayerId::Health => {
                    self.guard(health_layer(
                        &probe,
                        self.registry,
                        &self.config.thresholds,
                        &self.config.concurrency,
                    ))
                    .await?
                }
            };
            report.insert_layer(result);
        }

        for scenario in self.suite.scenarios() {
            info!("── Multi-actor scenario {} ──", scenario.name);
            let (record, _) = self.run_workflow(&scenario, None).await?;
            report.add_scenario(record);
        }

        report.finalize();
        info!(
            "Run complete in {:.1}s: {}/{} leaves passed ({}%)",
            started.elapsed().as_secs_f64(),
            report.successful_tests,
            report.total_tests,
            report.overall_success_rate
        );
        Ok(report)
    }

    async fn guard<T>(&self, future: impl Future<Output = T>) -> HarnessResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(HarnessError::Interrupted),
            value = future => Ok(value),
        }
    }

    /// L3: each workflow against a fresh context, prerequisites honored,
    /// registration credentials handed forward
    async fn workflow_layer(&self) -> HarnessResult<LayerResult> {
        let mut layer = LayerResult::new(LayerId::Workflow);
        let mut verdicts: HashMap<&'static str, bool> = HashMap::new();
        let mut handover: Option<Credentials> = None;

        for workflow in self.suite.workflows() {
            let failed_prerequisite = workflow
                .requires
                .iter()
                .find(|name| verdicts.get(*name) == Some(&false));

            let record = match failed_prerequisite {
                Some(name) => {
                    warn!("Skipping {}: prerequisite {} failed", workflow.name, name);
                    workflow.skipped(PREREQUISITE_FAILED)
                }
                None => {
                    let (record, credentials) = self.run_workflow(&workflow, handover.clone()).await?;
                    if workflow.name == "user_registration" && record.success {
                        handover = credentials;
                    }
                    record
                }
            };

            for step in &record.steps {
                if let Some(issue) = step.details.get(ISSUE_KEY).and_then(Value::as_str) {
                    layer.add_issue(format!("{}::{}: {}", record.name, step.name, issue));
                }
            }
            if !record.success {
                error!("Workflow {} failed", record.name);
                layer.add_issue(format!(
                    "workflow {} failed ({}/{} steps passed)",
                    record.name,
                    record.passed_steps(),
                    record.steps.len()
                ));
            }
            verdicts.insert(workflow.name, record.success);
            layer.record(record.to_check());
        }

        info!("{}: {}/{} workflows passed", LayerId::Workflow.title(), layer.passed(), layer.total());
        Ok(layer)
    }

    /// Run one workflow in its own context; every context it opened is
    /// closed before returning, interrupted or not
    async fn run_workflow(
        &self,
        workflow: &Workflow<WorkflowContext>,
        credentials: Option<Credentials>,
    ) -> HarnessResult<(WorkflowRecord, Option<Credentials>)> {
        if self.cancel.is_cancelled() {
            return Err(HarnessError::Interrupted);
        }
        let browsers = workflow.needs_browser.then(|| Arc::clone(&self.browsers));
        let mut ctx = WorkflowContext::new(
            Arc::clone(&self.config),
            self.registry,
            browsers,
            self.cancel.clone(),
        )?
        .with_credentials(credentials);

        let result = if workflow.needs_browser {
            match self.guard(ctx.open_browser()).await {
                Ok(Ok(())) => workflow.run(&mut ctx).await,
                Ok(Err(e)) => {
                    warn!("{}: {}", workflow.name, e);
                    Ok(workflow.skipped(&e.to_string()))
                }
                Err(interrupted) => Err(interrupted),
            }
        } else {
            workflow.run(&mut ctx).await
        };

        ctx.close().await;
        let record = result?;
        Ok((record, ctx.credentials.take()))
    }
}
