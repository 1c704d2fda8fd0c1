//! Dynamic-content waiting. This is the only place time-based waits live.

use newsteps_qa_common::config::TimeoutConfig;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::browser::{Locator, Page};
use crate::registry::Registry;

/// What a settle pass observed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WaitReport {
    pub network_idle: bool,
    /// Indicators present when checked
    pub observed: Vec<String>,
    /// Indicators still attached at their ceiling
    pub lingering: Vec<String>,
    pub elapsed_ms: u64,
}

impl WaitReport {
    pub fn complete(&self) -> bool {
        self.network_idle && self.lingering.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DynamicWaitPolicy {
    pub timeout: Duration,
    pub indicator_timeout: Duration,
    pub stabilization: Duration,
    indicators: Vec<Locator>,
}

impl DynamicWaitPolicy {
    pub fn new(timeout: Duration, indicator_timeout: Duration, stabilization: Duration) -> Self {
        Self {
            timeout,
            indicator_timeout,
            stabilization,
            indicators: Vec::new(),
        }
    }

    pub fn from_config(timeouts: &TimeoutConfig, registry: &Registry) -> Self {
        let mut policy = Self::new(
            timeouts.dynamic_wait(),
            timeouts.indicator(),
            timeouts.stabilization(),
        );
        for indicator in &registry.loading_indicators {
            match Locator::parse(indicator) {
                Ok(loc) => {
                    policy.add_indicator(loc);
                }
                Err(e) => warn!("Ignoring loading indicator: {}", e),
            }
        }
        policy
    }

    /// Returns false for a duplicate
    pub fn add_indicator(&mut self, locator: Locator) -> bool {
        if self.indicators.contains(&locator) {
            return false;
        }
        self.indicators.push(locator);
        true
    }

    pub fn indicators(&self) -> &[Locator] {
        &self.indicators
    }

    /// Wait for the page to settle. Never fails: ceilings produce warnings.
    pub async fn settle(&self, page: &dyn Page) -> WaitReport {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut report = WaitReport::default();

        report.network_idle = match page.wait_for_network_idle(self.timeout).await {
            Ok(idle) => idle,
            Err(e) => {
                warn!("Network-idle wait failed: {}", e);
                false
            }
        };
        if !report.network_idle {
            warn!("Network not idle after {}s, continuing", self.timeout.as_secs());
        }

        for indicator in &self.indicators {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Dynamic-wait ceiling reached before checking {}", indicator);
                break;
            }
            match page.count(indicator).await {
                Ok(0) => continue,
                Ok(_) => {}
                Err(e) => {
                    debug!("Indicator {} not checkable: {}", indicator, e);
                    continue;
                }
            }
            debug!("Loading indicator present: {}", indicator);
            report.observed.push(indicator.to_string());

            let ceiling = self.indicator_timeout.min(remaining);
            match page.wait_for_detached(indicator, ceiling).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("{} still present after {} ms", indicator, ceiling.as_millis());
                    report.lingering.push(indicator.to_string());
                }
                Err(e) => {
                    warn!("Waiting on {} failed: {}", indicator, e);
                    report.lingering.push(indicator.to_string());
                }
            }
        }

        sleep(self.stabilization).await;
        report.elapsed_ms = start.elapsed().as_millis() as u64;
        report
    }
}
