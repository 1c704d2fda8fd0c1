//! Root report, aggregation, and the JSON artifact

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ThresholdConfig;
use crate::error::{Error, Result};
use crate::types::{rate, round1, LayerId, LayerResult, WorkflowRecord};

/// Prefix of health-layer checks that assert an unauthenticated request is refused
pub const SECURITY_CHECK_PREFIX: &str = "security:";
/// Prefix of health-layer checks that assert a time budget
pub const PERF_CHECK_PREFIX: &str = "perf:";

/// Banner classification of a finalized run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Excellent,
    Pass,
    Fail,
}

/// The run report. Owned by the orchestrator, finalized once, written once.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub timestamp: String,
    pub base_url: String,
    #[serde(serialize_with = "serialize_layers")]
    pub layers: BTreeMap<LayerId, LayerResult>,
    pub multi_user_scenarios: Vec<WorkflowRecord>,
    pub overall_success_rate: f64,
    pub mean_layer_rate: f64,
    pub total_tests: usize,
    pub successful_tests: usize,
    pub critical_issues: Vec<String>,
    pub recommendations: Vec<String>,

    #[serde(skip)]
    started_at: DateTime<Utc>,
    #[serde(skip)]
    finalized: bool,
    #[serde(skip)]
    written_to: Option<PathBuf>,
}

fn serialize_layers<S: Serializer>(
    layers: &BTreeMap<LayerId, LayerResult>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let keyed: BTreeMap<&str, &LayerResult> =
        layers.iter().map(|(id, layer)| (id.key(), layer)).collect();
    keyed.serialize(serializer)
}

impl Report {
    pub fn new(base_url: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            timestamp: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            base_url: base_url.into(),
            layers: BTreeMap::new(),
            multi_user_scenarios: Vec::new(),
            overall_success_rate: 0.0,
            mean_layer_rate: 0.0,
            total_tests: 0,
            successful_tests: 0,
            critical_issues: Vec::new(),
            recommendations: Vec::new(),
            started_at,
            finalized: false,
            written_to: None,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn insert_layer(&mut self, layer: LayerResult) {
        self.layers.insert(layer.layer, layer);
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerResult> {
        self.layers.get(&id)
    }

    pub fn add_scenario(&mut self, scenario: WorkflowRecord) {
        self.multi_user_scenarios.push(scenario);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Compute totals, rates, issues, and recommendations
    pub fn finalize(&mut self) {
        let scenario_passed = self.multi_user_scenarios.iter().filter(|s| s.success).count();
        let scenario_total = self.multi_user_scenarios.len();

        self.successful_tests =
            self.layers.values().map(LayerResult::passed).sum::<usize>() + scenario_passed;
        self.total_tests =
            self.layers.values().map(LayerResult::total).sum::<usize>() + scenario_total;
        self.overall_success_rate = round1(rate(self.successful_tests, self.total_tests));

        let mut layer_rates: Vec<f64> = self.layers.values().map(LayerResult::success_rate).collect();
        if scenario_total > 0 {
            layer_rates.push(rate(scenario_passed, scenario_total));
        }
        self.mean_layer_rate = if layer_rates.is_empty() {
            0.0
        } else {
            round1(layer_rates.iter().sum::<f64>() / layer_rates.len() as f64)
        };

        self.critical_issues = self
            .layers
            .values()
            .flat_map(|layer| layer.issues.iter().map(move |i| format!("[{}] {}", layer.layer, i)))
            .collect();
        for scenario in self.multi_user_scenarios.iter().filter(|s| !s.success) {
            self.critical_issues.push(format!(
                "[multi_user] scenario '{}' failed ({}/{} steps)",
                scenario.name,
                scenario.passed_steps(),
                scenario.steps.len()
            ));
        }

        self.recommendations = self.derive_recommendations();
        self.finalized = true;
    }

    fn derive_recommendations(&self) -> Vec<String> {
        let mut out = Vec::new();

        if let Some(build) = self.layer(LayerId::Build) {
            if build.total() > 0 && build.passed() == 0 {
                out.push(format!(
                    "No public page or endpoint answered as expected; confirm {} is deployed and reachable.",
                    self.base_url
                ));
            }
        }

        if let Some(integration) = self.layer(LayerId::Integration) {
            if integration.passed() < integration.total() {
                out.push("Review API integration failures: schema drift or data-store connectivity.".to_string());
            }
        }

        if let Some(workflow) = self.layer(LayerId::Workflow) {
            let failed: Vec<&str> = workflow
                .tests
                .iter()
                .filter(|t| !t.success)
                .map(|t| t.name.as_str())
                .collect();
            if !failed.is_empty() {
                out.push(format!("Fix failing workflows: {}.", failed.join(", ")));
            }
            if workflow.issues.iter().any(|i| i.contains("inventory")) {
                out.push(
                    "Inventory is not restored when an approved request is rejected; reconcile the admin status handler."
                        .to_string(),
                );
            }
        }

        if let Some(health) = self.layer(LayerId::Health) {
            if health
                .tests
                .iter()
                .any(|t| !t.success && t.name.starts_with(SECURITY_CHECK_PREFIX))
            {
                out.push("Protect admin surfaces: an unauthenticated request was not refused.".to_string());
            }
            if health
                .tests
                .iter()
                .any(|t| !t.success && t.name.starts_with(PERF_CHECK_PREFIX))
            {
                out.push("Investigate slow responses: a page or API exceeded its time budget.".to_string());
            }
        }

        if self.multi_user_scenarios.iter().any(|s| !s.success) {
            out.push("The visitor → user → administrator handoff is broken; inspect multi_user_scenarios.".to_string());
        }

        out
    }

    /// Exit code: 0 when the overall rate reaches the pass threshold
    pub fn exit_code(&self, thresholds: &ThresholdConfig) -> i32 {
        if self.overall_success_rate >= thresholds.pass_rate {
            0
        } else {
            1
        }
    }

    pub fn verdict(&self, thresholds: &ThresholdConfig) -> Verdict {
        if self.overall_success_rate >= thresholds.excellent_rate {
            Verdict::Excellent
        } else if self.overall_success_rate >= thresholds.pass_rate {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    /// `<tag>_<epoch-seconds>.json`
    pub fn artifact_name(tag: &str, epoch_secs: i64) -> String {
        format!("{}_{}.json", tag, epoch_secs)
    }

    /// Finalize if needed and write the artifact. A report is written at most once.
    pub fn write_artifact(&mut self, dir: &Path, tag: &str) -> Result<PathBuf> {
        if let Some(path) = &self.written_to {
            return Err(Error::AlreadyWritten(path.display().to_string()));
        }
        if !self.finalized {
            self.finalize();
        }

        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::artifact_name(tag, Utc::now().timestamp()));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Report written to: {}", path.display());
        self.written_to = Some(path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details;
    use crate::types::CheckRecord;

    fn layer(id: LayerId, pass: usize, fail: usize) -> LayerResult {
        let mut layer = LayerResult::new(id);
        for i in 0..pass {
            layer.record(CheckRecord::pass(format!("ok{}", i), details! {}));
        }
        for i in 0..fail {
            layer.record(CheckRecord::fail(format!("bad{}", i), "boom", details! {}));
        }
        layer
    }

    #[test]
    fn test_empty_report_rate_is_zero() {
        let mut report = Report::new("http://localhost:3000", Utc::now());
        report.finalize();
        assert_eq!(report.overall_success_rate, 0.0);
        assert_eq!(report.total_tests, 0);
        assert_eq!(report.exit_code(&ThresholdConfig::default()), 1);
    }

    #[test]
    fn test_overall_rate_is_leaf_weighted() {
        let mut report = Report::new("http://localhost:3000", Utc::now());
        report.insert_layer(layer(LayerId::Build, 9, 1));
        report.insert_layer(layer(LayerId::Health, 1, 2));
        report.finalize();

        assert_eq!(report.total_tests, 13);
        assert_eq!(report.successful_tests, 10);
        assert_eq!(report.overall_success_rate, 76.9);
        assert_eq!(report.mean_layer_rate, round1((90.0 + 100.0 / 3.0) / 2.0));
        assert_eq!(report.exit_code(&ThresholdConfig::default()), 0);
        assert_eq!(report.verdict(&ThresholdConfig::default()), Verdict::Pass);
    }

    #[test]
    fn test_scenarios_count_as_leaves() {
        let mut report = Report::new("http://localhost:3000", Utc::now());
        report.insert_layer(layer(LayerId::Build, 3, 0));
        report.add_scenario(WorkflowRecord::from_steps(
            "visitor_to_admin",
            0.7,
            vec![CheckRecord::fail("register", "no success signal", details! {})],
        ));
        report.finalize();

        assert_eq!(report.total_tests, 4);
        assert_eq!(report.successful_tests, 3);
        assert_eq!(report.overall_success_rate, 75.0);
        assert!(report.critical_issues.iter().any(|i| i.contains("visitor_to_admin")));
        assert!(report.recommendations.iter().any(|r| r.contains("handoff")));
    }

    #[test]
    fn test_exit_code_boundary() {
        let thresholds = ThresholdConfig::default();
        let mut report = Report::new("http://localhost:3000", Utc::now());
        report.insert_layer(layer(LayerId::Build, 3, 1));
        report.finalize();
        assert_eq!(report.overall_success_rate, 75.0);
        assert_eq!(report.exit_code(&thresholds), 0);

        let mut report = Report::new("http://localhost:3000", Utc::now());
        report.insert_layer(layer(LayerId::Build, 74, 26));
        report.finalize();
        assert_eq!(report.exit_code(&thresholds), 1);
    }

    #[test]
    fn test_security_recommendation() {
        let mut health = LayerResult::new(LayerId::Health);
        health.record(CheckRecord::fail("security:/admin", "status 200", details! {}));
        let mut report = Report::new("http://localhost:3000", Utc::now());
        report.insert_layer(health);
        report.finalize();
        assert!(report.recommendations.iter().any(|r| r.contains("Protect admin")));
    }

    #[test]
    fn test_artifact_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = Report::new("http://localhost:3000", Utc::now());
        report.insert_layer(layer(LayerId::Build, 2, 0));

        let path = report.write_artifact(dir.path(), "full_layer_test").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("full_layer_test_"));
        assert!(name.ends_with(".json"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  \"base_url\""), "two-space indentation");
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["overall_success_rate"], 100.0);
        assert_eq!(json["layers"]["layer1"]["total"], 2);
        assert!(json["multi_user_scenarios"].as_array().unwrap().is_empty());

        assert!(matches!(
            report.write_artifact(dir.path(), "full_layer_test"),
            Err(Error::AlreadyWritten(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
