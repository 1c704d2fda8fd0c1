//! Core result types shared by every layer of the harness

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Free-form key → value details attached to a check or step
pub type Details = Map<String, Value>;

/// Build a `Details` map from `key => value` pairs
#[macro_export]
macro_rules! details {
    () => { $crate::types::Details::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::types::Details::new();
        $( map.insert(($key).to_string(), ::serde_json::json!($value)); )+
        map
    }};
}

/// The four probe layers, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerId {
    Build,
    Integration,
    Workflow,
    Health,
}

impl LayerId {
    pub const ALL: [LayerId; 4] = [
        LayerId::Build,
        LayerId::Integration,
        LayerId::Workflow,
        LayerId::Health,
    ];

    /// Key under `layers` in the JSON artifact
    pub fn key(&self) -> &'static str {
        match self {
            LayerId::Build => "layer1",
            LayerId::Integration => "layer2",
            LayerId::Workflow => "layer3",
            LayerId::Health => "layer4",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            LayerId::Build => "Build & Deployment",
            LayerId::Integration => "API Integration",
            LayerId::Workflow => "User Workflows",
            LayerId::Health => "Production Health",
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerId::Build => write!(f, "build"),
            LayerId::Integration => write!(f, "integration"),
            LayerId::Workflow => write!(f, "workflow"),
            LayerId::Health => write!(f, "health"),
        }
    }
}

/// A single pass/fail unit. Workflow steps use the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub name: String,
    pub success: bool,
    #[serde(default)]
    pub details: Details,
}

impl CheckRecord {
    /// A passing record never carries an `error` key.
    pub fn new(name: impl Into<String>, success: bool, mut details: Details) -> Self {
        if success {
            details.remove("error");
        }
        Self {
            name: name.into(),
            success,
            details,
        }
    }

    pub fn pass(name: impl Into<String>, details: Details) -> Self {
        Self::new(name, true, details)
    }

    pub fn fail(name: impl Into<String>, error: impl fmt::Display, mut details: Details) -> Self {
        details.insert("error".to_string(), Value::String(error.to_string()));
        Self::new(name, false, details)
    }

    pub fn error(&self) -> Option<&str> {
        self.details.get("error").and_then(Value::as_str)
    }
}

/// Contribution of one probe layer to the report
#[derive(Debug, Clone, PartialEq)]
pub struct LayerResult {
    pub layer: LayerId,
    pub tests: Vec<CheckRecord>,
    pub issues: Vec<String>,
}

impl LayerResult {
    pub fn new(layer: LayerId) -> Self {
        Self {
            layer,
            tests: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// Append a check, suffixing the name when it collides within the layer
    pub fn record(&mut self, mut check: CheckRecord) {
        let taken: HashSet<&str> = self.tests.iter().map(|t| t.name.as_str()).collect();
        if taken.contains(check.name.as_str()) {
            let base = check.name.clone();
            let mut n = 2;
            while taken.contains(format!("{}_{}", base, n).as_str()) {
                n += 1;
            }
            check.name = format!("{}_{}", base, n);
        }
        self.tests.push(check);
    }

    /// Blank issue strings are dropped
    pub fn add_issue(&mut self, issue: impl Into<String>) {
        let issue = issue.into();
        let trimmed = issue.trim();
        if !trimmed.is_empty() {
            self.issues.push(trimmed.to_string());
        }
    }

    pub fn passed(&self) -> usize {
        self.tests.iter().filter(|t| t.success).count()
    }

    pub fn total(&self) -> usize {
        self.tests.len()
    }

    /// Percentage of passing leaves, 0 when the layer is empty
    pub fn success_rate(&self) -> f64 {
        rate(self.passed(), self.total())
    }
}

impl Serialize for LayerResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("LayerResult", 7)?;
        s.serialize_field("layer", &self.layer)?;
        s.serialize_field("name", self.layer.title())?;
        s.serialize_field("tests", &self.tests)?;
        s.serialize_field("issues", &self.issues)?;
        s.serialize_field("passed", &self.passed())?;
        s.serialize_field("total", &self.total())?;
        s.serialize_field("success_rate", &round1(self.success_rate()))?;
        s.end()
    }
}

/// Outcome of a named workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub name: String,
    pub success: bool,
    /// Fraction of passing steps in [0, 1]
    pub success_rate: f64,
    pub threshold: f64,
    pub steps: Vec<CheckRecord>,
}

impl WorkflowRecord {
    /// Verdict is `passed / total >= threshold`; an empty workflow fails.
    pub fn from_steps(name: impl Into<String>, threshold: f64, steps: Vec<CheckRecord>) -> Self {
        let passed = steps.iter().filter(|s| s.success).count();
        let success_rate = if steps.is_empty() {
            0.0
        } else {
            passed as f64 / steps.len() as f64
        };
        Self {
            name: name.into(),
            success: !steps.is_empty() && success_rate >= threshold,
            success_rate,
            threshold,
            steps,
        }
    }

    pub fn passed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }

    /// Collapse into a leaf check for the workflow layer
    pub fn to_check(&self) -> CheckRecord {
        let mut details = Details::new();
        details.insert("success_rate".into(), Value::from(self.success_rate));
        details.insert("threshold".into(), Value::from(self.threshold));
        details.insert(
            "steps".into(),
            serde_json::to_value(&self.steps).unwrap_or(Value::Null),
        );
        if self.success {
            CheckRecord::pass(&self.name, details)
        } else {
            let reason = self
                .steps
                .iter()
                .find_map(|s| s.error().map(|e| format!("{}: {}", s.name, e)))
                .unwrap_or_else(|| "no steps executed".to_string());
            CheckRecord::fail(
                &self.name,
                format!(
                    "{}/{} steps passed (threshold {:.0}%), first failure {}",
                    self.passed_steps(),
                    self.steps.len(),
                    self.threshold * 100.0,
                    reason
                ),
                details,
            )
        }
    }
}

/// Ephemeral user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

impl Credentials {
    /// `<prefix><epoch-seconds>@example.com`, unique per second by construction
    pub fn mint(prefix: &str, password: &str, epoch_secs: i64) -> Self {
        Self {
            email: format!("{}{}@example.com", prefix, epoch_secs),
            password: password.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            phone: "555-123-4567".to_string(),
        }
    }

    /// Fixed credentials (administrator)
    pub fn fixed(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            first_name: "Admin".to_string(),
            last_name: "User".to_string(),
            phone: String::new(),
        }
    }
}

/// Percentage helper; 0 when there is nothing to count
pub fn rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    }
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
