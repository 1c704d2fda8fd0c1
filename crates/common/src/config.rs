//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default target when no base URL is given
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the target application
    pub base_url: String,

    /// Administrator credentials (configured out-of-band)
    pub admin: AdminConfig,

    /// Ephemeral user settings
    pub user: UserConfig,

    /// Wait ceilings
    pub timeouts: TimeoutConfig,

    /// Browser launch settings
    pub browser: BrowserSettings,

    /// Concurrent health probe settings
    pub concurrency: ConcurrencyConfig,

    /// Pass/fail thresholds
    pub thresholds: ThresholdConfig,

    /// Directory receiving the JSON artifact
    pub output_dir: PathBuf,

    /// Directory receiving failure screenshots
    pub screenshot_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            admin: AdminConfig::default(),
            user: UserConfig::default(),
            timeouts: TimeoutConfig::default(),
            browser: BrowserSettings::default(),
            concurrency: ConcurrencyConfig::default(),
            thresholds: ThresholdConfig::default(),
            output_dir: PathBuf::from("."),
            screenshot_dir: PathBuf::from("qa-screenshots"),
        }
    }
}

/// Administrator credential pair
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl AdminConfig {
    /// Both halves of the pair, if configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some((email, password))
            }
            _ => None,
        }
    }
}

/// Settings for freshly minted users
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Local-part prefix; the epoch second is appended
    pub email_prefix: String,

    /// Fixed-complexity password
    pub password: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            email_prefix: "testuser_".to_string(),
            password: "TestPassword123!".to_string(),
        }
    }
}

/// Wait ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation_secs: u64,
    pub dynamic_wait_secs: u64,
    pub indicator_secs: u64,
    pub element_secs: u64,
    pub http_secs: u64,
    pub stabilization_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_secs: 30,
            dynamic_wait_secs: 20,
            indicator_secs: 10,
            element_secs: 10,
            http_secs: 10,
            stabilization_ms: 2000,
        }
    }
}

impl TimeoutConfig {
    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }

    pub fn dynamic_wait(&self) -> Duration {
        Duration::from_secs(self.dynamic_wait_secs)
    }

    pub fn indicator(&self) -> Duration {
        Duration::from_secs(self.indicator_secs)
    }

    pub fn element(&self) -> Duration {
        Duration::from_secs(self.element_secs)
    }

    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }

    pub fn stabilization(&self) -> Duration {
        Duration::from_millis(self.stabilization_ms)
    }
}

/// Browser launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            executable: None,
        }
    }
}

/// Concurrent health probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub tasks: usize,
    pub workers: usize,
    pub min_success_ratio: f64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            tasks: 10,
            workers: 5,
            min_success_ratio: 0.8,
        }
    }
}

/// Pass/fail thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Overall rate at or above which the run exits 0
    pub pass_rate: f64,
    /// Overall rate at or above which the banner reads EXCELLENT
    pub excellent_rate: f64,
    pub homepage_max_ms: u64,
    pub api_max_ms: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            pass_rate: 75.0,
            excellent_rate: 90.0,
            homepage_max_ms: 5000,
            api_max_ms: 2000,
        }
    }
}

impl HarnessConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Base URL without a trailing slash
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Absolute URL for a target path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base(), path)
    }

    pub fn validate(&self) -> Result<()> {
        let host = self
            .base()
            .strip_prefix("http://")
            .or_else(|| self.base().strip_prefix("https://"));
        if host.map_or(true, str::is_empty) {
            return Err(Error::InvalidConfig(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.concurrency.workers == 0 {
            return Err(Error::InvalidConfig("concurrency.workers must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.concurrency.min_success_ratio) {
            return Err(Error::InvalidConfig(
                "concurrency.min_success_ratio must lie in [0, 1]".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.thresholds.pass_rate) {
            return Err(Error::InvalidConfig("thresholds.pass_rate must lie in [0, 100]".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.concurrency.workers, 5);
        assert_eq!(config.concurrency.tasks, 10);
        assert_eq!(config.thresholds.pass_rate, 75.0);
        assert!(config.admin.credentials().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
base_url = "https://staging.newsteps.example/"

[admin]
email = "ops@newsteps.example"
password = "hunter22"

[timeouts]
http_secs = 5
"#,
        )
        .unwrap();

        assert_eq!(config.base(), "https://staging.newsteps.example");
        assert_eq!(config.url("/api/health"), "https://staging.newsteps.example/api/health");
        assert_eq!(config.admin.credentials(), Some(("ops@newsteps.example", "hunter22")));
        assert_eq!(config.timeouts.http(), Duration::from_secs(5));
        assert_eq!(config.timeouts.navigation_secs, 30);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HarnessConfig {
            base_url: "localhost:3000".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.base_url = DEFAULT_BASE_URL.into();
        config.concurrency.workers = 0;
        assert!(config.validate().is_err());

        config.concurrency.workers = 5;
        config.concurrency.min_success_ratio = 1.5;
        assert!(config.validate().is_err());
    }
}
