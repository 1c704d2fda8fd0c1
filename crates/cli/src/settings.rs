//! Command-line arguments and their merge onto the harness configuration

use anyhow::{Context, Result};
use clap::Parser;
use newsteps_qa_common::HarnessConfig;
use newsteps_qa_e2e::Suite;
use std::path::PathBuf;

/// New Steps acceptance harness
#[derive(Parser, Debug)]
#[command(name = "newsteps-qa")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Target deployment, e.g. https://newsteps.example.org
    pub base_url: Option<String>,

    /// Suite to run (full, api, public, user, admin)
    #[arg(short, long, default_value = "full")]
    pub suite: Suite,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Administrator email for admin workflows
    #[arg(long, env = "NEWSTEPS_ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    /// Administrator password for admin workflows
    #[arg(long, env = "NEWSTEPS_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Directory for the JSON report
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Directory for failure screenshots
    #[arg(long)]
    pub screenshot_dir: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Chromium executable
    #[arg(long)]
    pub browser: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Defaults, then the TOML file, then environment and flags
    pub fn resolve(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => HarnessConfig::default(),
        };

        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(email) = &self.admin_email {
            config.admin.email = Some(email.clone());
        }
        if let Some(password) = &self.admin_password {
            config.admin.password = Some(password.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.screenshot_dir {
            config.screenshot_dir = dir.clone();
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(path) = &self.browser {
            config.browser.executable = Some(path.clone());
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "newsteps-qa",
            "https://staging.newsteps.test/",
            "--suite",
            "admin",
            "--admin-email",
            "ops@newsteps.test",
            "--admin-password",
            "hunter2",
            "--headed",
        ]);
        let config = cli.resolve().unwrap();

        assert_eq!(cli.suite, Suite::Admin);
        assert_eq!(config.base(), "https://staging.newsteps.test");
        assert_eq!(config.admin.credentials(), Some(("ops@newsteps.test", "hunter2")));
        assert!(!config.browser.headless);
        assert_eq!(config.concurrency.workers, 5);
    }

    #[test]
    fn test_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "base_url = \"http://10.0.0.5:3000\"\noutput_dir = \"reports\"\n[thresholds]\npass_rate = 80.0"
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = Cli::parse_from(["newsteps-qa", "--config", path]).resolve().unwrap();
        assert_eq!(config.base_url, "http://10.0.0.5:3000");
        assert_eq!(config.output_dir, PathBuf::from("reports"));
        assert_eq!(config.thresholds.pass_rate, 80.0);

        let config = Cli::parse_from(["newsteps-qa", "http://localhost:4000", "--config", path])
            .resolve()
            .unwrap();
        assert_eq!(config.base_url, "http://localhost:4000");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Cli::try_parse_from(["newsteps-qa", "--suite", "smoke"]).is_err());
        let cli = Cli::parse_from(["newsteps-qa", "ftp://newsteps.test"]);
        assert!(cli.resolve().is_err());
        let cli = Cli::parse_from(["newsteps-qa", "--config", "/nonexistent/newsteps.toml"]);
        let err = cli.resolve().unwrap_err();
        assert!(err.to_string().starts_with("reading config"));
    }
}
