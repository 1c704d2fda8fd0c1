//! New Steps QA CLI - Main Entry Point
//!
//! Runs one acceptance suite against a deployment, prints the summary, and
//! exits 0 (pass), 1 (below threshold), 2 (setup error), or 130 (interrupt).

use anyhow::{Context, Result};
use clap::Parser;
use newsteps_qa_cli::output::{print_error, print_summary, print_warning};
use newsteps_qa_cli::{Cli, EXIT_INTERRUPTED, EXIT_SETUP};
use newsteps_qa_e2e::{HarnessError, Orchestrator};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn init_logging(cli: &Cli) {
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Cancel the run on the first Ctrl-C
fn watch_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            cancel.cancel();
        }
    });
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Arc::new(cli.resolve()?);
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output directory {}", config.output_dir.display()))?;
    if config.admin.credentials().is_none() && cli.suite != newsteps_qa_e2e::Suite::Public {
        print_warning("No administrator credentials; admin workflows will fail at login");
    }

    let cancel = CancellationToken::new();
    watch_interrupt(cancel.clone());
    let orchestrator = Orchestrator::new(Arc::clone(&config), cli.suite).with_cancellation(cancel);

    let mut report = match orchestrator.run().await {
        Ok(report) => report,
        Err(HarnessError::Interrupted) => {
            print_error("Interrupted; no report written");
            return Ok(EXIT_INTERRUPTED);
        }
        Err(e) => return Err(e.into()),
    };

    let path = report
        .write_artifact(&config.output_dir, &cli.suite.tag())
        .context("writing report")?;
    print_summary(&report, &config.thresholds, Some(&path));

    let code = report.exit_code(&config.thresholds);
    info!("Exit code {}", code);
    Ok(code)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            EXIT_SETUP
        }
    };
    std::process::exit(code);
}
