//! Run summary for the terminal

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use newsteps_qa_common::config::ThresholdConfig;
use newsteps_qa_common::{Report, Verdict};
use std::fmt::Write;
use std::path::Path;

/// Per-layer table plus the scenario row
pub fn layer_table(report: &Report) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Layer", "Passed", "Total", "Rate", "Issues"]);

    for layer in report.layers.values() {
        table.add_row(vec![
            Cell::new(layer.layer.title()),
            Cell::new(layer.passed()),
            Cell::new(layer.total()),
            Cell::new(format!("{:.1}%", layer.success_rate())),
            Cell::new(layer.issues.len()),
        ]);
    }
    if !report.multi_user_scenarios.is_empty() {
        let passed = report.multi_user_scenarios.iter().filter(|s| s.success).count();
        let total = report.multi_user_scenarios.len();
        table.add_row(vec![
            Cell::new("Multi-actor scenarios"),
            Cell::new(passed),
            Cell::new(total),
            Cell::new(format!("{:.1}%", newsteps_qa_common::rate(passed, total))),
            Cell::new(total - passed),
        ]);
    }
    table
}

fn banner(verdict: Verdict) -> String {
    match verdict {
        Verdict::Excellent => "EXCELLENT".green().bold().to_string(),
        Verdict::Pass => "PASS".yellow().bold().to_string(),
        Verdict::Fail => "FAIL".red().bold().to_string(),
    }
}

/// The fixed-format summary printed after a run
pub fn render_summary(report: &Report, thresholds: &ThresholdConfig, artifact: Option<&Path>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "═".repeat(64));
    let _ = writeln!(out, "New Steps acceptance: {}", report.base_url);
    let _ = writeln!(out, "Started: {}", report.timestamp);
    let _ = writeln!(out, "{}", layer_table(report));
    let _ = writeln!(
        out,
        "Overall: {}/{} passed ({:.1}%), mean layer rate {:.1}%",
        report.successful_tests, report.total_tests, report.overall_success_rate, report.mean_layer_rate
    );
    let _ = writeln!(out, "Verdict: {}", banner(report.verdict(thresholds)));

    if !report.critical_issues.is_empty() {
        let _ = writeln!(out, "\n{}", "Critical issues:".bold());
        for issue in &report.critical_issues {
            let _ = writeln!(out, "  ❌ {}", issue);
        }
    }
    if !report.recommendations.is_empty() {
        let _ = writeln!(out, "\n{}", "Recommendations:".bold());
        for recommendation in &report.recommendations {
            let _ = writeln!(out, "  → {}", recommendation);
        }
    }
    if let Some(path) = artifact {
        let _ = writeln!(out, "\nReport: {}", path.display());
    }
    let _ = write!(out, "{}", "═".repeat(64));
    out
}

pub fn print_summary(report: &Report, thresholds: &ThresholdConfig, artifact: Option<&Path>) {
    println!("{}", render_summary(report, thresholds, artifact));
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("⚠️  {}", message);
}
