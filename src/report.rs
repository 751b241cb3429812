//! JSON and Markdown rendering. Pure: callers decide where output goes.

use serde::Serialize;
use std::fmt::Write;

use crate::coverage::{BatchSummary, CoverageReport, CoverageTrend};
use crate::error::Result;
use crate::models::{EndpointDescriptor, Provenance};

/// Placeholder for any value that is absent, so gaps are never silently blank.
pub const NO_DATA: &str = "_no data_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Json,
    #[default]
    Markdown,
}

/// Escapes text for a Markdown table cell. Blank text becomes [`NO_DATA`].
pub fn escape_cell(text: &str) -> String {
    if text.trim().is_empty() {
        return NO_DATA.to_string();
    }
    text.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace(['\n', '\r'], "<br>")
}

fn json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn provenance_banner(out: &mut String, provenance: Provenance) {
    let _ = writeln!(out, "Data source: **{}**\n", provenance);
    if provenance == Provenance::Simulated {
        out.push_str("> **Synthetic data.** These figures were not measured from real API calls.\n\n");
    }
}

fn endpoint_table(out: &mut String, heading: &str, endpoints: &[EndpointDescriptor]) {
    let _ = writeln!(out, "## {} ({})\n", heading, endpoints.len());
    if endpoints.is_empty() {
        out.push_str("_none_\n\n");
        return;
    }
    out.push_str("| Method | Path | Category |\n|---|---|---|\n");
    for endpoint in endpoints {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            endpoint.method,
            escape_cell(&endpoint.path),
            escape_cell(&endpoint.category)
        );
    }
    out.push('\n');
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn signed(value: f64) -> String {
    if value > 0.0 {
        format!("+{:.1}", value)
    } else {
        format!("{:.1}", value)
    }
}

fn or_no_data(value: Option<String>) -> String {
    value.unwrap_or_else(|| NO_DATA.to_string())
}

pub fn render(report: &CoverageReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => json(report),
        ReportFormat::Markdown => Ok(coverage_markdown(report)),
    }
}

fn coverage_markdown(report: &CoverageReport) -> String {
    let mut out = String::from("# API Coverage Report\n\n");
    provenance_banner(&mut out, report.provenance);

    out.push_str("| Metric | Value |\n|---|---|\n");
    let _ = writeln!(out, "| Expected endpoints | {} |", report.expected_len());
    let _ = writeln!(out, "| Covered | {} |", report.covered.len());
    let _ = writeln!(out, "| Missing | {} |", report.missing.len());
    let _ = writeln!(out, "| Extra | {} |", report.extra.len());
    let _ = writeln!(out, "| Overall coverage | {} |\n", percent(report.overall_percentage));

    out.push_str("## Coverage by category\n\n");
    out.push_str("| Category | Expected | Covered | Coverage |\n|---|---|---|---|\n");
    if report.categories.is_empty() {
        let _ = writeln!(out, "| {NO_DATA} | {NO_DATA} | {NO_DATA} | {NO_DATA} |");
    }
    for (name, category) in &report.categories {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            escape_cell(name),
            category.expected,
            category.covered,
            percent(category.percentage)
        );
    }
    out.push('\n');

    endpoint_table(&mut out, "Covered endpoints", &report.covered);
    endpoint_table(&mut out, "Missing endpoints", &report.missing);
    endpoint_table(&mut out, "Extra endpoints", &report.extra);
    out
}

pub fn render_summary(summary: &BatchSummary, format: ReportFormat) -> Result<String> {
    if format == ReportFormat::Json {
        return json(summary);
    }

    let mut out = String::from("# Batch Summary\n\n");
    out.push_str("| Metric | Value |\n|---|---|\n");
    let _ = writeln!(out, "| Calls | {} |", summary.total_calls);
    let _ = writeln!(out, "| Attempts | {} |", summary.total_attempts);
    let _ = writeln!(out, "| Passed (2xx) | {} |", summary.passed);
    let _ = writeln!(out, "| Pass rate | {} |\n", or_no_data(summary.pass_rate.map(percent)));

    out.push_str("## Outcomes\n\n| Outcome | Calls |\n|---|---|\n");
    if summary.by_outcome.is_empty() {
        let _ = writeln!(out, "| {NO_DATA} | {NO_DATA} |");
    }
    for (outcome, count) in &summary.by_outcome {
        let _ = writeln!(out, "| {} | {} |", escape_cell(outcome), count);
    }

    out.push_str("\n## Status classes\n\n| Class | Calls |\n|---|---|\n");
    if summary.by_status_class.is_empty() {
        let _ = writeln!(out, "| {NO_DATA} | {NO_DATA} |");
    }
    for (class, count) in &summary.by_status_class {
        let _ = writeln!(out, "| {} | {} |", escape_cell(class), count);
    }

    out.push_str("\n## Pass rate by category\n\n| Category | Calls | Passed | Pass rate |\n|---|---|---|---|\n");
    if summary.categories.is_empty() {
        let _ = writeln!(out, "| {NO_DATA} | {NO_DATA} | {NO_DATA} | {NO_DATA} |");
    }
    for (name, category) in &summary.categories {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            escape_cell(name),
            category.calls,
            category.passed,
            percent(category.pass_rate)
        );
    }
    Ok(out)
}

pub fn render_trend(trend: &CoverageTrend, format: ReportFormat) -> Result<String> {
    if format == ReportFormat::Json {
        return json(trend);
    }

    let mut out = String::from("# Coverage Trend\n\n");
    provenance_banner(&mut out, trend.provenance);

    let _ = writeln!(
        out,
        "Overall: {} -> {} ({})\n",
        percent(trend.overall_before),
        percent(trend.overall_after),
        signed(trend.overall_delta)
    );

    out.push_str("| Category | Before | After | Change |\n|---|---|---|---|\n");
    if trend.categories.is_empty() {
        let _ = writeln!(out, "| {NO_DATA} | {NO_DATA} | {NO_DATA} | {NO_DATA} |");
    }
    for (name, category) in &trend.categories {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            escape_cell(name),
            or_no_data(category.before.map(percent)),
            or_no_data(category.after.map(percent)),
            or_no_data(category.delta.map(signed))
        );
    }

    for (heading, keys) in [("Newly covered", &trend.newly_covered), ("Newly missing", &trend.newly_missing)] {
        let _ = writeln!(out, "\n## {} ({})\n", heading, keys.len());
        if keys.is_empty() {
            out.push_str("_none_\n");
        }
        for key in keys {
            let _ = writeln!(out, "- `{} {}`", key.method, key.path.replace('`', "'"));
        }
    }
    Ok(out)
}
