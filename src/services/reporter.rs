//! Report Rendering
//!
//! Persists a finished run as four artifacts sharing one timestamped stem:
//! a JSON document, a line-oriented log, an HTML summary and a markdown
//! list of failing units.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use labctl_core::OrchestratorContext;
use labctl_orchestrator::{AggregateReport, ExecutionOutcome, RunStatus, UnitResult};
use serde::Serialize;

use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{ensure_dir, report_stem};

/// Files written for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportArtifacts {
    pub json: PathBuf,
    pub log: PathBuf,
    pub html: PathBuf,
    pub markdown: PathBuf,
}

impl ReportArtifacts {
    pub fn paths(&self) -> [&Path; 4] {
        [&self.json, &self.log, &self.html, &self.markdown]
    }
}

/// Receives the outcome of every top-level run, including halted ones.
pub trait Reporter {
    fn report(
        &self,
        ctx: &OrchestratorContext,
        outcome: &ExecutionOutcome,
    ) -> AppResult<ReportArtifacts>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    run_id: &'a str,
    profile: &'a str,
    started_at: String,
    status: RunStatus,
    exit_code: i32,
    halted_by: Option<&'a labctl_orchestrator::FatalPhaseFailure>,
    report: &'a AggregateReport,
    results: &'a [UnitResult],
}

/// Writes report files into the context's output directory.
#[derive(Debug, Clone, Default)]
pub struct FileReporter {
    output_dir: Option<PathBuf>,
}

impl FileReporter {
    /// Reporter writing into `ctx.output_dir()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter writing into a fixed directory.
    pub fn with_output_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: Some(dir.into()),
        }
    }
}

impl Reporter for FileReporter {
    fn report(
        &self,
        ctx: &OrchestratorContext,
        outcome: &ExecutionOutcome,
    ) -> AppResult<ReportArtifacts> {
        let dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| ctx.output_dir().to_path_buf());
        ensure_dir(&dir)?;

        let stem = report_stem(ctx.started_at(), ctx.run_id());
        let artifacts = ReportArtifacts {
            json: dir.join(format!("{}.json", stem)),
            log: dir.join(format!("{}.log", stem)),
            html: dir.join(format!("{}.html", stem)),
            markdown: dir.join(format!("{}.md", stem)),
        };

        fs::write(&artifacts.json, render_json(ctx, outcome)?)?;
        fs::write(&artifacts.log, render_log(ctx, outcome))?;
        fs::write(&artifacts.html, render_html(ctx, outcome))?;
        fs::write(&artifacts.markdown, render_markdown(outcome))?;

        tracing::info!(dir = %dir.display(), stem = %stem, "wrote reports");
        Ok(artifacts)
    }
}

/// Pretty JSON document: run identity, status, aggregate report and results.
pub fn render_json(ctx: &OrchestratorContext, outcome: &ExecutionOutcome) -> AppResult<String> {
    let doc = JsonReport {
        run_id: ctx.run_id(),
        profile: ctx.profile_name(),
        started_at: ctx.started_at().to_rfc3339(),
        status: outcome.status,
        exit_code: outcome.exit_code(),
        halted_by: outcome.halted_by.as_ref(),
        report: &outcome.report,
        results: &outcome.results,
    };
    serde_json::to_string_pretty(&doc)
        .map_err(|e| AppError::report(format!("failed to render JSON report: {}", e)))
}

/// One line per unit followed by a summary block.
pub fn render_log(ctx: &OrchestratorContext, outcome: &ExecutionOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "labctl run {} (profile {}) started {}",
        ctx.run_id(),
        ctx.profile_name(),
        ctx.started_at().to_rfc3339()
    );
    for r in &outcome.results {
        let _ = write!(
            out,
            "[{}] {} attempt={} tests={}/{} duration={:.3}s",
            if r.success { "PASS" } else { "FAIL" },
            r.unit_id,
            r.attempt,
            r.tests_passed,
            r.tests_run,
            r.duration_seconds
        );
        if let Some(err) = &r.error {
            let _ = write!(out, " error={}", err);
        }
        out.push('\n');
    }

    let report = &outcome.report;
    let _ = writeln!(out, "---");
    let _ = writeln!(out, "status: {}", outcome.status);
    let _ = writeln!(
        out,
        "units: {} (failed {})",
        report.total_units, report.failed_units
    );
    let _ = writeln!(
        out,
        "tests: {} run, {} passed, {} failed",
        report.total_tests_run, report.total_passed, report.total_failed
    );
    let _ = writeln!(out, "success rate: {:.2}%", report.success_rate);
    if let Some(fatal) = &outcome.halted_by {
        let skipped: Vec<&str> = fatal.skipped_phases.iter().map(|p| p.as_str()).collect();
        let _ = writeln!(
            out,
            "halted: {} phase failed ({}); skipped: {}",
            fatal.phase,
            fatal.failed_units.join(", "),
            if skipped.is_empty() { "none".to_string() } else { skipped.join(", ") }
        );
    }
    out
}

/// Markdown list of failing units: `- **<unit>**: <error>`.
pub fn render_markdown(outcome: &ExecutionOutcome) -> String {
    let failures: Vec<&UnitResult> = outcome.results.iter().filter(|r| !r.success).collect();
    let mut out = String::from("# Failed Units\n\n");
    if failures.is_empty() {
        out.push_str("No failures.\n");
        return out;
    }
    for r in failures {
        let message = r
            .error
            .as_deref()
            .unwrap_or("failed without an error message")
            .replace('\n', " ");
        let _ = writeln!(out, "- **{}**: {}", r.unit_id, message);
    }
    out
}

/// Standalone HTML page: summary table, per-phase table, per-module tables.
pub fn render_html(ctx: &OrchestratorContext, outcome: &ExecutionOutcome) -> String {
    let report = &outcome.report;
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>labctl report {}</title>", escape_html(ctx.run_id()));
    out.push_str(
        "<style>body{font-family:sans-serif}table{border-collapse:collapse;margin-bottom:1em}\
         td,th{border:1px solid #ccc;padding:4px 8px}.pass{color:#1a7f37}.fail{color:#cf222e}</style>\n",
    );
    out.push_str("</head>\n<body>\n");
    let _ = writeln!(
        out,
        "<h1>labctl report</h1>\n<p>Run <code>{}</code>, profile <b>{}</b>, started {}</p>",
        escape_html(ctx.run_id()),
        escape_html(ctx.profile_name()),
        escape_html(&ctx.started_at().to_rfc3339())
    );

    out.push_str("<h2>Summary</h2>\n<table>\n");
    let rows: [(&str, String); 7] = [
        ("Status", outcome.status.to_string()),
        ("Units", report.total_units.to_string()),
        ("Failed units", report.failed_units.to_string()),
        ("Tests run", report.total_tests_run.to_string()),
        ("Passed", report.total_passed.to_string()),
        ("Failed", report.total_failed.to_string()),
        ("Success rate", format!("{:.2}%", report.success_rate)),
    ];
    for (label, value) in rows {
        let _ = writeln!(out, "<tr><th>{}</th><td>{}</td></tr>", label, escape_html(&value));
    }
    out.push_str("</table>\n");

    if let Some(fatal) = &outcome.halted_by {
        let _ = writeln!(
            out,
            "<p class=\"fail\"><b>Halted:</b> the {} phase failed; later phases were skipped.</p>",
            escape_html(fatal.phase.display_name())
        );
    }

    if !report.per_phase.is_empty() {
        out.push_str("<h2>Phases</h2>\n<table>\n<tr><th>Phase</th><th>Units</th><th>Passed</th><th>Failed</th><th>Duration (s)</th></tr>\n");
        for phase in &report.per_phase {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.3}</td></tr>",
                escape_html(phase.phase.display_name()),
                phase.units,
                phase.passed_units,
                phase.failed_units,
                phase.duration_seconds
            );
        }
        out.push_str("</table>\n");
    }

    for (module, results) in &report.per_module {
        let _ = writeln!(out, "<h2>{}</h2>", escape_html(module));
        out.push_str("<table>\n<tr><th>Phase</th><th>Result</th><th>Tests</th><th>Duration (s)</th><th>Error</th></tr>\n");
        for r in results {
            let (class, label) = if r.success { ("pass", "PASS") } else { ("fail", "FAIL") };
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td class=\"{}\">{}</td><td>{}/{}</td><td>{:.3}</td><td>{}</td></tr>",
                escape_html(r.phase.display_name()),
                class,
                label,
                r.tests_passed,
                r.tests_run,
                r.duration_seconds,
                escape_html(r.error.as_deref().unwrap_or(""))
            );
        }
        out.push_str("</table>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
