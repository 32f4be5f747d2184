//! Run report: one verdict per executed manifest or command line.

use std::fmt::Write as _;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::dispatch::Backend;

pub const PASS_DETAIL: &str = "No errors found. Doc is valid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Pass,
    Fail,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "Pass",
            Status::Fail => "Fail",
        }
    }
}

/// Outcome of one manifest apply or one command line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Manifest path or the command line that ran
    pub target: String,
    /// Script artifact the command line came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub backend: Backend,
    pub status: Status,
    pub detail: String,
    pub started_at: String,
    pub duration_ms: u64,
}

/// A result whose command is about to run.
///
/// Can only become a `CommandResult` through `pass` or `fail`.
#[must_use = "a pending result is lost unless completed and added to the report"]
#[derive(Debug)]
pub struct PendingResult {
    target: String,
    source: Option<String>,
    backend: Backend,
    started: Instant,
    started_at: String,
}

impl PendingResult {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn pass(self) -> CommandResult {
        self.finish(Status::Pass, PASS_DETAIL.to_string())
    }

    pub fn fail(self, detail: impl Into<String>) -> CommandResult {
        self.finish(Status::Fail, detail.into())
    }

    fn finish(self, status: Status, detail: String) -> CommandResult {
        CommandResult {
            target: self.target,
            source: self.source,
            backend: self.backend,
            status,
            detail,
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Append-only, insertion-ordered collection of results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    run_id: String,
    results: Vec<CommandResult>,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            results: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Start a result for `target`. Nothing is recorded until `add_result`.
    pub fn new_result(&self, target: impl Into<String>, backend: Backend) -> PendingResult {
        PendingResult {
            target: target.into(),
            source: None,
            backend,
            started: Instant::now(),
            started_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn add_result(&mut self, result: CommandResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[CommandResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn summary(&self) -> ReportSummary {
        let passed = self
            .results
            .iter()
            .filter(|r| r.status == Status::Pass)
            .count();
        ReportSummary {
            total: self.results.len(),
            passed,
            failed: self.results.len() - passed,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status == Status::Fail)
    }

    /// Plain-text rendering, one line per result in insertion order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let _ = writeln!(
                out,
                "{:<4}  {:<7}  {}  {}",
                result.status.as_str(),
                result.backend.as_str(),
                result.target,
                result.detail.trim_end()
            );
        }
        let summary = self.summary();
        let _ = writeln!(
            out,
            "{} results: {} passed, {} failed",
            summary.total, summary.passed, summary.failed
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_result_does_not_append() {
        let report = Report::new();
        let _pending = report.new_result("a-manifest.yaml", Backend::Kubectl);
        assert!(report.is_empty());
    }

    #[test]
    fn results_keep_insertion_order_without_dedup() {
        let mut report = Report::new();
        let first = report.new_result("pxctl status", Backend::Pxctl).fail("boom");
        report.add_result(first);
        let second = report.new_result("pxctl status", Backend::Pxctl).pass();
        report.add_result(second);

        let statuses: Vec<_> = report.results().iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![Status::Fail, Status::Pass]);
        assert_eq!(report.len(), 2);
        assert!(report.has_failures());
    }

    #[test]
    fn pass_uses_fixed_detail() {
        let report = Report::new();
        let result = report
            .new_result("kubectl get pods", Backend::Kubectl)
            .with_source("doc-commands.sh")
            .pass();
        assert_eq!(result.detail, PASS_DETAIL);
        assert_eq!(result.source.as_deref(), Some("doc-commands.sh"));
    }

    #[test]
    fn render_lists_every_result_and_a_summary() {
        let mut report = Report::new();
        let ok = report.new_result("a-manifest.yaml", Backend::Kubectl).pass();
        report.add_result(ok);
        let bad = report
            .new_result("pxctl status", Backend::Pxctl)
            .fail("connection refused\n");
        report.add_result(bad);

        let text = report.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Pass"));
        assert!(lines[0].contains("kubectl"));
        assert!(lines[1].starts_with("Fail"));
        assert!(lines[1].ends_with("connection refused"));
        assert_eq!(lines[2], "2 results: 1 passed, 1 failed");
    }

    #[test]
    fn serializes_backend_and_status() {
        let mut report = Report::new();
        let result = report.new_result("pxctl status", Backend::Pxctl).pass();
        report.add_result(result);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["results"][0]["backend"], "pxctl");
        assert_eq!(value["results"][0]["status"], "Pass");
        assert!(value["runId"].is_string());
    }
}
