use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use surge_core::runner::{ProgressFn, ProgressUpdate, RunReport, ScenarioSpec};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _source: &Path, _spec: &ScenarioSpec) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(|u| {
            emit_json_line(&build_progress_line(u));
        }))
    }

    fn print_report(&self, report: &RunReport) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(report));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub phase: String,
    pub elapsed_secs: u64,
    pub iterations_total: u64,
    pub dropped_total: u64,
    pub in_use_vus: usize,
    pub live_vus: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_p50_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_p95_ms: Option<f64>,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        phase: u.phase.to_string(),
        elapsed_secs: u.elapsed.as_secs(),
        iterations_total: u.iterations_total,
        dropped_total: u.dropped_total,
        in_use_vus: u.in_use_vus,
        live_vus: u.live_vus,
        stage: u.stage.as_ref().map(|s| s.index as u64 + 1),
        stages: u.stage.as_ref().map(|s| s.count as u64),
        current_rate: u.stage.as_ref().map(|s| s.current_rate),
        latency_p50_ms: u.window_p50_ms,
        latency_p95_ms: u.window_p95_ms,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub scenario: String,
    pub interrupted: bool,
    pub passed: bool,

    pub iterations_total: u64,
    pub dropped_iterations_total: u64,
    pub iterations_per_sec: f64,
    pub run_duration_secs: f64,

    pub status_2xx: u64,
    pub status_3xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
    pub transport_errors_total: u64,
    pub timeouts_total: u64,
    pub cancelled_total: u64,

    pub checks_total: u64,
    pub checks_failed: u64,
    pub checks_failed_by_name: BTreeMap<String, u64>,

    pub latency: Option<JsonLatencySummary>,
    pub gate_violations: Vec<JsonGateViolation>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub mean_ms: Option<f64>,
    pub max_ms: Option<u64>,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonGateViolation {
    pub gate: String,
    pub limit: f64,
    pub observed: Option<f64>,
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let s = &report.summary;

    let checks_failed_by_name = s
        .checks_by_name
        .iter()
        .filter(|c| c.failed > 0)
        .map(|c| (c.name.clone(), c.failed))
        .collect::<BTreeMap<_, _>>();

    let latency = (s.latency.count > 0).then(|| JsonLatencySummary {
        p50_ms: s.latency.p50_ms,
        p95_ms: s.latency.p95_ms,
        p99_ms: s.latency.p99_ms,
        mean_ms: s.latency.mean_ms,
        max_ms: s.latency.max_ms,
        count: s.latency.count,
    });

    JsonSummaryLine {
        kind: "summary",
        scenario: report.scenario.clone(),
        interrupted: report.interrupted,
        passed: report.passed(),
        iterations_total: s.iterations_total,
        dropped_iterations_total: s.dropped_iterations_total,
        iterations_per_sec: s.iterations_per_sec,
        run_duration_secs: s.run_duration.as_secs_f64(),
        status_2xx: s.status_2xx,
        status_3xx: s.status_3xx,
        status_4xx: s.status_4xx,
        status_5xx: s.status_5xx,
        transport_errors_total: s.transport_errors_total,
        timeouts_total: s.timeouts_total,
        cancelled_total: s.cancelled_total,
        checks_total: s.checks_total,
        checks_failed: s.checks_failed,
        checks_failed_by_name,
        latency,
        gate_violations: report
            .violations
            .iter()
            .map(|v| JsonGateViolation {
                gate: v.gate.clone(),
                limit: v.limit,
                observed: v.observed,
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
