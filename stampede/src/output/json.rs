use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use stampede_core::{AbortReason, RunConfig, RunVerdict, ViolationKind};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _scenario_path: &Path, _cfg: &RunConfig) {}

    fn progress(&self) -> Option<stampede_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, verdict: &RunVerdict) -> anyhow::Result<()> {
        let line = build_summary_line(verdict);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub phase: String,
    pub stage: Option<usize>,
    pub stages: Option<usize>,
    pub target_vus: u64,
    pub live_vus: u64,
    pub retiring_vus: u64,

    pub iterations_per_sec: f64,
    pub total_iterations: u64,
    pub failed_iterations: u64,
    pub total_responses: u64,
    pub total_bytes_received: u64,
    pub checks_failed_total: u64,
    pub error_rate: f64,

    pub latency_mean: Option<f64>,
    pub latency_p95: Option<f64>,
    pub latency_max: Option<f64>,
}

fn build_progress_line(u: &stampede_core::ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        phase: u.phase.to_string(),
        stage: u.stage.as_ref().map(|s| s.index + 1),
        stages: u.stage.as_ref().map(|s| s.count),
        target_vus: u.target_vus,
        live_vus: u.live_vus,
        retiring_vus: u.retiring_vus,

        iterations_per_sec: u.metrics.iterations_per_sec_now,
        total_iterations: u.metrics.iterations_total,
        failed_iterations: u.metrics.failed_iterations_total,
        total_responses: u.metrics.responses_total,
        total_bytes_received: u.metrics.bytes_received_total,
        checks_failed_total: u.metrics.checks_failed_total,
        error_rate: u.metrics.error_rate,

        latency_mean: u.metrics.latency_mean_ms,
        latency_p95: u.metrics.latency_p95_ms,
        latency_max: u.metrics.latency_max_ms,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub outcome: String,
    pub passed: bool,
    pub elapsed_secs: f64,
    pub aborted: Option<String>,
    pub forced_terminations: usize,

    pub iterations_total: u64,
    pub failed_iterations_total: u64,
    pub responses_total: u64,
    pub http_failures_total: u64,
    pub bytes_received_total: u64,
    pub late_results: u64,
    pub status_codes: BTreeMap<String, u64>,
    pub checks: BTreeMap<String, JsonCheckSummary>,

    pub latency: Option<JsonLatencySummary>,
    pub thresholds: Vec<JsonThreshold>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheckSummary {
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub passed: bool,
    pub observed: Option<f64>,
    pub no_data: bool,
}

fn build_summary_line(verdict: &RunVerdict) -> JsonSummaryLine {
    let snap = &verdict.snapshot;

    let latency = (snap.duration.count > 0).then(|| {
        let l = &snap.duration;
        JsonLatencySummary {
            p50: l.p50,
            p75: l.p75,
            p90: l.p90,
            p95: l.p95,
            p99: l.p99,
            min: l.min,
            max: l.max,
            mean: l.mean,
            stdev: l.stdev,
            count: l.count,
        }
    });

    let thresholds = verdict
        .rules
        .iter()
        .map(|r| JsonThreshold {
            metric: r.rule.metric.to_string(),
            expression: r.rule.expression.clone(),
            passed: r.passed,
            observed: r.observed,
            no_data: verdict
                .violations
                .iter()
                .any(|v| v.rule == r.rule && v.kind == ViolationKind::NoData),
        })
        .collect();

    let aborted = verdict.aborted.as_ref().map(|a| match a {
        AbortReason::Threshold(rule) => format!("threshold: {rule}"),
        AbortReason::Interrupted => "interrupted".to_string(),
    });

    JsonSummaryLine {
        kind: "summary",
        outcome: verdict.outcome.to_string(),
        passed: verdict.passed,
        elapsed_secs: verdict.elapsed.as_secs_f64(),
        aborted,
        forced_terminations: verdict.forced_terminations.len(),

        iterations_total: snap.iterations,
        failed_iterations_total: snap.failed_iterations,
        responses_total: snap.responses,
        http_failures_total: snap.http_failures,
        bytes_received_total: snap.bytes_received,
        late_results: snap.late_results,
        status_codes: snap
            .status_codes
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect(),
        checks: snap
            .checks
            .iter()
            .map(|(k, c)| {
                (
                    k.clone(),
                    JsonCheckSummary {
                        passes: c.passes,
                        fails: c.fails,
                    },
                )
            })
            .collect(),

        latency,
        thresholds,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
