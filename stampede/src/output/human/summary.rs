use std::fmt::Write as _;

use stampede_core::{AbortReason, RunVerdict, ViolationKind};

use super::format::{format_bytes, format_ms_opt, format_pct, format_rate};
use crate::output::format_duration;

pub(crate) fn render(verdict: &RunVerdict) -> String {
    let mut out = String::new();
    let snap = &verdict.snapshot;

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  outcome: {} (elapsed {})",
        verdict.outcome,
        format_duration(verdict.elapsed)
    )
    .ok();
    writeln!(
        &mut out,
        "  iterations: {} (failed {})",
        snap.iterations, snap.failed_iterations
    )
    .ok();
    writeln!(
        &mut out,
        "  responses: {} (http failures {}, transport failures {})",
        snap.responses,
        snap.http_failures,
        snap.iterations.saturating_sub(snap.responses)
    )
    .ok();

    if !snap.status_codes.is_empty() {
        let codes = snap
            .status_codes
            .iter()
            .map(|(code, n)| format!("{code}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(&mut out, "  status: {codes}").ok();
    }

    writeln!(&mut out, "  bytes: recv {}", format_bytes(snap.bytes_received)).ok();

    let secs = verdict.elapsed.as_secs_f64();
    if secs > 0.0 {
        writeln!(
            &mut out,
            "  rates: iters/s={}",
            format_rate((snap.iterations as f64) / secs)
        )
        .ok();
    }

    let d = &snap.duration;
    if d.count > 0 {
        writeln!(
            &mut out,
            "  http_req_duration: avg={} min={} med={} p90={} p95={} p99={} max={} (n={})",
            format_ms_opt(d.mean),
            format_ms_opt(d.min),
            format_ms_opt(d.p50),
            format_ms_opt(d.p90),
            format_ms_opt(d.p95),
            format_ms_opt(d.p99),
            format_ms_opt(d.max),
            d.count
        )
        .ok();
    } else {
        out.push_str("  http_req_duration: n/a\n");
    }

    if !snap.checks.is_empty() {
        out.push_str("checks\n");
        for (name, c) in &snap.checks {
            let mark = if c.fails == 0 { '✓' } else { '✗' };
            let ratio = if c.total() == 0 {
                0.0
            } else {
                (c.passes as f64) / (c.total() as f64)
            };
            writeln!(
                &mut out,
                "  {mark} {name}: {} ({}/{})",
                format_pct(ratio),
                c.passes,
                c.total()
            )
            .ok();
        }
    }

    if !verdict.rules.is_empty() {
        out.push_str("thresholds\n");
        for r in &verdict.rules {
            let mark = if r.passed { '✓' } else { '✗' };
            let observed = match r.observed {
                Some(v) => format!("observed {}", format_observed(v)),
                None => "no data".to_string(),
            };
            writeln!(&mut out, "  {mark} {} ({observed})", r.rule).ok();
        }
    }

    match &verdict.aborted {
        Some(AbortReason::Threshold(rule)) => {
            writeln!(&mut out, "aborted: threshold crossed: {rule}").ok();
        }
        Some(AbortReason::Interrupted) => {
            out.push_str("aborted: interrupted\n");
        }
        None => {}
    }

    if !verdict.forced_terminations.is_empty() {
        writeln!(
            &mut out,
            "forced terminations: {} (VUs still busy after their grace period)",
            verdict.forced_terminations.len()
        )
        .ok();
    }
    if snap.late_results > 0 {
        writeln!(&mut out, "late results dropped: {}", snap.late_results).ok();
    }

    let no_data = verdict
        .violations
        .iter()
        .filter(|v| v.kind == ViolationKind::NoData)
        .count();
    if no_data > 0 {
        writeln!(
            &mut out,
            "note: {no_data} threshold(s) failed for lack of samples (see --no-data)"
        )
        .ok();
    }

    out
}

fn format_observed(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.4}")
    }
}
