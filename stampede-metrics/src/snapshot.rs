use std::collections::BTreeMap;

use hdrhistogram::Histogram;

use crate::aggregator::Totals;
use crate::histogram::{HistogramSummary, quantile_ms, summarize_histogram};

/// Shape of a built-in metric, which decides the aggregations it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes.saturating_add(self.fails)
    }
}

/// Point-in-time view of everything the [`crate::Aggregator`] has folded so far.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Iterations recorded.
    pub iterations: u64,
    /// Iterations with at least one failed check or a request error.
    pub failed_iterations: u64,
    /// Iterations that produced an HTTP response (any status).
    pub responses: u64,
    /// Iterations without a response or with a status outside 200..=399.
    pub http_failures: u64,
    pub bytes_received: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub checks: BTreeMap<String, CheckSummary>,
    /// Results offered after the aggregator was sealed; never folded into the other fields.
    pub late_results: u64,
    /// Request duration summary (milliseconds).
    pub duration: HistogramSummary,
    histogram: Histogram<u64>,
}

impl MetricsSnapshot {
    pub(crate) fn from_totals(totals: Totals, late_results: u64) -> Self {
        Self {
            iterations: totals.iterations,
            failed_iterations: totals.failed_iterations,
            responses: totals.responses,
            http_failures: totals.http_failures,
            bytes_received: totals.bytes_received,
            status_codes: totals.status_codes,
            checks: totals.checks,
            late_results,
            duration: summarize_histogram(&totals.histogram),
            histogram: totals.histogram,
        }
    }

    /// `failed_iterations / iterations`, `None` without samples.
    pub fn error_rate(&self) -> Option<f64> {
        ratio(self.failed_iterations, self.iterations)
    }

    /// `http_failures / iterations`, `None` without samples.
    pub fn http_failure_rate(&self) -> Option<f64> {
        ratio(self.http_failures, self.iterations)
    }

    /// Fraction of passing checks across every check name.
    pub fn checks_rate(&self) -> Option<f64> {
        let (passes, total) = self.checks.values().fold((0u64, 0u64), |(p, t), c| {
            (p.saturating_add(c.passes), t.saturating_add(c.total()))
        });
        ratio(passes, total)
    }

    pub fn checks_failed(&self) -> u64 {
        self.checks.values().map(|c| c.fails).sum()
    }

    /// Duration percentile in milliseconds, `percentile` in `(0, 100]`.
    pub fn duration_percentile(&self, percentile: f64) -> Option<f64> {
        quantile_ms(&self.histogram, (percentile / 100.0).clamp(0.0, 1.0))
    }
}

impl PartialEq for MetricsSnapshot {
    // The histogram is fully described by its summary for equality purposes.
    fn eq(&self, other: &Self) -> bool {
        self.iterations == other.iterations
            && self.failed_iterations == other.failed_iterations
            && self.responses == other.responses
            && self.http_failures == other.http_failures
            && self.bytes_received == other.bytes_received
            && self.status_codes == other.status_codes
            && self.checks == other.checks
            && self.late_results == other.late_results
            && self.duration == other.duration
    }
}

fn ratio(hits: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| hits as f64 / total as f64)
}
