use std::time::Duration;

use hdrhistogram::Histogram;

const US_PER_MS: f64 = 1_000.0;

/// Latency summary. All values are milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSummary {
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

pub(crate) fn new_default_histogram() -> Histogram<u64> {
    // Samples are microseconds. Upper bound: 1 hour.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

pub(crate) fn record_duration(h: &mut Histogram<u64>, duration: Duration) {
    let us: u64 = duration.as_micros().try_into().unwrap_or(u64::MAX);
    h.saturating_record(us.max(1));
}

pub(crate) fn quantile_ms(h: &Histogram<u64>, quantile: f64) -> Option<f64> {
    if h.is_empty() {
        return None;
    }
    Some(h.value_at_quantile(quantile) as f64 / US_PER_MS)
}

pub(crate) fn summarize_histogram(h: &Histogram<u64>) -> HistogramSummary {
    let count = h.len();
    let non_empty = count > 0;
    let ms = |v: u64| v as f64 / US_PER_MS;

    HistogramSummary {
        p50: quantile_ms(h, 0.50),
        p75: quantile_ms(h, 0.75),
        p90: quantile_ms(h, 0.90),
        p95: quantile_ms(h, 0.95),
        p99: quantile_ms(h, 0.99),
        min: non_empty.then(|| ms(h.min())),
        max: non_empty.then(|| ms(h.max())),
        mean: non_empty.then(|| h.mean() / US_PER_MS),
        stdev: non_empty.then(|| h.stdev() / US_PER_MS),
        count,
    }
}
