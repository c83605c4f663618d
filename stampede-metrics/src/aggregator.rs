use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use hdrhistogram::Histogram;
use parking_lot::{Mutex, MutexGuard};

use crate::histogram::{new_default_histogram, record_duration};
use crate::sample::IterationResult;
use crate::snapshot::{CheckSummary, MetricsSnapshot};

const DEFAULT_SHARDS: usize = 16;

/// Running totals for one shard (and, merged, for the whole run).
#[derive(Debug)]
pub(crate) struct Totals {
    pub(crate) iterations: u64,
    pub(crate) failed_iterations: u64,
    pub(crate) responses: u64,
    pub(crate) http_failures: u64,
    pub(crate) bytes_received: u64,
    pub(crate) status_codes: BTreeMap<u16, u64>,
    pub(crate) checks: BTreeMap<String, CheckSummary>,
    pub(crate) histogram: Histogram<u64>,
}

impl Default for Totals {
    fn default() -> Self {
        Self {
            iterations: 0,
            failed_iterations: 0,
            responses: 0,
            http_failures: 0,
            bytes_received: 0,
            status_codes: BTreeMap::new(),
            checks: BTreeMap::new(),
            histogram: new_default_histogram(),
        }
    }
}

impl Totals {
    fn fold(&mut self, r: &IterationResult) {
        self.iterations = self.iterations.saturating_add(1);
        if !r.success {
            self.failed_iterations = self.failed_iterations.saturating_add(1);
        }
        if r.is_http_failure() {
            self.http_failures = self.http_failures.saturating_add(1);
        }
        if let Some(status) = r.status {
            self.responses = self.responses.saturating_add(1);
            *self.status_codes.entry(status).or_insert(0) += 1;
        }
        self.bytes_received = self.bytes_received.saturating_add(r.body_len);

        for check in &r.checks {
            if !self.checks.contains_key(&*check.name) {
                self.checks
                    .insert(check.name.to_string(), CheckSummary::default());
            }
            let Some(summary) = self.checks.get_mut(&*check.name) else {
                continue;
            };
            if check.passed {
                summary.passes = summary.passes.saturating_add(1);
            } else {
                summary.fails = summary.fails.saturating_add(1);
            }
        }

        record_duration(&mut self.histogram, r.duration);
    }

    fn merge(&mut self, other: &Totals) {
        self.iterations = self.iterations.saturating_add(other.iterations);
        self.failed_iterations = self
            .failed_iterations
            .saturating_add(other.failed_iterations);
        self.responses = self.responses.saturating_add(other.responses);
        self.http_failures = self.http_failures.saturating_add(other.http_failures);
        self.bytes_received = self.bytes_received.saturating_add(other.bytes_received);

        for (status, n) in &other.status_codes {
            *self.status_codes.entry(*status).or_insert(0) += n;
        }
        for (name, c) in &other.checks {
            let summary = self.checks.entry(name.clone()).or_default();
            summary.passes = summary.passes.saturating_add(c.passes);
            summary.fails = summary.fails.saturating_add(c.fails);
        }

        // Both histograms share the same bounds, so `add` cannot fail.
        let _ = self.histogram.add(&other.histogram);
    }
}

/// Thread-safe accumulator for [`IterationResult`]s.
///
/// Writes are spread across independently locked shards; a single `record` touches exactly
/// one shard, so every result is folded as a unit. Merging is commutative, which makes the
/// final snapshot independent of arrival order.
#[derive(Debug)]
pub struct Aggregator {
    shards: Box<[Mutex<Totals>]>,
    next_shard: AtomicUsize,
    sealed: AtomicBool,
    late_results: AtomicU64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl Aggregator {
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(Totals::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            next_shard: AtomicUsize::new(0),
            sealed: AtomicBool::new(false),
            late_results: AtomicU64::new(0),
        }
    }

    /// Folds one result. Returns `false` if the aggregator is sealed and the result was dropped.
    pub fn record(&self, result: IterationResult) -> bool {
        let idx = self.next_shard.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        let mut shard = self.shards[idx].lock();

        // Checked under the shard lock: `seal` raises the flag before taking any shard lock,
        // so a record either lands before the final merge or is rejected.
        if self.sealed.load(Ordering::SeqCst) {
            drop(shard);
            self.late_results.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        shard.fold(&result);
        true
    }

    /// Consistent point-in-time view across all shards.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let guards: Vec<MutexGuard<'_, Totals>> = self.shards.iter().map(|s| s.lock()).collect();

        let mut merged = Totals::default();
        for g in &guards {
            merged.merge(g);
        }
        drop(guards);

        MetricsSnapshot::from_totals(merged, self.late_results.load(Ordering::Relaxed))
    }

    /// Freezes the aggregator and returns the final snapshot. Later `record` calls are rejected.
    pub fn seal(&self) -> MetricsSnapshot {
        self.sealed.store(true, Ordering::SeqCst);
        self.snapshot()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Results rejected because they arrived after [`Aggregator::seal`].
    pub fn late_results(&self) -> u64 {
        self.late_results.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn ok(ms: u64) -> IterationResult {
        IterationResult::new(Duration::from_millis(ms), true, Some(200))
            .with_check("is status 200", true)
            .with_body_len(12)
    }

    fn failed(ms: u64, status: Option<u16>) -> IterationResult {
        IterationResult::new(Duration::from_millis(ms), false, status)
            .with_check("is status 200", status == Some(200))
    }

    #[test]
    fn record_folds_counts_checks_and_statuses() {
        let agg = Aggregator::default();
        assert!(agg.record(ok(100)));
        assert!(agg.record(ok(120)));
        assert!(agg.record(failed(5, None)));
        assert!(agg.record(failed(40, Some(503))));

        let s = agg.snapshot();
        assert_eq!(s.iterations, 4);
        assert_eq!(s.failed_iterations, 2);
        assert_eq!(s.responses, 3);
        assert_eq!(s.http_failures, 2);
        assert_eq!(s.bytes_received, 24);
        assert_eq!(s.status_codes.get(&200), Some(&2));
        assert_eq!(s.status_codes.get(&503), Some(&1));
        assert_eq!(
            s.checks.get("is status 200"),
            Some(&CheckSummary {
                passes: 2,
                fails: 2
            })
        );
        assert_eq!(s.duration.count, 4);
        assert_eq!(s.error_rate(), Some(0.5));
        assert_eq!(s.checks_rate(), Some(0.5));
    }

    #[test]
    fn empty_snapshot_has_no_rates() {
        let s = Aggregator::default().snapshot();
        assert_eq!(s.iterations, 0);
        assert!(s.error_rate().is_none());
        assert!(s.checks_rate().is_none());
        assert!(s.duration_percentile(95.0).is_none());
    }

    #[test]
    fn snapshot_is_independent_of_record_order() {
        let mut inputs: Vec<IterationResult> = (0..200)
            .map(|i| {
                if i % 7 == 0 {
                    failed(i, Some(500))
                } else {
                    ok(i)
                }
            })
            .collect();

        let forward = Aggregator::with_shards(3);
        for r in inputs.iter().cloned() {
            forward.record(r);
        }

        inputs.reverse();
        let reversed = Aggregator::with_shards(5);
        for r in inputs.iter().cloned() {
            reversed.record(r);
        }

        // Interleave odd/even positions for a third permutation.
        let (even, odd): (Vec<_>, Vec<_>) = inputs
            .into_iter()
            .enumerate()
            .partition(|(idx, _)| idx % 2 == 0);
        let interleaved = Aggregator::with_shards(1);
        for (_, r) in odd.into_iter().chain(even) {
            interleaved.record(r);
        }

        assert_eq!(forward.snapshot(), reversed.snapshot());
        assert_eq!(forward.snapshot(), interleaved.snapshot());
    }

    #[test]
    fn sealed_aggregator_rejects_late_results() {
        let agg = Aggregator::default();
        agg.record(ok(10));

        let frozen = agg.seal();
        assert!(agg.is_sealed());
        assert!(!agg.record(ok(10)));
        assert!(!agg.record(failed(10, None)));

        assert_eq!(frozen.iterations, 1);
        assert_eq!(agg.late_results(), 2);

        let after = agg.snapshot();
        assert_eq!(after.iterations, 1);
        assert_eq!(after.late_results, 2);
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let agg = Arc::new(Aggregator::default());

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let agg = agg.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        if (t + i) % 10 == 0 {
                            agg.record(failed(3, Some(500)));
                        } else {
                            agg.record(ok(3));
                        }
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap_or_else(|_| panic!("recorder thread panicked"));
        }

        let s = agg.snapshot();
        assert_eq!(s.iterations, 4000);
        assert_eq!(s.failed_iterations, 400);
        assert_eq!(s.duration.count, 4000);
    }

    #[test]
    fn snapshots_taken_mid_run_never_split_a_record() {
        let agg = Arc::new(Aggregator::default());
        let writing = Arc::new(AtomicBool::new(true));

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let agg = agg.clone();
                std::thread::spawn(move || {
                    for i in 0..2_000u64 {
                        if (t + i) % 7 == 0 {
                            agg.record(failed(1 + i % 50, Some(500)));
                        } else {
                            agg.record(ok(1 + i % 50));
                        }
                    }
                })
            })
            .collect();

        let reader = {
            let agg = agg.clone();
            let writing = writing.clone();
            std::thread::spawn(move || {
                let mut seen = 0u64;
                while writing.load(Ordering::SeqCst) || seen == 0 {
                    let s = agg.snapshot();
                    assert_eq!(s.iterations, s.duration.count);
                    assert_eq!(s.iterations, s.responses);
                    assert_eq!(s.iterations, s.status_codes.values().sum::<u64>());
                    assert_eq!(
                        s.iterations,
                        s.checks.values().map(CheckSummary::total).sum::<u64>()
                    );
                    assert_eq!(s.failed_iterations, s.http_failures);
                    assert_eq!(s.bytes_received, 12 * (s.iterations - s.failed_iterations));
                    seen += 1;
                }
                seen
            })
        };

        for w in writers {
            w.join().unwrap_or_else(|_| panic!("recorder thread panicked"));
        }
        writing.store(false, Ordering::SeqCst);
        let snapshots = reader
            .join()
            .unwrap_or_else(|_| panic!("snapshot thread panicked"));

        assert!(snapshots > 0);
        assert_eq!(agg.snapshot().iterations, 8_000);
    }

    #[test]
    fn duration_percentile_matches_recorded_distribution() {
        let agg = Aggregator::default();
        for ms in 1..=100 {
            agg.record(ok(ms));
        }

        let s = agg.snapshot();
        let p95 = s
            .duration_percentile(95.0)
            .unwrap_or_else(|| panic!("expected p95"));
        assert!((94.0..=96.0).contains(&p95), "p95={p95}");
        assert_eq!(s.duration.p95, Some(p95));
    }
}
