use std::time::Duration;

use stampede_metrics::MetricsSnapshot;

use crate::thresholds::{MetricName, NoDataPolicy, ThresholdAgg, ThresholdRule};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViolationKind {
    /// The observed value does not satisfy the rule.
    Exceeded { observed: f64 },
    /// The metric has no samples and the policy is [`NoDataPolicy::Fail`].
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdViolation {
    pub rule: ThresholdRule,
    pub kind: ViolationKind,
}

/// Per-rule evaluation result, kept for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleReport {
    pub rule: ThresholdRule,
    pub observed: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunOutcome {
    Passed,
    /// Requests reached the target but at least one threshold failed.
    ThresholdsFailed,
    /// Iterations ran but none of them got an HTTP response.
    TargetUnreachable,
    /// No iteration was recorded at all.
    NoData,
    /// The run was stopped early.
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// An `abort_on_fail` threshold was crossed mid-run.
    Threshold(ThresholdRule),
    /// The run's cancellation token was triggered from outside.
    Interrupted,
}

/// A VU that did not stop within its grace period and was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedTermination {
    pub vu_id: u64,
    pub grace: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunVerdict {
    /// True iff the outcome is [`RunOutcome::Passed`].
    pub passed: bool,
    pub outcome: RunOutcome,
    pub violations: Vec<ThresholdViolation>,
    pub rules: Vec<RuleReport>,
    pub snapshot: MetricsSnapshot,
    pub elapsed: Duration,
    pub aborted: Option<AbortReason>,
    pub forced_terminations: Vec<ForcedTermination>,
}

impl RunVerdict {
    /// Attaches engine-side facts and re-derives the outcome.
    #[must_use]
    pub fn with_run_info(
        mut self,
        aborted: Option<AbortReason>,
        forced_terminations: Vec<ForcedTermination>,
    ) -> Self {
        self.aborted = aborted;
        self.forced_terminations = forced_terminations;
        self.classify();
        self
    }

    pub fn has_no_data_violation(&self) -> bool {
        self.violations
            .iter()
            .any(|v| matches!(v.kind, ViolationKind::NoData))
    }

    /// A run that recorded nothing, or never got a response, is not a pass even when every
    /// declared threshold is satisfied.
    fn classify(&mut self) {
        self.outcome = if self.aborted.is_some() {
            RunOutcome::Aborted
        } else if self.snapshot.iterations == 0 {
            RunOutcome::NoData
        } else if self.snapshot.responses == 0 {
            RunOutcome::TargetUnreachable
        } else if self.violations.is_empty() {
            RunOutcome::Passed
        } else {
            RunOutcome::ThresholdsFailed
        };
        self.passed = self.outcome == RunOutcome::Passed;
    }
}

/// Value of `agg` over `metric`, `None` when the metric has no samples.
///
/// Counter rates are per second of `elapsed`; a zero window has no rate.
pub fn observed_value(
    snapshot: &MetricsSnapshot,
    metric: MetricName,
    agg: ThresholdAgg,
    elapsed: Duration,
) -> Option<f64> {
    match metric {
        MetricName::HttpReqDuration => {
            let d = &snapshot.duration;
            match agg {
                ThresholdAgg::Avg => d.mean,
                ThresholdAgg::Min => d.min,
                ThresholdAgg::Max => d.max,
                ThresholdAgg::Med => snapshot.duration_percentile(50.0),
                ThresholdAgg::P(p) => snapshot.duration_percentile(p),
                ThresholdAgg::Count => (d.count > 0).then_some(d.count as f64),
                ThresholdAgg::Rate => None,
            }
        }
        MetricName::Errors => snapshot.error_rate(),
        MetricName::HttpReqFailed => snapshot.http_failure_rate(),
        MetricName::Checks => snapshot.checks_rate(),
        MetricName::Iterations | MetricName::HttpReqs => {
            let count = snapshot.iterations as f64;
            match agg {
                ThresholdAgg::Rate => {
                    let secs = elapsed.as_secs_f64();
                    (secs > 0.0).then(|| count / secs)
                }
                _ => Some(count),
            }
        }
    }
}

/// Evaluates one rule over a snapshot covering `elapsed` of run time. `Err` carries the
/// violation.
pub fn evaluate_rule(
    snapshot: &MetricsSnapshot,
    rule: &ThresholdRule,
    default_policy: NoDataPolicy,
    elapsed: Duration,
) -> Result<Option<f64>, ViolationKind> {
    match observed_value(snapshot, rule.metric, rule.expr.agg, elapsed) {
        Some(observed) if rule.expr.op.compare(observed, rule.expr.value) => Ok(Some(observed)),
        Some(observed) => Err(ViolationKind::Exceeded { observed }),
        None => match rule.no_data.unwrap_or(default_policy) {
            NoDataPolicy::Pass => Ok(None),
            NoDataPolicy::Fail => Err(ViolationKind::NoData),
        },
    }
}

/// Evaluates every rule against `snapshot`. Deterministic: same inputs, same verdict.
pub fn evaluate(
    snapshot: &MetricsSnapshot,
    rules: &[ThresholdRule],
    policy: NoDataPolicy,
    elapsed: Duration,
) -> RunVerdict {
    let mut violations = Vec::new();
    let mut reports = Vec::with_capacity(rules.len());

    for rule in rules {
        match evaluate_rule(snapshot, rule, policy, elapsed) {
            Ok(observed) => reports.push(RuleReport {
                rule: rule.clone(),
                observed,
                passed: true,
            }),
            Err(kind) => {
                let observed = match kind {
                    ViolationKind::Exceeded { observed } => Some(observed),
                    ViolationKind::NoData => None,
                };
                reports.push(RuleReport {
                    rule: rule.clone(),
                    observed,
                    passed: false,
                });
                violations.push(ThresholdViolation {
                    rule: rule.clone(),
                    kind,
                });
            }
        }
    }

    let mut verdict = RunVerdict {
        passed: false,
        outcome: RunOutcome::Passed,
        violations,
        rules: reports,
        snapshot: snapshot.clone(),
        elapsed,
        aborted: None,
        forced_terminations: Vec::new(),
    };
    verdict.classify();
    verdict
}
