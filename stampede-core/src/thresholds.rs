use std::fmt;
use std::time::Duration;

use stampede_metrics::MetricKind;

use crate::error::{ConfigError, Result};

/// Built-in metrics a threshold may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum MetricName {
    /// Request duration trend (milliseconds).
    #[strum(serialize = "http_req_duration")]
    HttpReqDuration,

    /// Failed iterations / iterations.
    #[strum(serialize = "errors")]
    Errors,

    /// Requests without a response or with a status outside 200..=399 / requests, like
    /// k6's default expected statuses.
    #[strum(serialize = "http_req_failed")]
    HttpReqFailed,

    /// Passing checks / checks.
    #[strum(serialize = "checks")]
    Checks,

    /// Completed iterations; `rate` is per second of run time.
    #[strum(serialize = "iterations")]
    Iterations,

    #[strum(serialize = "http_reqs")]
    HttpReqs,
}

impl MetricName {
    #[must_use]
    pub fn kind(self) -> MetricKind {
        match self {
            Self::HttpReqDuration => MetricKind::Trend,
            Self::Errors | Self::HttpReqFailed | Self::Checks => MetricKind::Rate,
            Self::Iterations | Self::HttpReqs => MetricKind::Counter,
        }
    }
}

/// What to do with a threshold whose metric has no samples.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::EnumString, strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum NoDataPolicy {
    /// Report a distinct "no data" violation.
    #[default]
    Fail,
    /// Treat the threshold as vacuously satisfied.
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    NotEq,
}

impl ThresholdOp {
    pub fn compare(self, observed: f64, bound: f64) -> bool {
        match self {
            Self::Lt => observed < bound,
            Self::Lte => observed <= bound,
            Self::Gt => observed > bound,
            Self::Gte => observed >= bound,
            Self::Eq => observed == bound,
            Self::NotEq => observed != bound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    P(f64),
}

impl ThresholdAgg {
    fn supported_by(self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => !matches!(self, Self::Rate),
            MetricKind::Rate => matches!(self, Self::Rate),
            MetricKind::Counter => matches!(self, Self::Count | Self::Rate),
        }
    }
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

/// One declared threshold expression, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdSpec {
    pub expression: String,
    /// Stop the run as soon as this threshold is crossed.
    pub abort_on_fail: bool,
    /// Do not evaluate `abort_on_fail` before this much run time has elapsed.
    pub delay_abort_eval: Option<Duration>,
    /// Overrides the run-wide [`NoDataPolicy`].
    pub no_data: Option<NoDataPolicy>,
}

impl From<&str> for ThresholdSpec {
    fn from(expression: &str) -> Self {
        Self {
            expression: expression.to_string(),
            ..Self::default()
        }
    }
}

/// Threshold expressions declared for a single metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub thresholds: Vec<ThresholdSpec>,
}

impl ThresholdSet {
    pub fn new<I, S>(metric: &str, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ThresholdSpec>,
    {
        Self {
            metric: metric.to_string(),
            thresholds: expressions.into_iter().map(Into::into).collect(),
        }
    }
}

/// A validated pass/fail rule: metric, aggregation, operator and bound.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric: MetricName,
    pub expression: String,
    pub expr: ThresholdExpr,
    pub no_data: Option<NoDataPolicy>,
    pub abort_on_fail: bool,
    pub delay_abort_eval: Duration,
}

impl ThresholdRule {
    pub fn parse(metric: &str, spec: &ThresholdSpec) -> Result<Self> {
        let name: MetricName = metric
            .parse()
            .map_err(|_| ConfigError::UnknownMetric(metric.to_string()))?;

        let expr = parse_threshold_expr(&spec.expression).map_err(|error| {
            ConfigError::InvalidThresholdExpr {
                metric: metric.to_string(),
                error,
            }
        })?;

        let kind = name.kind();
        if !expr.agg.supported_by(kind) {
            return Err(ConfigError::UnsupportedAggregation {
                metric: metric.to_string(),
                kind: kind.to_string(),
                agg: expr.agg.to_string(),
            });
        }

        Ok(Self {
            metric: name,
            expression: spec.expression.trim().to_string(),
            expr,
            no_data: spec.no_data,
            abort_on_fail: spec.abort_on_fail,
            delay_abort_eval: spec.delay_abort_eval.unwrap_or(Duration::ZERO),
        })
    }

    pub fn parse_set(set: &ThresholdSet) -> Result<Vec<Self>> {
        set.thresholds
            .iter()
            .map(|spec| Self::parse(&set.metric, spec))
            .collect()
    }
}

impl fmt::Display for ThresholdRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expression)
    }
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-char operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::NotEq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = if left.eq_ignore_ascii_case("avg") {
        ThresholdAgg::Avg
    } else if left.eq_ignore_ascii_case("min") {
        ThresholdAgg::Min
    } else if left.eq_ignore_ascii_case("max") {
        ThresholdAgg::Max
    } else if left.eq_ignore_ascii_case("med") {
        ThresholdAgg::Med
    } else if left.eq_ignore_ascii_case("count") {
        ThresholdAgg::Count
    } else if left.eq_ignore_ascii_case("rate") {
        ThresholdAgg::Rate
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: f64 = inner
            .parse()
            .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
        if !(p > 0.0 && p <= 100.0) {
            return Err(format!("percentile out of range in threshold: {raw}"));
        }
        ThresholdAgg::P(p)
    } else {
        return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;
    if !value.is_finite() {
        return Err(format!("threshold bound must be finite: {raw}"));
    }

    Ok(ThresholdExpr { agg, op, value })
}
