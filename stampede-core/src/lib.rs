mod checks;
mod config;
mod engine;
mod error;
mod progress;
mod request;
mod schedule;
mod thresholds;
mod thresholds_eval;
mod vu;

pub use checks::{Check, CheckSet, NamedCheck};
pub use config::{
    DEFAULT_ABORT_EVAL_INTERVAL, DEFAULT_GRACEFUL_RAMP_DOWN, DEFAULT_GRACEFUL_STOP, DEFAULT_SLEEP,
    DEFAULT_TICK_INTERVAL, DEFAULT_TIMEOUT, RequestSpec, RunConfig, RunOptions, Stage,
};
pub use engine::LoadTestEngine;
pub use error::{ConfigError, RequestError, Result};
pub use progress::{EnginePhase, LiveMetrics, ProgressFn, ProgressUpdate};
pub use request::{RequestTarget, Response};
pub use schedule::{StageScheduler, StageSnapshot};
pub use thresholds::{
    MetricName, NoDataPolicy, ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdRule,
    ThresholdSet, ThresholdSpec, parse_threshold_expr,
};
pub use thresholds_eval::{
    AbortReason, ForcedTermination, RuleReport, RunOutcome, RunVerdict, ThresholdViolation,
    ViolationKind, evaluate, evaluate_rule, observed_value,
};
pub use vu::{ResultSink, VirtualUser, VuHandle, VuState};

pub use stampede_metrics::{
    Aggregator, CheckOutcome, CheckSummary, HistogramSummary, IterationResult, MetricKind,
    MetricsSnapshot,
};
