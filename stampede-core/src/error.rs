use std::time::Duration;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Invalid stage, threshold or request declarations. Always fatal, raised before a run starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    EmptyStages,

    #[error("stage #{index} must have a positive `duration`")]
    ZeroStageDuration { index: usize },

    #[error("`url` is required")]
    MissingUrl,

    #[error("invalid `url` (expected an absolute http:// or https:// URL): {0}")]
    InvalidUrl(String),

    #[error("`timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("`tickInterval` must be a positive duration")]
    InvalidTickInterval,

    #[error("unknown threshold metric `{0}`")]
    UnknownMetric(String),

    #[error("invalid threshold expression for metric `{metric}`: {error}")]
    InvalidThresholdExpr { metric: String, error: String },

    #[error("aggregation `{agg}` is not supported by {kind} metric `{metric}`")]
    UnsupportedAggregation {
        metric: String,
        kind: String,
        agg: String,
    },

    #[error("elapsed time is negative: {0:?} before run start")]
    NegativeElapsed(Duration),
}

/// Per-iteration request failure. Recorded as a failed iteration, never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}
