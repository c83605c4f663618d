use std::sync::Arc;
use std::time::Duration;

use crate::checks::{Check, CheckSet};
use crate::error::{ConfigError, Result};
use crate::thresholds::{NoDataPolicy, ThresholdRule, ThresholdSet};

pub const DEFAULT_SLEEP: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_ABORT_EVAL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// The single request a virtual user issues per iteration, plus the checks applied to it.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: Arc<str>,
    pub timeout: Duration,
    pub checks: CheckSet,
}

/// Declarative run input, as produced by a config loader. Validated into a [`RunConfig`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub url: Option<String>,
    pub stages: Vec<Stage>,
    /// Target VUs before the first stage starts ramping.
    pub start_vus: u64,
    /// Pause between iterations of one VU.
    pub sleep: Duration,
    /// Per-request timeout; a timed out request is a failed iteration.
    pub timeout: Duration,
    /// `status == N` check. `None` disables it.
    pub expected_status: Option<u16>,
    /// `duration < D` check. `None` disables it.
    pub max_duration: Option<Duration>,
    pub thresholds: Vec<ThresholdSet>,
    pub no_data: NoDataPolicy,
    /// Bound on the final drain after the last stage.
    pub graceful_stop: Duration,
    /// Bound on how long a VU retired by a ramp-down may finish its iteration.
    pub graceful_ramp_down: Duration,
    pub tick_interval: Duration,
    pub abort_eval_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            url: None,
            stages: Vec::new(),
            start_vus: 0,
            sleep: DEFAULT_SLEEP,
            timeout: DEFAULT_TIMEOUT,
            expected_status: Some(200),
            max_duration: None,
            thresholds: Vec::new(),
            no_data: NoDataPolicy::default(),
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            graceful_ramp_down: DEFAULT_GRACEFUL_RAMP_DOWN,
            tick_interval: DEFAULT_TICK_INTERVAL,
            abort_eval_interval: DEFAULT_ABORT_EVAL_INTERVAL,
        }
    }
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    stages: Vec<Stage>,
    start_vus: u64,
    sleep: Duration,
    request: RequestSpec,
    thresholds: Vec<ThresholdRule>,
    no_data: NoDataPolicy,
    graceful_stop: Duration,
    graceful_ramp_down: Duration,
    tick_interval: Duration,
    abort_eval_interval: Duration,
}

impl RunConfig {
    pub fn from_options(opts: RunOptions) -> Result<Self> {
        if opts.stages.is_empty() {
            return Err(ConfigError::EmptyStages);
        }
        if let Some(index) = opts.stages.iter().position(|s| s.duration.is_zero()) {
            return Err(ConfigError::ZeroStageDuration { index });
        }

        let raw_url = opts.url.ok_or(ConfigError::MissingUrl)?;
        let url = validate_url(&raw_url)?;

        if opts.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if opts.tick_interval.is_zero() {
            return Err(ConfigError::InvalidTickInterval);
        }

        let mut thresholds = Vec::new();
        for set in &opts.thresholds {
            thresholds.extend(ThresholdRule::parse_set(set)?);
        }

        let mut checks = Vec::new();
        if let Some(status) = opts.expected_status {
            checks.push(Check::Status(status));
        }
        if let Some(max) = opts.max_duration {
            checks.push(Check::DurationBelow(max));
        }

        Ok(Self {
            stages: opts.stages,
            start_vus: opts.start_vus,
            sleep: opts.sleep,
            request: RequestSpec {
                url,
                timeout: opts.timeout,
                checks: CheckSet::new(checks),
            },
            thresholds,
            no_data: opts.no_data,
            graceful_stop: opts.graceful_stop,
            graceful_ramp_down: opts.graceful_ramp_down,
            tick_interval: opts.tick_interval,
            abort_eval_interval: opts.abort_eval_interval.max(opts.tick_interval),
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn start_vus(&self) -> u64 {
        self.start_vus
    }

    pub fn sleep(&self) -> Duration {
        self.sleep
    }

    pub fn request(&self) -> &RequestSpec {
        &self.request
    }

    pub fn thresholds(&self) -> &[ThresholdRule] {
        &self.thresholds
    }

    pub fn no_data(&self) -> NoDataPolicy {
        self.no_data
    }

    pub fn graceful_stop(&self) -> Duration {
        self.graceful_stop
    }

    pub fn graceful_ramp_down(&self) -> Duration {
        self.graceful_ramp_down
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn abort_eval_interval(&self) -> Duration {
        self.abort_eval_interval
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    pub fn max_vus(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start_vus)
    }
}

fn validate_url(raw: &str) -> Result<Arc<str>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingUrl);
    }

    let parsed = url::Url::parse(trimmed).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }

    Ok(Arc::from(trimmed))
}
