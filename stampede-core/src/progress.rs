use std::time::Duration;

use stampede_metrics::MetricsSnapshot;

use crate::schedule::StageSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EnginePhase {
    /// First stage, target moving.
    Ramping,
    /// Target constant.
    Steady,
    /// A later stage moving the target between levels.
    Transitioning,
    Draining,
    Completed,
}

impl EnginePhase {
    pub(crate) fn for_stage(stage: Option<&StageSnapshot>) -> Self {
        match stage {
            Some(s) if s.is_plateau() => Self::Steady,
            Some(s) if s.index == 0 => Self::Ramping,
            Some(_) => Self::Transitioning,
            None => Self::Draining,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiveMetrics {
    /// Iterations/sec observed during the last tick.
    pub iterations_per_sec_now: f64,
    pub iterations_total: u64,
    pub failed_iterations_total: u64,
    pub responses_total: u64,
    pub bytes_received_total: u64,
    pub checks_failed_total: u64,
    /// Failed iterations / total over the whole run so far (0..=1).
    pub error_rate: f64,
    pub latency_mean_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,
}

impl LiveMetrics {
    pub(crate) fn from_snapshot(snap: &MetricsSnapshot, prev_iterations: u64, dt: Duration) -> Self {
        let delta = snap.iterations.saturating_sub(prev_iterations);
        Self {
            iterations_per_sec_now: (delta as f64) / dt.as_secs_f64().max(1e-9),
            iterations_total: snap.iterations,
            failed_iterations_total: snap.failed_iterations,
            responses_total: snap.responses,
            bytes_received_total: snap.bytes_received,
            checks_failed_total: snap.checks_failed(),
            error_rate: snap.error_rate().unwrap_or(0.0),
            latency_mean_ms: snap.duration.mean,
            latency_p95_ms: snap.duration_percentile(95.0),
            latency_max_ms: snap.duration.max,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based).
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub phase: EnginePhase,
    pub stage: Option<StageSnapshot>,
    pub target_vus: u64,
    pub live_vus: u64,
    /// VUs told to stop by a ramp-down that are still finishing their iteration.
    pub retiring_vus: u64,
    pub metrics: LiveMetrics,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(index: usize, start: u64, end: u64) -> StageSnapshot {
        StageSnapshot {
            index,
            count: 3,
            stage_elapsed: Duration::ZERO,
            stage_remaining: Duration::from_secs(1),
            start_target: start,
            end_target: end,
            current_target: start,
        }
    }

    #[test]
    fn phase_follows_stage_shape() {
        assert_eq!(EnginePhase::for_stage(Some(&stage(0, 0, 50))), EnginePhase::Ramping);
        assert_eq!(EnginePhase::for_stage(Some(&stage(1, 50, 50))), EnginePhase::Steady);
        assert_eq!(EnginePhase::for_stage(Some(&stage(2, 50, 0))), EnginePhase::Transitioning);
        assert_eq!(EnginePhase::for_stage(None), EnginePhase::Draining);
        assert_eq!(EnginePhase::Transitioning.to_string(), "transitioning");
    }
}
