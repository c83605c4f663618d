use std::time::Duration;

use tokio::time::Instant;

use crate::config::Stage;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

impl StageSnapshot {
    pub fn is_plateau(&self) -> bool {
        self.start_target == self.end_target
    }
}

/// Converts ordered `(duration, target)` stages into a target concurrency curve.
///
/// Within a stage the target is linearly interpolated from the previous stage's target
/// (or `start` for the first stage) to the stage's own target. Stage boundaries are
/// precomputed so each lookup is a binary search.
#[derive(Debug, Clone)]
pub struct StageScheduler {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl StageScheduler {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Target VUs at `elapsed` since run start. Past the last stage the target is 0.
    pub fn target_concurrency_at(&self, elapsed: Duration) -> u64 {
        let total = self.total_duration();
        if self.stages.is_empty() || elapsed > total {
            return 0;
        }
        if elapsed.is_zero() {
            return self.start;
        }

        let idx = self.stage_index(elapsed);
        let (stage_start, stage_end) = self.bounds(idx);
        let (start_target, end_target) = self.targets(idx);

        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);
        interpolate(start_target, end_target, stage_elapsed, stage_duration)
    }

    /// Same as [`Self::target_concurrency_at`], measured between two instants.
    /// `now` before `started` is invalid input.
    pub fn target_concurrency_between(&self, started: Instant, now: Instant) -> Result<u64> {
        match now.checked_duration_since(started) {
            Some(elapsed) => Ok(self.target_concurrency_at(elapsed)),
            None => Err(ConfigError::NegativeElapsed(started - now)),
        }
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let clamped = elapsed.min(self.total_duration());
        let idx = self.stage_index(clamped);
        let (stage_start, stage_end) = self.bounds(idx);
        let (start_target, end_target) = self.targets(idx);

        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target,
            end_target,
            current_target: self.target_concurrency_at(clamped),
        })
    }

    // Index of the stage containing `elapsed`; a boundary belongs to the stage it ends.
    fn stage_index(&self, elapsed: Duration) -> usize {
        let idx = match self.cumulative_ends.binary_search(&elapsed) {
            Ok(i) | Err(i) => i,
        };
        idx.min(self.stages.len().saturating_sub(1))
    }

    fn bounds(&self, idx: usize) -> (Duration, Duration) {
        let end = self.cumulative_ends[idx];
        let start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        (start, end)
    }

    fn targets(&self, idx: usize) -> (u64, u64) {
        let start = if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target
        };
        (start, self.stages[idx].target)
    }
}

fn interpolate(start: u64, end: u64, elapsed: Duration, duration: Duration) -> u64 {
    if duration.is_zero() || elapsed >= duration {
        return end;
    }

    let start_i = start as i128;
    let delta = end as i128 - start_i;
    let num = elapsed.as_nanos() as i128;
    let den = (duration.as_nanos() as i128).max(1);

    let cur = start_i + delta.saturating_mul(num) / den;
    cur.clamp(0, u64::MAX as i128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn load_profile() -> StageScheduler {
        // 1m -> 50, hold 3m, 1m -> 100, hold 3m, 1m -> 0
        StageScheduler::new(
            0,
            vec![
                Stage::new(secs(60), 50),
                Stage::new(secs(180), 50),
                Stage::new(secs(60), 100),
                Stage::new(secs(180), 100),
                Stage::new(secs(60), 0),
            ],
        )
    }

    #[test]
    fn ramp_interpolates_linearly() {
        let s = StageScheduler::new(0, vec![Stage::new(secs(10), 10)]);
        assert_eq!(s.target_concurrency_at(Duration::ZERO), 0);
        assert_eq!(s.target_concurrency_at(secs(1)), 1);
        assert_eq!(s.target_concurrency_at(secs(5)), 5);
        assert_eq!(s.target_concurrency_at(Duration::from_millis(9_999)), 9);
        assert_eq!(s.target_concurrency_at(secs(10)), 10);
    }

    #[test]
    fn past_the_last_stage_the_target_is_zero() {
        let s = StageScheduler::new(0, vec![Stage::new(secs(60), 100)]);
        assert_eq!(s.target_concurrency_at(secs(60)), 100);
        assert_eq!(s.target_concurrency_at(secs(60) + Duration::from_nanos(1)), 0);
        assert!(s.is_done(secs(60)));
    }

    #[test]
    fn boundaries_hit_stage_targets_exactly() {
        let s = load_profile();
        let mut edge = Duration::ZERO;
        assert_eq!(s.target_concurrency_at(edge), 0);
        for stage in s.stages().to_vec() {
            edge += stage.duration;
            assert_eq!(s.target_concurrency_at(edge), stage.target, "edge={edge:?}");
        }
    }

    #[test]
    fn targets_are_monotonic_within_each_stage() {
        let s = load_profile();
        let mut stage_start = Duration::ZERO;
        let mut start_target = 0u64;

        for stage in s.stages().to_vec() {
            let lo = start_target.min(stage.target);
            let hi = start_target.max(stage.target);
            let rising = stage.target >= start_target;

            let mut prev = start_target;
            let step = Duration::from_millis(250);
            let mut t = stage_start;
            while t <= stage_start + stage.duration {
                let cur = s.target_concurrency_at(t);
                assert!((lo..=hi).contains(&cur), "t={t:?} cur={cur}");
                if rising {
                    assert!(cur >= prev, "t={t:?} {cur} < {prev}");
                } else {
                    assert!(cur <= prev, "t={t:?} {cur} > {prev}");
                }
                prev = cur;
                t += step;
            }

            stage_start += stage.duration;
            start_target = stage.target;
        }
    }

    #[test]
    fn same_elapsed_always_yields_same_target() {
        let s = load_profile();
        let t = Duration::from_millis(270_123);
        let first = s.target_concurrency_at(t);
        for _ in 0..10 {
            assert_eq!(s.target_concurrency_at(t), first);
        }
    }

    #[test]
    fn non_zero_start_ramps_from_start() {
        let s = StageScheduler::new(
            10,
            vec![Stage::new(secs(10), 0), Stage::new(secs(10), 20)],
        );
        assert_eq!(s.target_concurrency_at(Duration::ZERO), 10);
        assert_eq!(s.target_concurrency_at(secs(5)), 5);
        assert_eq!(s.target_concurrency_at(secs(10)), 0);
        assert_eq!(s.target_concurrency_at(secs(15)), 10);
        assert_eq!(s.target_concurrency_at(secs(20)), 20);
    }

    #[test]
    fn negative_elapsed_is_rejected() {
        let s = load_profile();
        let started = Instant::now();
        let before = started
            .checked_sub(secs(1))
            .unwrap_or_else(|| panic!("clock too close to epoch"));

        assert_eq!(
            s.target_concurrency_between(started, before),
            Err(ConfigError::NegativeElapsed(secs(1)))
        );
        assert_eq!(
            s.target_concurrency_between(started, started + secs(30)),
            Ok(25)
        );
    }

    #[test]
    fn stage_snapshot_reports_position() {
        let s = load_profile();
        let snap = s
            .stage_snapshot_at(secs(90))
            .unwrap_or_else(|| panic!("expected a stage"));
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 5);
        assert_eq!(snap.stage_elapsed, secs(30));
        assert_eq!(snap.stage_remaining, secs(150));
        assert!(snap.is_plateau());
        assert_eq!(snap.current_target, 50);

        let end = s
            .stage_snapshot_at(secs(10_000))
            .unwrap_or_else(|| panic!("expected a stage"));
        assert_eq!(end.index, 4);
        assert_eq!(end.stage_remaining, Duration::ZERO);
    }

    #[test]
    fn empty_schedule_targets_zero() {
        let s = StageScheduler::new(3, Vec::new());
        assert_eq!(s.target_concurrency_at(Duration::ZERO), 0);
        assert!(s.stage_snapshot_at(secs(1)).is_none());
        assert!(s.is_done(Duration::ZERO));
    }
}
