use std::sync::Arc;
use std::time::Duration;

use stampede_metrics::{Aggregator, MetricsSnapshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{RequestSpec, RunConfig};
use crate::progress::{EnginePhase, LiveMetrics, ProgressFn, ProgressUpdate};
use crate::request::RequestTarget;
use crate::schedule::StageScheduler;
use crate::thresholds::ThresholdRule;
use crate::thresholds_eval::{
    self, AbortReason, ForcedTermination, RunVerdict, ViolationKind,
};
use crate::vu::{VirtualUser, VuHandle};

/// Drives one load test: reconciles live VUs against the stage schedule every tick, then
/// drains, seals the aggregator and evaluates thresholds.
pub struct LoadTestEngine<T> {
    config: RunConfig,
    target: Arc<T>,
    aggregator: Arc<Aggregator>,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl<T: RequestTarget> LoadTestEngine<T> {
    pub fn new(config: RunConfig, target: T) -> Self {
        Self {
            config,
            target: Arc::new(target),
            aggregator: Arc::new(Aggregator::default()),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Cancelling this token ends the schedule early; the run still drains and reports.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn aggregator(&self) -> Arc<Aggregator> {
        self.aggregator.clone()
    }

    pub async fn run(self) -> RunVerdict {
        let cfg = &self.config;
        let scheduler = StageScheduler::new(cfg.start_vus(), cfg.stages().to_vec());
        let total = scheduler.total_duration();

        // Parent of every VU stop token, so a run-wide cancel reaches VUs even mid-reconcile.
        let vu_root = CancellationToken::new();
        let factory = VuFactory {
            target: self.target.clone(),
            request: cfg.request().clone(),
            sleep: cfg.sleep(),
            sink: self.aggregator.clone(),
            root: vu_root.clone(),
        };
        let mut pool = VuPool::new(cfg.graceful_ramp_down());

        let abort_rules: Vec<&ThresholdRule> =
            cfg.thresholds().iter().filter(|r| r.abort_on_fail).collect();

        tracing::info!(
            url = %cfg.request().url,
            stages = cfg.stages().len(),
            total = ?total,
            max_vus = cfg.max_vus(),
            thresholds = cfg.thresholds().len(),
            "run started"
        );

        let started = Instant::now();
        let end = tokio::time::sleep_until(started + total);
        tokio::pin!(end);

        let mut interval = tokio::time::interval(cfg.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut phase: Option<EnginePhase> = None;
        let mut tick: u64 = 0;
        let mut last_tick_at = started;
        let mut last_iterations: u64 = 0;
        let mut last_abort_eval = started;
        let mut aborted: Option<AbortReason> = None;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::warn!(elapsed = ?started.elapsed(), "run interrupted");
                    aborted = Some(AbortReason::Interrupted);
                    break;
                }
                () = &mut end => break,
                _ = interval.tick() => {}
            }

            let now = Instant::now();
            let elapsed = now.duration_since(started);
            if scheduler.is_done(elapsed) {
                break;
            }

            let stage = scheduler.stage_snapshot_at(elapsed);
            let next_phase = EnginePhase::for_stage(stage.as_ref());
            if phase != Some(next_phase) {
                tracing::info!(
                    phase = %next_phase,
                    stage = stage.as_ref().map(|s| s.index + 1),
                    elapsed = ?elapsed,
                    "phase changed"
                );
                phase = Some(next_phase);
            }

            let target_vus = scheduler.target_concurrency_at(elapsed);
            pool.reap(now);
            pool.scale_to(target_vus, now, &factory);

            let needs_abort_eval = !abort_rules.is_empty()
                && now.duration_since(last_abort_eval) >= cfg.abort_eval_interval();
            if self.progress.is_none() && !needs_abort_eval {
                continue;
            }

            let snapshot = self.aggregator.snapshot();
            tick = tick.saturating_add(1);

            if let Some(progress) = &self.progress {
                let dt = now.duration_since(last_tick_at);
                last_tick_at = now;
                let metrics = LiveMetrics::from_snapshot(&snapshot, last_iterations, dt);
                last_iterations = snapshot.iterations;

                progress(ProgressUpdate {
                    tick,
                    elapsed,
                    total_duration: total,
                    phase: next_phase,
                    stage,
                    target_vus,
                    live_vus: pool.live_len(),
                    retiring_vus: pool.retiring_len(),
                    metrics,
                });
            }

            if needs_abort_eval {
                last_abort_eval = now;
                if let Some(rule) = crossed_abort_rule(&snapshot, &abort_rules, elapsed, cfg) {
                    tracing::warn!(threshold = %rule, elapsed = ?elapsed, "threshold crossed; aborting run");
                    aborted = Some(AbortReason::Threshold(rule));
                    break;
                }
            }
        }

        tracing::info!(
            phase = %EnginePhase::Draining,
            live = pool.live_len(),
            retiring = pool.retiring_len(),
            "draining virtual users"
        );
        vu_root.cancel();
        let forced = pool.drain(Instant::now() + cfg.graceful_stop(), cfg.graceful_stop()).await;

        let snapshot = self.aggregator.seal();
        let elapsed = started.elapsed();
        let verdict =
            thresholds_eval::evaluate(&snapshot, cfg.thresholds(), cfg.no_data(), elapsed)
                .with_run_info(aborted, forced);

        tracing::info!(
            phase = %EnginePhase::Completed,
            outcome = %verdict.outcome,
            iterations = verdict.snapshot.iterations,
            violations = verdict.violations.len(),
            forced_terminations = verdict.forced_terminations.len(),
            "run completed"
        );
        verdict
    }
}

fn crossed_abort_rule(
    snapshot: &MetricsSnapshot,
    rules: &[&ThresholdRule],
    elapsed: Duration,
    cfg: &RunConfig,
) -> Option<ThresholdRule> {
    rules
        .iter()
        .filter(|r| elapsed >= r.delay_abort_eval)
        .find(|r| {
            matches!(
                thresholds_eval::evaluate_rule(snapshot, r, cfg.no_data(), elapsed),
                Err(ViolationKind::Exceeded { .. })
            )
        })
        .map(|r| (*r).clone())
}

struct VuFactory<T> {
    target: Arc<T>,
    request: RequestSpec,
    sleep: Duration,
    sink: Arc<Aggregator>,
    root: CancellationToken,
}

impl<T: RequestTarget> VuFactory<T> {
    fn spawn(&self, id: u64) -> VuHandle {
        VuHandle::spawn(VirtualUser::new(
            id,
            self.target.clone(),
            self.request.clone(),
            self.sleep,
            self.sink.clone(),
            self.root.child_token(),
        ))
    }
}

#[derive(Debug)]
struct Retiring {
    handle: VuHandle,
    deadline: Instant,
}

/// Live VUs in start order, plus those retired by a ramp-down that have not exited yet.
#[derive(Debug)]
struct VuPool {
    live: Vec<VuHandle>,
    retiring: Vec<Retiring>,
    next_id: u64,
    ramp_down_grace: Duration,
    forced: Vec<ForcedTermination>,
}

impl VuPool {
    fn new(ramp_down_grace: Duration) -> Self {
        Self {
            live: Vec::new(),
            retiring: Vec::new(),
            next_id: 1,
            ramp_down_grace,
            forced: Vec::new(),
        }
    }

    fn live_len(&self) -> u64 {
        self.live.len() as u64
    }

    fn retiring_len(&self) -> u64 {
        self.retiring.len() as u64
    }

    /// Spawns or retires VUs until `live == target`. Retirement is LIFO: most recently
    /// started first.
    fn scale_to<T: RequestTarget>(&mut self, target: u64, now: Instant, factory: &VuFactory<T>) {
        let target = usize::try_from(target).unwrap_or(usize::MAX);

        while self.live.len() < target {
            let id = self.next_id;
            self.next_id = self.next_id.saturating_add(1);
            self.live.push(factory.spawn(id));
        }

        while self.live.len() > target {
            let Some(handle) = self.live.pop() else {
                break;
            };
            handle.stop();
            tracing::debug!(vu = handle.id(), "retiring virtual user");
            self.retiring.push(Retiring {
                handle,
                deadline: now + self.ramp_down_grace,
            });
        }
    }

    /// Drops exited VUs and force-terminates retirees past their deadline.
    fn reap(&mut self, now: Instant) {
        self.live.retain(|h| {
            let finished = h.is_finished();
            if finished {
                tracing::error!(vu = h.id(), "virtual user exited unexpectedly; replacing");
            }
            !finished
        });

        let grace = self.ramp_down_grace;
        self.retiring.retain(|r| {
            if r.handle.is_finished() {
                return false;
            }
            if now >= r.deadline {
                force_terminate(&r.handle, grace, &mut self.forced);
                return false;
            }
            true
        });
    }

    /// Stops every VU and waits for each until `deadline`; stragglers are aborted.
    async fn drain(mut self, deadline: Instant, grace: Duration) -> Vec<ForcedTermination> {
        for h in &self.live {
            h.stop();
        }

        let retiring = std::mem::take(&mut self.retiring);
        let mut waiting: Vec<(VuHandle, Instant, Duration)> = retiring
            .into_iter()
            .map(|r| (r.handle, r.deadline.min(deadline), self.ramp_down_grace))
            .collect();
        waiting.extend(self.live.drain(..).map(|h| (h, deadline, grace)));

        for (mut handle, until, grace) in waiting {
            match handle.wait_until(until).await {
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::error!(vu = handle.id(), error = %err, "virtual user task failed");
                }
                None => force_terminate(&handle, grace, &mut self.forced),
            }
        }

        self.forced
    }
}

fn force_terminate(handle: &VuHandle, grace: Duration, forced: &mut Vec<ForcedTermination>) {
    tracing::warn!(
        vu = handle.id(),
        grace = ?grace,
        "virtual user did not stop within its grace period; forcing termination"
    );
    handle.abort();
    forced.push(ForcedTermination {
        vu_id: handle.id(),
        grace,
    });
}
