use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stampede_core::{
    AbortReason, EnginePhase, IterationResult, LoadTestEngine, MetricName, NoDataPolicy,
    ProgressUpdate, RequestError, RequestTarget, Response, RunConfig, RunOptions, RunOutcome,
    Stage, ThresholdSet, ThresholdSpec, ViolationKind,
};

/// Fake target with a fixed latency. Every `fail_every`-th call returns 500.
struct FakeTarget {
    latency: Duration,
    fail_every: Option<u64>,
    unreachable: bool,
    calls: Arc<AtomicU64>,
}

impl FakeTarget {
    fn healthy(latency: Duration) -> Self {
        Self {
            latency,
            fail_every: None,
            unreachable: false,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    fn failing_every(latency: Duration, n: u64) -> Self {
        Self {
            fail_every: Some(n),
            ..Self::healthy(latency)
        }
    }

    fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::healthy(Duration::from_millis(10))
        }
    }
}

impl RequestTarget for FakeTarget {
    async fn send(&self) -> Result<Response, RequestError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        tokio::time::sleep(self.latency).await;
        if self.unreachable {
            return Err(RequestError::Transport("connection refused".to_string()));
        }
        let status = match self.fail_every {
            Some(n) if call % n == 0 => 500,
            _ => 200,
        };
        Ok(Response {
            status,
            body_len: 12,
        })
    }
}

struct HangingTarget;

impl RequestTarget for HangingTarget {
    async fn send(&self) -> Result<Response, RequestError> {
        tokio::time::sleep(Duration::from_secs(120)).await;
        Ok(Response {
            status: 200,
            body_len: 0,
        })
    }
}

fn script_options(stages: Vec<Stage>) -> RunOptions {
    RunOptions {
        url: Some("http://target.test/".to_string()),
        stages,
        max_duration: Some(Duration::from_millis(500)),
        thresholds: vec![
            ThresholdSet::new("http_req_duration", ["p(95)<500"]),
            ThresholdSet::new("errors", ["rate<0.01"]),
        ],
        ..RunOptions::default()
    }
}

fn config(opts: RunOptions) -> RunConfig {
    RunConfig::from_options(opts).unwrap_or_else(|e| panic!("invalid config: {e}"))
}

#[tokio::test(start_paused = true)]
async fn healthy_target_passes_every_threshold() {
    let cfg = config(script_options(vec![Stage::new(Duration::from_secs(10), 10)]));
    let verdict = LoadTestEngine::new(cfg, FakeTarget::healthy(Duration::from_millis(100)))
        .run()
        .await;

    assert!(verdict.passed, "violations: {:?}", verdict.violations);
    assert_eq!(verdict.outcome, RunOutcome::Passed);
    assert!(verdict.violations.is_empty());
    assert!(verdict.snapshot.iterations > 0);
    assert_eq!(verdict.snapshot.failed_iterations, 0);
    assert!(verdict.forced_terminations.is_empty());
    assert!(verdict.aborted.is_none());
    assert!(verdict.elapsed >= Duration::from_secs(10));
    assert!(verdict.elapsed < Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn two_percent_failures_break_only_the_error_threshold() {
    let mut opts = script_options(vec![Stage::new(Duration::from_secs(10), 10)]);
    opts.sleep = Duration::from_millis(100);
    let cfg = config(opts);

    let verdict = LoadTestEngine::new(cfg, FakeTarget::failing_every(Duration::from_millis(100), 50))
        .run()
        .await;

    assert!(!verdict.passed);
    assert_eq!(verdict.outcome, RunOutcome::ThresholdsFailed);
    assert_eq!(verdict.violations.len(), 1, "violations: {:?}", verdict.violations);

    let violation = &verdict.violations[0];
    assert_eq!(violation.rule.metric, MetricName::Errors);
    match violation.kind {
        ViolationKind::Exceeded { observed } => assert!(observed > 0.01 && observed <= 0.02),
        ViolationKind::NoData => panic!("expected an exceeded violation"),
    }
    assert!(verdict.snapshot.iterations >= 100);
    assert_eq!(verdict.snapshot.status_codes.get(&500).copied().unwrap_or(0), verdict.snapshot.failed_iterations);
}

#[tokio::test(start_paused = true)]
async fn zero_target_schedule_reports_no_data() {
    let cfg = config(script_options(vec![Stage::new(Duration::from_secs(2), 0)]));
    let verdict = LoadTestEngine::new(cfg, FakeTarget::healthy(Duration::from_millis(100)))
        .run()
        .await;

    assert!(!verdict.passed);
    assert_eq!(verdict.outcome, RunOutcome::NoData);
    assert_eq!(verdict.snapshot.iterations, 0);
    assert_eq!(verdict.violations.len(), 2);
    assert!(verdict.violations.iter().all(|v| v.kind == ViolationKind::NoData));
}

#[tokio::test(start_paused = true)]
async fn no_data_policy_pass_keeps_rules_green_but_an_empty_run_never_passes() {
    let mut opts = script_options(vec![Stage::new(Duration::from_secs(2), 0)]);
    opts.no_data = NoDataPolicy::Pass;
    let verdict = LoadTestEngine::new(config(opts), FakeTarget::healthy(Duration::from_millis(100)))
        .run()
        .await;

    assert!(verdict.violations.is_empty());
    assert!(verdict.rules.iter().all(|r| r.passed && r.observed.is_none()));
    assert!(!verdict.passed);
    assert_eq!(verdict.outcome, RunOutcome::NoData);
}

#[tokio::test(start_paused = true)]
async fn unreachable_target_is_classified_separately() {
    let cfg = config(script_options(vec![Stage::new(Duration::from_secs(3), 2)]));
    let verdict = LoadTestEngine::new(cfg, FakeTarget::unreachable()).run().await;

    assert!(!verdict.passed);
    assert_eq!(verdict.outcome, RunOutcome::TargetUnreachable);
    assert!(verdict.snapshot.iterations > 0);
    assert_eq!(verdict.snapshot.responses, 0);
    assert_eq!(verdict.snapshot.error_rate(), Some(1.0));
}

#[tokio::test(start_paused = true)]
async fn unreachable_target_fails_even_when_only_latency_is_bounded() {
    let mut opts = script_options(vec![Stage::new(Duration::from_secs(3), 2)]);
    opts.start_vus = 2;
    opts.thresholds = vec![ThresholdSet::new("http_req_duration", ["p(95)<500"])];

    let verdict = LoadTestEngine::new(config(opts), FakeTarget::unreachable()).run().await;

    assert!(verdict.violations.is_empty(), "violations: {:?}", verdict.violations);
    assert!(verdict.snapshot.iterations > 0);
    assert_eq!(verdict.snapshot.responses, 0);
    assert!(!verdict.passed);
    assert_eq!(verdict.outcome, RunOutcome::TargetUnreachable);
}

#[tokio::test(start_paused = true)]
async fn iteration_rate_threshold_uses_run_time() {
    let mut opts = script_options(vec![Stage::new(Duration::from_secs(10), 2)]);
    opts.start_vus = 2;
    opts.thresholds = vec![ThresholdSet::new("iterations", ["rate>1", "rate<3"])];

    // Two VUs, 100ms request + 1s sleep each: just under two iterations per second.
    let verdict = LoadTestEngine::new(config(opts), FakeTarget::healthy(Duration::from_millis(100)))
        .run()
        .await;

    assert!(verdict.passed, "rules: {:?}", verdict.rules);
    let observed = verdict.rules[0].observed.unwrap_or_else(|| panic!("no iteration rate"));
    assert!(observed > 1.0 && observed < 3.0, "observed {observed}");
}

#[tokio::test(start_paused = true)]
async fn abort_on_fail_threshold_stops_the_run_early() {
    let mut opts = script_options(vec![Stage::new(Duration::from_secs(20), 5)]);
    opts.start_vus = 5;
    opts.thresholds = vec![ThresholdSet {
        metric: "errors".to_string(),
        thresholds: vec![ThresholdSpec {
            expression: "rate<0.1".to_string(),
            abort_on_fail: true,
            delay_abort_eval: Some(Duration::from_secs(3)),
            no_data: None,
        }],
    }];
    let target = FakeTarget::failing_every(Duration::from_millis(100), 1);

    let verdict = LoadTestEngine::new(config(opts), target).run().await;

    assert!(!verdict.passed);
    assert_eq!(verdict.outcome, RunOutcome::Aborted);
    match &verdict.aborted {
        Some(AbortReason::Threshold(rule)) => assert_eq!(rule.metric, MetricName::Errors),
        other => panic!("expected a threshold abort, got {other:?}"),
    }
    assert!(verdict.elapsed >= Duration::from_secs(3));
    assert!(verdict.elapsed < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn external_cancel_interrupts_and_still_reports() {
    let mut opts = script_options(vec![Stage::new(Duration::from_secs(30), 3)]);
    opts.start_vus = 3;
    let engine = LoadTestEngine::new(config(opts), FakeTarget::healthy(Duration::from_millis(100)));

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        cancel.cancel();
    });

    let verdict = engine.run().await;
    assert_eq!(verdict.outcome, RunOutcome::Aborted);
    assert_eq!(verdict.aborted, Some(AbortReason::Interrupted));
    assert!(verdict.snapshot.iterations >= 3);
    assert!(verdict.elapsed < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn stragglers_are_forced_and_late_results_rejected() {
    let mut opts = script_options(vec![Stage::new(Duration::from_secs(2), 2)]);
    opts.start_vus = 2;
    opts.timeout = Duration::from_secs(300);
    opts.graceful_stop = Duration::from_secs(1);
    let engine = LoadTestEngine::new(config(opts), HangingTarget);
    let aggregator = engine.aggregator();

    let verdict = engine.run().await;

    assert_eq!(verdict.forced_terminations.len(), 2);
    assert!(
        verdict
            .forced_terminations
            .iter()
            .all(|f| f.grace == Duration::from_secs(1))
    );
    assert!(verdict.elapsed >= Duration::from_secs(3));
    assert!(verdict.elapsed < Duration::from_millis(3_100));
    assert_eq!(verdict.snapshot.iterations, 0);

    // Aborted VUs never emit; anything recorded after the seal is dropped.
    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(aggregator.is_sealed());
    assert!(!aggregator.record(IterationResult::new(
        Duration::from_millis(5),
        true,
        Some(200)
    )));
    assert_eq!(aggregator.late_results(), 1);
    assert_eq!(aggregator.snapshot().iterations, 0);
}

#[tokio::test(start_paused = true)]
async fn live_vus_track_the_schedule_each_tick() {
    let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();

    let cfg = config(script_options(vec![
        Stage::new(Duration::from_secs(3), 3),
        Stage::new(Duration::from_secs(3), 0),
    ]));
    let verdict = LoadTestEngine::new(cfg, FakeTarget::healthy(Duration::from_millis(100)))
        .with_progress(Arc::new(move |u| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(u);
        }))
        .run()
        .await;
    assert!(verdict.passed);

    let updates = updates.lock().unwrap_or_else(|e| e.into_inner());
    let targets: Vec<u64> = updates.iter().map(|u| u.target_vus).collect();
    assert_eq!(targets, vec![0, 1, 2, 3, 2, 1]);
    assert!(updates.iter().all(|u| u.live_vus == u.target_vus));
    assert!(updates.windows(2).all(|w| w[0].tick < w[1].tick));

    let phases: Vec<EnginePhase> = updates.iter().map(|u| u.phase).collect();
    assert_eq!(phases[0], EnginePhase::Ramping);
    assert_eq!(phases[3], EnginePhase::Ramping);
    assert_eq!(phases[4], EnginePhase::Transitioning);
}
