use std::sync::Arc;
use std::time::Duration;

use stampede_metrics::{Aggregator, IterationResult};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RequestSpec;
use crate::error::RequestError;
use crate::request::RequestTarget;

/// Where a virtual user emits its iteration results.
pub trait ResultSink: Send + Sync + 'static {
    /// Returns `false` if the result was rejected.
    fn accept(&self, result: IterationResult) -> bool;
}

impl ResultSink for Aggregator {
    fn accept(&self, result: IterationResult) -> bool {
        self.record(result)
    }
}

impl ResultSink for mpsc::UnboundedSender<IterationResult> {
    fn accept(&self, result: IterationResult) -> bool {
        self.send(result).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum VuState {
    Running,
    /// Stop requested; the current iteration is finishing.
    Stopping,
    Stopped,
}

/// One simulated user: request, check, sleep, repeat until stopped.
pub struct VirtualUser<T, S> {
    id: u64,
    target: Arc<T>,
    request: RequestSpec,
    sleep: Duration,
    sink: Arc<S>,
    stop: CancellationToken,
    state: Arc<watch::Sender<VuState>>,
}

impl<T: RequestTarget, S: ResultSink> VirtualUser<T, S> {
    pub fn new(
        id: u64,
        target: Arc<T>,
        request: RequestSpec,
        sleep: Duration,
        sink: Arc<S>,
        stop: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(VuState::Running);
        Self {
            id,
            target,
            request,
            sleep,
            sink,
            stop,
            state: Arc::new(state),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> watch::Receiver<VuState> {
        self.state.subscribe()
    }

    /// Runs iterations until the stop token fires. Returns the number of results emitted.
    ///
    /// Stop is observed between iterations and during the sleep; an in-flight request always
    /// completes and its result is emitted before the loop exits.
    pub async fn run(self) -> u64 {
        let mut completed: u64 = 0;

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            let result = self.iterate().await;
            self.sink.accept(result);
            completed = completed.saturating_add(1);

            if self.stop.is_cancelled() {
                break;
            }

            if self.sleep.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                () = tokio::time::sleep(self.sleep) => {}
            }
        }

        self.state.send_replace(VuState::Stopped);
        tracing::debug!(vu = self.id, iterations = completed, "virtual user stopped");
        completed
    }

    async fn iterate(&self) -> IterationResult {
        let started = Instant::now();

        let outcome = match tokio::time::timeout(self.request.timeout, self.target.send()).await {
            Ok(res) => res,
            Err(_) => Err(RequestError::Timeout(self.request.timeout)),
        };
        let duration = started.elapsed();

        let (status, body_len) = match &outcome {
            Ok(res) => (Some(res.status), res.body_len),
            Err(err) => {
                tracing::trace!(vu = self.id, error = %err, "request failed");
                (None, 0)
            }
        };

        let checks = self.request.checks.evaluate(status, duration);
        let success = outcome.is_ok() && checks.iter().all(|c| c.passed);

        IterationResult {
            timestamp: started.into_std(),
            duration,
            success,
            status,
            body_len,
            checks,
        }
    }
}

/// Engine-side handle to a spawned [`VirtualUser`].
#[derive(Debug)]
pub struct VuHandle {
    id: u64,
    stop: CancellationToken,
    state: Arc<watch::Sender<VuState>>,
    join: JoinHandle<u64>,
}

impl VuHandle {
    pub fn spawn<T: RequestTarget, S: ResultSink>(vu: VirtualUser<T, S>) -> Self {
        let id = vu.id;
        let stop = vu.stop.clone();
        let state = vu.state.clone();
        let join = tokio::spawn(vu.run());
        Self {
            id,
            stop,
            state,
            join,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> VuState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<VuState> {
        self.state.subscribe()
    }

    /// Asks the VU to stop after its current iteration.
    pub fn stop(&self) {
        self.state.send_if_modified(|s| {
            if *s == VuState::Running {
                *s = VuState::Stopping;
                true
            } else {
                false
            }
        });
        self.stop.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancels the task at its next suspension point. Any result it had not yet emitted is lost.
    pub fn abort(&self) {
        self.join.abort();
    }

    /// Waits for the VU to exit. `None` if `deadline` passed first.
    pub async fn wait_until(&mut self, deadline: Instant) -> Option<Result<u64, JoinError>> {
        tokio::time::timeout_at(deadline, &mut self.join).await.ok()
    }
}
