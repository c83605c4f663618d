use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::SmallVec;

/// Outcome of one named check for one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: Arc<str>,
    pub passed: bool,
}

/// Result of a single virtual user iteration.
///
/// `status` is `None` when the request never produced an HTTP response
/// (connect failure, timeout, body read error).
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub timestamp: Instant,
    pub duration: Duration,
    pub success: bool,
    pub status: Option<u16>,
    pub body_len: u64,
    pub checks: SmallVec<[CheckOutcome; 2]>,
}

impl IterationResult {
    pub fn new(duration: Duration, success: bool, status: Option<u16>) -> Self {
        Self {
            timestamp: Instant::now(),
            duration,
            success,
            status,
            body_len: 0,
            checks: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn with_check(mut self, name: impl Into<Arc<str>>, passed: bool) -> Self {
        self.checks.push(CheckOutcome {
            name: name.into(),
            passed,
        });
        self
    }

    #[must_use]
    pub fn with_body_len(mut self, body_len: u64) -> Self {
        self.body_len = body_len;
        self
    }

    /// Matches the default `http_req_failed` semantics: no response, or a status outside 200..=399.
    pub fn is_http_failure(&self) -> bool {
        !matches!(self.status, Some(200..=399))
    }
}
