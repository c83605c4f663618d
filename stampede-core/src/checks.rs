use std::sync::Arc;
use std::time::Duration;

use smallvec::SmallVec;
use stampede_metrics::CheckOutcome;

/// A response validation applied after every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Passes when the response status equals the value.
    Status(u16),
    /// Passes when the request completed in strictly less than the bound.
    DurationBelow(Duration),
}

impl Check {
    pub fn evaluate(&self, status: Option<u16>, duration: Duration) -> bool {
        match *self {
            Self::Status(expected) => status == Some(expected),
            Self::DurationBelow(max) => status.is_some() && duration < max,
        }
    }

    fn default_name(&self) -> String {
        match self {
            Self::Status(code) => format!("is status {code}"),
            Self::DurationBelow(max) => {
                format!("response time is less than {}ms", max.as_millis())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct NamedCheck {
    check: Check,
    name: Arc<str>,
}

impl NamedCheck {
    pub fn check(&self) -> Check {
        self.check
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Checks evaluated for every iteration. Names are interned once at config time.
#[derive(Debug, Clone, Default)]
pub struct CheckSet {
    checks: Arc<[NamedCheck]>,
}

impl CheckSet {
    pub fn new(checks: impl IntoIterator<Item = Check>) -> Self {
        let checks: Vec<NamedCheck> = checks
            .into_iter()
            .map(|check| NamedCheck {
                name: Arc::from(check.default_name()),
                check,
            })
            .collect();
        Self {
            checks: Arc::from(checks),
        }
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedCheck> + '_ {
        self.checks.iter()
    }

    /// Evaluates each check independently.
    pub fn evaluate(&self, status: Option<u16>, duration: Duration) -> SmallVec<[CheckOutcome; 2]> {
        self.checks
            .iter()
            .map(|c| CheckOutcome {
                name: c.name.clone(),
                passed: c.check.evaluate(status, duration),
            })
            .collect()
    }
}
