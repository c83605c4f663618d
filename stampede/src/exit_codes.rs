use stampede_core::RunOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// The run was stopped early by an `abortOnFail` threshold or Ctrl-C.
    Aborted = 12,

    /// Nothing useful was measured: every request failed at the transport level, or no
    /// iteration ran at all.
    NoResponses = 13,

    /// Invalid CLI/config/options (bad flags, invalid durations, invalid thresholds syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants, panics caught at top-level).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_outcome(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Passed => Self::Success,
            RunOutcome::ThresholdsFailed => Self::ThresholdsFailed,
            RunOutcome::Aborted => Self::Aborted,
            RunOutcome::TargetUnreachable | RunOutcome::NoData => Self::NoResponses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_distinct_codes() {
        assert_eq!(ExitCode::from_outcome(RunOutcome::Passed).as_i32(), 0);
        assert_eq!(ExitCode::from_outcome(RunOutcome::ThresholdsFailed).as_i32(), 11);
        assert_eq!(ExitCode::from_outcome(RunOutcome::Aborted).as_i32(), 12);
        assert_eq!(ExitCode::from_outcome(RunOutcome::TargetUnreachable).as_i32(), 13);
        assert_eq!(ExitCode::from_outcome(RunOutcome::NoData).as_i32(), 13);
    }
}
