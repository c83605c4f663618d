use stampede_core::ConfigError;

use crate::exit_codes::ExitCode;

/// Why `run`/`validate` could not produce a verdict. Anything a user can fix in the scenario
/// file or on the command line is `InvalidInput`.
#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    fn inner(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }
}

/// Scenario validation failures: bad stages, thresholds, durations or URL.
impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidInput(anyhow::Error::new(err).context("invalid scenario config"))
    }
}

/// The target URL passed config validation but the HTTP client refused it.
impl From<stampede_http::Error> for RunError {
    fn from(err: stampede_http::Error) -> Self {
        Self::InvalidInput(anyhow::Error::new(err).context("invalid target url"))
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.inner())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_and_url_errors_are_invalid_input() {
        let err = RunError::from(ConfigError::EmptyStages);
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert!(err.to_string().starts_with("invalid scenario config: "), "{err}");

        let url_err = stampede_http::HttpTarget::new("ws://127.0.0.1:1/")
            .err()
            .unwrap_or_else(|| panic!("ws:// should be rejected"));
        let err = RunError::from(url_err);
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert!(err.to_string().starts_with("invalid target url: "), "{err}");
    }

    #[test]
    fn runtime_errors_map_to_their_own_code() {
        let err = RunError::RuntimeError(anyhow::anyhow!("stdout closed"));
        assert_eq!(err.exit_code(), ExitCode::RuntimeError);
        assert_eq!(err.to_string(), "stdout closed");
    }
}
