use std::error::Error as _;

use stampede_core::RequestError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    RequestBuild,
    Request,
    BodyRead,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// and https:// URLs are supported: {0}")]
    UnsupportedScheme(String),

    #[error("http request build failed")]
    RequestBuild(#[from] http::Error),

    #[error("http request failed")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read response body")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> HttpTransportErrorKind {
        match self {
            Self::InvalidUrl(_) => HttpTransportErrorKind::InvalidUrl,
            Self::UnsupportedScheme(_) => HttpTransportErrorKind::UnsupportedScheme,
            Self::RequestBuild(_) => HttpTransportErrorKind::RequestBuild,
            Self::Request(_) => HttpTransportErrorKind::Request,
            Self::BodyRead(_) => HttpTransportErrorKind::BodyRead,
        }
    }

    /// Message with the full source chain; hyper's top-level messages alone are rarely useful.
    pub fn detailed(&self) -> String {
        let mut msg = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            msg.push_str(": ");
            msg.push_str(&err.to_string());
            source = err.source();
        }
        msg
    }
}

impl From<Error> for RequestError {
    fn from(err: Error) -> Self {
        RequestError::Transport(format!("{}: {}", err.transport_error_kind(), err.detailed()))
    }
}
