#![forbid(unsafe_code)]

mod client;
mod error;
mod target;

pub use client::{DEFAULT_CONNECT_TIMEOUT, HttpClient, HttpResponse};
pub use error::{Error, HttpTransportErrorKind, Result};
pub use target::HttpTarget;
