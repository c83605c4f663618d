use std::future::Future;
use std::sync::Arc;

use crate::error::RequestError;

/// What the core needs to know about a completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body_len: u64,
}

/// Issues the run's request. Transport details stay behind this seam.
pub trait RequestTarget: Send + Sync + 'static {
    fn send(&self) -> impl Future<Output = Result<Response, RequestError>> + Send;
}

impl<T: RequestTarget> RequestTarget for Arc<T> {
    fn send(&self) -> impl Future<Output = Result<Response, RequestError>> + Send {
        (**self).send()
    }
}
