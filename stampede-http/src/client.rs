use bytes::Bytes;
use http_body_util::{BodyExt as _, Empty};
use hyper::Request;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::{Error, Result};

/// The OS-level TCP connect timeout can be tens of seconds, which makes runs against an
/// unreachable host look hung.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Response body bytes read off the wire.
    pub body_len: u64,
}

/// Pooled HTTP/1.1 client over plain TCP or rustls.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    /// Issues a GET and drains the body. No timeout here; callers bound the whole exchange.
    pub async fn get(&self, uri: &hyper::Uri) -> Result<HttpResponse> {
        let req: Request<Empty<Bytes>> = Request::builder()
            .method(http::Method::GET)
            .uri(uri.clone())
            .body(Empty::new())?;

        let res: hyper::Response<Incoming> = self.inner.request(req).await?;
        let status = res.status().as_u16();

        let body = res.into_body().collect().await?.to_bytes();

        Ok(HttpResponse {
            status,
            body_len: body.len() as u64,
        })
    }
}

/// Validates `raw` as an absolute http(s) URL and converts it for hyper.
pub(crate) fn parse_uri(raw: &str) -> Result<hyper::Uri> {
    let parsed = url::Url::parse(raw).map_err(|_| Error::InvalidUrl(raw.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::UnsupportedScheme(raw.to_string()));
    }
    if parsed.host_str().is_none() {
        return Err(Error::InvalidUrl(raw.to_string()));
    }

    parsed
        .as_str()
        .parse()
        .map_err(|_| Error::InvalidUrl(raw.to_string()))
}
