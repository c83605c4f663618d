use std::sync::Arc;

use stampede_core::{RequestError, RequestTarget, Response};

use crate::client::{HttpClient, parse_uri};
use crate::Result;

/// `GET <url>` against a pooled [`HttpClient`]; the request every VU of a run issues.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: HttpClient,
    uri: hyper::Uri,
    url: Arc<str>,
}

impl HttpTarget {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_client(url, HttpClient::default())
    }

    pub fn with_client(url: &str, client: HttpClient) -> Result<Self> {
        Ok(Self {
            client,
            uri: parse_uri(url)?,
            url: Arc::from(url),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RequestTarget for HttpTarget {
    async fn send(&self) -> std::result::Result<Response, RequestError> {
        match self.client.get(&self.uri).await {
            Ok(res) => Ok(Response {
                status: res.status,
                body_len: res.body_len,
            }),
            Err(err) => {
                tracing::trace!(url = %self.url, error = %err.detailed(), "request failed");
                Err(err.into())
            }
        }
    }
}
