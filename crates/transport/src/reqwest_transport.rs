//! `reqwest`-backed transport
//!
//! Joins the configured base URL with each request's path and query, applies
//! the per-request timeout, and reads the full response body so the caller
//! can inspect the status before deciding whether to replay.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Url;
use tracing::debug;

use crate::{OutboundRequest, Result, Transport, TransportError, TransportResponse};

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl ReqwestTransport {
    /// `base_url` may carry a path prefix (e.g. `https://host/api`); request
    /// paths are appended to it.
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("base url {base_url}: {e}")))?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Absolute URL for a request. Non-ASCII and reserved characters in the
    /// path are percent-encoded.
    pub fn url_for(&self, request: &OutboundRequest) -> Url {
        let mut url = self.base_url.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{prefix}{}", request.path));
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        url
    }
}

impl Transport for ReqwestTransport {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn execute(
        &self,
        request: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + '_>> {
        Box::pin(async move {
            let url = self.url_for(&request);
            debug!(method = %request.method, path = %url.path(), "sending request");

            let response = self
                .client
                .request(request.method, url)
                .headers(request.headers)
                .timeout(self.timeout)
                .body(request.body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        TransportError::Timeout(e.to_string())
                    } else {
                        TransportError::Connect(e.to_string())
                    }
                })?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Body(e.to_string()))?;

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}
