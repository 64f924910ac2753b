//! Shared HTTP plumbing: one tuned client, checked execution, byte streams.
//!
//! Every HTTP adapter funnels through [`Transport`], which owns a single
//! `reqwest::Client` with production-friendly, env-overridable defaults and
//! applies uniform status handling: non-success statuses become
//! [`Error::Backend`] carrying the raw response body, logged with a
//! correlation id.

use std::env;
use std::time::{Duration, Instant};

use futures::TryStreamExt;
use reqwest::header::HeaderMap;
use reqwest::Proxy;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::stream::ByteStream;
use crate::{Error, Result};

/// Header carrying our own correlation id. Backends may ignore it, but
/// applications can use it for linkage in logs.
const REQUEST_ID_HEADER: &str = "x-llm-conduit-request-id";

/// Response headers that may carry the upstream's request id.
const UPSTREAM_ID_HEADERS: &[&str] = &["x-request-id", "request-id", "x-amzn-requestid", "cf-ray"];

#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
}

impl Transport {
    /// Build the shared client. Minimal production-friendly defaults,
    /// env-overridable.
    pub fn new() -> Result<Self> {
        let timeout_secs = env::var("LLM_CONDUIT_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(
                env::var("LLM_CONDUIT_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("LLM_CONDUIT_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )))
            // Conservative HTTP/2 keepalive defaults for long-lived streams.
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Ok(proxy_url) = env::var("LLM_CONDUIT_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build()?;
        Ok(Self { client })
    }

    pub async fn get_json(&self, url: &str, headers: &[(&str, String)]) -> Result<Value> {
        let mut req = self.client.get(url);
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        let response = self.execute(req).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value> {
        let mut req = self.client.post(url).json(body);
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        let response = self.execute(req).await?;
        Ok(response.json().await?)
    }

    /// URL-encoded form POST, used by the OAuth token exchange.
    pub async fn post_form(
        &self,
        url: &str,
        headers: &[(&str, String)],
        form: &[(&str, &str)],
    ) -> Result<Value> {
        let mut req = self.client.post(url).form(form);
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        let response = self.execute(req).await?;
        Ok(response.json().await?)
    }

    /// POST expecting an event stream back. Returns raw bytes for the frame
    /// parser; status checking happens before the first byte is surfaced.
    pub async fn post_sse(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<ByteStream> {
        let mut req = self
            .client
            .post(url)
            .json(body)
            .header("accept", "text/event-stream");
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        let response = self.execute(req).await?;
        Ok(Box::pin(response.bytes_stream().map_err(Error::from)))
    }

    /// Single-attempt execution with uniform status handling.
    async fn execute(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let client_request_id = Uuid::new_v4().to_string();
        let start = Instant::now();

        let response = req
            .header(REQUEST_ID_HEADER, &client_request_id)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let upstream_request_id = upstream_request_id(response.headers());
            let body = response.text().await.unwrap_or_default();
            warn!(
                http_status = status.as_u16(),
                client_request_id = %client_request_id,
                upstream_request_id = upstream_request_id.as_deref().unwrap_or("-"),
                duration_ms = start.elapsed().as_millis() as u64,
                "llm-conduit request failed"
            );
            return Err(Error::backend(status.as_u16(), body));
        }

        Ok(response)
    }
}

fn upstream_request_id(headers: &HeaderMap) -> Option<String> {
    UPSTREAM_ID_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds_with_defaults() {
        assert!(Transport::new().is_ok());
    }

    #[test]
    fn test_upstream_request_id_harvesting() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ray", "abc123".parse().unwrap());
        assert_eq!(upstream_request_id(&headers), Some("abc123".to_string()));

        headers.insert("x-request-id", "first".parse().unwrap());
        // Earlier names in the list win.
        assert_eq!(upstream_request_id(&headers), Some("first".to_string()));

        assert_eq!(upstream_request_id(&HeaderMap::new()), None);
    }
}
