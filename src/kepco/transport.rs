//! HTTP transport for the address service.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{LookupError, LookupResult};

/// A fully prepared POST: target, headers in send order, JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl RemoteRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path used to label log lines and errors
    pub fn endpoint(&self) -> &str {
        self.url.path()
    }
}

/// Sends prepared requests and returns the decoded JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: &RemoteRequest) -> LookupResult<Value>;
}

/// `reqwest`-backed transport with a fixed per-call timeout.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> LookupResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: &RemoteRequest) -> LookupResult<Value> {
        let endpoint = request.endpoint().to_string();

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let value = HeaderValue::from_str(value).map_err(|e| {
                LookupError::Config(format!("invalid value for header {}: {}", name, e))
            })?;
            headers.insert(HeaderName::from_static(*name), value);
        }

        // Serialized by hand so the content-type header is sent exactly as given
        let body = serde_json::to_vec(&request.body)?;

        debug!("POST {}", request.url);
        let response = self
            .client
            .post(request.url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| LookupError::Upstream {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::UpstreamStatus {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| LookupError::Upstream {
                endpoint,
                reason: format!("invalid JSON body: {}", e),
            })
    }
}
