//! Breaker-guarded HTTP client for one external service.
//!
//! All outbound integration traffic flows through [`ServiceClient`]: the
//! breaker is consulted before any I/O, request outcomes feed back into
//! it, and failures are normalized into the [`IntegrationError`] taxonomy.

use std::{sync::Arc, time::Duration};

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::{
    circuit::CircuitBreakerManager,
    error::{IntegrationError, Result},
};

/// Maximum error-response bytes kept for diagnostics.
const MAX_ERROR_BODY_BYTES: usize = 1024;

/// HTTP client tuning shared by all service clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Total per-request timeout.
    pub timeout: Duration,
    /// User-Agent header for outbound requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: format!("sluice/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Builds the underlying reqwest client.
    ///
    /// The returned client is cheap to clone and shares its connection
    /// pool, so one instance serves every [`ServiceClient`].
    pub fn build_http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| IntegrationError::configuration(format!("failed to build HTTP client: {e}")))
    }
}

/// Resilient JSON client for one named external service.
pub struct ServiceClient {
    service: String,
    base_url: String,
    http: reqwest::Client,
    breaker: Arc<CircuitBreakerManager>,
    timeout: Duration,
}

impl ServiceClient {
    /// Creates a client for `service` rooted at `base_url`.
    pub fn new(
        service: impl Into<String>,
        base_url: impl Into<String>,
        http: reqwest::Client,
        breaker: Arc<CircuitBreakerManager>,
        timeout: Duration,
    ) -> Result<Self> {
        let service = service.into();
        let base_url = base_url.into().trim_end_matches('/').to_string();

        // Fail fast on malformed base URLs instead of at first dispatch.
        reqwest::Url::parse(&base_url).map_err(|e| {
            IntegrationError::configuration(format!("invalid base URL for {service}: {e}"))
        })?;

        Ok(Self { service, base_url, http, breaker, timeout })
    }

    /// The service name this client targets.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Sends a JSON request and returns the parsed response body.
    ///
    /// Fails fast with [`IntegrationError::CircuitOpen`] when the breaker
    /// rejects the call; no request is made in that case and the
    /// rejection is not counted as a service failure.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        if !self.breaker.should_allow_request(&self.service).await {
            return Err(IntegrationError::circuit_open(&self.service));
        }

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let span = info_span!(
            "service_request",
            service = %self.service,
            method = %method,
            path,
        );

        async {
            let mut request = self.http.request(method, &url);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    self.breaker.record_failure(&self.service).await;
                    let error = if e.is_timeout() {
                        IntegrationError::timeout(&self.service, self.timeout.as_secs())
                    } else {
                        IntegrationError::transport(&self.service, e.to_string())
                    };
                    warn!(error = %error, "service request failed");
                    return Err(error);
                },
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                self.breaker.record_failure(&self.service).await;
                let error =
                    IntegrationError::http_status(&self.service, status.as_u16(), truncate(&body));
                warn!(status = status.as_u16(), "service returned error status");
                return Err(error);
            }

            self.breaker.record_success(&self.service).await;
            debug!(status = status.as_u16(), "service request succeeded");

            let bytes = response
                .bytes()
                .await
                .map_err(|e| IntegrationError::transport(&self.service, e.to_string()))?;
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_slice(&bytes).map_err(|e| {
                IntegrationError::transport(&self.service, format!("invalid JSON response: {e}"))
            })
        }
        .instrument(span)
        .await
    }

    /// Convenience GET request.
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    /// Convenience POST request with a JSON body.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Convenience PUT request with a JSON body.
    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// Convenience DELETE request.
    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.request(Method::DELETE, path, None).await
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_BYTES {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
