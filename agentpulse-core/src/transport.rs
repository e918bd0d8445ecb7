//! Transport layer for the Pulseboard collector
//!
//! The [`Transport`] trait is the seam between the delivery pipeline and
//! the wire: the batcher hands it whole batches and receives a
//! [`DeliveryOutcome`] or a classified [`TransportError`]. `HttpTransport`
//! is the production implementation speaking the Pulseboard HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};

use crate::config::CollectorConfig;
use crate::error::{Error, TransportError};
use crate::event::{AgentScore, DeliveryOutcome, EventBatch};

/// Delivery backend for event batches and score queries.
///
/// Implementations must classify failures so the retry layer can tell
/// transient conditions from permanent ones.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one batch; the batch id is the collector's dedup token
    /// across retransmissions.
    async fn send(&self, batch: &EventBatch) -> Result<DeliveryOutcome, TransportError>;

    /// Fetch the collector-computed score for an agent.
    async fn fetch_score(&self, agent_id: &str) -> Result<AgentScore, TransportError>;
}

/// HTTP transport for the Pulseboard collector API
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpTransport {
    /// Create a transport from validated configuration.
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &CollectorConfig, agent_id: &str) -> Result<Self, Error> {
        config.validate()?;

        let base_url = config
            .server_url
            .clone()
            .ok_or_else(|| Error::Config("collector.server_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        // Build default headers
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        headers.insert(
            "X-Agent-ID",
            HeaderValue::from_str(agent_id)
                .map_err(|e| Error::Config(format!("invalid agent_id: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Check if the collector is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn map_request_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            return TransportError::timeout(self.timeout_secs);
        }
        if e.is_connect() {
            return TransportError::network(format!("connection failed: {}", e));
        }
        TransportError::network(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &EventBatch) -> Result<DeliveryOutcome, TransportError> {
        let url = format!("{}/v1/events", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(batch)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if status.is_success() {
            let outcome: DeliveryOutcome = response.json().await.map_err(|e| {
                TransportError::invalid_response(format!("failed to parse response: {}", e))
            })?;
            Ok(outcome)
        } else {
            Err(error_for_status(response).await)
        }
    }

    async fn fetch_score(&self, agent_id: &str) -> Result<AgentScore, TransportError> {
        let url = format!(
            "{}/v1/agents/{}/score",
            self.base_url,
            urlencoding::encode(agent_id)
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if status.is_success() {
            let score: AgentScore = response.json().await.map_err(|e| {
                TransportError::invalid_response(format!("failed to parse response: {}", e))
            })?;
            Ok(score)
        } else {
            Err(error_for_status(response).await)
        }
    }
}

/// Classify a non-2xx response, consuming its body for the error message.
async fn error_for_status(response: reqwest::Response) -> TransportError {
    let status = response.status();
    let retry_after = retry_after_secs(response.headers());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        TransportError::rate_limited(retry_after)
    } else if status.is_server_error() {
        TransportError::server(status.as_u16(), body)
    } else if status.is_client_error() {
        TransportError::client(status.as_u16(), body)
    } else {
        TransportError::invalid_response(format!("unexpected status {}: {}", status, body))
    }
}

/// Numeric Retry-After header, when present and parseable
fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}
