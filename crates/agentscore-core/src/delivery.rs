use crate::config::DeliveryConfig;
use crate::trace::call::CallRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// How a single delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The backend answered with a non-success status.
    Rejected(u16),
    /// Transport error before any response.
    Failed(String),
    /// No acknowledgment within the bounded wait.
    TimedOut,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Wire shape of an event as the ingestion endpoint expects it.
#[derive(Debug, Serialize)]
struct EventBody<'a> {
    run_id: &'a str,
    workflow_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_run_id: Option<&'a str>,
    event_type: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a Value>,
    tokens_in: u64,
    tokens_out: u64,
    cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a CallRecord> for EventBody<'a> {
    fn from(record: &'a CallRecord) -> Self {
        Self {
            run_id: &record.id,
            workflow_id: &record.workflow_id,
            parent_run_id: record.parent_id.as_deref(),
            event_type: record.event_type.as_deref().unwrap_or("llm_call"),
            model: &record.model,
            prompt: record.prompt.as_ref(),
            response: record.response.as_ref(),
            tokens_in: record.tokens_in,
            tokens_out: record.tokens_out,
            // The backend prices calls itself.
            cost: record.cost.unwrap_or(0.0),
            latency_ms: record.latency_ms,
            created_at: record.created_at,
        }
    }
}

/// Posts call records to the ingestion backend.
///
/// Delivery is at-most-once: each send waits a bounded time for
/// acknowledgment, logs anything other than success and never retries.
#[derive(Debug, Clone)]
pub struct EventSender {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl EventSender {
    pub fn new(backend_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("agentscore/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/events", backend_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        Self::new(&config.backend_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Deliver one record, waiting at most the configured timeout.
    pub async fn send(&self, record: &CallRecord) -> DeliveryOutcome {
        let request = self.client.post(&self.endpoint).json(&EventBody::from(record)).send();

        let outcome = match tokio::time::timeout(self.timeout, request).await {
            Err(_) => DeliveryOutcome::TimedOut,
            Ok(Err(e)) => DeliveryOutcome::Failed(e.to_string()),
            Ok(Ok(response)) if response.status().is_success() => DeliveryOutcome::Delivered,
            Ok(Ok(response)) => DeliveryOutcome::Rejected(response.status().as_u16()),
        };

        match &outcome {
            DeliveryOutcome::Delivered => {
                tracing::debug!(call = %record.id, endpoint = %self.endpoint, "event delivered");
            }
            DeliveryOutcome::Rejected(status) => {
                tracing::warn!(call = %record.id, status, "backend rejected event");
            }
            DeliveryOutcome::Failed(error) => {
                tracing::warn!(call = %record.id, error = %error, "could not reach backend");
            }
            DeliveryOutcome::TimedOut => {
                tracing::warn!(
                    call = %record.id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "event delivery timed out, continuing"
                );
            }
        }
        outcome
    }
}
