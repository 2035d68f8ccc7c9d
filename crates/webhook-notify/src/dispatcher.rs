//! HTTP delivery of notification payloads.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

use crate::error::NotifyError;
use crate::payload::{NotificationPayload, PayloadLimits};

/// Default user agent sent with every delivery.
pub const NOTIFY_USER_AGENT: &str = concat!("evalops-notify/", env!("CARGO_PKG_VERSION"));

/// Delivery is attempted at most this many times.
const MAX_ATTEMPTS: u8 = 2;

/// Configuration for [`WebhookDispatcher`].
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Fixed delay before the single retry.
    pub retry_backoff: Duration,
    pub limits: PayloadLimits,
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(2),
            limits: PayloadLimits::default(),
            user_agent: NOTIFY_USER_AGENT.to_string(),
        }
    }
}

impl WebhookConfig {
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limits(mut self, limits: PayloadLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryResult {
    pub status: u16,
    pub attempts: u8,
}

/// Posts validated payloads to a webhook destination.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Validate `payload` locally, then POST it to `destination`.
    ///
    /// A non-2xx response or a transport error is retried once after the
    /// configured backoff. Payloads failing validation are never sent.
    pub async fn send(
        &self,
        payload: &NotificationPayload,
        destination: &str,
    ) -> Result<DeliveryResult, NotifyError> {
        let body = payload.encode(&self.config.limits)?;
        reqwest::Url::parse(destination)
            .map_err(|e| NotifyError::InvalidPayload(format!("destination url: {e}")))?;

        let mut attempts = 0u8;
        loop {
            attempts += 1;
            let failure = match self.post_once(destination, body.clone()).await {
                Ok(status) => {
                    info!(
                        status = status,
                        attempts = attempts,
                        bytes = body.len(),
                        "notification delivered"
                    );
                    return Ok(DeliveryResult { status, attempts });
                }
                Err(failure) => failure,
            };

            if attempts >= MAX_ATTEMPTS {
                return Err(NotifyError::Delivery {
                    status: failure.status,
                    body: failure.body,
                    attempts,
                });
            }

            warn!(
                status = ?failure.status,
                error = %failure.body,
                backoff_ms = self.config.retry_backoff.as_millis() as u64,
                "notification delivery failed, retrying"
            );
            tokio::time::sleep(self.config.retry_backoff).await;
        }
    }

    async fn post_once(&self, destination: &str, body: Vec<u8>) -> Result<u16, AttemptFailure> {
        let response = self
            .client
            .post(destination)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| AttemptFailure {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AttemptFailure {
            status: Some(status.as_u16()),
            body,
        })
    }
}

struct AttemptFailure {
    status: Option<u16>,
    body: String,
}
