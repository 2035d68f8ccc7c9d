//! Error types for webhook-notify

use thiserror::Error;

/// Errors that can occur while validating or delivering a notification
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Payload failed local validation and was not sent
    #[error("invalid notification payload: {0}")]
    InvalidPayload(String),

    /// Serialized payload exceeds the sink's size limit
    #[error("notification payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Delivery failed after the retry budget was spent
    #[error("delivery failed after {attempts} attempt(s) (status: {status:?}): {body}")]
    Delivery {
        status: Option<u16>,
        body: String,
        attempts: u8,
    },

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(String),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NotifyError {
    /// Whether the payload was rejected locally, before any network traffic.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            NotifyError::InvalidPayload(_) | NotifyError::PayloadTooLarge { .. } | NotifyError::Json(_)
        )
    }
}
