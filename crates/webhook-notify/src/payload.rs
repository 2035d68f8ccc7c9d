//! Notification payload model and local validation.

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// One entry of the key/value summary block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryField {
    pub label: String,
    pub value: String,
}

/// Link to the full results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLink {
    pub text: String,
    pub url: String,
}

/// Structured notification message posted to the webhook sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub header: String,
    pub fields: Vec<SummaryField>,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionLink>,
}

impl NotificationPayload {
    pub fn new(header: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            fields: Vec::new(),
            body: body.into(),
            action: None,
        }
    }

    /// Append a summary field. Empty values are skipped.
    pub fn with_field(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields.push(SummaryField {
                label: label.into(),
                value,
            });
        }
        self
    }

    pub fn with_action(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.action = Some(ActionLink {
            text: text.into(),
            url: url.into(),
        });
        self
    }

    /// Validate the payload against `limits` and return the exact bytes to send.
    pub fn encode(&self, limits: &PayloadLimits) -> Result<Vec<u8>, NotifyError> {
        if self.header.trim().is_empty() {
            return Err(NotifyError::InvalidPayload("header must not be empty".into()));
        }
        if self.body.len() > limits.max_body_bytes {
            return Err(NotifyError::InvalidPayload(format!(
                "body is {} bytes, cap is {}",
                self.body.len(),
                limits.max_body_bytes
            )));
        }
        if let Some(field) = self.fields.iter().find(|f| f.label.trim().is_empty()) {
            return Err(NotifyError::InvalidPayload(format!(
                "summary field with value {:?} has an empty label",
                field.value
            )));
        }
        if let Some(action) = &self.action {
            let url = reqwest::Url::parse(&action.url).map_err(|e| {
                NotifyError::InvalidPayload(format!("action url {:?}: {e}", action.url))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(NotifyError::InvalidPayload(format!(
                    "action url scheme must be http(s), got {}",
                    url.scheme()
                )));
            }
        }

        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > limits.max_payload_bytes {
            return Err(NotifyError::PayloadTooLarge {
                size: bytes.len(),
                limit: limits.max_payload_bytes,
            });
        }
        Ok(bytes)
    }
}

/// Size limits enforced before a payload leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    /// Cap on the report body.
    pub max_body_bytes: usize,
    /// Cap on the whole serialized payload.
    pub max_payload_bytes: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 1200,
            max_payload_bytes: 4000,
        }
    }
}
