//! webhook-notify: deliver evaluation summaries to a chat webhook
//!
//! Payloads are validated against size limits before any network traffic;
//! delivery retries once after a fixed backoff.

mod dispatcher;
mod error;
mod payload;

pub use dispatcher::{DeliveryResult, WebhookConfig, WebhookDispatcher, NOTIFY_USER_AGENT};
pub use error::NotifyError;
pub use payload::{ActionLink, NotificationPayload, PayloadLimits, SummaryField};
