//! Outbound SMS delivery to emergency contacts.
//!
//! The orchestrator talks to a [`Notifier`]; which one is wired depends on
//! configuration:
//!
//! - [`LogNotifier`]: writes every message to the log. Default when no
//!   gateway is configured.
//! - [`WebhookNotifier`]: POSTs each message as JSON to an SMS gateway.
//!
//! Failures are per recipient and never abort an emergency trigger.

mod log;
mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use self::log::LogNotifier;
pub use self::webhook::WebhookNotifier;

/// Why one message could not be handed off.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The recipient has no usable phone number.
    #[error("recipient has no phone number")]
    MissingPhone,

    /// The gateway could not be reached or answered badly.
    #[error("sms gateway error: {0}")]
    Gateway(String),

    /// The gateway did not answer before the deadline.
    #[error("sms delivery timed out")]
    Timeout,
}

/// Proof that a message was accepted by the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Channel-specific message reference.
    pub reference: String,
    /// When the channel accepted the message.
    pub accepted_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    /// A receipt stamped with the current time.
    #[must_use]
    pub fn now(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            accepted_at: Utc::now(),
        }
    }
}

/// Sends a text message to a phone number.
#[async_trait]
pub trait Notifier: std::fmt::Debug + Send + Sync {
    /// Hands `message` off for delivery to `phone`, appending `map_link`
    /// when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the message was not accepted.
    async fn send_sms(
        &self,
        phone: &str,
        message: &str,
        map_link: Option<&str>,
    ) -> Result<DeliveryReceipt, NotifyError>;
}

/// Joins the message and the optional map link into the final SMS body.
#[must_use]
pub fn compose_body(message: &str, map_link: Option<&str>) -> String {
    match map_link {
        Some(link) => format!("{message}\nLocation: {link}"),
        None => message.to_string(),
    }
}
