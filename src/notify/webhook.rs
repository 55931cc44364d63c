use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DeliveryReceipt, Notifier, NotifyError, compose_body};

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    body: String,
}

#[derive(Debug, Default, Deserialize)]
struct SmsResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Notifier that POSTs `{"to": .., "body": ..}` to an HTTP SMS gateway.
///
/// A 2xx answer counts as accepted; the gateway's `id` field, if any,
/// becomes the receipt reference.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Gateway`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Gateway(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_sms(
        &self,
        phone: &str,
        message: &str,
        map_link: Option<&str>,
    ) -> Result<DeliveryReceipt, NotifyError> {
        if phone.trim().is_empty() {
            return Err(NotifyError::MissingPhone);
        }
        let request = SmsRequest {
            to: phone,
            body: compose_body(message, map_link),
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::Gateway(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Gateway(format!("gateway answered {status}")));
        }

        let parsed: SmsResponse = resp.json().await.unwrap_or_default();
        let reference = parsed
            .id
            .unwrap_or_else(|| format!("webhook-{}", uuid::Uuid::new_v4()));
        Ok(DeliveryReceipt::now(reference))
    }
}
