use async_trait::async_trait;

use super::{DeliveryReceipt, Notifier, NotifyError, compose_body};

/// Notifier that only logs. Every message counts as accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_sms(
        &self,
        phone: &str,
        message: &str,
        map_link: Option<&str>,
    ) -> Result<DeliveryReceipt, NotifyError> {
        if phone.trim().is_empty() {
            return Err(NotifyError::MissingPhone);
        }
        let body = compose_body(message, map_link);
        tracing::info!(%phone, %body, "sms (log only)");
        Ok(DeliveryReceipt::now(format!("log-{}", uuid::Uuid::new_v4())))
    }
}
