//! Push notification dispatchers.
//!
//! [`WebhookNotifier`] posts each notification as JSON to a push gateway;
//! [`LogNotifier`] only logs it and is used when no gateway is configured.

use appeals_core::ports::{PushNotification, PushNotifier};
use appeals_core::{AppealsError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Posts notifications to an HTTP push gateway.
#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Notifier posting to `url`, each call bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppealsError::Internal(format!("Failed to build push client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PushNotifier for WebhookNotifier {
    async fn push(&self, notification: &PushNotification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| AppealsError::Internal(format!("Push request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppealsError::Internal(format!(
                "Push gateway answered {status}"
            )));
        }

        tracing::debug!(user_id = %notification.user_id, "Push delivered");
        Ok(())
    }
}

/// Logs notifications instead of sending them.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl PushNotifier for LogNotifier {
    async fn push(&self, notification: &PushNotification) -> Result<()> {
        tracing::info!(
            user_id = %notification.user_id,
            ticket_id = %notification.data.ticket_id,
            message_id = %notification.data.message_id,
            title = %notification.title,
            "Push notification (no gateway configured)"
        );
        Ok(())
    }
}
