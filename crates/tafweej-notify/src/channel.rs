//! Notification channel senders.
//!
//! A [`ChannelSender`] turns a classified alert into one delivery attempt
//! on one medium. The shipped implementation posts a JSON payload to a
//! per-channel endpoint on the delivery gateway; the gateway owns the
//! actual push/SMS/WhatsApp/email mechanics and this process never waits
//! for delivery receipts.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use tafweej_core::config::GatewayConfig;
use tafweej_core::types::{Alert, NotificationChannel};

use crate::error::{NotifyError, Result};

/// One delivery medium for classified alerts.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender delivers on.
    fn channel(&self) -> NotificationChannel;

    /// Attempt delivery of a rendered notification.
    async fn send(&self, alert: &Alert, title: &str, body: &str) -> Result<()>;
}

/// JSON payload posted to the gateway.
#[derive(Debug, Serialize)]
struct GatewayPayload<'a> {
    channel: &'a str,
    alert_id: i64,
    stage_id: i64,
    priority: &'a str,
    title: &'a str,
    body: &'a str,
}

/// Sender that posts notifications to an HTTP delivery gateway.
pub struct HttpGatewaySender {
    channel: NotificationChannel,
    client: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl HttpGatewaySender {
    /// Build a sender for `channel` against the configured gateway.
    ///
    /// The in-app channel has no transport; requesting a sender for it is
    /// a caller error.
    pub fn from_config(channel: NotificationChannel, config: &GatewayConfig) -> Result<Self> {
        let path = match channel {
            NotificationChannel::Push => &config.push_path,
            NotificationChannel::Sms => &config.sms_path,
            NotificationChannel::Whatsapp => &config.whatsapp_path,
            NotificationChannel::Email => &config.email_path,
            NotificationChannel::InApp => {
                return Err(NotifyError::UnknownChannel("in_app".to_string()))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::ClientBuild(e.to_string()))?;

        Ok(Self {
            channel,
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), path),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Endpoint this sender posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChannelSender for HttpGatewaySender {
    fn channel(&self) -> NotificationChannel {
        self.channel
    }

    async fn send(&self, alert: &Alert, title: &str, body: &str) -> Result<()> {
        let payload = GatewayPayload {
            channel: self.channel.as_str(),
            alert_id: alert.id,
            stage_id: alert.stage_id,
            priority: alert.priority.as_str(),
            title,
            body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::from_request_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::GatewayStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
