//! Notification fan-out dispatcher.
//!
//! Given a classified alert, the dispatcher walks the alert's channel set
//! and attempts delivery on each, independently. Each transport attempt
//! first records a pending outbox row, then invokes the channel sender and
//! flips the row to sent or failed. A failing channel is logged and
//! counted; it never blocks the remaining channels, is never retried
//! within the pass, and never touches the persisted alert.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use tafweej_core::config::GatewayConfig;
use tafweej_core::repo::{NewNotification, NotificationLog};
use tafweej_core::types::{Alert, NotificationChannel};

use crate::channel::{ChannelSender, HttpGatewaySender};
use crate::error::Result;

/// Outcome counts for one alert's fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Channels named by the alert
    pub requested: usize,
    /// Transport deliveries that succeeded
    pub delivered: usize,
    /// Transport deliveries that failed
    pub failed: usize,
    /// Channels satisfied without a transport call (in-app)
    pub satisfied_by_persistence: usize,
    /// Channels with no registered sender
    pub unroutable: usize,
}

/// Fan-out dispatcher over the registered channel senders.
pub struct NotificationDispatcher {
    senders: HashMap<NotificationChannel, Arc<dyn ChannelSender>>,
    log: Arc<dyn NotificationLog>,
}

impl NotificationDispatcher {
    /// Create an empty dispatcher; register senders afterwards.
    pub fn new(log: Arc<dyn NotificationLog>) -> Self {
        Self {
            senders: HashMap::new(),
            log,
        }
    }

    /// Create a dispatcher with HTTP gateway senders for every transport
    /// channel.
    pub fn from_gateway_config(log: Arc<dyn NotificationLog>, config: &GatewayConfig) -> Result<Self> {
        let mut dispatcher = Self::new(log);
        for channel in [
            NotificationChannel::Push,
            NotificationChannel::Sms,
            NotificationChannel::Whatsapp,
            NotificationChannel::Email,
        ] {
            let sender = HttpGatewaySender::from_config(channel, config)?;
            dispatcher = dispatcher.with_sender(Arc::new(sender));
        }
        Ok(dispatcher)
    }

    /// Register a sender for its channel, replacing any previous one.
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    /// Channels that currently have a registered sender.
    pub fn registered_channels(&self) -> Vec<NotificationChannel> {
        self.senders.keys().copied().collect()
    }

    /// Fan an alert out to every channel in its channel set.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchSummary {
        let mut summary = DispatchSummary {
            requested: alert.channels.len(),
            ..Default::default()
        };

        let title = alert.title();

        for &channel in &alert.channels {
            if !channel.requires_transport() {
                // In-app presence is satisfied by the alert row itself.
                summary.satisfied_by_persistence += 1;
                continue;
            }

            let Some(sender) = self.senders.get(&channel) else {
                warn!(alert_id = alert.id, channel = %channel, "no sender registered for channel");
                summary.unroutable += 1;
                continue;
            };

            // Persist the outbound record before attempting delivery so
            // downstream reconciliation sees every attempt. A failed write
            // here is logged and the delivery still goes out.
            let notification_id = match self
                .log
                .record_pending(NewNotification {
                    alert_id: alert.id,
                    channel,
                    title: title.clone(),
                    body: alert.message.clone(),
                })
                .await
            {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(alert_id = alert.id, channel = %channel, error = %e,
                        "failed to record outbound notification");
                    None
                }
            };

            match sender.send(alert, &title, &alert.message).await {
                Ok(()) => {
                    debug!(alert_id = alert.id, channel = %channel, "notification delivered");
                    summary.delivered += 1;
                    if let Some(id) = notification_id {
                        if let Err(e) = self.log.mark_sent(id).await {
                            warn!(notification_id = id, error = %e, "failed to mark notification sent");
                        }
                    }
                }
                Err(e) => {
                    error!(alert_id = alert.id, channel = %channel, error = %e,
                        "notification delivery failed");
                    summary.failed += 1;
                    if let Some(id) = notification_id {
                        if let Err(log_err) = self.log.mark_failed(id, &e.to_string()).await {
                            warn!(notification_id = id, error = %log_err,
                                "failed to mark notification failed");
                        }
                    }
                }
            }
        }

        debug!(
            alert_id = alert.id,
            requested = summary.requested,
            delivered = summary.delivered,
            failed = summary.failed,
            "dispatch complete"
        );

        summary
    }
}
