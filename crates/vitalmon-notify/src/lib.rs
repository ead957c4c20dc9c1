//! Notification delivery framework with pluggable channel support.
//!
//! Alert notices produced by the auto-processing engine are routed to one
//! or more [`NotificationChannel`] implementations based on severity.
//! Built-in channels: webhook and SMS gateway. Channel-specific retry and
//! backoff live inside the channel implementations; the engine only sees
//! delivered-or-failed.

pub mod channels;
pub mod manager;
pub mod plugin;


use anyhow::Result;
use async_trait::async_trait;
use vitalmon_common::types::AlertNotice;

/// Delivery result for one channel send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Recipients the channel accepted the notice for.
    pub delivered: u32,
    /// Recipients that failed after the channel's own retries.
    pub failed: u32,
    /// Retries spent across all recipients.
    pub retry_count: u32,
}

impl SendReceipt {
    pub fn all_failed(&self) -> bool {
        self.delivered == 0 && self.failed > 0
    }
}

/// A notification delivery channel that pushes alert notices to an external
/// service (e.g., webhook endpoint, SMS gateway).
///
/// Implementations are created by the corresponding [`plugin::ChannelPlugin`]
/// and bound to recipients in the [`manager::NotificationManager`].
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers the notice to the given recipients.
    ///
    /// # Errors
    ///
    /// Returns an error only on unrecoverable channel failures; individual
    /// recipient failures are reported through the [`SendReceipt`].
    async fn send(&self, notice: &AlertNotice, recipients: &[String]) -> Result<SendReceipt>;

    /// Returns the channel type name (e.g., `"webhook"`, `"sms"`).
    fn channel_type(&self) -> &str;
}
