use crate::{NotificationChannel, SendReceipt};
use vitalmon_common::types::{AlertNotice, Severity};

/// A channel bound to its recipients and a severity floor.
pub struct ChannelBinding {
    pub channel: Box<dyn NotificationChannel>,
    pub recipients: Vec<String>,
    pub min_severity: Severity,
}

impl ChannelBinding {
    pub fn should_send(&self, level: Severity) -> bool {
        level >= self.min_severity
    }
}

/// Dispatch summary across all matched channels.
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub delivered: usize,
    pub retry_count: u32,
}

impl DispatchSummary {
    /// True when at least one channel matched and none delivered. The
    /// engine treats this as an action execution failure; a notice with no
    /// matching channel is not a failure of the collaborator.
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.delivered == 0
    }
}

/// Routes alert notices to the configured channels by severity.
pub struct NotificationManager {
    bindings: Vec<ChannelBinding>,
}

impl NotificationManager {
    pub fn new(bindings: Vec<ChannelBinding>) -> Self {
        Self { bindings }
    }

    pub fn channel_count(&self) -> usize {
        self.bindings.len()
    }

    /// Sends the notice through every binding whose severity floor is met.
    pub async fn dispatch(&self, notice: &AlertNotice) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for binding in &self.bindings {
            if !binding.should_send(notice.level) {
                continue;
            }
            summary.attempted += 1;

            match binding.channel.send(notice, &binding.recipients).await {
                Ok(SendReceipt {
                    delivered,
                    failed,
                    retry_count,
                }) => {
                    summary.retry_count += retry_count;
                    if delivered > 0 || failed == 0 {
                        summary.delivered += 1;
                    } else {
                        tracing::error!(
                            channel = binding.channel.channel_type(),
                            instance_id = %notice.instance_id,
                            "All recipients failed for channel"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        channel = binding.channel.channel_type(),
                        instance_id = %notice.instance_id,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
        }

        if summary.attempted == 0 {
            tracing::warn!(
                instance_id = %notice.instance_id,
                level = %notice.level,
                "No notification channel matched the alert severity"
            );
        }

        summary
    }
}
