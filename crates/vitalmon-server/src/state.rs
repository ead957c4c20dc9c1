use anyhow::Result;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use vitalmon_common::types::Severity;
use vitalmon_engine::engine::AlertProcessor;
use vitalmon_notify::manager::{ChannelBinding, NotificationManager};
use vitalmon_notify::plugin::ChannelRegistry;
use vitalmon_storage::store::ProcessStore;

use crate::config::{ChannelSeed, ServerConfig};
use crate::stats::StatisticsAggregator;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProcessStore>,
    pub processor: Arc<AlertProcessor>,
    pub stats: Arc<StatisticsAggregator>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

/// Instantiates the configured notification channels through the plugin
/// registry. Invalid channel configs fail startup rather than silently
/// dropping a delivery path.
pub fn build_notifier(
    registry: &ChannelRegistry,
    seeds: &[ChannelSeed],
) -> Result<NotificationManager> {
    let mut bindings = Vec::new();
    for seed in seeds {
        let channel = registry.create_channel(&seed.channel_type, &seed.config)?;
        let min_severity = Severity::from_str(&seed.min_severity)
            .map_err(|e| anyhow::anyhow!("invalid min_severity: {e}"))?;
        bindings.push(ChannelBinding {
            channel,
            recipients: seed.recipients.clone(),
            min_severity,
        });
    }
    Ok(NotificationManager::new(bindings))
}
