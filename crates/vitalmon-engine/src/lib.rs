//! Alert rule evaluation and auto-processing engine.
//!
//! Incoming wearable events are matched against the [`registry::RuleRegistry`],
//! deduplicated through the per-key [`suppression::SuppressionWindow`], and
//! turned into alert instances whose automatic action is armed as a durable
//! timer and fired by the [`scheduler::DelayedActionScheduler`]. The
//! [`tracker::AutoResolveTracker`] closes alerts after enough consecutive
//! normal readings. Events for the same dedup key are serialized through a
//! per-key shard lock; timer execution synchronizes with the event path only
//! through the database compare-and-set on the instance state.

pub mod engine;
pub mod instance;
pub mod registry;
pub mod scheduler;
pub mod suppression;
pub mod tracker;

#[cfg(test)]
mod tests;

use vitalmon_common::types::{AlertAction, Severity};
use vitalmon_storage::StorageError;

/// Errors produced by the engine and its configuration surface.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed thresholds/durations at rule save time; rejected
    /// synchronously, never persisted.
    #[error("rule validation failed: {reason}")]
    RuleValidation { reason: String },

    /// An identical enabled rule already covers this match key.
    #[error("conflicting enabled rule {existing_id} for ({tenant_id}, {signal}, {level})")]
    DuplicateRule {
        existing_id: String,
        tenant_id: String,
        signal: String,
        level: Severity,
    },

    /// The durable timer store could not record a new timer. The instance
    /// falls back to manual handling.
    #[error("failed to persist timer for instance {instance_id}: {source}")]
    SchedulerPersistence {
        instance_id: String,
        #[source]
        source: StorageError,
    },

    /// The configured auto-action's downstream collaborator failed after
    /// bounded retries.
    #[error("action {action} failed after {attempts} attempts")]
    ActionExecution { action: AlertAction, attempts: u32 },

    /// The event cannot be correlated (no signal, unknown instance, ...).
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine runtime knobs, injected at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of per-key shards; events on different keys in different
    /// shards run fully in parallel.
    pub shards: usize,
    /// Delayed-action worker poll interval.
    pub tick_secs: u64,
    /// Max due timers claimed per poll.
    pub timer_batch: usize,
    /// Instances not terminal after this lifetime are expired by the sweep.
    pub max_lifetime_secs: u64,
    /// Bounded retries for notify/escalate delivery on top of the
    /// channel-internal ones.
    pub action_max_retries: u32,
    /// Base backoff between action retries, doubled per attempt.
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shards: 16,
            tick_secs: 1,
            timer_batch: 64,
            max_lifetime_secs: 86400,
            action_max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}
