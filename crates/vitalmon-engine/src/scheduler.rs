use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::interval;
use vitalmon_common::id;
use vitalmon_common::types::{AlertAction, AlertNotice, AlertState, Outcome};
use vitalmon_storage::store::{AlertInstanceRow, PendingTimerRow, ProcessingLogRow};

use crate::engine::{instance_key, AlertProcessor};
use crate::{EngineError, Result};

/// Worker loop over the durable delayed-action queue.
///
/// Timers live in the `pending_timers` table, so armed actions survive
/// restarts; overdue timers fire immediately in creation order on the next
/// poll. Execution synchronizes with the event path and manual actions only
/// through the database compare-and-set on the instance state: the CAS
/// winner runs the action exactly once, every loser is a no-op.
pub struct DelayedActionScheduler {
    processor: Arc<AlertProcessor>,
    shutdown: watch::Receiver<bool>,
}

impl DelayedActionScheduler {
    pub fn new(processor: Arc<AlertProcessor>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            processor,
            shutdown,
        }
    }

    /// Runs until the shutdown signal flips. Armed-but-unfired timers stay
    /// persisted and resume after restart; nothing is dropped silently.
    pub async fn run(mut self) {
        let tick_secs = self.processor.config.tick_secs.max(1);
        tracing::info!(tick_secs, "Delayed action scheduler started");

        let mut tick = interval(std::time::Duration::from_secs(tick_secs));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.poll_once(Utc::now()).await {
                        tracing::error!(error = %e, "Delayed action poll failed");
                    }
                    if let Err(e) = self.expire_overdue(Utc::now()).await {
                        tracing::error!(error = %e, "Expiry sweep failed");
                    }
                    self.processor.evict_idle_keys(Utc::now()).await;
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("Delayed action scheduler draining");
                        break;
                    }
                }
            }
        }
    }

    /// One poll cycle: claim and execute every due timer, oldest first.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self
            .processor
            .store
            .due_timers(now, self.processor.config.timer_batch)
            .await?;
        let count = due.len();
        for timer in due {
            if let Err(e) = self.fire(&timer, now).await {
                tracing::error!(
                    instance_id = %timer.instance_id,
                    error = %e,
                    "Timer execution failed"
                );
            }
        }
        Ok(count)
    }

    /// Executes one due timer.
    ///
    /// Re-reads the instance first: anything other than SCHEDULED means the
    /// alert was resolved or manually handled while the timer was pending,
    /// and the fire is a no-op. Otherwise the CAS claims the transition
    /// before the side effect runs, giving at-most-once execution under
    /// concurrent fire/cancel races.
    async fn fire(&self, timer: &PendingTimerRow, now: DateTime<Utc>) -> Result<()> {
        let p = &self.processor;
        let Some(inst) = p.store.get_alert_instance_by_id(&timer.instance_id).await? else {
            p.store.disarm_timer(&timer.instance_id).await?;
            return Ok(());
        };
        if inst.state != AlertState::Scheduled {
            p.store.disarm_timer(&timer.instance_id).await?;
            return Ok(());
        }

        let target = match timer.action {
            AlertAction::Notify | AlertAction::Ignore => AlertState::Processed,
            AlertAction::Escalate => AlertState::Escalated,
            AlertAction::AutoResolve => AlertState::Resolved,
        };
        let started = Instant::now();
        let claimed = p
            .store
            .transition_state(&inst.id, &[AlertState::Scheduled], target, now)
            .await?;
        if claimed.is_none() {
            // A concurrent resolution won the race; deterministic no-op.
            p.store.disarm_timer(&timer.instance_id).await?;
            return Ok(());
        }
        p.store.disarm_timer(&timer.instance_id).await?;

        let rule = p.rule_snapshot(&inst).await;
        let mut final_state = target;
        let mut outcome = Outcome::Success;
        let mut error = None;

        match timer.action {
            AlertAction::Notify | AlertAction::Escalate => {
                let notice = build_notice(&inst, &rule.name, timer.action == AlertAction::Escalate);
                match p.deliver_with_retry(&notice).await {
                    Ok(attempts) if attempts > 1 => {
                        tracing::warn!(
                            instance_id = %inst.id,
                            attempts,
                            "Notification delivered after retries"
                        );
                    }
                    Ok(_) => {}
                    Err(e @ EngineError::ActionExecution { .. }) => {
                        outcome = Outcome::Failure;
                        error = Some(e.to_string());
                        if timer.action == AlertAction::Notify {
                            // Degrade to manual handling.
                            if p.store
                                .transition_state(
                                    &inst.id,
                                    &[AlertState::Processed],
                                    AlertState::Escalated,
                                    Utc::now(),
                                )
                                .await?
                                .is_some()
                            {
                                final_state = AlertState::Escalated;
                            }
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            AlertAction::Ignore => {
                tracing::debug!(instance_id = %inst.id, "Alert ignored by rule action");
            }
            AlertAction::AutoResolve => {}
        }

        let duration_ms = started.elapsed().as_millis() as i64;
        p.append_log_with_retry(&ProcessingLogRow {
            id: id::next_id(),
            instance_id: inst.id.clone(),
            rule_id: inst.rule_id.clone(),
            tenant_id: inst.tenant_id.clone(),
            dedup_key: inst.dedup_key.clone(),
            from_state: Some(AlertState::Scheduled),
            to_state: final_state,
            action: Some(timer.action),
            actor: "auto".to_string(),
            outcome,
            error,
            event_json: None,
            duration_ms: Some(duration_ms),
            created_at: Utc::now(),
        })
        .await?;

        // Update the in-memory key state under the shard lock.
        let key = instance_key(&inst);
        let mut shard = p.shard_for(&key).lock().await;
        match final_state {
            AlertState::Resolved => {
                // AutoResolve action closes from SCHEDULED, so no cool-down.
                p.close_key_locked(&mut shard, &key, AlertState::Scheduled, 0, Utc::now());
            }
            state => {
                if let Some(active) = shard.active.get_mut(&key) {
                    active.state = state;
                }
            }
        }

        tracing::info!(
            instance_id = %inst.id,
            action = %timer.action,
            state = %final_state,
            outcome = %outcome,
            duration_ms,
            "Auto action executed"
        );
        Ok(())
    }

    /// Moves instances past the configured maximum lifetime to EXPIRED.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<usize> {
        let p = &self.processor;
        let cutoff = now - Duration::seconds(p.config.max_lifetime_secs as i64);
        let candidates = p
            .store
            .list_expiry_candidates(cutoff, p.config.timer_batch)
            .await?;
        let mut expired = 0usize;

        for inst in candidates {
            let key = instance_key(&inst);
            let mut shard = p.shard_for(&key).lock().await;
            let Some(prior) = p
                .store
                .transition_state(
                    &inst.id,
                    &[
                        AlertState::New,
                        AlertState::Scheduled,
                        AlertState::Processed,
                        AlertState::Escalated,
                    ],
                    AlertState::Expired,
                    now,
                )
                .await?
            else {
                continue;
            };
            p.store.disarm_timer(&inst.id).await?;

            p.append_log_with_retry(&ProcessingLogRow {
                id: id::next_id(),
                instance_id: inst.id.clone(),
                rule_id: inst.rule_id.clone(),
                tenant_id: inst.tenant_id.clone(),
                dedup_key: inst.dedup_key.clone(),
                from_state: Some(prior),
                to_state: AlertState::Expired,
                action: None,
                actor: "system".to_string(),
                outcome: Outcome::Success,
                error: None,
                event_json: None,
                duration_ms: None,
                created_at: now,
            })
            .await?;

            let rule = p.rule_snapshot(&inst).await;
            p.close_key_locked(&mut shard, &key, prior, rule.suppress_duration_mins, now);
            expired += 1;
            tracing::warn!(
                instance_id = %inst.id,
                dedup_key = %inst.dedup_key,
                from = %prior,
                "Alert instance expired"
            );
        }
        Ok(expired)
    }
}

fn build_notice(inst: &AlertInstanceRow, rule_name: &str, escalation: bool) -> AlertNotice {
    let message = match inst.trigger_value {
        Some(v) => format!(
            "{} on device {} breached ({} = {:.1}, seen {} times)",
            rule_name, inst.device_id, inst.signal, v, inst.occurrence_count
        ),
        None => format!(
            "{} on device {} ({} event, seen {} times)",
            rule_name, inst.device_id, inst.signal, inst.occurrence_count
        ),
    };
    AlertNotice {
        instance_id: inst.id.clone(),
        rule_id: inst.rule_id.clone(),
        rule_name: rule_name.to_string(),
        tenant_id: inst.tenant_id.clone(),
        org_id: inst.org_id.clone(),
        device_id: inst.device_id.clone(),
        signal: inst.signal.clone(),
        level: inst.level,
        escalation,
        message,
        value: inst.trigger_value,
        occurrence_count: inst.occurrence_count,
        created_at: inst.created_at,
    }
}
