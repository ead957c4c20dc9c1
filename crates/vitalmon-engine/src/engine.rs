use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use vitalmon_common::id;
use vitalmon_common::types::{
    AlertAction, AlertNotice, AlertRule, AlertState, DedupKey, Outcome, VitalEvent,
};
use vitalmon_notify::manager::NotificationManager;
use vitalmon_storage::store::{
    AlertInstanceRow, AlertRuleUpdate, PendingTimerRow, ProcessStore, ProcessingLogRow,
};

use crate::instance::RESOLVABLE;
use crate::registry::{self, RuleRegistry};
use crate::suppression::{Admission, SuppressionWindow};
use crate::tracker::{AutoResolveTracker, Observation};
use crate::{EngineConfig, EngineError, Result};

const LOG_APPEND_ATTEMPTS: u32 = 3;

/// Per-event decision returned to the ingestion boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum EventDecision {
    /// First non-duplicate breaching event: a new alert instance.
    Created {
        instance_id: String,
        scheduled: bool,
    },
    /// Merged into the live instance for the key.
    Duplicate {
        instance_id: String,
        occurrence_count: i64,
    },
    /// Blocked by post-processing suppression.
    Suppressed { dedup_key: String },
    /// A normal reading completed the auto-resolve streak.
    AutoResolved { instance_id: String },
    /// No rule matched, or the reading was in range.
    Observed,
}

/// The live instance bound to a dedup key. The cached state mirrors the
/// database row; the DB compare-and-set stays authoritative.
#[derive(Clone)]
pub struct ActiveAlert {
    pub instance_id: String,
    pub rule: Arc<AlertRule>,
    pub state: AlertState,
}

pub(crate) struct Shard {
    pub windows: SuppressionWindow,
    pub trackers: AutoResolveTracker,
    pub active: HashMap<DedupKey, ActiveAlert>,
}

impl Shard {
    fn new() -> Self {
        Self {
            windows: SuppressionWindow::new(),
            trackers: AutoResolveTracker::new(),
            active: HashMap::new(),
        }
    }
}

/// The alert rule evaluation & auto-processing engine.
///
/// Owns the rule registry and the sharded per-key state; persistence and
/// notification collaborators are injected at construction so isolated
/// engine instances can be stood up for tests and per-tenant sharding.
pub struct AlertProcessor {
    pub(crate) store: Arc<ProcessStore>,
    pub(crate) notifier: Arc<NotificationManager>,
    pub(crate) registry: RwLock<RuleRegistry>,
    pub(crate) shards: Vec<Mutex<Shard>>,
    pub(crate) config: EngineConfig,
}

impl AlertProcessor {
    /// Builds the engine: loads enabled rules, rebuilds per-key state from
    /// open instances, and re-arms recent post-processing cool-downs.
    pub async fn bootstrap(
        store: Arc<ProcessStore>,
        notifier: Arc<NotificationManager>,
        config: EngineConfig,
    ) -> Result<Arc<Self>> {
        let rules = store.list_enabled_rules().await?;
        let registry = RuleRegistry::new(rules);
        let shard_count = config.shards.max(1);
        let shards = (0..shard_count).map(|_| Mutex::new(Shard::new())).collect();

        let processor = Arc::new(Self {
            store,
            notifier,
            registry: RwLock::new(registry),
            shards,
            config,
        });
        processor.restore_state().await?;
        Ok(processor)
    }

    pub fn store(&self) -> &Arc<ProcessStore> {
        &self.store
    }

    pub async fn rule_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Rebuilds the registry from the rule table. Called after every rule
    /// change; live instances keep the rule snapshot they were created with.
    pub async fn reload_rules(&self) -> Result<()> {
        let rules = self.store.list_enabled_rules().await?;
        let mut registry = self.registry.write().await;
        *registry = RuleRegistry::new(rules);
        tracing::info!(count = registry.len(), "Alert rules reloaded");
        Ok(())
    }

    // ---- Event hot path ----

    /// Processes one event: rule match, admission, instance creation /
    /// duplicate merge, auto-processing arm, auto-resolve observation.
    ///
    /// Events for the same dedup key are serialized by the shard lock;
    /// different keys proceed in parallel.
    pub async fn process_event(&self, event: &VitalEvent) -> Result<EventDecision> {
        let key = DedupKey::from_event(event).ok_or_else(|| EngineError::InvalidEvent {
            reason: "event names neither physical_sign nor event_type".to_string(),
        })?;
        let now = event.timestamp;
        let candidates = { self.registry.read().await.match_event(event) };
        // The governing rule is the best candidate whose band the event
        // actually breaches: a bradycardia rule still fires while a
        // higher-severity tachycardia rule covers the same signal.
        let breaching_rule = candidates.iter().find(|r| r.is_breaching(event)).cloned();

        let mut shard = self.shard_for(&key).lock().await;
        let mut decision = EventDecision::Observed;

        if let Some(rule) = &breaching_rule {
            let active_state = shard.active.get(&key).map(|a| a.state);
            match shard
                .windows
                .admit(&key, now, rule.time_window_secs, active_state)
            {
                Admission::Duplicate => {
                    if let Some(active) = shard.active.get(&key) {
                        let instance_id = active.instance_id.clone();
                        if let Some(updated) = self.store.record_duplicate(&instance_id, now).await?
                        {
                            decision = EventDecision::Duplicate {
                                instance_id,
                                occurrence_count: updated.occurrence_count,
                            };
                        }
                    }
                }
                Admission::Suppressed => {
                    tracing::debug!(
                        dedup_key = %key,
                        rule_id = %rule.id,
                        "Alert suppressed (post-processing cool-down)"
                    );
                    decision = EventDecision::Suppressed {
                        dedup_key: key.to_string(),
                    };
                }
                Admission::NewInstance => {
                    decision = self
                        .open_instance(&mut shard, &key, rule.clone(), event, now)
                        .await?;
                }
            }
        }

        // Every event on the key feeds the auto-resolve counter, judged
        // against the active instance's rule band.
        let tracker_rule = shard
            .active
            .get(&key)
            .map(|a| a.rule.clone())
            .or(breaching_rule)
            .or_else(|| candidates.into_iter().next());
        if let Some(rule) = tracker_rule {
            let breaching = rule.is_breaching(event);
            if let Observation::ThresholdMet = shard.trackers.observe(&key, &rule, breaching) {
                if let Some(resolved_id) = self.auto_resolve(&mut shard, &key, now).await? {
                    decision = EventDecision::AutoResolved {
                        instance_id: resolved_id,
                    };
                }
            }
        }

        Ok(decision)
    }

    async fn open_instance(
        &self,
        shard: &mut Shard,
        key: &DedupKey,
        rule: Arc<AlertRule>,
        event: &VitalEvent,
        now: DateTime<Utc>,
    ) -> Result<EventDecision> {
        let inst = AlertInstanceRow {
            id: id::next_id(),
            dedup_key: key.to_string(),
            tenant_id: key.tenant_id.clone(),
            org_id: key.org_id.clone(),
            device_id: key.device_id.clone(),
            signal: key.signal.clone(),
            rule_id: rule.id.clone(),
            level: rule.level,
            action: rule.auto_process_action,
            state: AlertState::New,
            occurrence_count: 1,
            trigger_value: event.value,
            window_started_at: now,
            last_seen_at: now,
            processed_at: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        let inst = self.store.insert_alert_instance(&inst).await?;

        shard.active.insert(
            key.clone(),
            ActiveAlert {
                instance_id: inst.id.clone(),
                rule: rule.clone(),
                state: AlertState::New,
            },
        );
        shard.trackers.reset(key);

        let event_json = serde_json::to_string(event).ok();
        self.append_log_with_retry(&ProcessingLogRow {
            id: id::next_id(),
            instance_id: inst.id.clone(),
            rule_id: rule.id.clone(),
            tenant_id: inst.tenant_id.clone(),
            dedup_key: inst.dedup_key.clone(),
            from_state: None,
            to_state: AlertState::New,
            action: None,
            actor: "auto".to_string(),
            outcome: Outcome::Success,
            error: None,
            event_json,
            duration_ms: None,
            created_at: now,
        })
        .await?;

        let mut scheduled = false;
        if rule.auto_process_enabled {
            match self.arm_auto_processing(&inst, &rule, now).await {
                Ok(()) => {
                    scheduled = true;
                    if let Some(active) = shard.active.get_mut(key) {
                        active.state = AlertState::Scheduled;
                    }
                }
                Err(EngineError::SchedulerPersistence {
                    instance_id,
                    source,
                }) => {
                    // The instance stays NEW and requires manual handling.
                    tracing::error!(
                        instance_id = %instance_id,
                        rule_id = %rule.id,
                        error = %source,
                        "Timer persistence failed; instance falls back to manual handling"
                    );
                    self.append_log_with_retry(&ProcessingLogRow {
                        id: id::next_id(),
                        instance_id: inst.id.clone(),
                        rule_id: rule.id.clone(),
                        tenant_id: inst.tenant_id.clone(),
                        dedup_key: inst.dedup_key.clone(),
                        from_state: Some(AlertState::New),
                        to_state: AlertState::New,
                        action: Some(rule.auto_process_action),
                        actor: "system".to_string(),
                        outcome: Outcome::Failure,
                        error: Some(source.to_string()),
                        event_json: None,
                        duration_ms: None,
                        created_at: now,
                    })
                    .await?;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            instance_id = %inst.id,
            dedup_key = %inst.dedup_key,
            rule_id = %rule.id,
            level = %rule.level,
            scheduled,
            "Alert instance created"
        );
        Ok(EventDecision::Created {
            instance_id: inst.id,
            scheduled,
        })
    }

    /// Arms exactly one durable timer for the instance and moves it to
    /// SCHEDULED. A persistence failure is surfaced as
    /// [`EngineError::SchedulerPersistence`].
    async fn arm_auto_processing(
        &self,
        inst: &AlertInstanceRow,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let timer = PendingTimerRow {
            id: id::next_id(),
            instance_id: inst.id.clone(),
            rule_id: rule.id.clone(),
            dedup_key: inst.dedup_key.clone(),
            action: rule.auto_process_action,
            fire_at: now + Duration::seconds(rule.auto_process_delay_secs as i64),
            created_at: now,
        };
        self.store
            .arm_timer(&timer)
            .await
            .map_err(|e| EngineError::SchedulerPersistence {
                instance_id: inst.id.clone(),
                source: e,
            })?;

        self.store
            .transition_state(&inst.id, &[AlertState::New], AlertState::Scheduled, now)
            .await?;
        self.append_log_with_retry(&ProcessingLogRow {
            id: id::next_id(),
            instance_id: inst.id.clone(),
            rule_id: rule.id.clone(),
            tenant_id: inst.tenant_id.clone(),
            dedup_key: inst.dedup_key.clone(),
            from_state: Some(AlertState::New),
            to_state: AlertState::Scheduled,
            action: Some(rule.auto_process_action),
            actor: "auto".to_string(),
            outcome: Outcome::Success,
            error: None,
            event_json: None,
            duration_ms: None,
            created_at: now,
        })
        .await?;
        Ok(())
    }

    /// Resolves the active instance after the in-range streak completed.
    /// Returns the resolved instance id, or `None` when a racing transition
    /// already closed it.
    async fn auto_resolve(
        &self,
        shard: &mut Shard,
        key: &DedupKey,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let Some(active) = shard.active.get(key).cloned() else {
            return Ok(None);
        };

        let prior = self
            .store
            .transition_state(&active.instance_id, &RESOLVABLE, AlertState::Resolved, now)
            .await?;
        let Some(prior) = prior else {
            // Lost the race (manual close or expiry); drop stale key state.
            shard.active.remove(key);
            shard.trackers.evict(key);
            return Ok(None);
        };

        self.store.disarm_timer(&active.instance_id).await?;
        self.append_log_with_retry(&ProcessingLogRow {
            id: id::next_id(),
            instance_id: active.instance_id.clone(),
            rule_id: active.rule.id.clone(),
            tenant_id: key.tenant_id.clone(),
            dedup_key: key.to_string(),
            from_state: Some(prior),
            to_state: AlertState::Resolved,
            action: Some(AlertAction::AutoResolve),
            actor: "auto".to_string(),
            outcome: Outcome::Success,
            error: None,
            event_json: None,
            duration_ms: None,
            created_at: now,
        })
        .await?;

        tracing::info!(
            instance_id = %active.instance_id,
            dedup_key = %key,
            from = %prior,
            "Alert auto-resolved"
        );
        self.close_key_locked(shard, key, prior, active.rule.suppress_duration_mins, now);
        Ok(Some(active.instance_id))
    }

    /// Evicts key state on a terminal transition, arming the
    /// post-processing cool-down when the instance had been processed or
    /// escalated.
    pub(crate) fn close_key_locked(
        &self,
        shard: &mut Shard,
        key: &DedupKey,
        prior: AlertState,
        suppress_duration_mins: u64,
        now: DateTime<Utc>,
    ) {
        if matches!(prior, AlertState::Processed | AlertState::Escalated)
            && suppress_duration_mins > 0
        {
            let until = now + Duration::minutes(suppress_duration_mins as i64);
            shard.windows.start_cooldown(key, until);
        } else {
            shard.windows.clear(key);
        }
        shard.active.remove(key);
        shard.trackers.evict(key);
    }

    // ---- Manual operator actions ----

    /// Manual close. Idempotent against races: returns `false` when the
    /// instance is already terminal or unknown.
    pub async fn manual_resolve(&self, instance_id: &str, operator: &str) -> Result<bool> {
        self.manual_transition(instance_id, operator, &RESOLVABLE, AlertState::Resolved)
            .await
    }

    /// Operator mute of a not-yet-processed instance.
    pub async fn manual_suppress(&self, instance_id: &str, operator: &str) -> Result<bool> {
        self.manual_transition(
            instance_id,
            operator,
            &[AlertState::New, AlertState::Scheduled],
            AlertState::Suppressed,
        )
        .await
    }

    async fn manual_transition(
        &self,
        instance_id: &str,
        operator: &str,
        from: &[AlertState],
        to: AlertState,
    ) -> Result<bool> {
        let Some(inst) = self.store.get_alert_instance_by_id(instance_id).await? else {
            return Ok(false);
        };
        let key = instance_key(&inst);
        let mut shard = self.shard_for(&key).lock().await;
        let now = Utc::now();

        let Some(prior) = self.store.transition_state(instance_id, from, to, now).await? else {
            return Ok(false);
        };
        self.store.disarm_timer(instance_id).await?;

        self.append_log_with_retry(&ProcessingLogRow {
            id: id::next_id(),
            instance_id: inst.id.clone(),
            rule_id: inst.rule_id.clone(),
            tenant_id: inst.tenant_id.clone(),
            dedup_key: inst.dedup_key.clone(),
            from_state: Some(prior),
            to_state: to,
            action: None,
            actor: format!("manual:{operator}"),
            outcome: Outcome::Success,
            error: None,
            event_json: None,
            duration_ms: None,
            created_at: now,
        })
        .await?;

        let suppress_mins = match shard.active.get(&key) {
            Some(active) => active.rule.suppress_duration_mins,
            None => self
                .store
                .get_alert_rule_by_id(&inst.rule_id)
                .await?
                .map(|r| r.suppress_duration_mins)
                .unwrap_or(0),
        };
        self.close_key_locked(&mut shard, &key, prior, suppress_mins, now);

        tracing::info!(
            instance_id = %instance_id,
            operator = %operator,
            from = %prior,
            to = %to,
            "Manual transition applied"
        );
        Ok(true)
    }

    // ---- Rule configuration surface ----

    /// Validates and persists a new rule, then reloads the registry.
    pub async fn create_rule(&self, rule: AlertRule) -> Result<AlertRule> {
        registry::validate_rule(&rule)?;
        if rule.enabled {
            self.check_conflict(&rule, None).await?;
        }
        let created = self.store.insert_alert_rule(&rule).await?;
        self.reload_rules().await?;
        Ok(created)
    }

    /// Applies a partial update after validating the merged result.
    pub async fn update_rule(
        &self,
        id: &str,
        update: &AlertRuleUpdate,
    ) -> Result<Option<AlertRule>> {
        let Some(existing) = self.store.get_alert_rule_by_id(id).await? else {
            return Ok(None);
        };
        let merged = merge_rule(&existing, update);
        registry::validate_rule(&merged)?;
        if merged.enabled {
            self.check_conflict(&merged, Some(id)).await?;
        }
        let updated = self.store.update_alert_rule(id, update).await?;
        self.reload_rules().await?;
        Ok(updated)
    }

    pub async fn delete_rule(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_alert_rule(id).await?;
        if deleted {
            self.reload_rules().await?;
        }
        Ok(deleted)
    }

    /// Enables or disables one rule. Enabling re-checks the conflict
    /// invariant; disabling never touches live instances.
    pub async fn set_rule_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        if enabled {
            if let Some(rule) = self.store.get_alert_rule_by_id(id).await? {
                self.check_conflict(&rule, Some(id)).await?;
            }
        }
        let changed = self.store.set_rule_enabled(id, enabled).await?;
        if changed {
            self.reload_rules().await?;
        }
        Ok(changed)
    }

    pub async fn set_rules_enabled(&self, ids: &[String], enabled: bool) -> Result<u64> {
        let changed = self.store.set_rules_enabled(ids, enabled).await?;
        if changed > 0 {
            self.reload_rules().await?;
        }
        Ok(changed)
    }

    /// Imports a rule set (e.g. a previously exported one). Conflicting or
    /// invalid rules are skipped; returns (created, skipped).
    pub async fn import_rules(&self, rules: Vec<AlertRule>) -> Result<(u32, u32)> {
        let mut created = 0u32;
        let mut skipped = 0u32;
        for mut rule in rules {
            rule.id = id::next_id();
            rule.source = "import".to_string();
            if registry::validate_rule(&rule).is_err() {
                skipped += 1;
                continue;
            }
            if rule.enabled && self.check_conflict(&rule, None).await.is_err() {
                tracing::warn!(name = %rule.name, "Imported rule conflicts with an enabled rule, skipping");
                skipped += 1;
                continue;
            }
            self.store.insert_alert_rule(&rule).await?;
            created += 1;
        }
        if created > 0 {
            self.reload_rules().await?;
        }
        Ok((created, skipped))
    }

    async fn check_conflict(&self, rule: &AlertRule, exclude_id: Option<&str>) -> Result<()> {
        let conflict = self
            .store
            .find_conflicting_rule(
                &rule.tenant_id,
                rule.physical_sign.as_deref(),
                rule.event_type.as_deref(),
                rule.level,
                exclude_id,
            )
            .await?;
        if let Some(existing) = conflict {
            return Err(EngineError::DuplicateRule {
                existing_id: existing.id,
                tenant_id: rule.tenant_id.clone(),
                signal: rule.signal().unwrap_or_default().to_string(),
                level: rule.level,
            });
        }
        Ok(())
    }

    // ---- Internals shared with the scheduler ----

    pub(crate) fn shard_for(&self, key: &DedupKey) -> &Mutex<Shard> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Appends a processing log entry, retrying before giving up. A write
    /// failure after retries is surfaced; transitions are never silently
    /// unrecorded.
    pub(crate) async fn append_log_with_retry(&self, row: &ProcessingLogRow) -> Result<()> {
        let mut last_err = None;
        for attempt in 1..=LOG_APPEND_ATTEMPTS {
            match self.store.append_log(row).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        instance_id = %row.instance_id,
                        error = %e,
                        "Processing log append failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }
        Err(EngineError::Storage(last_err.expect("retry loop ran")))
    }

    /// Resolves the rule an instance was created under: registry first,
    /// then the rule table (disabled rules included), then a conservative
    /// snapshot built from the instance row.
    pub(crate) async fn rule_snapshot(&self, inst: &AlertInstanceRow) -> Arc<AlertRule> {
        if let Some(rule) = self.registry.read().await.get(&inst.rule_id) {
            return rule;
        }
        match self.store.get_alert_rule_by_id(&inst.rule_id).await {
            Ok(Some(rule)) => Arc::new(rule),
            _ => {
                tracing::warn!(
                    instance_id = %inst.id,
                    rule_id = %inst.rule_id,
                    "Rule no longer exists; using conservative snapshot"
                );
                Arc::new(synthetic_rule(inst))
            }
        }
    }

    /// Delivers a notice with bounded engine-level retries on top of the
    /// channel-internal ones.
    pub(crate) async fn deliver_with_retry(&self, notice: &AlertNotice) -> Result<u32> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let summary = self.notifier.dispatch(notice).await;
            if !summary.all_failed() {
                return Ok(attempts);
            }
            if attempts >= self.config.action_max_retries {
                let action = if notice.escalation {
                    AlertAction::Escalate
                } else {
                    AlertAction::Notify
                };
                return Err(EngineError::ActionExecution { action, attempts });
            }
            let backoff = self.config.retry_backoff_ms * 2u64.pow(attempts - 1);
            tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
        }
    }

    /// Memory bound: drops window/streak entries for keys with no live
    /// instance once their cool-down passed and the window went idle.
    pub async fn evict_idle_keys(&self, now: DateTime<Utc>) {
        let idle_secs = self.config.max_lifetime_secs;
        for shard in &self.shards {
            let mut shard = shard.lock().await;
            let Shard {
                windows,
                trackers,
                active,
            } = &mut *shard;
            windows.evict_idle(now, idle_secs, |key| active.contains_key(key));
            trackers.retain(|key| active.contains_key(key) || windows.contains(key));
        }
    }

    async fn restore_state(&self) -> Result<()> {
        let open = self.store.list_open_instances().await?;
        let open_count = open.len();
        for inst in open {
            let rule = self.rule_snapshot(&inst).await;
            let key = instance_key(&inst);
            let mut shard = self.shard_for(&key).lock().await;
            shard.windows.seed(
                &key,
                inst.window_started_at,
                inst.last_seen_at,
                inst.occurrence_count,
            );
            shard.active.insert(
                key.clone(),
                ActiveAlert {
                    instance_id: inst.id.clone(),
                    rule,
                    state: inst.state,
                },
            );
        }

        // Re-arm cool-downs from recently closed processed/escalated
        // instances so a restart does not forget suppression.
        let now = Utc::now();
        let lookback = now - Duration::hours(48);
        let recent = self.store.list_instances_in_range(lookback, now).await?;
        let mut cooldowns = 0usize;
        for inst in recent {
            if !inst.state.is_terminal() || inst.processed_at.is_none() {
                continue;
            }
            let Some(closed_at) = inst.resolved_at else {
                continue;
            };
            let rule = self.rule_snapshot(&inst).await;
            let until = closed_at + Duration::minutes(rule.suppress_duration_mins as i64);
            if until > now {
                let key = instance_key(&inst);
                let mut shard = self.shard_for(&key).lock().await;
                shard.windows.start_cooldown(&key, until);
                cooldowns += 1;
            }
        }

        if open_count > 0 || cooldowns > 0 {
            tracing::info!(open_count, cooldowns, "Engine state restored from storage");
        }
        Ok(())
    }
}

pub(crate) fn instance_key(inst: &AlertInstanceRow) -> DedupKey {
    DedupKey {
        tenant_id: inst.tenant_id.clone(),
        org_id: inst.org_id.clone(),
        device_id: inst.device_id.clone(),
        signal: inst.signal.clone(),
    }
}

/// Conservative stand-in when an instance outlived its rule: keeps the
/// severity and action, disables auto-resolution and suppression.
fn synthetic_rule(inst: &AlertInstanceRow) -> AlertRule {
    AlertRule {
        id: inst.rule_id.clone(),
        name: format!("recovered:{}", inst.signal),
        tenant_id: inst.tenant_id.clone(),
        org_id: Some(inst.org_id.clone()),
        physical_sign: Some(inst.signal.clone()),
        event_type: None,
        level: inst.level,
        threshold_min: None,
        threshold_max: None,
        auto_process_enabled: false,
        auto_process_action: inst.action,
        auto_process_delay_secs: 0,
        auto_resolve_threshold_count: 0,
        suppress_duration_mins: 0,
        time_window_secs: 0,
        enabled: false,
        source: "recovered".to_string(),
        created_at: inst.created_at,
        updated_at: inst.updated_at,
    }
}

fn merge_rule(existing: &AlertRule, update: &AlertRuleUpdate) -> AlertRule {
    let mut merged = existing.clone();
    if let Some(name) = &update.name {
        merged.name = name.clone();
    }
    if let Some(org) = &update.org_id {
        merged.org_id = org.clone();
    }
    if let Some(level) = update.level {
        merged.level = level;
    }
    if let Some(min) = update.threshold_min {
        merged.threshold_min = min;
    }
    if let Some(max) = update.threshold_max {
        merged.threshold_max = max;
    }
    if let Some(enabled) = update.auto_process_enabled {
        merged.auto_process_enabled = enabled;
    }
    if let Some(action) = update.auto_process_action {
        merged.auto_process_action = action;
    }
    if let Some(delay) = update.auto_process_delay_secs {
        merged.auto_process_delay_secs = delay;
    }
    if let Some(count) = update.auto_resolve_threshold_count {
        merged.auto_resolve_threshold_count = count;
    }
    if let Some(mins) = update.suppress_duration_mins {
        merged.suppress_duration_mins = mins;
    }
    if let Some(secs) = update.time_window_secs {
        merged.time_window_secs = secs;
    }
    if let Some(enabled) = update.enabled {
        merged.enabled = enabled;
    }
    merged
}
