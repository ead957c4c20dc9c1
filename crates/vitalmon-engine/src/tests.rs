use crate::engine::{AlertProcessor, EventDecision};
use crate::registry::{validate_rule, RuleRegistry};
use crate::scheduler::DelayedActionScheduler;
use crate::{EngineConfig, EngineError};
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::watch;
use vitalmon_common::types::{
    AlertAction, AlertNotice, AlertRule, AlertState, Severity, VitalEvent,
};
use vitalmon_notify::manager::{ChannelBinding, NotificationManager};
use vitalmon_notify::{NotificationChannel, SendReceipt};
use vitalmon_storage::store::ProcessStore;

struct RecordingChannel {
    notices: Arc<Mutex<Vec<AlertNotice>>>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, notice: &AlertNotice, recipients: &[String]) -> AnyResult<SendReceipt> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(SendReceipt {
            delivered: recipients.len() as u32,
            failed: 0,
            retry_count: 0,
        })
    }

    fn channel_type(&self) -> &str {
        "recording"
    }
}

struct FailingChannel;

#[async_trait]
impl NotificationChannel for FailingChannel {
    async fn send(&self, _notice: &AlertNotice, recipients: &[String]) -> AnyResult<SendReceipt> {
        Ok(SendReceipt {
            delivered: 0,
            failed: recipients.len() as u32,
            retry_count: 0,
        })
    }

    fn channel_type(&self) -> &str {
        "failing"
    }
}

struct TestBed {
    _dir: TempDir,
    store: Arc<ProcessStore>,
    processor: Arc<AlertProcessor>,
    scheduler: DelayedActionScheduler,
    notices: Arc<Mutex<Vec<AlertNotice>>>,
}

fn test_config() -> EngineConfig {
    EngineConfig {
        shards: 4,
        tick_secs: 1,
        timer_batch: 64,
        max_lifetime_secs: 3600,
        action_max_retries: 2,
        retry_backoff_ms: 10,
    }
}

async fn setup() -> TestBed {
    setup_with_channel(None).await
}

async fn setup_failing() -> TestBed {
    setup_with_channel(Some(Box::new(FailingChannel))).await
}

async fn setup_with_channel(channel: Option<Box<dyn NotificationChannel>>) -> TestBed {
    vitalmon_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("vitalmon.db").display());
    let store = Arc::new(ProcessStore::new(&url).await.unwrap());

    let notices = Arc::new(Mutex::new(Vec::new()));
    let channel: Box<dyn NotificationChannel> = channel.unwrap_or_else(|| {
        Box::new(RecordingChannel {
            notices: notices.clone(),
        })
    });
    let notifier = Arc::new(NotificationManager::new(vec![ChannelBinding {
        channel,
        recipients: vec!["ops".to_string()],
        min_severity: Severity::Low,
    }]));

    let processor = AlertProcessor::bootstrap(store.clone(), notifier, test_config())
        .await
        .unwrap();
    let (_tx, rx) = watch::channel(false);
    let scheduler = DelayedActionScheduler::new(processor.clone(), rx);

    TestBed {
        _dir: dir,
        store,
        processor,
        scheduler,
        notices,
    }
}

fn heart_rate_rule() -> AlertRule {
    let now = Utc::now();
    AlertRule {
        id: vitalmon_common::id::next_id(),
        name: "心率过速".to_string(),
        tenant_id: "t1".to_string(),
        org_id: None,
        physical_sign: Some("heart_rate".to_string()),
        event_type: None,
        level: Severity::High,
        threshold_min: Some(100.0),
        threshold_max: None,
        auto_process_enabled: true,
        auto_process_action: AlertAction::Notify,
        auto_process_delay_secs: 60,
        auto_resolve_threshold_count: 3,
        suppress_duration_mins: 30,
        time_window_secs: 300,
        enabled: true,
        source: "api".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn reading(t0: DateTime<Utc>, offset_secs: i64, value: f64) -> VitalEvent {
    VitalEvent {
        id: vitalmon_common::id::next_id(),
        tenant_id: "t1".to_string(),
        org_id: "o1".to_string(),
        device_id: "dev-01".to_string(),
        physical_sign: Some("heart_rate".to_string()),
        event_type: None,
        value: Some(value),
        payload: None,
        timestamp: t0 + Duration::seconds(offset_secs),
    }
}

/// The worked end-to-end scenario: duplicate merge at t=30, notify at t=60,
/// auto-resolve after three in-range readings, then the post-processing
/// cool-down blocks new instances.
#[tokio::test]
async fn full_lifecycle_scenario() {
    let bed = setup().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    let t0 = Utc::now();

    // t=0: breach -> instance created and scheduled
    let d = bed.processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();
    let EventDecision::Created { instance_id, scheduled } = d else {
        panic!("expected Created, got {d:?}");
    };
    assert!(scheduled);
    let timer = bed
        .store
        .get_timer_for_instance(&instance_id)
        .await
        .unwrap()
        .unwrap();
    let drift = timer.fire_at - (t0 + Duration::seconds(60));
    assert!(drift.num_milliseconds().abs() < 10, "fire_at drift: {drift}");

    // t=30: duplicate, occurrence count 2, no new instance, no reschedule
    let d = bed.processor.process_event(&reading(t0, 30, 108.0)).await.unwrap();
    let EventDecision::Duplicate {
        instance_id: dup_id,
        occurrence_count,
    } = d
    else {
        panic!("expected Duplicate, got {d:?}");
    };
    assert_eq!(dup_id, instance_id);
    assert_eq!(occurrence_count, 2);

    // t=60: timer fires, notify executes once, instance processed
    let fired = bed.scheduler.poll_once(t0 + Duration::seconds(60)).await.unwrap();
    assert_eq!(fired, 1);
    assert_eq!(bed.notices.lock().unwrap().len(), 1);
    let inst = bed
        .store
        .get_alert_instance_by_id(&instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inst.state, AlertState::Processed);

    // t=90,120: in-range readings count toward auto-resolution
    for (offset, value) in [(90, 85.0), (120, 82.0)] {
        let d = bed.processor.process_event(&reading(t0, offset, value)).await.unwrap();
        assert!(matches!(d, EventDecision::Observed), "got {d:?}");
    }

    // t=150: third consecutive in-range reading resolves the alert
    let d = bed.processor.process_event(&reading(t0, 150, 80.0)).await.unwrap();
    assert!(matches!(d, EventDecision::AutoResolved { .. }), "got {d:?}");
    let inst = bed
        .store
        .get_alert_instance_by_id(&instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inst.state, AlertState::Resolved);

    // t=200: new breach blocked by the 30-minute cool-down
    let d = bed.processor.process_event(&reading(t0, 200, 105.0)).await.unwrap();
    assert!(matches!(d, EventDecision::Suppressed { .. }), "got {d:?}");

    // After the cool-down a new breach opens a fresh instance
    let d = bed
        .processor
        .process_event(&reading(t0, 150 + 30 * 60 + 1, 105.0))
        .await
        .unwrap();
    let EventDecision::Created { instance_id: second, .. } = d else {
        panic!("expected Created after cool-down, got {d:?}");
    };
    assert_ne!(second, instance_id);

    // The lifecycle trace covers every transition
    let trace = bed.store.instance_trace(&instance_id).await.unwrap();
    let states: Vec<AlertState> = trace.iter().map(|e| e.to_state).collect();
    assert_eq!(
        states,
        vec![
            AlertState::New,
            AlertState::Scheduled,
            AlertState::Processed,
            AlertState::Resolved
        ]
    );
}

#[tokio::test]
async fn dedup_is_idempotent_within_window() {
    let bed = setup().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    let t0 = Utc::now();
    bed.processor.process_event(&reading(t0, 0, 120.0)).await.unwrap();
    for i in 1..10 {
        let d = bed
            .processor
            .process_event(&reading(t0, i * 10, 120.0))
            .await
            .unwrap();
        assert!(matches!(d, EventDecision::Duplicate { .. }), "got {d:?}");
    }

    // One instance, one armed timer, and after the fire one notification.
    assert_eq!(bed.store.count_pending_timers().await.unwrap(), 1);
    bed.scheduler.poll_once(t0 + Duration::seconds(60)).await.unwrap();
    bed.scheduler.poll_once(t0 + Duration::seconds(120)).await.unwrap();
    assert_eq!(bed.notices.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn action_fires_at_most_once_and_not_before_delay() {
    let bed = setup().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    let t0 = Utc::now();
    bed.processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();

    // Before creation + delay nothing fires
    let fired = bed.scheduler.poll_once(t0 + Duration::seconds(59)).await.unwrap();
    assert_eq!(fired, 0);
    assert!(bed.notices.lock().unwrap().is_empty());

    // At the deadline it fires exactly once, repeat polls are no-ops
    bed.scheduler.poll_once(t0 + Duration::seconds(60)).await.unwrap();
    bed.scheduler.poll_once(t0 + Duration::seconds(61)).await.unwrap();
    assert_eq!(bed.notices.lock().unwrap().len(), 1);
    assert_eq!(bed.store.count_pending_timers().await.unwrap(), 0);
}

#[tokio::test]
async fn auto_resolve_before_fire_cancels_timer() {
    let bed = setup().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    let t0 = Utc::now();
    bed.processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();

    // Three in-range readings arrive before the 60s delay elapses
    for (offset, value) in [(10, 85.0), (20, 84.0), (30, 83.0)] {
        bed.processor.process_event(&reading(t0, offset, value)).await.unwrap();
    }
    assert_eq!(bed.store.count_pending_timers().await.unwrap(), 0);

    // The would-be fire time passes without any action
    bed.scheduler.poll_once(t0 + Duration::seconds(60)).await.unwrap();
    assert!(bed.notices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn breach_resets_auto_resolve_streak() {
    let bed = setup().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    let t0 = Utc::now();
    bed.processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();

    // Two normals, a breach, then two normals: threshold of 3 never met
    for (offset, value) in [(10, 85.0), (20, 84.0), (30, 111.0), (40, 85.0), (50, 84.0)] {
        let d = bed.processor.process_event(&reading(t0, offset, value)).await.unwrap();
        assert!(!matches!(d, EventDecision::AutoResolved { .. }), "got {d:?}");
    }

    // The third consecutive normal completes the streak
    let d = bed.processor.process_event(&reading(t0, 55, 83.0)).await.unwrap();
    assert!(matches!(d, EventDecision::AutoResolved { .. }), "got {d:?}");
}

#[tokio::test]
async fn manual_resolution_wins_race_against_timer() {
    let bed = setup().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    let t0 = Utc::now();
    let d = bed.processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();
    let EventDecision::Created { instance_id, .. } = d else {
        panic!("expected Created");
    };

    assert!(bed.processor.manual_resolve(&instance_id, "operator-1").await.unwrap());
    // Second manual close is a no-op
    assert!(!bed.processor.manual_resolve(&instance_id, "operator-1").await.unwrap());

    // The overdue timer is a deterministic no-op for the loser
    bed.scheduler.poll_once(t0 + Duration::seconds(120)).await.unwrap();
    assert!(bed.notices.lock().unwrap().is_empty());
    let inst = bed
        .store
        .get_alert_instance_by_id(&instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inst.state, AlertState::Resolved);
}

#[tokio::test]
async fn manual_suppress_mutes_open_instance() {
    let bed = setup().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    let t0 = Utc::now();
    let d = bed.processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();
    let EventDecision::Created { instance_id, .. } = d else {
        panic!("expected Created");
    };

    assert!(bed.processor.manual_suppress(&instance_id, "operator-1").await.unwrap());
    let inst = bed
        .store
        .get_alert_instance_by_id(&instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inst.state, AlertState::Suppressed);
    assert_eq!(bed.store.count_pending_timers().await.unwrap(), 0);

    // Suppression is an operator mute of the instance, not a cool-down:
    // the next breach opens a fresh one.
    let d = bed.processor.process_event(&reading(t0, 10, 115.0)).await.unwrap();
    assert!(matches!(d, EventDecision::Created { .. }), "got {d:?}");
}

#[tokio::test]
async fn timers_survive_restart_and_fire_in_creation_order() {
    vitalmon_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("vitalmon.db").display());
    let t0 = Utc::now() - Duration::minutes(10);

    // First process lifetime: two alerts armed, never fired
    {
        let store = Arc::new(ProcessStore::new(&url).await.unwrap());
        let notifier = Arc::new(NotificationManager::new(vec![]));
        let processor = AlertProcessor::bootstrap(store, notifier, test_config())
            .await
            .unwrap();
        processor.create_rule(heart_rate_rule()).await.unwrap();
        processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();
        let mut other_device = reading(t0, 5, 120.0);
        other_device.device_id = "dev-02".to_string();
        processor.process_event(&other_device).await.unwrap();
    }

    // Second process lifetime: overdue timers fire in creation order
    let store = Arc::new(ProcessStore::new(&url).await.unwrap());
    let notices = Arc::new(Mutex::new(Vec::new()));
    let notifier = Arc::new(NotificationManager::new(vec![ChannelBinding {
        channel: Box::new(RecordingChannel {
            notices: notices.clone(),
        }),
        recipients: vec!["ops".to_string()],
        min_severity: Severity::Low,
    }]));
    let processor = AlertProcessor::bootstrap(store.clone(), notifier, test_config())
        .await
        .unwrap();
    let (_tx, rx) = watch::channel(false);
    let scheduler = DelayedActionScheduler::new(processor, rx);

    assert_eq!(store.count_pending_timers().await.unwrap(), 2);
    let fired = scheduler.poll_once(Utc::now()).await.unwrap();
    assert_eq!(fired, 2);

    let sent = notices.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].device_id, "dev-01");
    assert_eq!(sent[1].device_id, "dev-02");
}

#[tokio::test]
async fn cooldown_survives_restart() {
    vitalmon_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("vitalmon.db").display());
    let t0 = Utc::now() - Duration::minutes(5);

    {
        let store = Arc::new(ProcessStore::new(&url).await.unwrap());
        let notices = Arc::new(Mutex::new(Vec::new()));
        let notifier = Arc::new(NotificationManager::new(vec![ChannelBinding {
            channel: Box::new(RecordingChannel { notices }),
            recipients: vec!["ops".to_string()],
            min_severity: Severity::Low,
        }]));
        let processor = AlertProcessor::bootstrap(store, notifier, test_config())
            .await
            .unwrap();
        processor.create_rule(heart_rate_rule()).await.unwrap();
        processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();
        let (_tx, rx) = watch::channel(false);
        let scheduler = DelayedActionScheduler::new(processor.clone(), rx);
        scheduler.poll_once(t0 + Duration::seconds(60)).await.unwrap();
        // Three in-range readings close the processed instance
        for (offset, value) in [(90, 85.0), (120, 82.0), (150, 80.0)] {
            processor.process_event(&reading(t0, offset, value)).await.unwrap();
        }
    }

    // Restart: the 30-minute cool-down must still block new instances
    let store = Arc::new(ProcessStore::new(&url).await.unwrap());
    let notifier = Arc::new(NotificationManager::new(vec![]));
    let processor = AlertProcessor::bootstrap(store, notifier, test_config())
        .await
        .unwrap();
    let d = processor.process_event(&reading(t0, 200, 105.0)).await.unwrap();
    assert!(matches!(d, EventDecision::Suppressed { .. }), "got {d:?}");
}

#[tokio::test]
async fn escalate_action_and_zero_delay() {
    let bed = setup().await;
    let mut rule = heart_rate_rule();
    rule.auto_process_action = AlertAction::Escalate;
    rule.auto_process_delay_secs = 0;
    bed.processor.create_rule(rule).await.unwrap();

    let t0 = Utc::now();
    bed.processor.process_event(&reading(t0, 0, 130.0)).await.unwrap();
    bed.scheduler.poll_once(t0).await.unwrap();

    let sent = bed.notices.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].escalation);
    drop(sent);

    let open = bed.store.list_open_instances().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].state, AlertState::Escalated);
}

#[tokio::test]
async fn ignore_action_processes_without_notification() {
    let bed = setup().await;
    let mut rule = heart_rate_rule();
    rule.auto_process_action = AlertAction::Ignore;
    rule.auto_process_delay_secs = 0;
    bed.processor.create_rule(rule).await.unwrap();

    let t0 = Utc::now();
    bed.processor.process_event(&reading(t0, 0, 130.0)).await.unwrap();
    bed.scheduler.poll_once(t0).await.unwrap();

    assert!(bed.notices.lock().unwrap().is_empty());
    let open = bed.store.list_open_instances().await.unwrap();
    assert_eq!(open[0].state, AlertState::Processed);
}

#[tokio::test]
async fn failed_notify_escalates_for_manual_handling() {
    let bed = setup_failing().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    let t0 = Utc::now();
    let d = bed.processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();
    let EventDecision::Created { instance_id, .. } = d else {
        panic!("expected Created");
    };

    bed.scheduler.poll_once(t0 + Duration::seconds(60)).await.unwrap();

    let inst = bed
        .store
        .get_alert_instance_by_id(&instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inst.state, AlertState::Escalated);

    let trace = bed.store.instance_trace(&instance_id).await.unwrap();
    let failed = trace
        .iter()
        .find(|e| e.to_state == AlertState::Escalated)
        .unwrap();
    assert_eq!(failed.outcome, vitalmon_common::types::Outcome::Failure);
    assert!(failed.error.is_some());
}

#[tokio::test]
async fn stale_instances_expire() {
    let bed = setup().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    // Created two hours ago with a one-hour max lifetime
    let t0 = Utc::now() - Duration::hours(2);
    let d = bed.processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();
    let EventDecision::Created { instance_id, .. } = d else {
        panic!("expected Created");
    };

    let expired = bed.scheduler.expire_overdue(Utc::now()).await.unwrap();
    assert_eq!(expired, 1);
    let inst = bed
        .store
        .get_alert_instance_by_id(&instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inst.state, AlertState::Expired);
    assert_eq!(bed.store.count_pending_timers().await.unwrap(), 0);
}

#[tokio::test]
async fn rule_validation_and_conflict() {
    let bed = setup().await;

    let mut bad = heart_rate_rule();
    bad.threshold_min = Some(200.0);
    bad.threshold_max = Some(100.0);
    let err = bed.processor.create_rule(bad).await.unwrap_err();
    assert!(matches!(err, EngineError::RuleValidation { .. }));

    let mut no_signal = heart_rate_rule();
    no_signal.physical_sign = None;
    let err = bed.processor.create_rule(no_signal).await.unwrap_err();
    assert!(matches!(err, EngineError::RuleValidation { .. }));

    bed.processor.create_rule(heart_rate_rule()).await.unwrap();
    let err = bed.processor.create_rule(heart_rate_rule()).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateRule { .. }));

    // A different severity is a different match key
    let mut low = heart_rate_rule();
    low.level = Severity::Low;
    bed.processor.create_rule(low).await.unwrap();
}

#[tokio::test]
async fn disabled_rule_does_not_match_but_instance_completes() {
    let bed = setup().await;
    let rule = bed.processor.create_rule(heart_rate_rule()).await.unwrap();

    let t0 = Utc::now();
    let d = bed.processor.process_event(&reading(t0, 0, 110.0)).await.unwrap();
    let EventDecision::Created { instance_id, .. } = d else {
        panic!("expected Created");
    };

    // Disabling the rule stops new matches...
    bed.processor.set_rule_enabled(&rule.id, false).await.unwrap();
    let mut other = reading(t0, 5, 130.0);
    other.device_id = "dev-09".to_string();
    let d = bed.processor.process_event(&other).await.unwrap();
    assert!(matches!(d, EventDecision::Observed), "got {d:?}");

    // ...but the live instance still completes its own lifecycle
    bed.scheduler.poll_once(t0 + Duration::seconds(60)).await.unwrap();
    let inst = bed
        .store
        .get_alert_instance_by_id(&instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inst.state, AlertState::Processed);
    assert_eq!(bed.notices.lock().unwrap().len(), 1);
}

#[test]
fn registry_prefers_specific_rules() {
    vitalmon_common::id::init(1, 1);
    let now = Utc::now();
    let mut tenant_wide = heart_rate_rule();
    tenant_wide.id = "tenant-wide".to_string();
    tenant_wide.updated_at = now;

    let mut org_scoped = heart_rate_rule();
    org_scoped.id = "org-scoped".to_string();
    org_scoped.org_id = Some("o1".to_string());
    org_scoped.level = Severity::Low;
    org_scoped.updated_at = now;

    let registry = RuleRegistry::new(vec![tenant_wide.clone(), org_scoped]);
    let event = reading(now, 0, 120.0);
    let best = registry.best_match(&event).unwrap();
    assert_eq!(best.id, "org-scoped");

    // For another org only the tenant-wide rule applies
    let mut other_org = reading(now, 0, 120.0);
    other_org.org_id = "o2".to_string();
    let best = registry.best_match(&other_org).unwrap();
    assert_eq!(best.id, "tenant-wide");
}

/// Two band rules share the heart-rate signal: the bradycardia band must
/// still open alerts even though the tachycardia rule ranks higher.
#[tokio::test]
async fn lower_priority_band_is_not_shadowed_on_shared_signal() {
    let bed = setup().await;
    let mut tachy = heart_rate_rule();
    tachy.threshold_min = Some(120.0);
    bed.processor.create_rule(tachy).await.unwrap();

    let mut brady = heart_rate_rule();
    brady.name = "心率过缓".to_string();
    brady.level = Severity::Medium;
    brady.threshold_min = Some(0.0);
    brady.threshold_max = Some(45.0);
    bed.processor.create_rule(brady).await.unwrap();

    let t0 = Utc::now();
    let d = bed.processor.process_event(&reading(t0, 0, 40.0)).await.unwrap();
    let EventDecision::Created { instance_id, .. } = d else {
        panic!("expected Created, got {d:?}");
    };
    let inst = bed
        .store
        .get_alert_instance_by_id(&instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inst.level, Severity::Medium);

    // A reading inside neither band is a plain observation
    let mut normal = reading(t0, 5, 80.0);
    normal.device_id = "dev-02".to_string();
    let d = bed.processor.process_event(&normal).await.unwrap();
    assert!(matches!(d, EventDecision::Observed), "got {d:?}");
}

#[test]
fn registry_breaks_ties_by_severity_priority() {
    vitalmon_common::id::init(1, 1);
    let now = Utc::now();
    let mut medium = heart_rate_rule();
    medium.id = "medium".to_string();
    medium.level = Severity::Medium;
    medium.updated_at = now;

    let mut critical = heart_rate_rule();
    critical.id = "critical".to_string();
    critical.level = Severity::Critical;
    critical.updated_at = now - Duration::hours(1);

    let registry = RuleRegistry::new(vec![medium, critical]);
    let best = registry.best_match(&reading(now, 0, 120.0)).unwrap();
    assert_eq!(best.id, "critical");
}

#[test]
fn rule_validation_rejects_both_signals() {
    let mut rule = heart_rate_rule();
    rule.event_type = Some("fall_detected".to_string());
    assert!(validate_rule(&rule).is_err());
}

/// Export/import round-trip: an imported rule set matches events exactly
/// like the original registry.
#[tokio::test]
async fn exported_rule_set_reimports_with_identical_matching() {
    let bed = setup().await;
    bed.processor.create_rule(heart_rate_rule()).await.unwrap();
    let mut spo2 = heart_rate_rule();
    spo2.physical_sign = Some("spo2".to_string());
    spo2.threshold_min = Some(0.0);
    spo2.threshold_max = Some(90.0);
    spo2.level = Severity::Critical;
    bed.processor.create_rule(spo2).await.unwrap();

    let exported = bed.store.list_enabled_rules().await.unwrap();

    // Fresh registry from the imported set
    let fresh = setup().await;
    let (created, skipped) = fresh.processor.import_rules(exported.clone()).await.unwrap();
    assert_eq!(created, 2);
    assert_eq!(skipped, 0);

    let original = RuleRegistry::new(exported);
    let imported = RuleRegistry::new(fresh.store.list_enabled_rules().await.unwrap());

    let t0 = Utc::now();
    let mut fixtures = vec![
        reading(t0, 0, 120.0),
        reading(t0, 0, 80.0),
    ];
    let mut spo2_event = reading(t0, 0, 85.0);
    spo2_event.physical_sign = Some("spo2".to_string());
    fixtures.push(spo2_event);
    let mut unknown = reading(t0, 0, 50.0);
    unknown.physical_sign = Some("temperature".to_string());
    fixtures.push(unknown);

    for event in &fixtures {
        let a = original.best_match(event).map(|r| (r.name.clone(), r.level));
        let b = imported.best_match(event).map(|r| (r.name.clone(), r.level));
        assert_eq!(a, b, "matching diverged for {:?}", event.physical_sign);
    }
}

#[tokio::test]
async fn event_without_signal_is_rejected() {
    let bed = setup().await;
    let mut event = reading(Utc::now(), 0, 100.0);
    event.physical_sign = None;
    event.event_type = None;
    let err = bed.processor.process_event(&event).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidEvent { .. }));
}

#[tokio::test]
async fn device_event_rule_flows_through_pipeline() {
    let bed = setup().await;
    let now = Utc::now();
    let rule = AlertRule {
        id: vitalmon_common::id::next_id(),
        name: "跌倒检测".to_string(),
        tenant_id: "t1".to_string(),
        org_id: None,
        physical_sign: None,
        event_type: Some("fall_detected".to_string()),
        level: Severity::Critical,
        threshold_min: None,
        threshold_max: None,
        auto_process_enabled: true,
        auto_process_action: AlertAction::Notify,
        auto_process_delay_secs: 0,
        auto_resolve_threshold_count: 0,
        suppress_duration_mins: 10,
        time_window_secs: 120,
        enabled: true,
        source: "api".to_string(),
        created_at: now,
        updated_at: now,
    };
    bed.processor.create_rule(rule).await.unwrap();

    let t0 = Utc::now();
    let event = VitalEvent {
        id: vitalmon_common::id::next_id(),
        tenant_id: "t1".to_string(),
        org_id: "o1".to_string(),
        device_id: "dev-01".to_string(),
        physical_sign: None,
        event_type: Some("fall_detected".to_string()),
        value: None,
        payload: Some(serde_json::json!({"confidence": 0.93})),
        timestamp: t0,
    };
    let d = bed.processor.process_event(&event).await.unwrap();
    assert!(matches!(d, EventDecision::Created { .. }), "got {d:?}");

    bed.scheduler.poll_once(t0).await.unwrap();
    let sent = bed.notices.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].signal, "fall_detected");
    assert_eq!(sent[0].level, Severity::Critical);
}
