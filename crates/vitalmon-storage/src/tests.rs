use crate::store::{
    AlertInstanceFilter, AlertInstanceRow, AlertRuleFilter, AlertRuleUpdate, PendingTimerRow,
    ProcessStore, ProcessingLogFilter, ProcessingLogRow,
};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use vitalmon_common::types::{AlertAction, AlertRule, AlertState, Outcome, Severity};

async fn setup() -> (TempDir, ProcessStore) {
    vitalmon_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("vitalmon.db").display());
    let store = ProcessStore::new(&url).await.unwrap();
    (dir, store)
}

fn make_rule(tenant: &str, sign: &str, level: Severity) -> AlertRule {
    let now = Utc::now();
    AlertRule {
        id: vitalmon_common::id::next_id(),
        name: format!("{sign} 越限"),
        tenant_id: tenant.to_string(),
        org_id: None,
        physical_sign: Some(sign.to_string()),
        event_type: None,
        level,
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

fn make_instance(key: &str, rule_id: &str, state: AlertState) -> AlertInstanceRow {
    let now = Utc::now();
    AlertInstanceRow {
        id: vitalmon_common::id::next_id(),
        dedup_key: key.to_string(),
        tenant_id: "t1".to_string(),
        org_id: "o1".to_string(),
        device_id: "dev-01".to_string(),
        signal: "heart_rate".to_string(),
        rule_id: rule_id.to_string(),
        level: Severity::High,
        action: AlertAction::Notify,
        state,
        occurrence_count: 1,
        trigger_value: Some(110.0),
        window_started_at: now,
        last_seen_at: now,
        processed_at: None,
        resolved_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn rule_crud_roundtrip() {
    let (_dir, store) = setup().await;

    let rule = make_rule("t1", "heart_rate", Severity::High);
    let inserted = store.insert_alert_rule(&rule).await.unwrap();
    assert_eq!(inserted.id, rule.id);
    assert_eq!(inserted.level, Severity::High);

    let fetched = store.get_alert_rule_by_id(&rule.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, rule.name);
    assert_eq!(fetched.threshold_min, Some(100.0));

    let update = AlertRuleUpdate {
        threshold_min: Some(Some(95.0)),
        auto_process_delay_secs: Some(30),
        ..Default::default()
    };
    let updated = store
        .update_alert_rule(&rule.id, &update)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.threshold_min, Some(95.0));
    assert_eq!(updated.auto_process_delay_secs, 30);

    assert!(store.delete_alert_rule(&rule.id).await.unwrap());
    assert!(store.get_alert_rule_by_id(&rule.id).await.unwrap().is_none());
}

#[tokio::test]
async fn rule_list_filters_and_count() {
    let (_dir, store) = setup().await;

    store
        .insert_alert_rule(&make_rule("t1", "heart_rate", Severity::High))
        .await
        .unwrap();
    store
        .insert_alert_rule(&make_rule("t1", "spo2", Severity::Critical))
        .await
        .unwrap();
    store
        .insert_alert_rule(&make_rule("t2", "heart_rate", Severity::Low))
        .await
        .unwrap();

    let filter = AlertRuleFilter {
        tenant_id_eq: Some("t1".to_string()),
        ..Default::default()
    };
    assert_eq!(store.count_alert_rules(&filter).await.unwrap(), 2);

    let filter = AlertRuleFilter {
        physical_sign_eq: Some("heart_rate".to_string()),
        ..Default::default()
    };
    let rules = store.list_alert_rules(&filter, 20, 0).await.unwrap();
    assert_eq!(rules.len(), 2);

    let filter = AlertRuleFilter {
        level_eq: Some(Severity::Critical),
        ..Default::default()
    };
    assert_eq!(store.count_alert_rules(&filter).await.unwrap(), 1);
}

#[tokio::test]
async fn conflicting_rule_lookup_respects_enabled() {
    let (_dir, store) = setup().await;

    let rule = make_rule("t1", "heart_rate", Severity::High);
    store.insert_alert_rule(&rule).await.unwrap();

    let found = store
        .find_conflicting_rule("t1", Some("heart_rate"), None, Severity::High, None)
        .await
        .unwrap();
    assert!(found.is_some());

    // Different level is not a conflict
    let found = store
        .find_conflicting_rule("t1", Some("heart_rate"), None, Severity::Low, None)
        .await
        .unwrap();
    assert!(found.is_none());

    // Disabled rules do not conflict
    store.set_rule_enabled(&rule.id, false).await.unwrap();
    let found = store
        .find_conflicting_rule("t1", Some("heart_rate"), None, Severity::High, None)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn batch_enable_disable() {
    let (_dir, store) = setup().await;

    let a = store
        .insert_alert_rule(&make_rule("t1", "heart_rate", Severity::High))
        .await
        .unwrap();
    let b = store
        .insert_alert_rule(&make_rule("t1", "spo2", Severity::Low))
        .await
        .unwrap();

    let updated = store
        .set_rules_enabled(&[a.id.clone(), b.id.clone()], false)
        .await
        .unwrap();
    assert_eq!(updated, 2);
    assert!(store.list_enabled_rules().await.unwrap().is_empty());
}

#[tokio::test]
async fn instance_duplicate_bumps_occurrence_and_window() {
    let (_dir, store) = setup().await;

    let inst = make_instance("t1:o1:dev-01:heart_rate", "r1", AlertState::New);
    store.insert_alert_instance(&inst).await.unwrap();

    let later = Utc::now() + Duration::seconds(30);
    let updated = store
        .record_duplicate(&inst.id, later)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.occurrence_count, 2);
    assert!(updated.last_seen_at > inst.last_seen_at);
}

#[tokio::test]
async fn cas_transition_returns_prior_state_once() {
    let (_dir, store) = setup().await;

    let inst = make_instance("t1:o1:dev-01:heart_rate", "r1", AlertState::Scheduled);
    store.insert_alert_instance(&inst).await.unwrap();

    let now = Utc::now();
    // First mover wins and learns the prior state
    let prior = store
        .transition_state(&inst.id, &[AlertState::Scheduled], AlertState::Processed, now)
        .await
        .unwrap();
    assert_eq!(prior, Some(AlertState::Scheduled));

    // Second identical attempt is a deterministic no-op
    let prior = store
        .transition_state(&inst.id, &[AlertState::Scheduled], AlertState::Processed, now)
        .await
        .unwrap();
    assert_eq!(prior, None);

    let row = store
        .get_alert_instance_by_id(&inst.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.state, AlertState::Processed);
    assert!(row.processed_at.is_some());
}

#[tokio::test]
async fn cas_transition_from_multiple_states() {
    let (_dir, store) = setup().await;

    let inst = make_instance("k", "r1", AlertState::Processed);
    store.insert_alert_instance(&inst).await.unwrap();

    let prior = store
        .transition_state(
            &inst.id,
            &[
                AlertState::New,
                AlertState::Scheduled,
                AlertState::Processed,
                AlertState::Escalated,
            ],
            AlertState::Resolved,
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(prior, Some(AlertState::Processed));

    let row = store
        .get_alert_instance_by_id(&inst.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.state, AlertState::Resolved);
    assert!(row.resolved_at.is_some());
}

#[tokio::test]
async fn open_and_expiry_queries() {
    let (_dir, store) = setup().await;

    let mut old = make_instance("k-old", "r1", AlertState::Scheduled);
    old.created_at = Utc::now() - Duration::hours(48);
    store.insert_alert_instance(&old).await.unwrap();

    let fresh = make_instance("k-new", "r1", AlertState::New);
    store.insert_alert_instance(&fresh).await.unwrap();

    let resolved = make_instance("k-done", "r1", AlertState::Resolved);
    store.insert_alert_instance(&resolved).await.unwrap();

    let open = store.list_open_instances().await.unwrap();
    assert_eq!(open.len(), 2);

    let cutoff = Utc::now() - Duration::hours(24);
    let expired = store.list_expiry_candidates(cutoff, 10).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].dedup_key, "k-old");
}

#[tokio::test]
async fn instance_filters() {
    let (_dir, store) = setup().await;

    store
        .insert_alert_instance(&make_instance("k1", "r1", AlertState::New))
        .await
        .unwrap();
    store
        .insert_alert_instance(&make_instance("k2", "r2", AlertState::Resolved))
        .await
        .unwrap();

    let filter = AlertInstanceFilter {
        state_eq: Some(AlertState::Resolved),
        ..Default::default()
    };
    assert_eq!(store.count_alert_instances(&filter).await.unwrap(), 1);

    let filter = AlertInstanceFilter {
        tenant_id_eq: Some("t1".to_string()),
        rule_id_eq: Some("r1".to_string()),
        ..Default::default()
    };
    let rows = store.list_alert_instances(&filter, 20, 0).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].dedup_key, "k1");
}

#[tokio::test]
async fn timers_fire_in_creation_order() {
    let (_dir, store) = setup().await;

    let now = Utc::now();
    for i in 0..3 {
        let row = PendingTimerRow {
            id: vitalmon_common::id::next_id(),
            instance_id: format!("inst-{i}"),
            rule_id: "r1".to_string(),
            dedup_key: format!("k-{i}"),
            action: AlertAction::Notify,
            // All overdue, later-created timers have earlier fire_at on
            // purpose: ordering must follow created_at, not fire_at.
            fire_at: now - Duration::seconds(60 - i * 10),
            created_at: now - Duration::seconds(30 - i),
        };
        store.arm_timer(&row).await.unwrap();
    }

    let due = store.due_timers(now, 10).await.unwrap();
    assert_eq!(due.len(), 3);
    assert_eq!(due[0].instance_id, "inst-0");
    assert_eq!(due[1].instance_id, "inst-1");
    assert_eq!(due[2].instance_id, "inst-2");
}

#[tokio::test]
async fn disarm_timer_is_idempotent() {
    let (_dir, store) = setup().await;

    let row = PendingTimerRow {
        id: vitalmon_common::id::next_id(),
        instance_id: "inst-1".to_string(),
        rule_id: "r1".to_string(),
        dedup_key: "k".to_string(),
        action: AlertAction::Notify,
        fire_at: Utc::now(),
        created_at: Utc::now(),
    };
    store.arm_timer(&row).await.unwrap();

    assert!(store.disarm_timer("inst-1").await.unwrap());
    // Already fired / already cancelled: no-op
    assert!(!store.disarm_timer("inst-1").await.unwrap());
    assert_eq!(store.count_pending_timers().await.unwrap(), 0);
}

#[tokio::test]
async fn log_append_trace_and_filters() {
    let (_dir, store) = setup().await;

    let base = Utc::now();
    let states = [
        (None, AlertState::New),
        (Some(AlertState::New), AlertState::Scheduled),
        (Some(AlertState::Scheduled), AlertState::Processed),
    ];
    for (i, (from, to)) in states.iter().enumerate() {
        let row = ProcessingLogRow {
            id: vitalmon_common::id::next_id(),
            instance_id: "inst-1".to_string(),
            rule_id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            dedup_key: "k".to_string(),
            from_state: *from,
            to_state: *to,
            action: (*to == AlertState::Processed).then_some(AlertAction::Notify),
            actor: "auto".to_string(),
            outcome: Outcome::Success,
            error: None,
            event_json: None,
            duration_ms: Some(5),
            created_at: base + Duration::milliseconds(i as i64 * 10),
        };
        store.append_log(&row).await.unwrap();
    }

    let trace = store.instance_trace("inst-1").await.unwrap();
    assert_eq!(trace.len(), 3);
    assert_eq!(trace[0].to_state, AlertState::New);
    assert_eq!(trace[2].to_state, AlertState::Processed);
    assert_eq!(trace[2].action, Some(AlertAction::Notify));

    let filter = ProcessingLogFilter {
        actor_eq: Some("auto".to_string()),
        outcome_eq: Some(Outcome::Success),
        ..Default::default()
    };
    assert_eq!(store.count_logs(&filter).await.unwrap(), 3);

    let filter = ProcessingLogFilter {
        instance_id_eq: Some("missing".to_string()),
        ..Default::default()
    };
    assert!(store.list_logs(&filter, 20, 0).await.unwrap().is_empty());
}
