use chrono::Utc;
use vitalmon_common::id;
use vitalmon_common::types::{AlertAction, AlertRule, Severity};
use vitalmon_storage::store::{AlertRuleFilter, ProcessStore};

/// Seeds a default wearable rule set when the rule table is empty, so a
/// fresh deployment evaluates something sensible out of the box.
pub async fn init_default_rules(store: &ProcessStore) -> anyhow::Result<()> {
    let existing = store.count_alert_rules(&AlertRuleFilter::default()).await?;
    if existing > 0 {
        tracing::info!(existing, "Rule table not empty, skipping default rule seed");
        return Ok(());
    }

    let mut created = 0u32;
    for rule in default_rules() {
        match store.insert_alert_rule(&rule).await {
            Ok(inserted) => {
                tracing::info!(name = %inserted.name, id = %inserted.id, "Default rule created");
                created += 1;
            }
            Err(e) => {
                tracing::error!(name = %rule.name, error = %e, "Failed to create default rule");
            }
        }
    }
    tracing::info!(created, "init default rules completed");
    Ok(())
}

fn default_rules() -> Vec<AlertRule> {
    let now = Utc::now();
    let base = AlertRule {
        id: String::new(),
        name: String::new(),
        tenant_id: "default".to_string(),
        org_id: None,
        physical_sign: None,
        event_type: None,
        level: Severity::Medium,
        threshold_min: None,
        threshold_max: None,
        auto_process_enabled: true,
        auto_process_action: AlertAction::Notify,
        auto_process_delay_secs: 60,
        auto_resolve_threshold_count: 3,
        suppress_duration_mins: 30,
        time_window_secs: 300,
        enabled: true,
        source: "seed".to_string(),
        created_at: now,
        updated_at: now,
    };

    vec![
        AlertRule {
            id: id::next_id(),
            name: "心率过速".to_string(),
            physical_sign: Some("heart_rate".to_string()),
            level: Severity::High,
            threshold_min: Some(120.0),
            ..base.clone()
        },
        AlertRule {
            id: id::next_id(),
            name: "心率过缓".to_string(),
            physical_sign: Some("heart_rate".to_string()),
            level: Severity::Medium,
            threshold_min: Some(0.0),
            threshold_max: Some(45.0),
            ..base.clone()
        },
        AlertRule {
            id: id::next_id(),
            name: "血氧过低".to_string(),
            physical_sign: Some("spo2".to_string()),
            level: Severity::Critical,
            threshold_min: Some(0.0),
            threshold_max: Some(90.0),
            auto_process_delay_secs: 30,
            ..base.clone()
        },
        AlertRule {
            id: id::next_id(),
            name: "跌倒检测".to_string(),
            event_type: Some("fall_detected".to_string()),
            level: Severity::Critical,
            auto_process_action: AlertAction::Escalate,
            auto_process_delay_secs: 0,
            auto_resolve_threshold_count: 0,
            suppress_duration_mins: 10,
            time_window_secs: 120,
            ..base.clone()
        },
        AlertRule {
            id: id::next_id(),
            name: "SOS 呼救".to_string(),
            event_type: Some("sos_pressed".to_string()),
            level: Severity::Critical,
            auto_process_action: AlertAction::Escalate,
            auto_process_delay_secs: 0,
            auto_resolve_threshold_count: 0,
            suppress_duration_mins: 5,
            time_window_secs: 60,
            ..base
        },
    ]
}
