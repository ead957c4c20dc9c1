use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 按依赖顺序建表
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS alert_rules (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    org_id TEXT,
    physical_sign TEXT,
    event_type TEXT,
    level TEXT NOT NULL,
    threshold_min REAL,
    threshold_max REAL,
    auto_process_enabled INTEGER NOT NULL DEFAULT 0,
    auto_process_action TEXT NOT NULL DEFAULT 'notify',
    auto_process_delay_secs INTEGER NOT NULL DEFAULT 0,
    auto_resolve_threshold_count INTEGER NOT NULL DEFAULT 0,
    suppress_duration_mins INTEGER NOT NULL DEFAULT 0,
    time_window_secs INTEGER NOT NULL DEFAULT 300,
    enabled INTEGER NOT NULL DEFAULT 1,
    source TEXT NOT NULL DEFAULT 'api',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_rules_tenant ON alert_rules(tenant_id);
CREATE INDEX IF NOT EXISTS idx_alert_rules_sign ON alert_rules(physical_sign);
CREATE INDEX IF NOT EXISTS idx_alert_rules_event_type ON alert_rules(event_type);
CREATE INDEX IF NOT EXISTS idx_alert_rules_enabled ON alert_rules(enabled);

CREATE TABLE IF NOT EXISTS alert_instances (
    id TEXT PRIMARY KEY NOT NULL,
    dedup_key TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    org_id TEXT NOT NULL,
    device_id TEXT NOT NULL,
    signal TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    level TEXT NOT NULL,
    action TEXT NOT NULL,
    state TEXT NOT NULL,
    occurrence_count INTEGER NOT NULL DEFAULT 1,
    trigger_value REAL,
    window_started_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    processed_at TEXT,
    resolved_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_instances_dedup_key ON alert_instances(dedup_key);
CREATE INDEX IF NOT EXISTS idx_alert_instances_state ON alert_instances(state);
CREATE INDEX IF NOT EXISTS idx_alert_instances_tenant ON alert_instances(tenant_id);
CREATE INDEX IF NOT EXISTS idx_alert_instances_rule ON alert_instances(rule_id);
CREATE INDEX IF NOT EXISTS idx_alert_instances_created ON alert_instances(created_at DESC);

CREATE TABLE IF NOT EXISTS processing_log (
    id TEXT PRIMARY KEY NOT NULL,
    instance_id TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    dedup_key TEXT NOT NULL,
    from_state TEXT,
    to_state TEXT NOT NULL,
    action TEXT,
    actor TEXT NOT NULL,
    outcome TEXT NOT NULL,
    error TEXT,
    event_json TEXT,
    duration_ms INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_processing_log_instance ON processing_log(instance_id);
CREATE INDEX IF NOT EXISTS idx_processing_log_rule ON processing_log(rule_id);
CREATE INDEX IF NOT EXISTS idx_processing_log_tenant ON processing_log(tenant_id);
CREATE INDEX IF NOT EXISTS idx_processing_log_created ON processing_log(created_at DESC);

CREATE TABLE IF NOT EXISTS pending_timers (
    id TEXT PRIMARY KEY NOT NULL,
    instance_id TEXT NOT NULL UNIQUE,
    rule_id TEXT NOT NULL,
    dedup_key TEXT NOT NULL,
    action TEXT NOT NULL,
    fire_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pending_timers_fire_at ON pending_timers(fire_at);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS pending_timers;
DROP TABLE IF EXISTS processing_log;
DROP TABLE IF EXISTS alert_instances;
DROP TABLE IF EXISTS alert_rules;
";
