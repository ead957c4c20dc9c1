use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use vitalmon_common::types::{AlertAction, AlertRule, Severity};

use crate::entities::alert_rule::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::ProcessStore;

/// 告警规则更新请求（None 表示保持原值）
#[derive(Debug, Clone, Default)]
pub struct AlertRuleUpdate {
    pub name: Option<String>,
    pub org_id: Option<Option<String>>,
    pub level: Option<Severity>,
    pub threshold_min: Option<Option<f64>>,
    pub threshold_max: Option<Option<f64>>,
    pub auto_process_enabled: Option<bool>,
    pub auto_process_action: Option<AlertAction>,
    pub auto_process_delay_secs: Option<u64>,
    pub auto_resolve_threshold_count: Option<u32>,
    pub suppress_duration_mins: Option<u64>,
    pub time_window_secs: Option<u64>,
    pub enabled: Option<bool>,
}

/// 告警规则列表过滤器
#[derive(Debug, Clone, Default)]
pub struct AlertRuleFilter {
    pub tenant_id_eq: Option<String>,
    pub org_id_eq: Option<String>,
    pub name_contains: Option<String>,
    pub physical_sign_eq: Option<String>,
    pub event_type_eq: Option<String>,
    pub level_eq: Option<Severity>,
    pub enabled_eq: Option<bool>,
}

fn to_rule(m: alert_rule::Model) -> Result<AlertRule> {
    let level = m
        .level
        .parse::<Severity>()
        .map_err(|_| StorageError::InvalidColumnValue {
            column: "level",
            value: m.level.clone(),
        })?;
    let action = m.auto_process_action.parse::<AlertAction>().map_err(|_| {
        StorageError::InvalidColumnValue {
            column: "auto_process_action",
            value: m.auto_process_action.clone(),
        }
    })?;
    Ok(AlertRule {
        id: m.id,
        name: m.name,
        tenant_id: m.tenant_id,
        org_id: m.org_id,
        physical_sign: m.physical_sign,
        event_type: m.event_type,
        level,
        threshold_min: m.threshold_min,
        threshold_max: m.threshold_max,
        auto_process_enabled: m.auto_process_enabled,
        auto_process_action: action,
        auto_process_delay_secs: m.auto_process_delay_secs.max(0) as u64,
        auto_resolve_threshold_count: m.auto_resolve_threshold_count.max(0) as u32,
        suppress_duration_mins: m.suppress_duration_mins.max(0) as u64,
        time_window_secs: m.time_window_secs.max(0) as u64,
        enabled: m.enabled,
        source: m.source,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

fn apply_filter(mut q: sea_orm::Select<Entity>, filter: &AlertRuleFilter) -> sea_orm::Select<Entity> {
    if let Some(t) = &filter.tenant_id_eq {
        q = q.filter(Column::TenantId.eq(t.clone()));
    }
    if let Some(o) = &filter.org_id_eq {
        q = q.filter(Column::OrgId.eq(o.clone()));
    }
    if let Some(n) = &filter.name_contains {
        q = q.filter(Column::Name.contains(n.clone()));
    }
    if let Some(s) = &filter.physical_sign_eq {
        q = q.filter(Column::PhysicalSign.eq(s.clone()));
    }
    if let Some(e) = &filter.event_type_eq {
        q = q.filter(Column::EventType.eq(e.clone()));
    }
    if let Some(l) = filter.level_eq {
        q = q.filter(Column::Level.eq(l.to_string()));
    }
    if let Some(en) = filter.enabled_eq {
        q = q.filter(Column::Enabled.eq(en));
    }
    q
}

impl ProcessStore {
    pub async fn insert_alert_rule(&self, rule: &AlertRule) -> Result<AlertRule> {
        let now = Utc::now().fixed_offset();
        let am = alert_rule::ActiveModel {
            id: Set(rule.id.clone()),
            name: Set(rule.name.clone()),
            tenant_id: Set(rule.tenant_id.clone()),
            org_id: Set(rule.org_id.clone()),
            physical_sign: Set(rule.physical_sign.clone()),
            event_type: Set(rule.event_type.clone()),
            level: Set(rule.level.to_string()),
            threshold_min: Set(rule.threshold_min),
            threshold_max: Set(rule.threshold_max),
            auto_process_enabled: Set(rule.auto_process_enabled),
            auto_process_action: Set(rule.auto_process_action.to_string()),
            auto_process_delay_secs: Set(rule.auto_process_delay_secs as i64),
            auto_resolve_threshold_count: Set(rule.auto_resolve_threshold_count as i64),
            suppress_duration_mins: Set(rule.suppress_duration_mins as i64),
            time_window_secs: Set(rule.time_window_secs as i64),
            enabled: Set(rule.enabled),
            source: Set(rule.source.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        to_rule(model)
    }

    pub async fn get_alert_rule_by_id(&self, id: &str) -> Result<Option<AlertRule>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        model.map(to_rule).transpose()
    }

    pub async fn list_alert_rules(
        &self,
        filter: &AlertRuleFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertRule>> {
        let rows = apply_filter(Entity::find(), filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_rule).collect()
    }

    pub async fn count_alert_rules(&self, filter: &AlertRuleFilter) -> Result<u64> {
        Ok(apply_filter(Entity::find(), filter).count(self.db()).await?)
    }

    /// 启用规则全量加载（供规则注册表在启动/变更后重建）。
    pub async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>> {
        let rows = Entity::find()
            .filter(Column::Enabled.eq(true))
            .order_by(Column::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_rule).collect()
    }

    /// 查找与 (tenant, physical_sign, event_type, level) 完全一致且仍启用的规则。
    pub async fn find_conflicting_rule(
        &self,
        tenant_id: &str,
        physical_sign: Option<&str>,
        event_type: Option<&str>,
        level: Severity,
        exclude_id: Option<&str>,
    ) -> Result<Option<AlertRule>> {
        let mut q = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Level.eq(level.to_string()))
            .filter(Column::Enabled.eq(true));
        q = match physical_sign {
            Some(s) => q.filter(Column::PhysicalSign.eq(s)),
            None => q.filter(Column::PhysicalSign.is_null()),
        };
        q = match event_type {
            Some(e) => q.filter(Column::EventType.eq(e)),
            None => q.filter(Column::EventType.is_null()),
        };
        if let Some(ex) = exclude_id {
            q = q.filter(Column::Id.ne(ex));
        }
        let model = q.one(self.db()).await?;
        model.map(to_rule).transpose()
    }

    pub async fn update_alert_rule(
        &self,
        id: &str,
        update: &AlertRuleUpdate,
    ) -> Result<Option<AlertRule>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        let Some(m) = model else {
            return Ok(None);
        };
        let mut am: alert_rule::ActiveModel = m.into();
        if let Some(name) = &update.name {
            am.name = Set(name.clone());
        }
        if let Some(org) = &update.org_id {
            am.org_id = Set(org.clone());
        }
        if let Some(level) = update.level {
            am.level = Set(level.to_string());
        }
        if let Some(min) = update.threshold_min {
            am.threshold_min = Set(min);
        }
        if let Some(max) = update.threshold_max {
            am.threshold_max = Set(max);
        }
        if let Some(enabled) = update.auto_process_enabled {
            am.auto_process_enabled = Set(enabled);
        }
        if let Some(action) = update.auto_process_action {
            am.auto_process_action = Set(action.to_string());
        }
        if let Some(delay) = update.auto_process_delay_secs {
            am.auto_process_delay_secs = Set(delay as i64);
        }
        if let Some(count) = update.auto_resolve_threshold_count {
            am.auto_resolve_threshold_count = Set(count as i64);
        }
        if let Some(mins) = update.suppress_duration_mins {
            am.suppress_duration_mins = Set(mins as i64);
        }
        if let Some(secs) = update.time_window_secs {
            am.time_window_secs = Set(secs as i64);
        }
        if let Some(enabled) = update.enabled {
            am.enabled = Set(enabled);
        }
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        Ok(Some(to_rule(updated)?))
    }

    pub async fn delete_alert_rule(&self, id: &str) -> Result<bool> {
        let res = Entity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn set_rule_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        let Some(m) = model else {
            return Ok(false);
        };
        let mut am: alert_rule::ActiveModel = m.into();
        am.enabled = Set(enabled);
        am.updated_at = Set(Utc::now().fixed_offset());
        am.update(self.db()).await?;
        Ok(true)
    }

    /// 批量启停，返回实际更新条数。
    pub async fn set_rules_enabled(&self, ids: &[String], enabled: bool) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let res = Entity::update_many()
            .col_expr(Column::Enabled, sea_orm::sea_query::Expr::value(enabled))
            .col_expr(
                Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now().fixed_offset()),
            )
            .filter(Column::Id.is_in(ids.to_vec()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }
}
