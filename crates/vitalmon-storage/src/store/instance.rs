use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use vitalmon_common::types::{AlertAction, AlertState, Severity};

use crate::entities::alert_instance::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::ProcessStore;

/// 告警实例数据行（来自 alert_instances 表）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInstanceRow {
    pub id: String,
    pub dedup_key: String,
    pub tenant_id: String,
    pub org_id: String,
    pub device_id: String,
    pub signal: String,
    pub rule_id: String,
    pub level: Severity,
    pub action: AlertAction,
    pub state: AlertState,
    pub occurrence_count: i64,
    pub trigger_value: Option<f64>,
    pub window_started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 告警实例列表过滤器
#[derive(Debug, Clone, Default)]
pub struct AlertInstanceFilter {
    pub tenant_id_eq: Option<String>,
    pub org_id_eq: Option<String>,
    pub device_id_eq: Option<String>,
    pub signal_eq: Option<String>,
    pub rule_id_eq: Option<String>,
    pub state_eq: Option<AlertState>,
    pub level_eq: Option<Severity>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

fn to_row(m: alert_instance::Model) -> Result<AlertInstanceRow> {
    let level = m
        .level
        .parse::<Severity>()
        .map_err(|_| StorageError::InvalidColumnValue {
            column: "level",
            value: m.level.clone(),
        })?;
    let action = m
        .action
        .parse::<AlertAction>()
        .map_err(|_| StorageError::InvalidColumnValue {
            column: "action",
            value: m.action.clone(),
        })?;
    let state = m
        .state
        .parse::<AlertState>()
        .map_err(|_| StorageError::InvalidColumnValue {
            column: "state",
            value: m.state.clone(),
        })?;
    Ok(AlertInstanceRow {
        id: m.id,
        dedup_key: m.dedup_key,
        tenant_id: m.tenant_id,
        org_id: m.org_id,
        device_id: m.device_id,
        signal: m.signal,
        rule_id: m.rule_id,
        level,
        action,
        state,
        occurrence_count: m.occurrence_count,
        trigger_value: m.trigger_value,
        window_started_at: m.window_started_at.with_timezone(&Utc),
        last_seen_at: m.last_seen_at.with_timezone(&Utc),
        processed_at: m.processed_at.map(|t| t.with_timezone(&Utc)),
        resolved_at: m.resolved_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

fn apply_filter(
    mut q: sea_orm::Select<Entity>,
    filter: &AlertInstanceFilter,
) -> sea_orm::Select<Entity> {
    if let Some(t) = &filter.tenant_id_eq {
        q = q.filter(Column::TenantId.eq(t.clone()));
    }
    if let Some(o) = &filter.org_id_eq {
        q = q.filter(Column::OrgId.eq(o.clone()));
    }
    if let Some(d) = &filter.device_id_eq {
        q = q.filter(Column::DeviceId.eq(d.clone()));
    }
    if let Some(s) = &filter.signal_eq {
        q = q.filter(Column::Signal.eq(s.clone()));
    }
    if let Some(r) = &filter.rule_id_eq {
        q = q.filter(Column::RuleId.eq(r.clone()));
    }
    if let Some(st) = filter.state_eq {
        q = q.filter(Column::State.eq(st.to_string()));
    }
    if let Some(l) = filter.level_eq {
        q = q.filter(Column::Level.eq(l.to_string()));
    }
    if let Some(from) = filter.created_from {
        q = q.filter(Column::CreatedAt.gte(from.fixed_offset()));
    }
    if let Some(to) = filter.created_to {
        q = q.filter(Column::CreatedAt.lte(to.fixed_offset()));
    }
    q
}

impl ProcessStore {
    pub async fn insert_alert_instance(&self, row: &AlertInstanceRow) -> Result<AlertInstanceRow> {
        let am = alert_instance::ActiveModel {
            id: Set(row.id.clone()),
            dedup_key: Set(row.dedup_key.clone()),
            tenant_id: Set(row.tenant_id.clone()),
            org_id: Set(row.org_id.clone()),
            device_id: Set(row.device_id.clone()),
            signal: Set(row.signal.clone()),
            rule_id: Set(row.rule_id.clone()),
            level: Set(row.level.to_string()),
            action: Set(row.action.to_string()),
            state: Set(row.state.to_string()),
            occurrence_count: Set(row.occurrence_count),
            trigger_value: Set(row.trigger_value),
            window_started_at: Set(row.window_started_at.fixed_offset()),
            last_seen_at: Set(row.last_seen_at.fixed_offset()),
            processed_at: Set(row.processed_at.map(|t| t.fixed_offset())),
            resolved_at: Set(row.resolved_at.map(|t| t.fixed_offset())),
            created_at: Set(row.created_at.fixed_offset()),
            updated_at: Set(row.updated_at.fixed_offset()),
        };
        let model = am.insert(self.db()).await?;
        to_row(model)
    }

    pub async fn get_alert_instance_by_id(&self, id: &str) -> Result<Option<AlertInstanceRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        model.map(to_row).transpose()
    }

    /// 重复事件：次数 +1，滑动窗口向后延伸。
    pub async fn record_duplicate(
        &self,
        id: &str,
        last_seen_at: DateTime<Utc>,
    ) -> Result<Option<AlertInstanceRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        let Some(m) = model else {
            return Ok(None);
        };
        let count = m.occurrence_count + 1;
        let mut am: alert_instance::ActiveModel = m.into();
        am.occurrence_count = Set(count);
        am.last_seen_at = Set(last_seen_at.fixed_offset());
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        Ok(Some(to_row(updated)?))
    }

    /// 状态机核心：条件更新实现的 compare-and-set。
    ///
    /// 仅当当前状态位于 `from` 集合中时才迁移到 `to`，并返回迁移前的
    /// 状态；否则返回 `None`（竞争的另一方已经完成迁移）。定时器触发、
    /// 自动恢复与人工处理之间的竞态由此仲裁，保证动作至多执行一次。
    pub async fn transition_state(
        &self,
        id: &str,
        from: &[AlertState],
        to: AlertState,
        at: DateTime<Utc>,
    ) -> Result<Option<AlertState>> {
        loop {
            let model = Entity::find_by_id(id).one(self.db()).await?;
            let Some(m) = model else {
                return Err(StorageError::NotFound {
                    entity: "alert_instance",
                    id: id.to_string(),
                });
            };
            let current = m
                .state
                .parse::<AlertState>()
                .map_err(|_| StorageError::InvalidColumnValue {
                    column: "state",
                    value: m.state.clone(),
                })?;
            if !from.contains(&current) {
                return Ok(None);
            }

            let mut update = Entity::update_many()
                .col_expr(Column::State, Expr::value(to.to_string()))
                .col_expr(Column::UpdatedAt, Expr::value(at.fixed_offset()));
            match to {
                AlertState::Processed | AlertState::Escalated => {
                    update = update.col_expr(Column::ProcessedAt, Expr::value(at.fixed_offset()));
                }
                AlertState::Resolved | AlertState::Expired | AlertState::Suppressed => {
                    update = update.col_expr(Column::ResolvedAt, Expr::value(at.fixed_offset()));
                }
                _ => {}
            }
            let res = update
                .filter(Column::Id.eq(id))
                .filter(Column::State.eq(current.to_string()))
                .exec(self.db())
                .await?;
            if res.rows_affected > 0 {
                return Ok(Some(current));
            }
            // Lost the race against a concurrent transition; re-read and
            // re-check against `from`.
        }
    }

    pub async fn list_alert_instances(
        &self,
        filter: &AlertInstanceFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertInstanceRow>> {
        let rows = apply_filter(Entity::find(), filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }

    pub async fn count_alert_instances(&self, filter: &AlertInstanceFilter) -> Result<u64> {
        Ok(apply_filter(Entity::find(), filter).count(self.db()).await?)
    }

    /// 所有未到达终态的实例（引擎重启时重建内存键状态用）。
    pub async fn list_open_instances(&self) -> Result<Vec<AlertInstanceRow>> {
        let terminal = vec![
            AlertState::Resolved.to_string(),
            AlertState::Expired.to_string(),
            AlertState::Suppressed.to_string(),
        ];
        let rows = Entity::find()
            .filter(Column::State.is_not_in(terminal))
            .order_by(Column::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }

    /// 创建时间早于 `cutoff` 且未到达终态的实例（过期扫描用）。
    pub async fn list_expiry_candidates(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AlertInstanceRow>> {
        let terminal = vec![
            AlertState::Resolved.to_string(),
            AlertState::Expired.to_string(),
            AlertState::Suppressed.to_string(),
        ];
        let rows = Entity::find()
            .filter(Column::State.is_not_in(terminal))
            .filter(Column::CreatedAt.lt(cutoff.fixed_offset()))
            .order_by(Column::CreatedAt, Order::Asc)
            .limit(limit as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }

    /// 时间范围内的实例全量（统计聚合用，读路径与热路径解耦）。
    pub async fn list_instances_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AlertInstanceRow>> {
        let rows = Entity::find()
            .filter(Column::CreatedAt.gte(from.fixed_offset()))
            .filter(Column::CreatedAt.lte(to.fixed_offset()))
            .order_by(Column::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }
}
