use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use vitalmon_common::types::{AlertAction, AlertState, Outcome};

use crate::entities::processing_log::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::ProcessStore;

/// 处理日志数据行（追加写，永不修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLogRow {
    pub id: String,
    pub instance_id: String,
    pub rule_id: String,
    pub tenant_id: String,
    pub dedup_key: String,
    pub from_state: Option<AlertState>,
    pub to_state: AlertState,
    pub action: Option<AlertAction>,
    /// auto / manual / system
    pub actor: String,
    pub outcome: Outcome,
    pub error: Option<String>,
    pub event_json: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// 处理日志列表过滤器
#[derive(Debug, Clone, Default)]
pub struct ProcessingLogFilter {
    pub instance_id_eq: Option<String>,
    pub rule_id_eq: Option<String>,
    pub tenant_id_eq: Option<String>,
    pub actor_eq: Option<String>,
    pub outcome_eq: Option<Outcome>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

fn to_row(m: processing_log::Model) -> Result<ProcessingLogRow> {
    let from_state = m
        .from_state
        .as_deref()
        .map(|s| {
            s.parse::<AlertState>()
                .map_err(|_| StorageError::InvalidColumnValue {
                    column: "from_state",
                    value: s.to_string(),
                })
        })
        .transpose()?;
    let to_state = m
        .to_state
        .parse::<AlertState>()
        .map_err(|_| StorageError::InvalidColumnValue {
            column: "to_state",
            value: m.to_state.clone(),
        })?;
    let action = m
        .action
        .as_deref()
        .map(|a| {
            a.parse::<AlertAction>()
                .map_err(|_| StorageError::InvalidColumnValue {
                    column: "action",
                    value: a.to_string(),
                })
        })
        .transpose()?;
    let outcome = m
        .outcome
        .parse::<Outcome>()
        .map_err(|_| StorageError::InvalidColumnValue {
            column: "outcome",
            value: m.outcome.clone(),
        })?;
    Ok(ProcessingLogRow {
        id: m.id,
        instance_id: m.instance_id,
        rule_id: m.rule_id,
        tenant_id: m.tenant_id,
        dedup_key: m.dedup_key,
        from_state,
        to_state,
        action,
        actor: m.actor,
        outcome,
        error: m.error,
        event_json: m.event_json,
        duration_ms: m.duration_ms,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

fn apply_filter(
    mut q: sea_orm::Select<Entity>,
    filter: &ProcessingLogFilter,
) -> sea_orm::Select<Entity> {
    if let Some(i) = &filter.instance_id_eq {
        q = q.filter(Column::InstanceId.eq(i.clone()));
    }
    if let Some(r) = &filter.rule_id_eq {
        q = q.filter(Column::RuleId.eq(r.clone()));
    }
    if let Some(t) = &filter.tenant_id_eq {
        q = q.filter(Column::TenantId.eq(t.clone()));
    }
    if let Some(a) = &filter.actor_eq {
        q = q.filter(Column::Actor.eq(a.clone()));
    }
    if let Some(o) = filter.outcome_eq {
        q = q.filter(Column::Outcome.eq(o.to_string()));
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
    pub async fn append_log(&self, row: &ProcessingLogRow) -> Result<ProcessingLogRow> {
        let am = processing_log::ActiveModel {
            id: Set(row.id.clone()),
            instance_id: Set(row.instance_id.clone()),
            rule_id: Set(row.rule_id.clone()),
            tenant_id: Set(row.tenant_id.clone()),
            dedup_key: Set(row.dedup_key.clone()),
            from_state: Set(row.from_state.map(|s| s.to_string())),
            to_state: Set(row.to_state.to_string()),
            action: Set(row.action.map(|a| a.to_string())),
            actor: Set(row.actor.clone()),
            outcome: Set(row.outcome.to_string()),
            error: Set(row.error.clone()),
            event_json: Set(row.event_json.clone()),
            duration_ms: Set(row.duration_ms),
            created_at: Set(row.created_at.fixed_offset()),
        };
        let model = am.insert(self.db()).await?;
        to_row(model)
    }

    pub async fn list_logs(
        &self,
        filter: &ProcessingLogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ProcessingLogRow>> {
        let rows = apply_filter(Entity::find(), filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }

    pub async fn count_logs(&self, filter: &ProcessingLogFilter) -> Result<u64> {
        Ok(apply_filter(Entity::find(), filter).count(self.db()).await?)
    }

    /// 单个告警实例的全生命周期轨迹（按时间正序，同一时刻按写入顺序）。
    pub async fn instance_trace(&self, instance_id: &str) -> Result<Vec<ProcessingLogRow>> {
        let rows = Entity::find()
            .filter(Column::InstanceId.eq(instance_id))
            .order_by(Column::CreatedAt, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }

    /// 时间范围内的日志全量（统计聚合用）。
    pub async fn list_logs_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProcessingLogRow>> {
        let rows = Entity::find()
            .filter(Column::CreatedAt.gte(from.fixed_offset()))
            .filter(Column::CreatedAt.lte(to.fixed_offset()))
            .order_by(Column::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }
}
