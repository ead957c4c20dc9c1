use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use vitalmon_common::types::AlertAction;

use crate::entities::pending_timer::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::ProcessStore;

/// 待触发定时器数据行：持久化的延迟处理队列。
///
/// 每个告警实例至多一行（instance_id 唯一索引），进程重启后队列照常
/// 生效，超期定时器按创建顺序立即触发。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTimerRow {
    pub id: String,
    pub instance_id: String,
    pub rule_id: String,
    pub dedup_key: String,
    pub action: AlertAction,
    pub fire_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

fn to_row(m: pending_timer::Model) -> Result<PendingTimerRow> {
    let action = m
        .action
        .parse::<AlertAction>()
        .map_err(|_| StorageError::InvalidColumnValue {
            column: "action",
            value: m.action.clone(),
        })?;
    Ok(PendingTimerRow {
        id: m.id,
        instance_id: m.instance_id,
        rule_id: m.rule_id,
        dedup_key: m.dedup_key,
        action,
        fire_at: m.fire_at.with_timezone(&Utc),
        created_at: m.created_at.with_timezone(&Utc),
    })
}

impl ProcessStore {
    /// 持久化一个定时器。唯一索引保证每个实例至多一个。
    pub async fn arm_timer(&self, row: &PendingTimerRow) -> Result<PendingTimerRow> {
        let am = pending_timer::ActiveModel {
            id: Set(row.id.clone()),
            instance_id: Set(row.instance_id.clone()),
            rule_id: Set(row.rule_id.clone()),
            dedup_key: Set(row.dedup_key.clone()),
            action: Set(row.action.to_string()),
            fire_at: Set(row.fire_at.fixed_offset()),
            created_at: Set(row.created_at.fixed_offset()),
        };
        let model = am.insert(self.db()).await?;
        to_row(model)
    }

    /// 取消定时器。幂等：定时器已触发或不存在时为 no-op，返回 false。
    pub async fn disarm_timer(&self, instance_id: &str) -> Result<bool> {
        let res = Entity::delete_many()
            .filter(Column::InstanceId.eq(instance_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// 到期定时器，按创建顺序返回（重启后超期定时器的触发顺序由此保证）。
    pub async fn due_timers(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<PendingTimerRow>> {
        let rows = Entity::find()
            .filter(Column::FireAt.lte(now.fixed_offset()))
            .order_by(Column::CreatedAt, Order::Asc)
            .limit(limit as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }

    pub async fn get_timer_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<PendingTimerRow>> {
        let model = Entity::find()
            .filter(Column::InstanceId.eq(instance_id))
            .one(self.db())
            .await?;
        model.map(to_row).transpose()
    }

    pub async fn count_pending_timers(&self) -> Result<u64> {
        Ok(Entity::find().count(self.db()).await?)
    }
}
