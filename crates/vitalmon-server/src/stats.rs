use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::interval;
use utoipa::ToSchema;
use vitalmon_common::types::{AlertState, Outcome};
use vitalmon_storage::error::Result as StorageResult;
use vitalmon_storage::store::ProcessStore;

/// 统计快照（由聚合器独立重算，热路径从不等待它）
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatisticsSnapshot {
    /// 快照计算时间
    pub computed_at: DateTime<Utc>,
    /// 统计窗口起点
    pub window_from: DateTime<Utc>,
    /// 统计窗口终点
    pub window_to: DateTime<Utc>,
    /// 窗口内告警实例总数
    pub total_instances: u64,
    /// 按状态分布
    pub by_state: HashMap<String, u64>,
    /// 按级别分布
    pub by_severity: HashMap<String, u64>,
    /// 按自动处理动作分布
    pub by_action: HashMap<String, u64>,
    /// 按规则分布
    pub by_rule: HashMap<String, u64>,
    /// 自动处理执行次数
    pub auto_handled: u64,
    /// 人工处理次数
    pub manual_handled: u64,
    /// 自动处理成功次数
    pub auto_success: u64,
    /// 自动处理失败次数
    pub auto_failure: u64,
    /// 自动处理成功率（0-1）
    pub success_rate: f64,
    /// 自动处理覆盖率（自动处理告警 / 全部告警，0-1）
    pub coverage_rate: f64,
    /// 平均动作执行耗时（毫秒）
    pub avg_action_delay_ms: f64,
    /// 动作耗时 P50（毫秒）
    pub latency_p50_ms: f64,
    /// 动作耗时 P90（毫秒）
    pub latency_p90_ms: f64,
    /// 动作耗时 P99（毫秒）
    pub latency_p99_ms: f64,
}

/// Periodic statistics recomputation over the processing log and instance
/// table. Runs on its own cadence; failures are logged and retried on the
/// next cycle, and stale snapshots are acceptable by design.
pub struct StatisticsAggregator {
    store: Arc<ProcessStore>,
    window_hours: i64,
    snapshot: RwLock<Option<StatisticsSnapshot>>,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<ProcessStore>, window_hours: i64) -> Self {
        Self {
            store,
            window_hours,
            snapshot: RwLock::new(None),
        }
    }

    /// Latest snapshot, computing one on demand when none exists yet.
    pub async fn snapshot(&self) -> StorageResult<StatisticsSnapshot> {
        if let Some(snapshot) = self.snapshot.read().await.clone() {
            return Ok(snapshot);
        }
        self.refresh().await
    }

    /// Recomputes and stores the snapshot.
    pub async fn refresh(&self) -> StorageResult<StatisticsSnapshot> {
        let snapshot = self.compute(Utc::now()).await?;
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn compute(&self, now: DateTime<Utc>) -> StorageResult<StatisticsSnapshot> {
        let window_from = now - Duration::hours(self.window_hours);
        let instances = self.store.list_instances_in_range(window_from, now).await?;
        let logs = self.store.list_logs_in_range(window_from, now).await?;

        let total_instances = instances.len() as u64;
        let mut by_state: HashMap<String, u64> = HashMap::new();
        let mut by_severity: HashMap<String, u64> = HashMap::new();
        let mut by_action: HashMap<String, u64> = HashMap::new();
        let mut by_rule: HashMap<String, u64> = HashMap::new();
        for inst in &instances {
            *by_state.entry(inst.state.to_string()).or_default() += 1;
            *by_severity.entry(inst.level.to_string()).or_default() += 1;
            *by_rule.entry(inst.rule_id.clone()).or_default() += 1;
        }

        let mut auto_handled = 0u64;
        let mut manual_handled = 0u64;
        let mut auto_success = 0u64;
        let mut auto_failure = 0u64;
        let mut durations: Vec<i64> = Vec::new();
        for entry in &logs {
            if entry.actor.starts_with("manual") {
                manual_handled += 1;
                continue;
            }
            // Auto action executions are the scheduler's claimed
            // SCHEDULED -> terminal-or-processed transitions.
            let Some(action) = entry.action else { continue };
            if entry.from_state != Some(AlertState::Scheduled) {
                continue;
            }
            if entry.to_state == AlertState::Scheduled {
                continue;
            }
            auto_handled += 1;
            *by_action.entry(action.to_string()).or_default() += 1;
            match entry.outcome {
                Outcome::Success => auto_success += 1,
                Outcome::Failure => auto_failure += 1,
            }
            if let Some(ms) = entry.duration_ms {
                durations.push(ms);
            }
        }

        durations.sort_unstable();
        let success_rate = if auto_handled > 0 {
            auto_success as f64 / auto_handled as f64
        } else {
            0.0
        };
        let coverage_rate = if total_instances > 0 {
            auto_handled.min(total_instances) as f64 / total_instances as f64
        } else {
            0.0
        };
        let avg_action_delay_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        Ok(StatisticsSnapshot {
            computed_at: now,
            window_from,
            window_to: now,
            total_instances,
            by_state,
            by_severity,
            by_action,
            by_rule,
            auto_handled,
            manual_handled,
            auto_success,
            auto_failure,
            success_rate,
            coverage_rate,
            avg_action_delay_ms,
            latency_p50_ms: percentile(&durations, 0.50),
            latency_p90_ms: percentile(&durations, 0.90),
            latency_p99_ms: percentile(&durations, 0.99),
        })
    }

    /// Recomputation loop; read-only against storage and cancel-safe.
    pub async fn run(self: Arc<Self>, recompute_secs: u64, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(recompute_secs, "Statistics aggregator started");
        let mut tick = interval(std::time::Duration::from_secs(recompute_secs.max(5)));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.refresh().await {
                        // Non-fatal: stale statistics self-heal next cycle.
                        tracing::error!(error = %e, "Statistics recomputation failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[i64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() as f64) * q).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1] as f64
}
