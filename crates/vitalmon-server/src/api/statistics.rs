use crate::api::{error_response, storage_error_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use crate::stats::StatisticsSnapshot;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// 告警总览。读取聚合器的最新快照；快照缺失时现场重算一次。
#[utoipa::path(
    get,
    path = "/v1/statistics/overview",
    tag = "Statistics",
    responses(
        (status = 200, description = "统计快照", body = StatisticsSnapshot)
    )
)]
async fn overview(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.stats.snapshot().await {
        Ok(snapshot) => success_response(StatusCode::OK, &trace_id, snapshot),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// 趋势查询参数
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct TrendParams {
    /// 时间粒度（hour / day，默认 hour）
    #[param(required = false)]
    granularity: Option<String>,
    /// 回看范围（小时，默认 24，最大 720）
    #[param(required = false)]
    hours: Option<i64>,
}

/// 趋势点
#[derive(Debug, Serialize, ToSchema)]
struct TrendPoint {
    /// 桶起始时间
    bucket: DateTime<Utc>,
    /// 新建告警数
    total: u64,
    /// 自动处理数（processed / escalated / resolved 由自动路径达成）
    auto_processed: u64,
    /// 已关闭数
    resolved: u64,
}

/// 按时间粒度聚合的告警趋势序列。
#[utoipa::path(
    get,
    path = "/v1/statistics/trend",
    tag = "Statistics",
    params(TrendParams),
    responses(
        (status = 200, description = "趋势序列", body = Vec<TrendPoint>),
        (status = 400, description = "粒度参数非法", body = crate::api::ApiError)
    )
)]
async fn trend(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<TrendParams>,
) -> impl IntoResponse {
    let bucket_span = match params.granularity.as_deref().unwrap_or("hour") {
        "hour" => Duration::hours(1),
        "day" => Duration::days(1),
        other => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "invalid_filter",
                &format!("unknown granularity: {other}"),
            )
            .into_response()
        }
    };
    let hours = params.hours.unwrap_or(24).clamp(1, 720);
    let now = Utc::now();
    let from = now - Duration::hours(hours);

    let instances = match state.store.list_instances_in_range(from, now).await {
        Ok(rows) => rows,
        Err(e) => return storage_error_response(&trace_id, &e).into_response(),
    };

    let start = match from.duration_trunc(bucket_span) {
        Ok(start) => start,
        Err(_) => from,
    };
    let mut points: Vec<TrendPoint> = Vec::new();
    let mut bucket = start;
    while bucket < now {
        points.push(TrendPoint {
            bucket,
            total: 0,
            auto_processed: 0,
            resolved: 0,
        });
        bucket += bucket_span;
    }

    for inst in &instances {
        let Ok(truncated) = inst.created_at.duration_trunc(bucket_span) else {
            continue;
        };
        if let Some(point) = points.iter_mut().find(|p| p.bucket == truncated) {
            point.total += 1;
            if inst.processed_at.is_some() {
                point.auto_processed += 1;
            }
            if inst.state.is_terminal() {
                point.resolved += 1;
            }
        }
    }

    success_response(StatusCode::OK, &trace_id, points)
}

/// 处理效能分析
#[derive(Debug, Serialize, ToSchema)]
struct PerformanceResponse {
    /// 平均动作执行耗时（毫秒）——处理效率
    avg_action_delay_ms: f64,
    /// 动作耗时 P50 / P90 / P99（毫秒）
    latency_p50_ms: f64,
    latency_p90_ms: f64,
    latency_p99_ms: f64,
    /// 自动处理成功率（0-1）——处理准确性
    success_rate: f64,
    /// 自动处理覆盖率（0-1）
    coverage_rate: f64,
    /// 当前未关闭告警数
    open_alerts: u64,
    /// 统计窗口内告警总数
    total_instances: u64,
}

/// 处理效能分析（效率 / 准确性 / 覆盖率）。实时重算，不走快照缓存。
#[utoipa::path(
    get,
    path = "/v1/statistics/performance",
    tag = "Statistics",
    responses(
        (status = 200, description = "效能指标", body = PerformanceResponse)
    )
)]
async fn performance(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let snapshot = match state.stats.compute(Utc::now()).await {
        Ok(snapshot) => snapshot,
        Err(e) => return storage_error_response(&trace_id, &e).into_response(),
    };
    let open_alerts = match state.store.list_open_instances().await {
        Ok(rows) => rows.len() as u64,
        Err(e) => return storage_error_response(&trace_id, &e).into_response(),
    };

    success_response(
        StatusCode::OK,
        &trace_id,
        PerformanceResponse {
            avg_action_delay_ms: snapshot.avg_action_delay_ms,
            latency_p50_ms: snapshot.latency_p50_ms,
            latency_p90_ms: snapshot.latency_p90_ms,
            latency_p99_ms: snapshot.latency_p99_ms,
            success_rate: snapshot.success_rate,
            coverage_rate: snapshot.coverage_rate,
            open_alerts,
            total_instances: snapshot.total_instances,
        },
    )
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(overview))
        .routes(routes!(trend))
        .routes(routes!(performance))
}
