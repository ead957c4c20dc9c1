use crate::api::pagination::PaginationParams;
use crate::api::{
    engine_error_response, error_response, storage_error_response, success_paginated_response,
    success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use vitalmon_common::types::{AlertAction, AlertState, Outcome, Severity};
use vitalmon_storage::store::{AlertInstanceFilter, AlertInstanceRow, ProcessingLogRow};

/// 告警实例信息
#[derive(Debug, Serialize, ToSchema)]
pub struct AlertInstanceResponse {
    /// 实例唯一标识
    pub id: String,
    /// 去重键（tenant:org:device:signal）
    pub dedup_key: String,
    /// 租户标识
    pub tenant_id: String,
    /// 机构标识
    pub org_id: String,
    /// 设备标识
    pub device_id: String,
    /// 信号（体征或事件类型）
    pub signal: String,
    /// 命中的规则 ID
    pub rule_id: String,
    /// 告警级别
    pub level: Severity,
    /// 配置的自动处理动作
    pub action: AlertAction,
    /// 当前状态
    pub state: AlertState,
    /// 窗口内事件次数
    pub occurrence_count: i64,
    /// 触发值
    pub trigger_value: Option<f64>,
    /// 最近一次事件时间
    pub last_seen_at: DateTime<Utc>,
    /// 自动处理时间
    pub processed_at: Option<DateTime<Utc>>,
    /// 关闭时间
    pub resolved_at: Option<DateTime<Utc>>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl From<AlertInstanceRow> for AlertInstanceResponse {
    fn from(r: AlertInstanceRow) -> Self {
        Self {
            id: r.id,
            dedup_key: r.dedup_key,
            tenant_id: r.tenant_id,
            org_id: r.org_id,
            device_id: r.device_id,
            signal: r.signal,
            rule_id: r.rule_id,
            level: r.level,
            action: r.action,
            state: r.state,
            occurrence_count: r.occurrence_count,
            trigger_value: r.trigger_value,
            last_seen_at: r.last_seen_at,
            processed_at: r.processed_at,
            resolved_at: r.resolved_at,
            created_at: r.created_at,
        }
    }
}

/// 生命周期轨迹条目
#[derive(Debug, Serialize, ToSchema)]
pub struct TraceEntryResponse {
    /// 迁移前状态（创建时为空）
    pub from_state: Option<AlertState>,
    /// 迁移后状态
    pub to_state: AlertState,
    /// 执行的动作
    pub action: Option<AlertAction>,
    /// 执行者（auto / manual:xxx / system）
    pub actor: String,
    /// 执行结果
    pub outcome: Outcome,
    /// 失败原因
    pub error: Option<String>,
    /// 执行耗时（毫秒）
    pub duration_ms: Option<i64>,
    /// 发生时间
    pub created_at: DateTime<Utc>,
}

impl From<ProcessingLogRow> for TraceEntryResponse {
    fn from(r: ProcessingLogRow) -> Self {
        Self {
            from_state: r.from_state,
            to_state: r.to_state,
            action: r.action,
            actor: r.actor,
            outcome: r.outcome,
            error: r.error,
            duration_ms: r.duration_ms,
            created_at: r.created_at,
        }
    }
}

/// 告警详情（含逐步生命周期轨迹）
#[derive(Debug, Serialize, ToSchema)]
pub struct AlertDetailResponse {
    /// 告警实例
    pub instance: AlertInstanceResponse,
    /// 生命周期轨迹（按时间正序）
    pub trace: Vec<TraceEntryResponse>,
}

/// 告警实例列表查询参数
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct ListAlertsParams {
    /// 租户精确匹配
    #[param(required = false, rename = "tenant_id__eq")]
    #[serde(rename = "tenant_id__eq")]
    tenant_id_eq: Option<String>,
    /// 机构精确匹配
    #[param(required = false, rename = "org_id__eq")]
    #[serde(rename = "org_id__eq")]
    org_id_eq: Option<String>,
    /// 设备精确匹配
    #[param(required = false, rename = "device_id__eq")]
    #[serde(rename = "device_id__eq")]
    device_id_eq: Option<String>,
    /// 信号精确匹配
    #[param(required = false, rename = "signal__eq")]
    #[serde(rename = "signal__eq")]
    signal_eq: Option<String>,
    /// 规则精确匹配
    #[param(required = false, rename = "rule_id__eq")]
    #[serde(rename = "rule_id__eq")]
    rule_id_eq: Option<String>,
    /// 状态精确匹配
    #[param(required = false, rename = "state__eq")]
    #[serde(rename = "state__eq")]
    state_eq: Option<String>,
    /// 级别精确匹配
    #[param(required = false, rename = "level__eq")]
    #[serde(rename = "level__eq")]
    level_eq: Option<String>,
    /// 创建时间下界（Unix 秒级时间戳）
    #[param(required = false, rename = "created__gte")]
    #[serde(rename = "created__gte")]
    created_gte: Option<i64>,
    /// 创建时间上界（Unix 秒级时间戳）
    #[param(required = false, rename = "created__lte")]
    #[serde(rename = "created__lte")]
    created_lte: Option<i64>,
    /// 每页条数（默认 20）
    #[param(required = false)]
    #[serde(
        default,
        deserialize_with = "crate::api::pagination::deserialize_optional_u64"
    )]
    limit: Option<u64>,
    /// 偏移量（默认 0）
    #[param(required = false)]
    #[serde(
        default,
        deserialize_with = "crate::api::pagination::deserialize_optional_u64"
    )]
    offset: Option<u64>,
}

fn params_to_filter(params: &ListAlertsParams) -> Result<AlertInstanceFilter, String> {
    let state_eq = params
        .state_eq
        .as_deref()
        .map(AlertState::from_str)
        .transpose()?;
    let level_eq = params
        .level_eq
        .as_deref()
        .map(Severity::from_str)
        .transpose()?;
    Ok(AlertInstanceFilter {
        tenant_id_eq: params.tenant_id_eq.clone(),
        org_id_eq: params.org_id_eq.clone(),
        device_id_eq: params.device_id_eq.clone(),
        signal_eq: params.signal_eq.clone(),
        rule_id_eq: params.rule_id_eq.clone(),
        state_eq,
        level_eq,
        created_from: params
            .created_gte
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        created_to: params
            .created_lte
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
    })
}

/// 分页查询告警实例列表。
#[utoipa::path(
    get,
    path = "/v1/alerts",
    tag = "Alerts",
    params(ListAlertsParams),
    responses(
        (status = 200, description = "告警实例分页列表", body = Vec<AlertInstanceResponse>),
        (status = 400, description = "过滤参数非法", body = crate::api::ApiError)
    )
)]
async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListAlertsParams>,
) -> impl IntoResponse {
    let filter = match params_to_filter(&params) {
        Ok(filter) => filter,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "invalid_filter", &e)
                .into_response()
        }
    };
    let limit = PaginationParams::resolve_limit(params.limit);
    let offset = PaginationParams::resolve_offset(params.offset);

    let total = match state.store.count_alert_instances(&filter).await {
        Ok(c) => c,
        Err(e) => return storage_error_response(&trace_id, &e).into_response(),
    };
    match state.store.list_alert_instances(&filter, limit, offset).await {
        Ok(rows) => {
            let items: Vec<AlertInstanceResponse> =
                rows.into_iter().map(AlertInstanceResponse::from).collect();
            success_paginated_response(StatusCode::OK, &trace_id, items, total, limit, offset)
        }
        Err(e) => storage_error_response(&trace_id, &e).into_response(),
    }
}

/// 获取告警详情，包含逐步的生命周期轨迹。
#[utoipa::path(
    get,
    path = "/v1/alerts/{id}",
    tag = "Alerts",
    params(("id" = String, Path, description = "告警实例 ID")),
    responses(
        (status = 200, description = "告警详情", body = AlertDetailResponse),
        (status = 404, description = "实例不存在", body = crate::api::ApiError)
    )
)]
async fn get_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let instance = match state.store.get_alert_instance_by_id(&id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Alert instance not found",
            )
        }
        Err(e) => return storage_error_response(&trace_id, &e),
    };
    match state.store.instance_trace(&id).await {
        Ok(entries) => success_response(
            StatusCode::OK,
            &trace_id,
            AlertDetailResponse {
                instance: instance.into(),
                trace: entries.into_iter().map(TraceEntryResponse::from).collect(),
            },
        ),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// 人工处理请求
#[derive(Debug, Deserialize, ToSchema)]
struct ManualActionRequest {
    /// 操作人标识
    #[serde(default = "default_operator")]
    operator: String,
}

fn default_operator() -> String {
    "unknown".to_string()
}

/// 人工关闭告警。与定时器触发 / 自动恢复的竞态由状态 CAS 仲裁，
/// 后到的一方为 no-op。
#[utoipa::path(
    post,
    path = "/v1/alerts/{id}/resolve",
    tag = "Alerts",
    params(("id" = String, Path, description = "告警实例 ID")),
    request_body = ManualActionRequest,
    responses(
        (status = 200, description = "已关闭"),
        (status = 409, description = "实例已处于终态", body = crate::api::ApiError),
        (status = 404, description = "实例不存在", body = crate::api::ApiError)
    )
)]
async fn resolve_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ManualActionRequest>,
) -> impl IntoResponse {
    match state.processor.manual_resolve(&id, &req.operator).await {
        Ok(true) => crate::api::success_empty_response(StatusCode::OK, &trace_id, "Alert resolved"),
        Ok(false) => match state.store.get_alert_instance_by_id(&id).await {
            Ok(Some(_)) => error_response(
                StatusCode::CONFLICT,
                &trace_id,
                "conflict",
                "Alert instance is already closed",
            ),
            Ok(None) => error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Alert instance not found",
            ),
            Err(e) => storage_error_response(&trace_id, &e),
        },
        Err(e) => engine_error_response(&trace_id, &e),
    }
}

/// 人工屏蔽尚未处理的告警（操作员静音）。
#[utoipa::path(
    post,
    path = "/v1/alerts/{id}/suppress",
    tag = "Alerts",
    params(("id" = String, Path, description = "告警实例 ID")),
    request_body = ManualActionRequest,
    responses(
        (status = 200, description = "已屏蔽"),
        (status = 409, description = "实例不在可屏蔽状态", body = crate::api::ApiError),
        (status = 404, description = "实例不存在", body = crate::api::ApiError)
    )
)]
async fn suppress_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ManualActionRequest>,
) -> impl IntoResponse {
    match state.processor.manual_suppress(&id, &req.operator).await {
        Ok(true) => {
            crate::api::success_empty_response(StatusCode::OK, &trace_id, "Alert suppressed")
        }
        Ok(false) => match state.store.get_alert_instance_by_id(&id).await {
            Ok(Some(_)) => error_response(
                StatusCode::CONFLICT,
                &trace_id,
                "conflict",
                "Alert instance cannot be suppressed in its current state",
            ),
            Ok(None) => error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Alert instance not found",
            ),
            Err(e) => storage_error_response(&trace_id, &e),
        },
        Err(e) => engine_error_response(&trace_id, &e),
    }
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_alerts))
        .routes(routes!(get_alert))
        .routes(routes!(resolve_alert))
        .routes(routes!(suppress_alert))
}
