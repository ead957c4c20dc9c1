use crate::api::pagination::PaginationParams;
use crate::api::{error_response, storage_error_response, success_paginated_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use vitalmon_common::types::{AlertAction, AlertState, Outcome};
use vitalmon_storage::store::{ProcessingLogFilter, ProcessingLogRow};

/// 处理日志条目
#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessingLogResponse {
    /// 日志唯一标识
    pub id: String,
    /// 告警实例标识
    pub instance_id: String,
    /// 规则标识
    pub rule_id: String,
    /// 租户标识
    pub tenant_id: String,
    /// 去重键
    pub dedup_key: String,
    /// 迁移前状态
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
    /// 事件快照（JSON）
    pub event_json: Option<String>,
    /// 执行耗时（毫秒）
    pub duration_ms: Option<i64>,
    /// 记录时间
    pub created_at: DateTime<Utc>,
}

impl From<ProcessingLogRow> for ProcessingLogResponse {
    fn from(r: ProcessingLogRow) -> Self {
        Self {
            id: r.id,
            instance_id: r.instance_id,
            rule_id: r.rule_id,
            tenant_id: r.tenant_id,
            dedup_key: r.dedup_key,
            from_state: r.from_state,
            to_state: r.to_state,
            action: r.action,
            actor: r.actor,
            outcome: r.outcome,
            error: r.error,
            event_json: r.event_json,
            duration_ms: r.duration_ms,
            created_at: r.created_at,
        }
    }
}

/// 处理日志列表查询参数
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct ListLogsParams {
    /// 告警实例精确匹配
    #[param(required = false, rename = "instance_id__eq")]
    #[serde(rename = "instance_id__eq")]
    instance_id_eq: Option<String>,
    /// 规则精确匹配
    #[param(required = false, rename = "rule_id__eq")]
    #[serde(rename = "rule_id__eq")]
    rule_id_eq: Option<String>,
    /// 租户精确匹配
    #[param(required = false, rename = "tenant_id__eq")]
    #[serde(rename = "tenant_id__eq")]
    tenant_id_eq: Option<String>,
    /// 执行者精确匹配（auto / manual:xxx / system）
    #[param(required = false, rename = "actor__eq")]
    #[serde(rename = "actor__eq")]
    actor_eq: Option<String>,
    /// 执行结果精确匹配（success / failure）
    #[param(required = false, rename = "outcome__eq")]
    #[serde(rename = "outcome__eq")]
    outcome_eq: Option<String>,
    /// 记录时间下界（Unix 秒级时间戳）
    #[param(required = false, rename = "created__gte")]
    #[serde(rename = "created__gte")]
    created_gte: Option<i64>,
    /// 记录时间上界（Unix 秒级时间戳）
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

fn params_to_filter(params: &ListLogsParams) -> Result<ProcessingLogFilter, String> {
    let outcome_eq = params
        .outcome_eq
        .as_deref()
        .map(Outcome::from_str)
        .transpose()?;
    Ok(ProcessingLogFilter {
        instance_id_eq: params.instance_id_eq.clone(),
        rule_id_eq: params.rule_id_eq.clone(),
        tenant_id_eq: params.tenant_id_eq.clone(),
        actor_eq: params.actor_eq.clone(),
        outcome_eq,
        created_from: params
            .created_gte
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        created_to: params
            .created_lte
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
    })
}

/// 分页查询处理日志。
#[utoipa::path(
    get,
    path = "/v1/logs",
    tag = "Logs",
    params(ListLogsParams),
    responses(
        (status = 200, description = "处理日志分页列表", body = Vec<ProcessingLogResponse>),
        (status = 400, description = "过滤参数非法", body = crate::api::ApiError)
    )
)]
async fn list_logs(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListLogsParams>,
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

    let total = match state.store.count_logs(&filter).await {
        Ok(c) => c,
        Err(e) => return storage_error_response(&trace_id, &e).into_response(),
    };
    match state.store.list_logs(&filter, limit, offset).await {
        Ok(rows) => {
            let items: Vec<ProcessingLogResponse> =
                rows.into_iter().map(ProcessingLogResponse::from).collect();
            success_paginated_response(StatusCode::OK, &trace_id, items, total, limit, offset)
        }
        Err(e) => storage_error_response(&trace_id, &e).into_response(),
    }
}

const EXPORT_MAX_ROWS: usize = 10000;

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// 导出处理日志（CSV，至多 10000 条，支持与列表相同的过滤参数）。
#[utoipa::path(
    get,
    path = "/v1/logs/export",
    tag = "Logs",
    params(ListLogsParams),
    responses(
        (status = 200, description = "CSV 文件", content_type = "text/csv")
    )
)]
async fn export_logs(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListLogsParams>,
) -> impl IntoResponse {
    let filter = match params_to_filter(&params) {
        Ok(filter) => filter,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "invalid_filter", &e)
                .into_response()
        }
    };
    let rows = match state.store.list_logs(&filter, EXPORT_MAX_ROWS, 0).await {
        Ok(rows) => rows,
        Err(e) => return storage_error_response(&trace_id, &e).into_response(),
    };

    let mut csv = String::from(
        "id,instance_id,rule_id,tenant_id,dedup_key,from_state,to_state,action,actor,outcome,error,duration_ms,created_at\n",
    );
    for row in rows {
        let _ = writeln!(
            csv,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            row.id,
            row.instance_id,
            row.rule_id,
            row.tenant_id,
            csv_escape(&row.dedup_key),
            row.from_state.map(|s| s.to_string()).unwrap_or_default(),
            row.to_state,
            row.action.map(|a| a.to_string()).unwrap_or_default(),
            csv_escape(&row.actor),
            row.outcome,
            csv_escape(row.error.as_deref().unwrap_or("")),
            row.duration_ms.map(|d| d.to_string()).unwrap_or_default(),
            row.created_at.to_rfc3339(),
        );
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"processing_log.csv\"",
            ),
        ],
        csv,
    )
        .into_response()
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_logs))
        .routes(routes!(export_logs))
}
