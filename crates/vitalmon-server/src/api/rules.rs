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
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use vitalmon_common::types::{AlertAction, AlertRule, Severity};
use vitalmon_storage::store::{AlertRuleFilter, AlertRuleUpdate};

/// 创建告警规则请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAlertRuleRequest {
    /// 规则名称（必填）
    pub name: String,
    /// 租户标识（必填）
    pub tenant_id: String,
    /// 机构标识（可选，为空表示租户级规则）
    #[serde(default)]
    pub org_id: Option<String>,
    /// 体征类型（与 event_type 二选一）
    #[serde(default)]
    pub physical_sign: Option<String>,
    /// 设备事件类型（与 physical_sign 二选一）
    #[serde(default)]
    pub event_type: Option<String>,
    /// 告警级别（low / medium / high / critical）
    pub level: String,
    /// 告警区间下界
    #[serde(default)]
    pub threshold_min: Option<f64>,
    /// 告警区间上界
    #[serde(default)]
    pub threshold_max: Option<f64>,
    /// 是否启用自动处理
    #[serde(default)]
    pub auto_process_enabled: bool,
    /// 自动处理动作（notify / escalate / auto_resolve / ignore）
    #[serde(default = "default_action")]
    pub auto_process_action: String,
    /// 自动处理延迟（秒）
    #[serde(default)]
    pub auto_process_delay_secs: u64,
    /// 自动恢复所需连续正常读数次数（0 表示禁用）
    #[serde(default)]
    pub auto_resolve_threshold_count: u32,
    /// 处理后抑制时长（分钟）
    #[serde(default)]
    pub suppress_duration_mins: u64,
    /// 去重时间窗口（秒）
    #[serde(default = "default_time_window")]
    pub time_window_secs: u64,
    /// 是否启用（默认 true）
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// 更新告警规则请求（缺省字段保持原值）
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAlertRuleRequest {
    /// 规则名称（可选）
    pub name: Option<String>,
    /// 机构标识（可选；传 null 清除）
    pub org_id: Option<Option<String>>,
    /// 告警级别（可选）
    pub level: Option<String>,
    /// 告警区间下界（可选；传 null 清除）
    pub threshold_min: Option<Option<f64>>,
    /// 告警区间上界（可选；传 null 清除）
    pub threshold_max: Option<Option<f64>>,
    /// 是否启用自动处理（可选）
    pub auto_process_enabled: Option<bool>,
    /// 自动处理动作（可选）
    pub auto_process_action: Option<String>,
    /// 自动处理延迟（秒）（可选）
    pub auto_process_delay_secs: Option<u64>,
    /// 自动恢复所需连续正常读数次数（可选）
    pub auto_resolve_threshold_count: Option<u32>,
    /// 处理后抑制时长（分钟）（可选）
    pub suppress_duration_mins: Option<u64>,
    /// 去重时间窗口（秒）（可选）
    pub time_window_secs: Option<u64>,
    /// 是否启用（可选）
    pub enabled: Option<bool>,
}

fn default_action() -> String {
    "notify".to_string()
}

fn default_time_window() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

/// 告警规则列表查询参数
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct ListRulesParams {
    /// 租户精确匹配
    #[param(required = false, rename = "tenant_id__eq")]
    #[serde(rename = "tenant_id__eq")]
    tenant_id_eq: Option<String>,
    /// 机构精确匹配
    #[param(required = false, rename = "org_id__eq")]
    #[serde(rename = "org_id__eq")]
    org_id_eq: Option<String>,
    /// 规则名称模糊匹配
    #[param(required = false, rename = "name__contains")]
    #[serde(rename = "name__contains")]
    name_contains: Option<String>,
    /// 体征类型精确匹配
    #[param(required = false, rename = "physical_sign__eq")]
    #[serde(rename = "physical_sign__eq")]
    physical_sign_eq: Option<String>,
    /// 设备事件类型精确匹配
    #[param(required = false, rename = "event_type__eq")]
    #[serde(rename = "event_type__eq")]
    event_type_eq: Option<String>,
    /// 告警级别精确匹配（low / medium / high / critical）
    #[param(required = false, rename = "level__eq")]
    #[serde(rename = "level__eq")]
    level_eq: Option<String>,
    /// 是否启用精确匹配
    #[param(required = false, rename = "enabled__eq")]
    #[serde(rename = "enabled__eq")]
    enabled_eq: Option<bool>,
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

/// 分页查询告警规则列表。
/// 默认排序：`created_at` 倒序；默认分页：`limit=20&offset=0`。
#[utoipa::path(
    get,
    path = "/v1/rules",
    tag = "Rules",
    params(ListRulesParams),
    responses(
        (status = 200, description = "告警规则分页列表", body = Vec<AlertRule>),
        (status = 400, description = "过滤参数非法", body = crate::api::ApiError)
    )
)]
async fn list_rules(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListRulesParams>,
) -> impl IntoResponse {
    let level_eq = match params.level_eq.as_deref().map(Severity::from_str) {
        Some(Err(e)) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "invalid_filter", &e)
                .into_response()
        }
        Some(Ok(level)) => Some(level),
        None => None,
    };
    let filter = AlertRuleFilter {
        tenant_id_eq: params.tenant_id_eq,
        org_id_eq: params.org_id_eq,
        name_contains: params.name_contains,
        physical_sign_eq: params.physical_sign_eq,
        event_type_eq: params.event_type_eq,
        level_eq,
        enabled_eq: params.enabled_eq,
    };
    let limit = PaginationParams::resolve_limit(params.limit);
    let offset = PaginationParams::resolve_offset(params.offset);

    let total = match state.store.count_alert_rules(&filter).await {
        Ok(c) => c,
        Err(e) => return storage_error_response(&trace_id, &e).into_response(),
    };
    match state.store.list_alert_rules(&filter, limit, offset).await {
        Ok(rules) => {
            success_paginated_response(StatusCode::OK, &trace_id, rules, total, limit, offset)
        }
        Err(e) => storage_error_response(&trace_id, &e).into_response(),
    }
}

/// 获取单条告警规则详情。
#[utoipa::path(
    get,
    path = "/v1/rules/{id}",
    tag = "Rules",
    params(("id" = String, Path, description = "规则 ID")),
    responses(
        (status = 200, description = "规则详情", body = AlertRule),
        (status = 404, description = "规则不存在", body = crate::api::ApiError)
    )
)]
async fn get_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_alert_rule_by_id(&id).await {
        Ok(Some(rule)) => success_response(StatusCode::OK, &trace_id, rule),
        Ok(None) => error_response(StatusCode::NOT_FOUND, &trace_id, "not_found", "Rule not found"),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// 创建告警规则。阈值区间、时长与冲突校验失败时同步拒绝。
#[utoipa::path(
    post,
    path = "/v1/rules",
    tag = "Rules",
    request_body = CreateAlertRuleRequest,
    responses(
        (status = 201, description = "创建成功", body = AlertRule),
        (status = 400, description = "规则校验失败", body = crate::api::ApiError),
        (status = 409, description = "与已启用规则冲突", body = crate::api::ApiError)
    )
)]
async fn create_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<CreateAlertRuleRequest>,
) -> impl IntoResponse {
    let rule = match request_to_rule(req) {
        Ok(rule) => rule,
        Err(msg) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "invalid_rule", &msg)
                .into_response()
        }
    };
    match state.processor.create_rule(rule).await {
        Ok(created) => success_response(StatusCode::CREATED, &trace_id, created),
        Err(e) => engine_error_response(&trace_id, &e),
    }
}

/// 更新告警规则。
#[utoipa::path(
    put,
    path = "/v1/rules/{id}",
    tag = "Rules",
    params(("id" = String, Path, description = "规则 ID")),
    request_body = UpdateAlertRuleRequest,
    responses(
        (status = 200, description = "更新后的规则", body = AlertRule),
        (status = 404, description = "规则不存在", body = crate::api::ApiError),
        (status = 409, description = "与已启用规则冲突", body = crate::api::ApiError)
    )
)]
async fn update_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAlertRuleRequest>,
) -> impl IntoResponse {
    let update = match request_to_update(req) {
        Ok(update) => update,
        Err(msg) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "invalid_rule", &msg)
                .into_response()
        }
    };
    match state.processor.update_rule(&id, &update).await {
        Ok(Some(rule)) => success_response(StatusCode::OK, &trace_id, rule),
        Ok(None) => error_response(StatusCode::NOT_FOUND, &trace_id, "not_found", "Rule not found"),
        Err(e) => engine_error_response(&trace_id, &e),
    }
}

/// 删除告警规则。已创建的告警实例不受影响，按自身生命周期结束。
#[utoipa::path(
    delete,
    path = "/v1/rules/{id}",
    tag = "Rules",
    params(("id" = String, Path, description = "规则 ID")),
    responses(
        (status = 200, description = "删除成功"),
        (status = 404, description = "规则不存在", body = crate::api::ApiError)
    )
)]
async fn delete_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.processor.delete_rule(&id).await {
        Ok(true) => {
            crate::api::success_empty_response(StatusCode::OK, &trace_id, "Rule deleted")
        }
        Ok(false) => {
            error_response(StatusCode::NOT_FOUND, &trace_id, "not_found", "Rule not found")
        }
        Err(e) => engine_error_response(&trace_id, &e),
    }
}

/// 规则启停请求
#[derive(Debug, Deserialize, ToSchema)]
struct ToggleRuleRequest {
    /// 是否启用
    enabled: bool,
}

/// 启用 / 停用单条规则。
#[utoipa::path(
    patch,
    path = "/v1/rules/{id}/enabled",
    tag = "Rules",
    params(("id" = String, Path, description = "规则 ID")),
    request_body = ToggleRuleRequest,
    responses(
        (status = 200, description = "切换成功"),
        (status = 404, description = "规则不存在", body = crate::api::ApiError),
        (status = 409, description = "启用后与现有规则冲突", body = crate::api::ApiError)
    )
)]
async fn toggle_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRuleRequest>,
) -> impl IntoResponse {
    match state.processor.set_rule_enabled(&id, req.enabled).await {
        Ok(true) => crate::api::success_empty_response(StatusCode::OK, &trace_id, "Rule toggled"),
        Ok(false) => {
            error_response(StatusCode::NOT_FOUND, &trace_id, "not_found", "Rule not found")
        }
        Err(e) => engine_error_response(&trace_id, &e),
    }
}

/// 批量启停请求
#[derive(Debug, Deserialize, ToSchema)]
struct BatchToggleRequest {
    /// 规则 ID 列表
    ids: Vec<String>,
    /// 是否启用
    enabled: bool,
}

/// 批量启停响应
#[derive(Debug, Serialize, ToSchema)]
struct BatchToggleResponse {
    /// 实际更新条数
    updated: u64,
}

/// 批量启用 / 停用规则。
#[utoipa::path(
    post,
    path = "/v1/rules/batch-enabled",
    tag = "Rules",
    request_body = BatchToggleRequest,
    responses(
        (status = 200, description = "批量切换结果", body = BatchToggleResponse)
    )
)]
async fn batch_toggle_rules(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<BatchToggleRequest>,
) -> impl IntoResponse {
    match state.processor.set_rules_enabled(&req.ids, req.enabled).await {
        Ok(updated) => {
            success_response(StatusCode::OK, &trace_id, BatchToggleResponse { updated })
        }
        Err(e) => engine_error_response(&trace_id, &e),
    }
}

/// 规则集导出格式
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RuleSetExport {
    /// 导出时间
    pub exported_at: chrono::DateTime<Utc>,
    /// 规则列表
    pub rules: Vec<AlertRule>,
}

/// 导出全部规则（含停用规则）。导出结果可在空注册表上重新导入，
/// 对同一批事件复现完全一致的匹配行为。
#[utoipa::path(
    get,
    path = "/v1/rules/export",
    tag = "Rules",
    responses(
        (status = 200, description = "规则集", body = RuleSetExport)
    )
)]
async fn export_rules(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let filter = AlertRuleFilter::default();
    match state.store.list_alert_rules(&filter, 10000, 0).await {
        Ok(rules) => success_response(
            StatusCode::OK,
            &trace_id,
            RuleSetExport {
                exported_at: Utc::now(),
                rules,
            },
        ),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// 规则导入请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportRulesRequest {
    /// 待导入规则列表（通常来自导出接口）
    pub rules: Vec<AlertRule>,
}

/// 规则导入结果
#[derive(Debug, Serialize, ToSchema)]
struct ImportRulesResponse {
    /// 新建条数
    created: u32,
    /// 跳过条数（校验失败或与启用规则冲突）
    skipped: u32,
}

/// 导入规则集。冲突或校验失败的规则被跳过。
#[utoipa::path(
    post,
    path = "/v1/rules/import",
    tag = "Rules",
    request_body = ImportRulesRequest,
    responses(
        (status = 200, description = "导入结果", body = ImportRulesResponse)
    )
)]
async fn import_rules(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<ImportRulesRequest>,
) -> impl IntoResponse {
    match state.processor.import_rules(req.rules).await {
        Ok((created, skipped)) => success_response(
            StatusCode::OK,
            &trace_id,
            ImportRulesResponse { created, skipped },
        ),
        Err(e) => engine_error_response(&trace_id, &e),
    }
}

/// 枚举选项
#[derive(Debug, Serialize, ToSchema)]
struct OptionItem {
    /// 枚举值
    value: String,
    /// 显示标签
    label: String,
}

/// 规则表单选项
#[derive(Debug, Serialize, ToSchema)]
struct RuleOptionsResponse {
    /// 自动处理动作选项
    actions: Vec<OptionItem>,
    /// 告警级别选项
    severities: Vec<OptionItem>,
}

/// 获取自动处理动作与告警级别枚举（供管理端下拉框使用）。
#[utoipa::path(
    get,
    path = "/v1/rules/options",
    tag = "Rules",
    responses(
        (status = 200, description = "枚举选项", body = RuleOptionsResponse)
    )
)]
async fn rule_options(Extension(trace_id): Extension<TraceId>) -> impl IntoResponse {
    let actions = [
        (AlertAction::Notify, "发送通知"),
        (AlertAction::Escalate, "升级处理"),
        (AlertAction::AutoResolve, "自动恢复"),
        (AlertAction::Ignore, "忽略"),
    ]
    .into_iter()
    .map(|(value, label)| OptionItem {
        value: value.to_string(),
        label: label.to_string(),
    })
    .collect();
    let severities = [
        (Severity::Low, "低"),
        (Severity::Medium, "中"),
        (Severity::High, "高"),
        (Severity::Critical, "紧急"),
    ]
    .into_iter()
    .map(|(value, label)| OptionItem {
        value: value.to_string(),
        label: label.to_string(),
    })
    .collect();
    success_response(
        StatusCode::OK,
        &trace_id,
        RuleOptionsResponse {
            actions,
            severities,
        },
    )
}

fn request_to_rule(req: CreateAlertRuleRequest) -> Result<AlertRule, String> {
    let level = Severity::from_str(&req.level)?;
    let action = AlertAction::from_str(&req.auto_process_action)?;
    let now = Utc::now();
    Ok(AlertRule {
        id: vitalmon_common::id::next_id(),
        name: req.name,
        tenant_id: req.tenant_id,
        org_id: req.org_id,
        physical_sign: req.physical_sign,
        event_type: req.event_type,
        level,
        threshold_min: req.threshold_min,
        threshold_max: req.threshold_max,
        auto_process_enabled: req.auto_process_enabled,
        auto_process_action: action,
        auto_process_delay_secs: req.auto_process_delay_secs,
        auto_resolve_threshold_count: req.auto_resolve_threshold_count,
        suppress_duration_mins: req.suppress_duration_mins,
        time_window_secs: req.time_window_secs,
        enabled: req.enabled,
        source: "api".to_string(),
        created_at: now,
        updated_at: now,
    })
}

fn request_to_update(req: UpdateAlertRuleRequest) -> Result<AlertRuleUpdate, String> {
    let level = req.level.as_deref().map(Severity::from_str).transpose()?;
    let action = req
        .auto_process_action
        .as_deref()
        .map(AlertAction::from_str)
        .transpose()?;
    Ok(AlertRuleUpdate {
        name: req.name,
        org_id: req.org_id,
        level,
        threshold_min: req.threshold_min,
        threshold_max: req.threshold_max,
        auto_process_enabled: req.auto_process_enabled,
        auto_process_action: action,
        auto_process_delay_secs: req.auto_process_delay_secs,
        auto_resolve_threshold_count: req.auto_resolve_threshold_count,
        suppress_duration_mins: req.suppress_duration_mins,
        time_window_secs: req.time_window_secs,
        enabled: req.enabled,
    })
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_rules, create_rule))
        .routes(routes!(export_rules))
        .routes(routes!(import_rules))
        .routes(routes!(rule_options))
        .routes(routes!(batch_toggle_rules))
        .routes(routes!(get_rule, update_rule, delete_rule))
        .routes(routes!(toggle_rule))
}
