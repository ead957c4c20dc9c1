use crate::api::{engine_error_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use vitalmon_common::types::VitalEvent;

/// 设备事件上报请求
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReportEventRequest {
    /// 租户标识（必填）
    pub tenant_id: String,
    /// 机构标识（必填）
    pub org_id: String,
    /// 设备标识（必填）
    pub device_id: String,
    /// 体征类型（与 event_type 至少填一个）
    #[serde(default)]
    pub physical_sign: Option<String>,
    /// 设备事件类型
    #[serde(default)]
    pub event_type: Option<String>,
    /// 体征数值
    #[serde(default)]
    pub value: Option<f64>,
    /// 事件附加载荷
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    /// 事件发生时间（缺省为服务端当前时间）
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// 批量上报请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportEventBatchRequest {
    /// 事件列表
    pub events: Vec<ReportEventRequest>,
}

fn to_event(req: ReportEventRequest) -> VitalEvent {
    VitalEvent {
        id: vitalmon_common::id::next_id(),
        tenant_id: req.tenant_id,
        org_id: req.org_id,
        device_id: req.device_id,
        physical_sign: req.physical_sign,
        event_type: req.event_type,
        value: req.value,
        payload: req.payload,
        timestamp: req.timestamp.unwrap_or_else(Utc::now),
    }
}

/// 上报单个事件，返回引擎的处理决策
/// （created / duplicate / suppressed / auto_resolved / observed）。
#[utoipa::path(
    post,
    path = "/v1/events",
    tag = "Events",
    request_body = ReportEventRequest,
    responses(
        (status = 200, description = "处理决策"),
        (status = 400, description = "事件缺少信号标识", body = crate::api::ApiError)
    )
)]
async fn report_event(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<ReportEventRequest>,
) -> impl IntoResponse {
    let event = to_event(req);
    match state.processor.process_event(&event).await {
        Ok(decision) => success_response(StatusCode::OK, &trace_id, decision),
        Err(e) => engine_error_response(&trace_id, &e),
    }
}

/// 批量上报事件。逐条处理并返回逐条决策；单条失败不影响其余事件。
#[utoipa::path(
    post,
    path = "/v1/events/batch",
    tag = "Events",
    request_body = ReportEventBatchRequest,
    responses(
        (status = 200, description = "逐条处理决策")
    )
)]
async fn report_event_batch(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<ReportEventBatchRequest>,
) -> impl IntoResponse {
    let mut decisions: Vec<serde_json::Value> = Vec::with_capacity(req.events.len());
    for event_req in req.events {
        let event = to_event(event_req);
        match state.processor.process_event(&event).await {
            Ok(decision) => {
                decisions.push(serde_json::to_value(&decision).unwrap_or_default());
            }
            Err(e) => {
                tracing::warn!(event_id = %event.id, error = %e, "Event rejected");
                decisions.push(serde_json::json!({
                    "decision": "rejected",
                    "error": e.to_string(),
                }));
            }
        }
    }
    success_response(StatusCode::OK, &trace_id, decisions)
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(report_event))
        .routes(routes!(report_event_batch))
}
