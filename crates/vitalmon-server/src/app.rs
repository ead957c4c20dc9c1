use crate::state::AppState;
use crate::{api, logging, openapi};
use axum::middleware;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "vitalmon API",
        description = "vitalmon 穿戴设备告警自动处理引擎 REST API",
    ),
    tags(
        (name = "Health", description = "服务健康检查"),
        (name = "Events", description = "设备事件接入"),
        (name = "Rules", description = "告警规则管理"),
        (name = "Alerts", description = "告警实例与人工处理"),
        (name = "Logs", description = "处理日志查询与导出"),
        (name = "Statistics", description = "统计与效能分析")
    )
)]
struct ApiDoc;

pub fn build_http_app(state: AppState) -> Router {
    let (router, spec) = api::health_routes()
        .merge(api::events::routes())
        .merge(api::rules::routes())
        .merge(api::alerts::routes())
        .merge(api::logs::routes())
        .merge(api::statistics::routes())
        .split_for_parts();

    let mut merged_spec = ApiDoc::openapi();
    merged_spec.merge(spec);
    let spec = Arc::new(merged_spec);

    let cors = if state.config.cors_allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    router
        .with_state(state)
        .merge(openapi::json_route(spec))
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
