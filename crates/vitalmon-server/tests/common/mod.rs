#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;
use tower::util::ServiceExt;
use vitalmon_engine::engine::AlertProcessor;
use vitalmon_engine::scheduler::DelayedActionScheduler;
use vitalmon_engine::EngineConfig;
use vitalmon_notify::manager::NotificationManager;
use vitalmon_server::app;
use vitalmon_server::config::ServerConfig;
use vitalmon_server::state::AppState;
use vitalmon_server::stats::StatisticsAggregator;
use vitalmon_storage::store::ProcessStore;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
    pub scheduler: DelayedActionScheduler,
}

pub async fn build_test_context() -> Result<TestContext> {
    vitalmon_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let url = format!(
        "sqlite://{}?mode=rwc",
        temp_dir.path().join("vitalmon.db").display()
    );
    let store = Arc::new(ProcessStore::new(&url).await?);

    // No channels: notify actions deliver nowhere, which is fine for the
    // HTTP surface tests.
    let notifier = Arc::new(NotificationManager::new(vec![]));
    let engine_config = EngineConfig {
        shards: 4,
        tick_secs: 1,
        timer_batch: 16,
        max_lifetime_secs: 3600,
        action_max_retries: 1,
        retry_backoff_ms: 10,
    };
    let processor = AlertProcessor::bootstrap(store.clone(), notifier, engine_config).await?;
    let (_tx, rx) = watch::channel(false);
    let scheduler = DelayedActionScheduler::new(processor.clone(), rx);

    let stats = Arc::new(StatisticsAggregator::new(store.clone(), 24));

    let state = AppState {
        store,
        processor,
        stats,
        start_time: Utc::now(),
        config: Arc::new(ServerConfig::default()),
    };
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
        scheduler,
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Ok((status, value))
}
