use anyhow::Result;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use vitalmon_engine::engine::AlertProcessor;
use vitalmon_engine::scheduler::DelayedActionScheduler;
use vitalmon_notify::plugin::ChannelRegistry;
use vitalmon_storage::store::ProcessStore;

use vitalmon_server::app;
use vitalmon_server::config::ServerConfig;
use vitalmon_server::rule_seed;
use vitalmon_server::state::{build_notifier, AppState};
use vitalmon_server::stats::StatisticsAggregator;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  vitalmon-server [config.toml]    Start the server");
}

#[tokio::main]
async fn main() -> Result<()> {
    vitalmon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vitalmon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if matches!(args.get(1).map(|s| s.as_str()), Some("--help" | "-h")) {
        print_usage();
        return Ok(());
    }
    let config_path = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("config/server.toml");
    run_server(config_path).await
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = match std::fs::metadata(config_path) {
        Ok(_) => ServerConfig::load(config_path)?,
        Err(_) => {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            ServerConfig::default()
        }
    };

    std::fs::create_dir_all(&config.data_dir)?;
    let db_url = config.database.connection_url(&config.data_dir);
    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        db = %db_url,
        "vitalmon-server starting"
    );

    // Build components
    let store = Arc::new(ProcessStore::new(&db_url).await?);

    // Seed default wearable rules (only when the rule table is empty)
    if let Err(e) = rule_seed::init_default_rules(&store).await {
        tracing::error!(error = %e, "Failed to initialize default alert rules");
    }

    // Notification channels from config
    let registry = ChannelRegistry::default();
    let notifier = Arc::new(build_notifier(&registry, &config.notification)?);
    if notifier.channel_count() == 0 {
        tracing::warn!("No notification channels configured; notify/escalate actions deliver nowhere");
    }

    // Engine: rule registry + per-key state restored from storage
    let processor = AlertProcessor::bootstrap(
        store.clone(),
        notifier.clone(),
        config.engine.to_engine_config(),
    )
    .await?;

    // Durable delayed-action worker
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = DelayedActionScheduler::new(processor.clone(), shutdown_rx.clone());
    let scheduler_handle = tokio::spawn(scheduler.run());

    // Statistics aggregator (read-only, independent cadence)
    let stats = Arc::new(StatisticsAggregator::new(
        store.clone(),
        config.statistics.window_hours,
    ));
    let stats_handle = tokio::spawn(
        stats
            .clone()
            .run(config.statistics.recompute_secs, shutdown_rx),
    );

    let state = AppState {
        store,
        processor,
        stats,
        start_time: Utc::now(),
        config: Arc::new(config.clone()),
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "Server started");

    let http_server = axum::serve(http_listener, app);
    tokio::select! {
        result = http_server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    // Drain the worker loops; armed timers stay persisted and resume on
    // the next start.
    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    stats_handle.abort();
    tracing::info!("Server stopped");

    Ok(())
}
