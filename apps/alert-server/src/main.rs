//! Stock Alert Server Binary
//!
//! Starts the price monitor, the public HTTP/WebSocket server, and the
//! health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin alert-server
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `ALERT_SERVER_PORT`: HTTP + WebSocket port (default: 5000)
//! - `ALERT_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `ALERT_MONITOR_INTERVAL_MS`: Tick period (default: 5000)
//! - `ALERT_FETCH_TIMEOUT_MS`: Per-fetch timeout (default: 4000)
//! - `ALERT_NOTIFY_ON_FALLBACK`: Evaluate fallback prices (default: false)
//! - `ALERT_OUTBOUND_CAPACITY`: Per-connection queue depth (default: 64)
//! - `ALERT_REGISTRY_SHARDS`: Registry shard count (default: 16)
//! - `ALERT_FETCH_CONCURRENCY`: Price fetches in flight per tick (default: 8)
//! - `ALERT_MAX_CONDITIONS`: Conditions per connection (default: 100)
//! - `PRICE_SOURCE`: "yahoo" | "simulated" (default: yahoo)
//! - `PRICE_SOURCE_URL`, `NEWS_SOURCE_URL`, `OLLAMA_URL`, `OLLAMA_MODEL`
//! - `UPSTREAM_TIMEOUT_MS`: Dashboard upstream timeout (default: 10000)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: stock-alert-server)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use alert_server::application::services::{
    AlertMonitor, MonitorConfig, NotificationDispatcher, ResilientPriceSource,
};
use alert_server::domain::subscription::SubscriptionRegistry;
use alert_server::infrastructure::health::{HealthServer, HealthServerState};
use alert_server::infrastructure::http::{AppState, DashboardClient, HttpServer};
use alert_server::infrastructure::price;
use alert_server::infrastructure::telemetry;
use alert_server::infrastructure::websocket::AlertHub;
use alert_server::{AlertServerConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting stock alert server");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics()?;

    let config = AlertServerConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Core state
    let registry = Arc::new(SubscriptionRegistry::with_shards(
        config.monitor.registry_shards,
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(config.monitor.outbound_capacity));

    // Price monitor
    let upstream = price::from_settings(&config.upstream, config.monitor.fetch_timeout)?;
    let prices = Arc::new(ResilientPriceSource::new(
        upstream,
        config.monitor.fetch_timeout,
    ));
    let monitor = Arc::new(AlertMonitor::new(
        Arc::clone(&registry),
        Arc::clone(&dispatcher),
        prices,
        MonitorConfig {
            interval: config.monitor.interval,
            notify_on_fallback: config.monitor.notify_on_fallback,
            fetch_concurrency: config.monitor.fetch_concurrency,
        },
    ));

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        config.monitor.interval,
        Arc::clone(&registry),
        Arc::clone(&dispatcher),
        monitor.state(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Public server
    let app_state = AppState {
        hub: Arc::new(
            AlertHub::new(Arc::clone(&registry), Arc::clone(&dispatcher))
                .with_max_conditions(config.monitor.max_conditions_per_connection),
        ),
        dashboard: Arc::new(DashboardClient::new(&config.upstream)?),
    };
    let http_server = HttpServer::new(config.server.port, app_state, shutdown_token.clone());

    // Spawn monitor loop
    let monitor_cancel = shutdown_token.clone();
    let monitor_task = tokio::spawn(async move {
        monitor.run(monitor_cancel).await;
    });

    // Spawn health server
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn public server; a bind failure stops the process
    let server_shutdown = shutdown_token.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "Alert server error");
            server_shutdown.cancel();
        }
    });

    tracing::info!("Stock alert server ready");

    tokio::select! {
        () = await_shutdown_signal() => shutdown_token.cancel(),
        () = shutdown_token.cancelled() => {}
    }

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = monitor_task.await;
        let _ = http_task.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timed out, exiting anyway");
    }

    tracing::info!("Stock alert server stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &AlertServerConfig) {
    tracing::info!(
        port = config.server.port,
        health_port = config.server.health_port,
        interval_ms = config.monitor.interval.as_millis(),
        fetch_timeout_ms = config.monitor.fetch_timeout.as_millis(),
        notify_on_fallback = config.monitor.notify_on_fallback,
        fetch_concurrency = config.monitor.fetch_concurrency,
        max_conditions = config.monitor.max_conditions_per_connection,
        price_source = config.upstream.price_source.as_str(),
        "Configuration loaded"
    );
    tracing::debug!(
        price_source_url = %config.upstream.price_source_url,
        news_source_url = %config.upstream.news_source_url,
        ollama_url = %config.upstream.ollama_url,
        ollama_model = %config.upstream.ollama_model,
        "Upstream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGTERM or SIGINT.
#[allow(clippy::expect_used)]
async fn await_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
