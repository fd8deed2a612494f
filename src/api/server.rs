use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    get_monitor, health_check, list_alerts, list_monitors, recent_alerts, start_monitor, stats,
    stop_monitor, AppState,
};
use crate::config::Config;
use crate::monitor::MonitorService;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Monitors
        .route("/monitors", post(start_monitor).get(list_monitors))
        .route("/monitors/:id", get(get_monitor).delete(stop_monitor))
        // Alerts
        .route("/alerts", get(list_alerts))
        .route("/alerts/recent", get(recent_alerts))
        // Stats
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server until CTRL+C, then stop every monitor
pub async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let service = MonitorService::from_config(&config)?;

    let sources: Vec<&str> = service.checker_stats().iter().map(|(name, _)| *name).collect();
    tracing::info!(sources = ?sources, "Record sources ready");
    if !config.notify.smtp.is_configured() {
        tracing::warn!("SMTP credentials missing, email alerts will be skipped");
    }
    if config.notify.webhook.url.is_none() {
        tracing::warn!("WEBHOOK_URL not set, webhook alerts will be skipped");
    }

    let state = Arc::new(AppState {
        service: service.clone(),
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Starting Casewatch server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown();
    tracing::info!("Casewatch server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
        return;
    }

    tracing::info!("Shutdown signal received, stopping monitors...");
}
