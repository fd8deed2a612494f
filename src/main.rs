//! Casewatch Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - CASEWATCH_HOST: Bind address (default: 0.0.0.0)
//! - CASEWATCH_PORT: Port number (default: 8080)
//! - CASEWATCH_CHECK_INTERVAL_SECS: Default check interval (default: 3600)
//! - CASEWATCH_FAULT_BACKOFF_SECS: Pause after a failed cycle (default: 300)
//! - RUST_LOG: Log level (default: info)
//!
//! Record sources are enabled by their credentials (COURTLISTENER_TOKEN,
//! VINELINK_API_KEY, PACER_USERNAME/PACER_PASSWORD, STATE_COURTS_BASE_URL).
//! Email needs NOTIFICATION_EMAIL and NOTIFICATION_PASSWORD; webhooks need
//! WEBHOOK_URL.

use casewatch::api::run_server;
use casewatch::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "casewatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Casewatch configuration:");
    tracing::info!("  Host: {}:{}", config.server.host, config.server.port);
    tracing::info!(
        "  Default check interval: {} seconds",
        config.scheduler.default_check_interval.as_secs()
    );
    tracing::info!(
        "  Fault backoff: {} seconds",
        config.scheduler.fault_backoff.as_secs()
    );
    tracing::info!(
        "  Source timeout: {} seconds",
        config.sources.timeout.as_secs()
    );
    tracing::info!(
        "  State courts: {}",
        config.sources.state_courts.states.join(", ")
    );

    println!(
        r#"
   ____                              _       _
  / ___|__ _ ___  _____      ____ _| |_ ___| |__
 | |   / _` / __|/ _ \ \ /\ / / _` | __/ __| '_ \
 | |__| (_| \__ \  __/\ V  V / (_| | || (__| | | |
  \____\__,_|___/\___| \_/\_/ \__,_|\__\___|_| |_|

 Person Monitoring and Alert Dispatch
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
