//! VitalWatch Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - VITALWATCH_HOST: Bind address (default: 0.0.0.0)
//! - VITALWATCH_PORT: Port number (default: 8080)
//! - VITALWATCH_MIN_DELAY_MS: Minimum simulated send delay (default: 5000)
//! - VITALWATCH_MAX_DELAY_MS: Maximum simulated send delay (default: 20000)
//! - VITALWATCH_ALERT_BUFFER: Alert worker inbox size (default: 16)
//! - RUST_LOG: Log level (default: info)

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitalwatch::api::{run_server, ServerConfig};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vitalwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse configuration from environment
    let defaults = ServerConfig::default();
    let config = ServerConfig {
        host: std::env::var("VITALWATCH_HOST").unwrap_or(defaults.host),
        port: env_or("VITALWATCH_PORT", defaults.port),
        min_delay: Duration::from_millis(env_or(
            "VITALWATCH_MIN_DELAY_MS",
            defaults.min_delay.as_millis() as u64,
        )),
        max_delay: Duration::from_millis(env_or(
            "VITALWATCH_MAX_DELAY_MS",
            defaults.max_delay.as_millis() as u64,
        )),
        alert_buffer: env_or("VITALWATCH_ALERT_BUFFER", defaults.alert_buffer),
    };

    tracing::info!("VitalWatch {} configuration:", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!(
        "  Send delay: {:?} - {:?}",
        config.min_delay,
        config.max_delay
    );
    tracing::info!("  Alert buffer: {}", config.alert_buffer);

    run_server(config).await
}
