use axum::{
    response::Html,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_check, ingest_vital, list_alerts, list_messages, list_vitals, message_events,
    AppState,
};
use super::live::{LiveUpdates, LIVE_UPDATE_CAPACITY};
use crate::alerts::AlertWorker;
use crate::bus::EventBus;
use crate::ingest::VitalService;
use crate::notify::{NotificationQueue, QueueDrainer};
use crate::storage::{MemoryStore, VitalStore};

// Embed UI files at compile time
const INDEX_HTML: &str = include_str!("../ui/index.html");

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Lower bound of the simulated send delay
    pub min_delay: Duration,
    /// Upper bound of the simulated send delay
    pub max_delay: Duration,
    /// Inbox size of the alert worker's bus subscription
    pub alert_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(20),
            alert_buffer: 16,
        }
    }
}

async fn serve_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // UI routes
        .route("/", get(serve_index))
        // Health check
        .route("/health", get(health_check))
        // Vitals and alerts
        .route("/vitals", get(list_vitals).post(ingest_vital))
        .route("/alerts", get(list_alerts))
        // Notifications
        .route("/messages", get(list_messages))
        .route("/events", get(message_events))
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

/// Run the HTTP server and the alerting pipeline until Ctrl-C
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();

    // Initialize the pipeline
    let store: Arc<dyn VitalStore> = Arc::new(MemoryStore::new());
    let bus = EventBus::new();
    let queue = Arc::new(NotificationQueue::new(config.min_delay, config.max_delay));
    let service = Arc::new(VitalService::new(Arc::clone(&store), bus.clone()));

    let live = LiveUpdates::new(LIVE_UPDATE_CAPACITY);
    live.attach(&queue);

    // Start background workers
    let alert_handle = AlertWorker::new(
        &bus,
        Arc::clone(&store),
        config.alert_buffer,
        Some(Arc::clone(&queue)),
    )
    .start(shutdown.child_token());
    let drainer_handle = QueueDrainer::new(Arc::clone(&queue)).start(shutdown.child_token());

    let state = Arc::new(AppState {
        service,
        queue,
        live,
        shutdown: shutdown.clone(),
    });

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting VitalWatch server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Release anything still blocked on the bus or the store
    shutdown.cancel();
    bus.close();
    store.close();

    for (name, handle) in [("alert worker", alert_handle), ("queue drainer", drainer_handle)] {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Failed to join {}", name);
        }
    }

    tracing::info!("VitalWatch server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        }
        _ = shutdown.cancelled() => {}
    }

    tracing::info!("Shutdown signal received, stopping workers...");
    shutdown.cancel();
}
