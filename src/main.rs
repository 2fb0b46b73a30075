use std::panic;
use std::sync::Arc;

use collab_hub::config::Config;
use collab_hub::hub::HubHandle;
use collab_hub::routes::{create_app, origin_policy::OriginPolicy};
use collab_hub::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "collab_hub=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting collaboration hub...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    let origins = config.origin_policy().unwrap_or_else(|e| {
        error!("Invalid connection policy: {}", e);
        warn!("Only http://localhost origins will be accepted");
        OriginPolicy::default()
    });

    let hub = HubHandle::spawn(config.outbound_buffer, config.inbound_buffer);
    let app = create_app(AppState {
        hub,
        origins: Arc::new(origins),
    });

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", config.server_address(), e));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed to start");

    info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
