//! Camserver - MJPEG streaming for local V4L2 cameras
//!
//! Main entry point for the camserver application.

use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uvc_camserver::capture::DeviceSpec;
use uvc_camserver::mjpeg_hub::{self, MjpegHub};
use uvc_camserver::state::{AppConfig, AppState};
use uvc_camserver::web_api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uvc_camserver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camserver v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        device = %config.device,
        width = config.width,
        height = config.height,
        fps = config.fps,
        "Configuration loaded"
    );

    // Start the capture session; it owns the device for the process lifetime
    let hub = Arc::new(MjpegHub::new());
    let spec = DeviceSpec::new(config.device.clone(), config.width, config.height, config.fps);
    tokio::spawn(mjpeg_hub::run_capture(Arc::clone(&hub), spec));

    // Create application state
    let state = AppState {
        config,
        hub,
    };

    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
