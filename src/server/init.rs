//! Server initialization
//!
//! Builds the shared state and router, then runs the HTTP server until a
//! shutdown signal arrives.

use super::background_tasks::start_history_sweep;
use super::config::AppConfig;
use crate::api::{api_router, StreamSettings};
use crate::middleware::auth::ApiKeyAuth;
use crate::middleware::rate_limit::RateLimitState;
use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use axum::{Extension, Router};
use ps3_core::{
    shutdown_signal_with_controller, EventBus, InMemoryTaskRegistry, ShutdownController,
    TaskRegistry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Process-wide state owned by the composition root
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub registry: Arc<dyn TaskRegistry>,
    pub shutdown: Arc<ShutdownController>,
    pub rate_limit: RateLimitState,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            bus: Arc::new(EventBus::new(config.event_bus.bus_config())),
            registry: Arc::new(InMemoryTaskRegistry::new()),
            shutdown: ShutdownController::new(),
            rate_limit: RateLimitState::new(&config.rate_limit),
        }
    }
}

/// Assemble the router with shared state attached as extensions
pub fn build_router(config: &AppConfig, state: &AppState) -> Router {
    let auth = Arc::new(ApiKeyAuth::new(config.server.api_key()));
    let stream_settings = StreamSettings {
        heartbeat: config.event_bus.heartbeat(),
    };

    api_router(
        &config.rate_limit,
        &state.rate_limit,
        config.server.max_upload_bytes,
    )
    .layer(Extension(auth))
    .layer(Extension(state.bus.clone()))
    .layer(Extension(state.registry.clone()))
    .layer(Extension(state.shutdown.clone()))
    .layer(Extension(stream_settings))
    .layer(TraceLayer::new_for_http())
    .layer(cors_layer(&config.server.cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Run the server
pub async fn run(config: AppConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let state = AppState::new(&config);

    if config.rate_limit.enabled {
        state
            .rate_limit
            .spawn_cleanup(config.rate_limit.cleanup_interval(), state.shutdown.token());
        info!(
            upload = config.rate_limit.upload.max_requests,
            events_stream = config.rate_limit.events_stream.max_requests,
            "Rate limiting enabled"
        );
    } else {
        warn!("Rate limiting disabled");
    }
    if config.server.api_key().is_none() {
        warn!("No API key configured; task routes are unauthenticated");
    }

    start_history_sweep(
        &state.bus,
        config.event_bus.sweep_interval(),
        &state.shutdown,
    );

    let app = build_router(&config, &state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal_with_controller(state.shutdown.clone()))
    .await
    .context("HTTP server error")?;

    let released = state.bus.shutdown();
    info!(released, "PS3 shutdown complete");
    Ok(())
}
