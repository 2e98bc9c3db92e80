//! Health check endpoint.
//!
//! `/health` is public and carries browser hardening headers.

use axum::extract::Extension;
use axum::http::header::{HeaderName, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use ps3_core::EventBus;
use serde::Serialize;
use std::sync::Arc;

/// Security headers attached to the health response
pub const SECURITY_HEADERS: [(HeaderName, &str); 3] = [
    (X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (X_FRAME_OPTIONS, "DENY"),
    (X_XSS_PROTECTION, "1; mode=block"),
];

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Unix time in seconds
    pub timestamp: f64,
    pub event_bus: EventBusHealth,
}

/// Event bus occupancy
#[derive(Debug, Serialize)]
pub struct EventBusHealth {
    pub tasks: usize,
    pub subscribers: usize,
}

/// Simple health check (for load balancers)
async fn health_check(Extension(bus): Extension<Arc<EventBus>>) -> impl IntoResponse {
    let body = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
        event_bus: EventBusHealth {
            tasks: bus.task_count(),
            subscribers: bus.total_subscriber_count(),
        },
    };
    (SECURITY_HEADERS, Json(body))
}

/// Create health routes
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_check))
}
