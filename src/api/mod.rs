//! Web API module for PS3
//!
//! Provides REST and SSE endpoints for:
//! - Health checks
//! - PDF upload and task status
//! - Task event streaming, history and worker ingestion

pub mod events;
pub mod health;
pub mod tasks;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use ps3_core::{Error, UserFriendlyError};
use serde::Serialize;
use tracing::error;

use crate::middleware::rate_limit::{RateLimitSettings, RateLimitState};

pub use events::{events_routes, StreamSettings};
pub use health::health_routes;
pub use tasks::tasks_routes;

/// Create the API router with all endpoints
pub fn api_router(
    settings: &RateLimitSettings,
    rate_limit: &RateLimitState,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(tasks_routes(settings, rate_limit, max_upload_bytes))
        .merge(events_routes(settings, rate_limit))
}

/// JSON error body shared by API handlers
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

/// Handler error mapped to an HTTP status and JSON body
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidUpload(_) | Error::InvalidStatus(_) | Error::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::InvalidConfig { .. } | Error::Serialization(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: self.0.user_message(),
            code: self.0.code(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Error::RateLimited {
            retry_after: Some(secs),
        } = self.0
        {
            if let Ok(value) = secs.to_string().parse() {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}
