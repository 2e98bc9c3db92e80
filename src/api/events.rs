//! Task event endpoints
//!
//! - `GET /tasks/:id/events`: live SSE stream with heartbeats
//! - `GET /tasks/:id/events/history`: retained events
//! - `POST /tasks/:id/events`: worker ingestion

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Extension, Path},
    http::header::{HeaderName, CACHE_CONTROL, CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use ps3_core::{
    event_stream, Error, EventBus, ShutdownController, TaskEvent, TaskRegistry, TaskStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::ApiError;
use crate::middleware::auth::require_auth;
use crate::middleware::rate_limit::{RateLimitLayer, RateLimitSettings, RateLimitState};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Streaming parameters shared by SSE handlers
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub heartbeat: Duration,
}

/// Stream a task's events as server-sent events
async fn stream_events(
    Extension(bus): Extension<Arc<EventBus>>,
    Extension(registry): Extension<Arc<dyn TaskRegistry>>,
    Extension(shutdown): Extension<Arc<ShutdownController>>,
    Extension(settings): Extension<StreamSettings>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    if !registry.exists(&task_id).await {
        return Err(Error::TaskNotFound { task_id }.into());
    }

    let tracker = shutdown.track_stream();
    let frames = event_stream(bus, &task_id, settings.heartbeat, shutdown.token()).map(
        move |item| {
            let _open = &tracker;
            Ok::<_, Infallible>(item.to_sse_frame())
        },
    );

    info!(task_id = %task_id, "SSE stream opened");

    Ok((
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}

/// History response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub task_id: String,
    pub count: usize,
    pub events: Vec<TaskEvent>,
}

/// Return the retained events for a task, oldest first
async fn event_history(
    Extension(bus): Extension<Arc<EventBus>>,
    Extension(registry): Extension<Arc<dyn TaskRegistry>>,
    Path(task_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    if !registry.exists(&task_id).await {
        return Err(Error::TaskNotFound { task_id }.into());
    }

    let events = bus.history(&task_id);
    Ok(Json(HistoryResponse {
        task_id,
        count: events.len(),
        events,
    }))
}

/// Event reported by a worker
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublishRequest {
    Progress {
        stage: String,
        progress: u8,
        #[serde(default)]
        message: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Status {
        status: String,
        #[serde(default)]
        message: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Error {
        error: String,
        #[serde(default)]
        details: Option<String>,
    },
    Completion {
        #[serde(default)]
        results: Value,
    },
}

/// Ingestion acknowledgement
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub task_id: String,
    pub delivered: usize,
    pub status: TaskStatus,
}

/// Publish a worker event and advance the task status
async fn publish_event(
    Extension(bus): Extension<Arc<EventBus>>,
    Extension(registry): Extension<Arc<dyn TaskRegistry>>,
    Path(task_id): Path<String>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<PublishResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| Error::InvalidRequest(rejection.body_text()))?;

    let task = registry
        .get(&task_id)
        .await
        .ok_or_else(|| Error::TaskNotFound {
            task_id: task_id.clone(),
        })?;

    let (delivered, next_status) = match request {
        PublishRequest::Progress {
            stage,
            progress,
            message,
            extra,
        } => {
            let progress = progress.min(100);
            let delivered = bus.publish_progress(&task_id, &stage, progress, &message, extra);
            let next = (task.status == TaskStatus::Pending).then_some(TaskStatus::Processing);
            (delivered, next)
        }
        PublishRequest::Status {
            status,
            message,
            extra,
        } => {
            let delivered = bus.publish_status(&task_id, &status, &message, extra);
            (delivered, status.parse::<TaskStatus>().ok())
        }
        PublishRequest::Error { error, details } => {
            let delivered = bus.publish_error(&task_id, &error, details.as_deref());
            (delivered, Some(TaskStatus::Failed))
        }
        PublishRequest::Completion { results } => {
            let delivered = bus.publish_completion(&task_id, results);
            (delivered, Some(TaskStatus::Completed))
        }
    };

    let status = match next_status {
        Some(next) if next != task.status && !task.status.is_terminal() => {
            registry.update_status(&task_id, next).await?.status
        }
        _ => task.status,
    };

    debug!(task_id = %task_id, delivered, status = %status, "Worker event ingested");

    Ok(Json(PublishResponse {
        task_id,
        delivered,
        status,
    }))
}

/// Create event routes.
///
/// Ingestion is authenticated but not rate limited.
pub fn events_routes(settings: &RateLimitSettings, rate_limit: &RateLimitState) -> Router {
    Router::new()
        .route(
            "/tasks/:id/events",
            get(stream_events)
                .route_layer(RateLimitLayer::new(
                    rate_limit,
                    "events_stream",
                    settings.events_stream,
                ))
                .route_layer(middleware::from_fn(require_auth)),
        )
        .route(
            "/tasks/:id/events",
            post(publish_event).route_layer(middleware::from_fn(require_auth)),
        )
        .route(
            "/tasks/:id/events/history",
            get(event_history)
                .route_layer(RateLimitLayer::new(
                    rate_limit,
                    "events_history",
                    settings.events_history,
                ))
                .route_layer(middleware::from_fn(require_auth)),
        )
}
