//! Task upload and status endpoints

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Extension, Path},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use ps3_core::{Error, EventBus, NewTask, TaskRecord, TaskRegistry, TaskStatus};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use super::ApiError;
use crate::middleware::auth::require_auth;
use crate::middleware::rate_limit::{RateLimitLayer, RateLimitSettings, RateLimitState};

const PDF_CONTENT_TYPE: &str = "application/pdf";
const DEFAULT_FILENAME: &str = "document.pdf";

/// Upload acknowledgement
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

/// Accept a PDF and queue it as a new task
async fn upload_task(
    Extension(bus): Extension<Arc<EventBus>>,
    Extension(registry): Extension<Arc<dyn TaskRegistry>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    if !is_pdf(&headers) {
        return Err(Error::InvalidUpload("file must be a PDF".to_string()).into());
    }
    if body.is_empty() {
        return Err(Error::InvalidUpload("file is empty".to_string()).into());
    }

    let filename = headers
        .get("x-filename")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_FILENAME)
        .to_string();

    let task = registry
        .create(NewTask {
            filename: filename.clone(),
            size_bytes: body.len() as u64,
        })
        .await?;

    let mut extra = Map::new();
    extra.insert("filename".to_string(), Value::from(filename));
    bus.publish_status(
        &task.id,
        task.status.as_str(),
        "Task queued for processing",
        extra,
    );

    info!(task_id = %task.id, size_bytes = task.size_bytes, "Task created");

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            task_id: task.id,
            status: task.status,
        }),
    ))
}

fn is_pdf(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Task listing
#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskRecord>,
    pub total: usize,
}

/// List every task, newest first
async fn list_tasks(
    Extension(registry): Extension<Arc<dyn TaskRegistry>>,
) -> Json<TaskListResponse> {
    let tasks = registry.list().await;
    Json(TaskListResponse {
        total: tasks.len(),
        tasks,
    })
}

/// Fetch a task record
async fn get_task(
    Extension(registry): Extension<Arc<dyn TaskRegistry>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    registry
        .get(&task_id)
        .await
        .map(Json)
        .ok_or_else(|| Error::TaskNotFound { task_id }.into())
}

/// Create task routes.
///
/// Auth is the outermost route layer, so unauthenticated requests are
/// rejected before they reach the rate limiter.
pub fn tasks_routes(
    settings: &RateLimitSettings,
    rate_limit: &RateLimitState,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route(
            "/tasks",
            post(upload_task)
                .layer(DefaultBodyLimit::max(max_upload_bytes))
                .route_layer(RateLimitLayer::new(rate_limit, "upload", settings.upload))
                .route_layer(middleware::from_fn(require_auth)),
        )
        .route(
            "/tasks",
            get(list_tasks)
                .route_layer(RateLimitLayer::new(rate_limit, "task_list", settings.task_list))
                .route_layer(middleware::from_fn(require_auth)),
        )
        .route(
            "/tasks/:id",
            get(get_task)
                .route_layer(RateLimitLayer::new(
                    rate_limit,
                    "task_status",
                    settings.task_status,
                ))
                .route_layer(middleware::from_fn(require_auth)),
        )
}
