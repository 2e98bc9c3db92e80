//! Rate limiting middleware for Axum
//!
//! Wraps the `RateLimiter` from ps3-core as a per-route layer. Each route
//! declares its own limit and a scope; keys are `"{scope}:ip:{client}"` so
//! routes with different windows never share timestamps.

use axum::{
    extract::ConnectInfo,
    http::{header::RETRY_AFTER, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ps3_core::{Error, RateLimitConfig, RateLimiter, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, info, warn};

// ============================================================================
// Config
// ============================================================================

/// Rate limit configuration (deserializable from TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// POST /tasks
    #[serde(default = "default_upload")]
    pub upload: RouteLimit,
    /// GET /tasks
    #[serde(default = "default_task_list")]
    pub task_list: RouteLimit,
    /// GET /tasks/:id
    #[serde(default = "default_task_status")]
    pub task_status: RouteLimit,
    /// GET /tasks/:id/events
    #[serde(default = "default_events_stream")]
    pub events_stream: RouteLimit,
    /// GET /tasks/:id/events/history
    #[serde(default = "default_events_history")]
    pub events_history: RouteLimit,
    /// Seconds between sweeps of idle client keys
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// Requests allowed per trailing window for one route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RouteLimit {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.max_requests, Duration::from_secs(self.window_secs))
    }
}

fn default_true() -> bool {
    true
}
fn default_upload() -> RouteLimit {
    RouteLimit::new(50, 3600)
}
fn default_task_list() -> RouteLimit {
    RouteLimit::new(100, 3600)
}
fn default_task_status() -> RouteLimit {
    RouteLimit::new(100, 3600)
}
fn default_events_stream() -> RouteLimit {
    RouteLimit::new(30, 60)
}
fn default_events_history() -> RouteLimit {
    RouteLimit::new(100, 3600)
}
fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            upload: default_upload(),
            task_list: default_task_list(),
            task_status: default_task_status(),
            events_stream: default_events_stream(),
            events_history: default_events_history(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RateLimitSettings {
    /// Reject limits that would block every request or never expire
    pub fn validate(&self) -> Result<()> {
        let routes = [
            ("rate_limit.upload", self.upload),
            ("rate_limit.task_list", self.task_list),
            ("rate_limit.task_status", self.task_status),
            ("rate_limit.events_stream", self.events_stream),
            ("rate_limit.events_history", self.events_history),
        ];
        for (field, limit) in routes {
            if limit.max_requests == 0 || limit.window_secs == 0 {
                return Err(Error::InvalidConfig {
                    field: field.to_string(),
                    message: "max_requests and window_secs must both be positive".to_string(),
                });
            }
        }
        if self.cleanup_interval_secs == 0 {
            return Err(Error::InvalidConfig {
                field: "rate_limit.cleanup_interval_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

// ============================================================================
// Rate Limit Error Response
// ============================================================================

#[derive(Debug, Serialize)]
struct RateLimitResponse {
    success: bool,
    error: String,
    code: String,
    retry_after_secs: u64,
}

// ============================================================================
// Rate Limit State (shared across requests)
// ============================================================================

/// Shared rate limiter state
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    enabled: bool,
}

impl RateLimitState {
    /// Create a new rate limit state from settings
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::default()),
            enabled: settings.enabled,
        }
    }

    /// Check and record a request against `limit`
    pub async fn check_request(&self, key: &str, limit: &RateLimitConfig) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        self.limiter
            .acquire_with(key, limit)
            .await
            .into_result()
            .map(|_| ())
    }

    /// Spawn periodic cleanup task, stopped by `shutdown`
    pub fn spawn_cleanup(&self, interval: Duration, shutdown: CancellationToken) {
        let limiter = self.limiter.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let removed = limiter.cleanup().await;
                        if removed > 0 {
                            debug!(removed, "Rate limiter cleanup");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Rate limiter cleanup shutting down");
                        break;
                    }
                }
            }
        });
    }
}

// ============================================================================
// Axum Layer
// ============================================================================

/// Rate limiting layer for one route
#[derive(Clone)]
pub struct RateLimitLayer {
    state: RateLimitState,
    scope: &'static str,
    limit: RateLimitConfig,
}

impl RateLimitLayer {
    /// Create a layer admitting `limit` requests per client for `scope`
    pub fn new(state: &RateLimitState, scope: &'static str, limit: RouteLimit) -> Self {
        Self {
            state: state.clone(),
            scope,
            limit: limit.config(),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            state: self.state.clone(),
            scope: self.scope,
            limit: self.limit,
        }
    }
}

// ============================================================================
// Axum Service
// ============================================================================

/// Rate limiting service wrapper
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    state: RateLimitState,
    scope: &'static str,
    limit: RateLimitConfig,
}

type BoxFuture<T, E> =
    std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send>>;

impl<S, B> Service<Request<B>> for RateLimitService<S>
where
    S: Service<Request<B>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> BoxFuture<Response, S::Error> {
        let state = self.state.clone();
        let limit = self.limit;
        let key = format!("{}:{}", self.scope, extract_client_key(&req));
        // Take the service that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match state.check_request(&key, &limit).await {
                Ok(()) => inner.call(req).await,
                Err(Error::RateLimited { retry_after }) => {
                    let retry_after = retry_after.unwrap_or(limit.window.as_secs());
                    warn!(key = %key, retry_after_secs = retry_after, "Rate limit exceeded");
                    Ok(rate_limited_response(retry_after))
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Rate limit check failed");
                    Ok(rate_limited_response(limit.window.as_secs()))
                }
            }
        })
    }
}

fn rate_limited_response(retry_after: u64) -> Response {
    let body = RateLimitResponse {
        success: false,
        error: "Rate limit exceeded. Please retry later.".to_string(),
        code: "RATE_LIMITED".to_string(),
        retry_after_secs: retry_after,
    };

    (
        StatusCode::TOO_MANY_REQUESTS,
        [(RETRY_AFTER, retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

/// Client identity for rate limiting: peer IP, then `X-Forwarded-For`.
fn extract_client_key<B>(req: &Request<B>) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }

    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let ip = first.trim();
                if !ip.is_empty() {
                    return format!("ip:{}", ip);
                }
            }
        }
    }

    "ip:unknown".to_string()
}
