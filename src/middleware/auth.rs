//! Authentication middleware for Axum
//!
//! Validates `Authorization: Bearer <key>` against the configured API key.
//! Provides the `RequireAuth` extractor and the `require_auth` route middleware.

use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

/// JSON error response for auth failures
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl AuthErrorResponse {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Auth rejection type
pub struct AuthRejection {
    status: StatusCode,
    body: AuthErrorResponse,
}

impl AuthRejection {
    fn missing() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: AuthErrorResponse::new(
                "Authentication required. Provide Authorization: Bearer <token>.",
                "UNAUTHORIZED",
            ),
        }
    }

    fn invalid() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: AuthErrorResponse::new("Invalid token", "INVALID_CREDENTIALS"),
        }
    }

    fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: AuthErrorResponse::new(msg, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Static API key check
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuth {
    key: Option<String>,
}

impl ApiKeyAuth {
    /// `None` disables authentication
    pub fn new(key: Option<&str>) -> Self {
        Self {
            key: key.map(str::to_string),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Constant-time comparison against the configured key
    pub fn verify(&self, token: &str) -> bool {
        match &self.key {
            Some(key) => key.as_bytes().ct_eq(token.as_bytes()).into(),
            None => true,
        }
    }
}

// ============================================================================
// RequireAuth Extractor
// ============================================================================

/// Axum extractor that requires a valid bearer token when auth is enabled.
pub struct RequireAuth;

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<Arc<ApiKeyAuth>>()
            .ok_or_else(|| AuthRejection::internal("ApiKeyAuth not configured"))?;

        if !auth.is_enabled() {
            return Ok(RequireAuth);
        }

        let token = extract_token(parts).ok_or_else(AuthRejection::missing)?;
        if !auth.verify(token) {
            warn!(path = %parts.uri.path(), "Rejected request with invalid token");
            return Err(AuthRejection::invalid());
        }

        Ok(RequireAuth)
    }
}

// ============================================================================
// Route middleware
// ============================================================================

/// Route middleware enforcing [`RequireAuth`].
///
/// Attach it with `route_layer` after the rate limit layer so it runs first:
/// rejected credentials never consume an admission slot.
pub async fn require_auth(_auth: RequireAuth, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// Extract token from `Authorization: Bearer <token>`
fn extract_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts_with(auth: ApiKeyAuth, header: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().uri("/tasks/abc");
        if let Some(value) = header {
            builder = builder.header("authorization", value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        parts.extensions.insert(Arc::new(auth));
        parts
    }

    #[test]
    fn test_verify() {
        let auth = ApiKeyAuth::new(Some("secret"));
        assert!(auth.is_enabled());
        assert!(auth.verify("secret"));
        assert!(!auth.verify("secreT"));
        assert!(!auth.verify("secret-but-longer"));
        assert!(!auth.verify(""));
    }

    #[test]
    fn test_disabled_accepts_anything() {
        let auth = ApiKeyAuth::new(None);
        assert!(!auth.is_enabled());
        assert!(auth.verify("whatever"));
    }

    #[tokio::test]
    async fn test_require_auth_valid_token() {
        let mut parts = parts_with(ApiKeyAuth::new(Some("secret")), Some("Bearer secret"));
        assert!(RequireAuth::from_request_parts(&mut parts, &()).await.is_ok());
    }

    #[tokio::test]
    async fn test_require_auth_missing_token() {
        let mut parts = parts_with(ApiKeyAuth::new(Some("secret")), None);
        let rejection = RequireAuth::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection.status, StatusCode::UNAUTHORIZED);
        assert_eq!(rejection.body.code, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_require_auth_wrong_token() {
        let mut parts = parts_with(ApiKeyAuth::new(Some("secret")), Some("Bearer nope"));
        let rejection = RequireAuth::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection.body.code, "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_require_auth_disabled() {
        let mut parts = parts_with(ApiKeyAuth::new(None), None);
        assert!(RequireAuth::from_request_parts(&mut parts, &()).await.is_ok());
    }

    #[tokio::test]
    async fn test_require_auth_unconfigured_is_internal_error() {
        let (mut parts, _) = axum::http::Request::builder().body(()).unwrap().into_parts();
        let rejection = RequireAuth::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
