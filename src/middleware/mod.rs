//! Middleware module for the PS3 HTTP server
//!
//! Provides:
//! - Authentication middleware (static Bearer API key)
//! - Per-route rate limiting middleware

pub mod auth;
pub mod rate_limit;
