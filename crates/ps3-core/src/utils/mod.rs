//! Utility modules for ps3-core
//!
//! - rate_limiter: sliding window admission control

mod rate_limiter;

pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimiter};
