//! PS3 Core - task event distribution and admission control
//!
//! This crate provides the in-process pieces of the PS3 backend that hold
//! state across requests:
//! - EventBus: task-scoped publish/subscribe with bounded history, plus the
//!   heartbeat streaming loop used by SSE endpoints
//! - Utils: sliding window rate limiter for per-client admission control
//! - Tasks: task registry seam consulted before streaming or history
//! - Shutdown: cancellation and drain of open streams

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event_bus;
pub mod shutdown;
pub mod tasks;
pub mod utils;

pub use error::{Error, Result, UserFriendlyError};
pub use event_bus::{
    event_stream, format_event, EventBus, EventBusConfig, EventKind, StreamItem, Subscription,
    SubscriptionGuard, SubscriptionId, TaskEvent,
};
pub use shutdown::{
    shutdown_signal_with_controller, wait_for_shutdown_signal, ShutdownController, ShutdownPhase,
    StreamTracker,
};
pub use tasks::{
    generate_task_id, InMemoryTaskRegistry, NewTask, TaskRecord, TaskRegistry, TaskStatus,
};
pub use utils::{RateLimitConfig, RateLimitResult, RateLimiter};
