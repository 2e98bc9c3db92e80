//! EventBus - task-scoped publish/subscribe for real-time task events.
//!
//! Producers (upload handler, worker callbacks) publish per-task events;
//! SSE endpoints subscribe to one task and stream them to clients. Each task
//! keeps a bounded history for the polling endpoint.

/// Core event bus implementation (per-task registries and history).
pub mod bus;
/// SSE wire framing.
pub mod sse;
/// Streaming loop with heartbeat and cancellation.
pub mod stream;
/// Event type definitions.
pub mod types;

pub use bus::{
    EventBus, EventBusConfig, Subscription, SubscriptionId, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_HISTORY_RETENTION, DEFAULT_SUBSCRIBER_CAPACITY,
};
pub use sse::{format_event, HEARTBEAT_FRAME};
pub use stream::{event_stream, StreamItem, SubscriptionGuard, DEFAULT_HEARTBEAT_INTERVAL};
pub use types::{EventKind, TaskEvent};
