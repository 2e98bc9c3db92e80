use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::types::{EventKind, TaskEvent};

/// Default number of events kept per task
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default per-subscriber channel capacity
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Default time an idle task stream keeps its history
pub const DEFAULT_HISTORY_RETENTION: Duration = Duration::from_secs(600);

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Maximum events kept in a task's history ring
    pub history_capacity: usize,
    /// Buffered events per subscriber before it is dropped
    pub subscriber_capacity: usize,
    /// How long a task stream with no subscribers keeps its history.
    /// Zero removes the stream as soon as the last subscriber leaves.
    pub history_retention: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            history_retention: DEFAULT_HISTORY_RETENTION,
        }
    }
}

impl EventBusConfig {
    /// Set the history ring capacity (clamped to at least 1)
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    /// Set the per-subscriber channel capacity (clamped to at least 1)
    #[must_use]
    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// Set the idle history retention
    #[must_use]
    pub fn with_history_retention(mut self, retention: Duration) -> Self {
        self.history_retention = retention;
        self
    }
}

/// Identity of one registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A consumer's private, bounded delivery channel for one task.
///
/// The bus holds the sending half until the subscription is removed; after
/// that `recv` drains whatever was already buffered and then returns `None`.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    task_id: String,
    receiver: mpsc::Receiver<TaskEvent>,
}

impl Subscription {
    /// Subscription identity
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Task this subscription listens to
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Wait for the next event. `None` once the bus has released the subscription.
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Result<TaskEvent, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    sender: mpsc::Sender<TaskEvent>,
}

/// Per-task state: live subscribers and the history ring.
#[derive(Debug)]
struct TaskStream {
    subscribers: Vec<Subscriber>,
    history: VecDeque<TaskEvent>,
    /// Set while the stream has no subscribers
    idle_since: Option<Instant>,
}

impl TaskStream {
    fn new(now: Instant) -> Self {
        Self {
            subscribers: Vec::new(),
            history: VecDeque::new(),
            idle_since: Some(now),
        }
    }

    fn push_history(&mut self, event: TaskEvent, capacity: usize) {
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    /// Zero retention never expires lazily: teardown happens on the last unsubscribe.
    fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        if retention.is_zero() {
            return false;
        }
        match self.idle_since {
            Some(since) if self.subscribers.is_empty() => now.duration_since(since) >= retention,
            _ => false,
        }
    }
}

/// Task-scoped publish/subscribe broker.
///
/// Each task id maps to a [`TaskStream`] holding its subscribers and a bounded
/// history. Streams are created on first subscribe or publish. Publishing never
/// waits on consumers: a subscriber whose channel is full is dropped instead.
///
/// All mutation of one task's stream happens under that entry's lock, so every
/// subscriber of a task observes events in the same order they entered history.
#[derive(Debug)]
pub struct EventBus {
    config: EventBusConfig,
    streams: DashMap<String, TaskStream>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    #[must_use]
    pub fn new(config: EventBusConfig) -> Self {
        let config = EventBusConfig {
            history_capacity: config.history_capacity.max(1),
            subscriber_capacity: config.subscriber_capacity.max(1),
            history_retention: config.history_retention,
        };
        Self {
            config,
            streams: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Register a new subscription for `task_id`, creating the stream if needed.
    pub fn subscribe(&self, task_id: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.config.subscriber_capacity);
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = Instant::now();

        let subscribers = {
            let mut stream = self
                .streams
                .entry(task_id.to_string())
                .or_insert_with(|| TaskStream::new(now));
            if stream.is_expired(now, self.config.history_retention) {
                stream.history.clear();
            }
            stream.subscribers.push(Subscriber { id, sender });
            stream.idle_since = None;
            stream.subscribers.len()
        };

        info!(task_id, subscription_id = %id, subscribers, "Subscription registered");

        Subscription {
            id,
            task_id: task_id.to_string(),
            receiver,
        }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, task_id: &str, id: SubscriptionId) -> bool {
        let now = Instant::now();

        let (removed, remaining) = match self.streams.get_mut(task_id) {
            Some(mut stream) => {
                let before = stream.subscribers.len();
                stream.subscribers.retain(|s| s.id != id);
                let removed = stream.subscribers.len() != before;
                if removed && stream.subscribers.is_empty() {
                    stream.idle_since = Some(now);
                }
                (removed, stream.subscribers.len())
            }
            None => (false, 0),
        };

        if !removed {
            debug!(task_id, subscription_id = %id, "Subscription already removed");
            return false;
        }

        info!(task_id, subscription_id = %id, remaining, "Subscription removed");

        if remaining == 0 {
            if self.config.history_retention.is_zero() {
                self.streams
                    .remove_if(task_id, |_, s| s.subscribers.is_empty());
                info!(task_id, "All subscriptions closed, task stream removed");
            } else {
                info!(task_id, "All subscriptions closed, keeping history");
            }
        }

        true
    }

    /// Publish an event to `task_id`.
    ///
    /// Appends to history and fans out to every subscriber. Returns the number
    /// of subscribers that received the event.
    pub fn publish(&self, task_id: &str, kind: EventKind, payload: Value) -> usize {
        let event = TaskEvent::new(task_id, kind, payload);
        let now = Instant::now();
        let retention = self.config.history_retention;

        let (delivered, dropped, remaining) = {
            let mut stream = self
                .streams
                .entry(task_id.to_string())
                .or_insert_with(|| TaskStream::new(now));
            if stream.is_expired(now, retention) {
                stream.history.clear();
            }
            stream.push_history(event.clone(), self.config.history_capacity);

            let mut delivered = 0;
            let mut dropped = 0;
            stream
                .subscribers
                .retain(|sub| match sub.sender.try_send(event.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(TrySendError::Full(_)) => {
                        warn!(task_id, subscription_id = %sub.id, "Subscriber channel full, dropping subscriber");
                        dropped += 1;
                        false
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(task_id, subscription_id = %sub.id, "Subscriber receiver gone, removing");
                        dropped += 1;
                        false
                    }
                });
            // Retention counts from the last activity on an unwatched stream
            if stream.subscribers.is_empty() {
                stream.idle_since = Some(now);
            }
            (delivered, dropped, stream.subscribers.len())
        };

        if dropped > 0 && remaining == 0 && retention.is_zero() {
            self.streams
                .remove_if(task_id, |_, s| s.subscribers.is_empty());
        }

        debug!(task_id, kind = %kind, delivered, dropped, "Event published");
        delivered
    }

    /// Publish a `progress` event: `{stage, progress, message, ..extra}`.
    pub fn publish_progress(
        &self,
        task_id: &str,
        stage: &str,
        progress: u8,
        message: &str,
        extra: Map<String, Value>,
    ) -> usize {
        let mut data = Map::new();
        data.insert("stage".to_string(), Value::from(stage));
        data.insert("progress".to_string(), Value::from(progress));
        data.insert("message".to_string(), Value::from(message));
        merge_extra(&mut data, extra);
        self.publish(task_id, EventKind::Progress, Value::Object(data))
    }

    /// Publish a `status` event: `{status, message, timestamp, ..extra}`.
    pub fn publish_status(
        &self,
        task_id: &str,
        status: &str,
        message: &str,
        extra: Map<String, Value>,
    ) -> usize {
        let mut data = Map::new();
        data.insert("status".to_string(), Value::from(status));
        data.insert("message".to_string(), Value::from(message));
        data.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));
        merge_extra(&mut data, extra);
        self.publish(task_id, EventKind::Status, Value::Object(data))
    }

    /// Publish an `error` event: `{error, details, timestamp}`.
    pub fn publish_error(&self, task_id: &str, error: &str, details: Option<&str>) -> usize {
        let mut data = Map::new();
        data.insert("error".to_string(), Value::from(error));
        data.insert(
            "details".to_string(),
            details.map_or(Value::Null, Value::from),
        );
        data.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));
        self.publish(task_id, EventKind::Error, Value::Object(data))
    }

    /// Publish a `completion` event: `{results, timestamp}`.
    pub fn publish_completion(&self, task_id: &str, results: Value) -> usize {
        let mut data = Map::new();
        data.insert("results".to_string(), results);
        data.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));
        self.publish(task_id, EventKind::Completion, Value::Object(data))
    }

    /// Snapshot of the task's history, oldest first. Empty for unknown tasks.
    #[must_use]
    pub fn history(&self, task_id: &str) -> Vec<TaskEvent> {
        let now = Instant::now();
        let retention = self.config.history_retention;

        if self
            .streams
            .remove_if(task_id, |_, s| s.is_expired(now, retention))
            .is_some()
        {
            debug!(task_id, "Idle task stream expired");
            return Vec::new();
        }

        self.streams
            .get(task_id)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live subscriptions for a task, 0 if unknown.
    #[must_use]
    pub fn active_subscriber_count(&self, task_id: &str) -> usize {
        self.streams
            .get(task_id)
            .map(|s| s.subscribers.len())
            .unwrap_or(0)
    }

    /// Number of task streams currently held (live or idle).
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.streams.len()
    }

    /// Total live subscriptions across all tasks.
    #[must_use]
    pub fn total_subscriber_count(&self) -> usize {
        self.streams.iter().map(|s| s.subscribers.len()).sum()
    }

    /// Drop idle task streams whose retention has passed. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let retention = self.config.history_retention;
        let before = self.streams.len();
        self.streams.retain(|_, s| !s.is_expired(now, retention));
        let removed = before.saturating_sub(self.streams.len());
        if removed > 0 {
            debug!(removed, "Pruned idle task streams");
        }
        removed
    }

    /// Release every subscription and drop all task streams.
    ///
    /// Consumers observe their channel closing once buffered events are drained.
    /// Returns the number of subscriptions released.
    pub fn shutdown(&self) -> usize {
        let mut released = 0;
        self.streams.retain(|task_id, s| {
            if !s.subscribers.is_empty() {
                debug!(task_id = %task_id, subscribers = s.subscribers.len(), "Releasing subscriptions");
            }
            released += s.subscribers.len();
            false
        });
        info!(released, "Event bus shut down");
        released
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

/// Add extra payload fields without overriding the fixed ones.
fn merge_extra(data: &mut Map<String, Value>, extra: Map<String, Value>) {
    for (key, value) in extra {
        data.entry(key).or_insert(value);
    }
}
