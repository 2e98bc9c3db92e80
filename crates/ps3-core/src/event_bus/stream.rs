//! Streaming consumption loop around a [`Subscription`].
//!
//! The HTTP layer turns the stream returned by [`event_stream`] into an SSE
//! response body. Each step waits on three things at once: the cancellation
//! token, the subscription channel, and the heartbeat timer.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::bus::{EventBus, Subscription};
use super::types::TaskEvent;

/// Default wait before a heartbeat is emitted
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// One item produced by the streaming loop
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// An event delivered by the bus
    Event(TaskEvent),
    /// No event arrived within the heartbeat interval
    Heartbeat,
}

/// Owns a subscription and releases it from the bus exactly once,
/// either explicitly or on drop.
#[derive(Debug)]
pub struct SubscriptionGuard {
    bus: Arc<EventBus>,
    subscription: Subscription,
    released: bool,
}

impl SubscriptionGuard {
    /// Subscribe to `task_id` on `bus`.
    pub fn new(bus: Arc<EventBus>, task_id: &str) -> Self {
        let subscription = bus.subscribe(task_id);
        Self {
            bus,
            subscription,
            released: false,
        }
    }

    /// The guarded subscription
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Whether the subscription has been released
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Wait for the next item.
    ///
    /// Returns `None` when `cancel` fires or the bus closes the channel; the
    /// subscription is released before returning.
    pub async fn next(
        &mut self,
        heartbeat: Duration,
        cancel: &CancellationToken,
    ) -> Option<StreamItem> {
        if self.released {
            return None;
        }

        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(task_id = self.subscription.task_id(), "Stream cancelled");
                None
            }
            received = tokio::time::timeout(heartbeat, self.subscription.recv()) => match received {
                Ok(Some(event)) => Some(StreamItem::Event(event)),
                Ok(None) => {
                    debug!(task_id = self.subscription.task_id(), "Subscription closed by bus");
                    None
                }
                Err(_) => Some(StreamItem::Heartbeat),
            },
        };

        if item.is_none() {
            self.release();
        }
        item
    }

    /// Unsubscribe from the bus. Returns `false` if already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.bus
            .unsubscribe(self.subscription.task_id(), self.subscription.id());
        true
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Subscribe to `task_id` and yield events and heartbeats until cancelled.
///
/// The subscription is registered before this function returns, so events
/// published afterwards are never missed. Dropping the stream (client
/// disconnect) releases the subscription.
pub fn event_stream(
    bus: Arc<EventBus>,
    task_id: &str,
    heartbeat: Duration,
    cancel: CancellationToken,
) -> impl Stream<Item = StreamItem> + Send + 'static {
    let guard = SubscriptionGuard::new(bus, task_id);
    futures::stream::unfold((guard, cancel), move |(mut guard, cancel)| async move {
        let item = guard.next(heartbeat, &cancel).await?;
        Some((item, (guard, cancel)))
    })
}
