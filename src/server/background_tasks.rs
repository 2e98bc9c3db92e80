//! Background maintenance tasks

use ps3_core::{EventBus, ShutdownController};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Periodically drop idle task streams whose history retention has passed
pub fn start_history_sweep(
    bus: &Arc<EventBus>,
    interval: Duration,
    shutdown_controller: &ShutdownController,
) {
    let sweep_bus = bus.clone();
    let sweep_shutdown = shutdown_controller.token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let removed = sweep_bus.prune_idle();
                    if removed > 0 {
                        debug!(removed, "History sweep removed idle task streams");
                    }
                }
                _ = sweep_shutdown.cancelled() => {
                    info!("History sweep shutting down");
                    break;
                }
            }
        }
    });
    info!("History sweep started (interval: {}s)", interval.as_secs());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps3_core::{EventBusConfig, EventKind};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_streams() {
        let bus = Arc::new(EventBus::new(
            EventBusConfig::default().with_history_retention(Duration::from_secs(5)),
        ));
        let controller = ShutdownController::new();

        let sub = bus.subscribe("task-1");
        bus.publish("task-1", EventKind::Status, json!({"status": "pending"}));
        bus.unsubscribe("task-1", sub.id());
        assert_eq!(bus.task_count(), 1);

        start_history_sweep(&bus, Duration::from_secs(1), &controller);
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert_eq!(bus.task_count(), 0);
        controller.shutdown().await;
    }
}
