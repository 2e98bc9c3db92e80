use super::*;

#[tokio::test]
async fn test_shutdown_phases() {
    let controller = ShutdownController::new();
    assert_eq!(controller.phase(), ShutdownPhase::Running);
    assert!(!controller.is_shutting_down());

    controller.shutdown().await;

    assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    assert!(controller.is_shutting_down());
}

#[tokio::test]
async fn test_stream_tracker() {
    let controller = ShutdownController::new();
    assert_eq!(controller.active_stream_count(), 0);

    {
        let _a = controller.track_stream();
        let _b = controller.track_stream();
        assert_eq!(controller.active_stream_count(), 2);
    }

    assert_eq!(controller.active_stream_count(), 0);
}

#[tokio::test]
async fn test_cancellation_propagation() {
    let controller = ShutdownController::new();
    let token = controller.token();
    assert!(!token.is_cancelled());

    controller.shutdown().await;
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_shutdown_waits_for_streams() {
    let controller = ShutdownController::new();
    let tracker = controller.track_stream();
    let token = controller.token();

    let stream_task = tokio::spawn(async move {
        token.cancelled().await;
        drop(tracker);
    });

    controller.shutdown().await;
    stream_task.await.unwrap();

    assert_eq!(controller.active_stream_count(), 0);
    assert_eq!(controller.phase(), ShutdownPhase::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_times_out_on_stuck_stream() {
    let controller = ShutdownController::with_timeout(Duration::from_secs(1));
    let _stuck = controller.track_stream();

    controller.shutdown().await;

    assert_eq!(controller.active_stream_count(), 1);
    assert_eq!(controller.phase(), ShutdownPhase::Terminated);
}

#[tokio::test]
async fn test_double_shutdown() {
    let controller = ShutdownController::new();

    let c1 = controller.clone();
    let c2 = controller.clone();
    let _ = tokio::join!(
        tokio::spawn(async move { c1.shutdown().await }),
        tokio::spawn(async move { c2.shutdown().await }),
    );

    assert_eq!(controller.phase(), ShutdownPhase::Terminated);
}
