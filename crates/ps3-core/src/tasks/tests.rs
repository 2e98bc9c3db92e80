use super::*;

fn sample() -> NewTask {
    NewTask {
        filename: "odds.pdf".to_string(),
        size_bytes: 2048,
    }
}

#[test]
fn test_task_id_format() {
    let id = generate_task_id();
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(id, generate_task_id());
}

#[test]
fn test_status_parsing() {
    assert_eq!("Processing".parse::<TaskStatus>().unwrap(), TaskStatus::Processing);
    assert_eq!("failed".parse::<TaskStatus>().unwrap(), TaskStatus::Failed);
    assert!(matches!(
        "queued".parse::<TaskStatus>(),
        Err(Error::InvalidStatus(s)) if s == "queued"
    ));
    assert!(TaskStatus::Completed.is_terminal());
    assert!(!TaskStatus::Pending.is_terminal());
}

#[tokio::test]
async fn test_create_and_get() {
    let registry = InMemoryTaskRegistry::new();
    let task = registry.create(sample()).await.unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert!(registry.exists(&task.id).await);
    assert!(!registry.exists("missing").await);

    let fetched = registry.get(&task.id).await.unwrap();
    assert_eq!(fetched.filename, "odds.pdf");
    assert_eq!(fetched.size_bytes, 2048);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_status_transitions_stamp_times() {
    let registry = InMemoryTaskRegistry::new();
    let task = registry.create(sample()).await.unwrap();

    let processing = registry
        .update_status(&task.id, TaskStatus::Processing)
        .await
        .unwrap();
    assert!(processing.processing_started_at.is_some());
    assert!(processing.completed_at.is_none());

    let done = registry
        .update_status(&task.id, TaskStatus::Completed)
        .await
        .unwrap();
    assert!(done.completed_at.is_some());
    assert!(done.updated_at >= done.created_at);
}

#[tokio::test]
async fn test_update_unknown_task() {
    let registry = InMemoryTaskRegistry::new();
    let err = registry
        .update_status("missing", TaskStatus::Failed)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskNotFound { .. }));
}

#[test]
fn test_record_serialization_skips_empty_stamps() {
    let now = Utc::now();
    let record = TaskRecord {
        id: "abc".to_string(),
        filename: "a.pdf".to_string(),
        size_bytes: 1,
        status: TaskStatus::Pending,
        created_at: now,
        updated_at: now,
        processing_started_at: None,
        completed_at: None,
    };
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["status"], "pending");
    assert!(value.get("completed_at").is_none());
}

#[tokio::test]
async fn test_terminal_status_is_final() {
    let registry = InMemoryTaskRegistry::new();
    let task = registry.create(sample()).await.unwrap();

    let done = registry
        .update_status(&task.id, TaskStatus::Completed)
        .await
        .unwrap();
    let completed_at = done.completed_at;

    let after_error = registry
        .update_status(&task.id, TaskStatus::Failed)
        .await
        .unwrap();
    assert_eq!(after_error.status, TaskStatus::Completed);
    assert_eq!(after_error.completed_at, completed_at);

    let after_reset = registry
        .update_status(&task.id, TaskStatus::Pending)
        .await
        .unwrap();
    assert_eq!(after_reset.status, TaskStatus::Completed);
    assert_eq!(after_reset.updated_at, done.updated_at);
}

#[tokio::test]
async fn test_list_newest_first() {
    let registry = InMemoryTaskRegistry::new();
    assert!(registry.list().await.is_empty());

    let first = registry.create(sample()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = registry
        .create(NewTask {
            filename: "evens.pdf".to_string(),
            size_bytes: 10,
        })
        .await
        .unwrap();

    let ids: Vec<String> = registry.list().await.into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}
