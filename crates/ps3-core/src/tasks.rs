//! Task registry
//!
//! The event bus does not validate task ids; the HTTP layer asks a
//! [`TaskRegistry`] whether a task exists before subscribing or serving
//! history. The in-memory implementation stands in for the document store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Uploaded, waiting for the worker
    Pending,
    /// Worker is processing the document
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl TaskStatus {
    /// Wire name of the status
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the task can no longer change
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

/// Stored task metadata
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    /// Task identifier
    pub id: String,
    /// Original file name
    pub filename: String,
    /// Uploaded size in bytes
    pub size_bytes: u64,
    /// Current status
    pub status: TaskStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// When processing started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for a new task
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Original file name
    pub filename: String,
    /// Uploaded size in bytes
    pub size_bytes: u64,
}

/// Task store consulted by the HTTP layer
#[async_trait]
pub trait TaskRegistry: Send + Sync {
    /// Create a task in `pending` state
    async fn create(&self, task: NewTask) -> Result<TaskRecord>;

    /// Look up a task
    async fn get(&self, task_id: &str) -> Option<TaskRecord>;

    /// Whether `task_id` refers to a known task
    async fn exists(&self, task_id: &str) -> bool {
        self.get(task_id).await.is_some()
    }

    /// All tasks, newest first
    async fn list(&self) -> Vec<TaskRecord>;

    /// Move a task to `status`, stamping processing/completion times.
    ///
    /// A task in a terminal status is returned unchanged.
    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<TaskRecord>;
}

/// Generate a task id: 32 hex chars of SHA-256 over 32 random bytes
#[must_use]
pub fn generate_task_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let digest = Sha256::digest(bytes);
    digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
        .chars()
        .take(32)
        .collect()
}

/// In-memory [`TaskRegistry`]
#[derive(Debug, Default)]
pub struct InMemoryTaskRegistry {
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

impl InMemoryTaskRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks stored
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskRegistry for InMemoryTaskRegistry {
    async fn create(&self, task: NewTask) -> Result<TaskRecord> {
        let now = Utc::now();
        let record = TaskRecord {
            id: generate_task_id(),
            filename: task.filename,
            size_bytes: task.size_bytes,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            completed_at: None,
        };

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&record.id) {
            return Err(Error::Internal(format!("task id collision: {}", record.id)));
        }
        tasks.insert(record.id.clone(), record.clone());

        info!(task_id = %record.id, filename = %record.filename, "Task created");
        Ok(record)
    }

    async fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.read().await.get(task_id).cloned()
    }

    async fn list(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self.tasks.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<TaskRecord> {
        let mut tasks = self.tasks.write().await;
        let record = tasks.get_mut(task_id).ok_or_else(|| Error::TaskNotFound {
            task_id: task_id.to_string(),
        })?;

        if record.status.is_terminal() {
            if record.status != status {
                warn!(
                    task_id,
                    current = %record.status,
                    requested = %status,
                    "Ignoring transition out of terminal status"
                );
            }
            return Ok(record.clone());
        }

        let now = Utc::now();
        record.status = status;
        record.updated_at = now;
        match status {
            TaskStatus::Processing => record.processing_started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed => record.completed_at = Some(now),
            TaskStatus::Pending => {}
        }

        info!(task_id, status = %status, "Task status updated");
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests;
