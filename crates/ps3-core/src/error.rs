//! Error types for ps3-core
//!
//! This module provides the core error type and user-facing formatting.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Admission limiter rejected the request
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until retry is allowed
        retry_after: Option<u64>,
    },

    /// Task id does not refer to a known task
    #[error("task not found: {task_id}")]
    TaskNotFound {
        /// Task identifier
        task_id: String,
    },

    /// Uploaded document was rejected
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// Task status name not recognised
    #[error("unknown task status: {0}")]
    InvalidStatus(String),

    /// Request body could not be decoded
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("invalid configuration: {field}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// Payload could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code, used in HTTP error bodies
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Error::InvalidUpload(_) => "INVALID_UPLOAD",
            Error::InvalidStatus(_) => "INVALID_STATUS",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::InvalidConfig { .. } => "INVALID_CONFIG",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller can expect a later retry to succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }
}

/// Trait for user-friendly error messages
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::RateLimited { retry_after } => {
                if let Some(secs) = retry_after {
                    format!("Rate limit exceeded. Please wait {} seconds.", secs)
                } else {
                    "Rate limit exceeded. Try again later.".to_string()
                }
            }
            Error::TaskNotFound { task_id } => format!("Task '{}' was not found.", task_id),
            Error::InvalidUpload(msg) => format!("The uploaded file was rejected: {}", msg),
            Error::InvalidStatus(status) => format!("'{}' is not a task status.", status),
            Error::InvalidRequest(msg) => format!("The request body was rejected: {}", msg),
            Error::InvalidConfig { field, message } => {
                format!("Configuration error in '{}': {}", field, message)
            }
            Error::Serialization(e) => format!("Could not encode event payload: {}", e),
            Error::Internal(msg) => format!("Internal error: {}", msg),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::RateLimited { .. } => {
                Some("Reduce the request rate or wait for the window to pass.".to_string())
            }
            Error::TaskNotFound { .. } => {
                Some("Check the task id returned when the PDF was uploaded.".to_string())
            }
            Error::InvalidUpload(_) => {
                Some("Send the document with Content-Type: application/pdf.".to_string())
            }
            Error::InvalidStatus(_) => {
                Some("Use one of: pending, processing, completed, failed.".to_string())
            }
            Error::InvalidConfig { field, .. } => Some(format!(
                "Check the '{}' setting in config/default.toml or the PS3_ environment variables.",
                field
            )),
            _ => None,
        }
    }
}
