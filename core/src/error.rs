//! Error types for the Conveyor client.

use std::time::Duration;

use crate::task::TaskId;

/// Main error type for Conveyor operations.
///
/// Every failure the client can observe is a distinct, inspectable variant;
/// there is no generic catch-all that swallows outcomes. [`NotFinished`] is a
/// control signal rather than a fault: the polling driver catches it and
/// retries after a delay, while every other variant is terminal for the
/// operation that produced it.
///
/// [`NotFinished`]: TaskError::NotFinished
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Broker rejected or could not accept a submission.
    #[error("Submission rejected: {0}")]
    Submission(String),

    /// Status query could not reach the monitoring source or got a non-2xx
    /// response. Retrying is the caller's decision.
    #[error("Monitor request failed: {message}")]
    Transport {
        /// HTTP status code, when the response got far enough to carry one.
        status: Option<u16>,
        /// Response body or transport-level error text.
        message: String,
    },

    /// Response shape or state value violates the expected contract.
    /// Always a bug or version-skew signal, never silently coerced.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The task has not reached a terminal state yet.
    #[error("Task '{task_id}' has not finished yet")]
    NotFinished { task_id: TaskId },

    /// The task was revoked. Terminal, never retried.
    #[error("Task '{task_id}' was revoked")]
    Revoked { task_id: TaskId },

    /// The task finished with an error. Terminal, never retried.
    #[error("Task '{task_id}' failed: {error}")]
    Failed { task_id: TaskId, error: String },

    /// The polling driver's wall-clock budget expired while the task was
    /// still unfinished.
    #[error("Timed out after {elapsed:?} waiting for task '{task_id}'")]
    Timeout { task_id: TaskId, elapsed: Duration },

    /// The event channel subscription was lost. Reconnecting is a caller
    /// concern, kept explicit rather than hidden.
    #[error("Event channel error: {0}")]
    Connection(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// True for the single retry-after-delay control signal.
    pub fn is_not_finished(&self) -> bool {
        matches!(self, TaskError::NotFinished { .. })
    }

    /// True when the error is the task's definitive outcome
    /// (revoked or failed remotely).
    pub fn is_terminal_outcome(&self) -> bool {
        matches!(self, TaskError::Revoked { .. } | TaskError::Failed { .. })
    }
}

impl From<reqwest::Error> for TaskError {
    fn from(err: reqwest::Error) -> Self {
        TaskError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Result type alias for Conveyor operations.
pub type Result<T> = std::result::Result<T, TaskError>;
