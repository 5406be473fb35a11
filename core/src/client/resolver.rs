//! Resolution of a task's terminal outcome from the polling status source.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::client::status::StatusSource;
use crate::error::{Result, TaskError};
use crate::task::{TaskId, TaskState};

/// Resolves the outcome of a single task from the monitoring source.
///
/// `resolve` is pure observation: one status query, then the terminal/error
/// policy. It never retries, never mutates broker state, and is safe to call
/// any number of times for the same identifier. Retry-on-not-finished is the
/// polling driver's job, kept out of here so the policy stays testable in
/// isolation.
#[derive(Clone)]
pub struct StatusResolver {
    source: Arc<dyn StatusSource>,
}

impl StatusResolver {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self { source }
    }

    /// Resolve the terminal outcome of `task_id`.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Transport`]: the status query failed or got a non-2xx
    ///   response; retrying is the caller's decision.
    /// - [`TaskError::Protocol`]: the source reported a state outside the
    ///   known set.
    /// - [`TaskError::NotFinished`]: the task is still in flight; callers
    ///   are expected to catch this and retry later.
    /// - [`TaskError::Revoked`] / [`TaskError::Failed`]: the task's
    ///   definitive outcome; never retried.
    pub async fn resolve(&self, task_id: &TaskId) -> Result<Value> {
        let info = self.source.task_info(task_id).await?;
        let state: TaskState = info.state.parse()?;
        debug!(task_id = %task_id, state = %state, "status query answered");

        if !state.is_finished() {
            return Err(TaskError::NotFinished {
                task_id: task_id.clone(),
            });
        }
        if state == TaskState::Revoked {
            return Err(TaskError::Revoked {
                task_id: task_id.clone(),
            });
        }
        if state != TaskState::Success {
            let error = info
                .result
                .or(info.traceback)
                .unwrap_or_else(|| "no error detail reported".to_string());
            return Err(TaskError::Failed {
                task_id: task_id.clone(),
                error,
            });
        }

        match info.result {
            Some(encoded) => Ok(serde_json::from_str(&encoded)?),
            None => Ok(Value::Null),
        }
    }
}
