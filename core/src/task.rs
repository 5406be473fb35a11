//! Task identifier and lifecycle state vocabulary.
//!
//! These two types are the shared vocabulary between the pull view (status
//! polling) and the push view (lifecycle events) of a task. Both views must
//! agree on what "finished" means; that classification lives here and
//! nowhere else.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Opaque handle for a submitted task.
///
/// Assigned by the broker at submission time, immutable afterwards, and used
/// as the join key between the status and event views of the same task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap an identifier handed out by the broker.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle state of a task as reported by the pull (status) view.
///
/// The declaration order defines the total order used by `Ord`:
/// `Pending < Started < Failure < Revoked < Success`. A task occupies
/// exactly one state at a time from the pull view.
///
/// Comparisons against textual labels are case-insensitive; comparing
/// against a label outside this set fails loudly through [`try_cmp`]
/// instead of coercing to a default.
///
/// [`try_cmp`]: TaskState::try_cmp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Accepted by the broker, not yet picked up by a worker.
    Pending,
    /// A worker is executing the task.
    Started,
    /// The task finished with an error.
    Failure,
    /// The task was revoked before or during execution.
    Revoked,
    /// The task finished and produced a result.
    Success,
}

impl TaskState {
    /// Terminal states: no further transition occurs once one is reached.
    pub const FINISHED: [TaskState; 3] = [TaskState::Failure, TaskState::Revoked, TaskState::Success];

    /// States from which revocation is no longer possible: a task that has
    /// started, finished, or been revoked cannot be revoked (again).
    pub const NON_REVOKABLE: [TaskState; 4] = [
        TaskState::Started,
        TaskState::Failure,
        TaskState::Revoked,
        TaskState::Success,
    ];

    /// Canonical wire form of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Failure => "FAILURE",
            TaskState::Revoked => "REVOKED",
            TaskState::Success => "SUCCESS",
        }
    }

    /// True once the task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        Self::FINISHED.contains(self)
    }

    /// True while a revocation request can still take effect.
    pub fn can_revoke(&self) -> bool {
        !Self::NON_REVOKABLE.contains(self)
    }

    /// Compare against a textual state label.
    ///
    /// Unknown labels fail with [`TaskError::Protocol`] rather than
    /// coercing to a default ordering.
    pub fn try_cmp(&self, label: &str) -> Result<Ordering, TaskError> {
        let other: TaskState = label.parse()?;
        Ok(self.cmp(&other))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = TaskError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TaskState::Pending),
            "STARTED" => Ok(TaskState::Started),
            "FAILURE" => Ok(TaskState::Failure),
            "REVOKED" => Ok(TaskState::Revoked),
            "SUCCESS" => Ok(TaskState::Success),
            _ => Err(TaskError::Protocol(format!(
                "unknown task state '{label}'"
            ))),
        }
    }
}

impl PartialEq<str> for TaskState {
    fn eq(&self, other: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for TaskState {
    fn eq(&self, other: &&str) -> bool {
        self.as_str().eq_ignore_ascii_case(other)
    }
}

impl PartialEq<String> for TaskState {
    fn eq(&self, other: &String) -> bool {
        self.as_str().eq_ignore_ascii_case(other)
    }
}

impl PartialEq<TaskState> for str {
    fn eq(&self, other: &TaskState) -> bool {
        other == self
    }
}

impl PartialEq<TaskState> for &str {
    fn eq(&self, other: &TaskState) -> bool {
        other == self
    }
}

impl PartialEq<TaskState> for String {
    fn eq(&self, other: &TaskState) -> bool {
        other == self
    }
}
