//! Typed model for the broker's task lifecycle event stream.
//!
//! Inbound records are loosely-typed JSON objects discriminated by a
//! `"type"` field, one record per lifecycle transition. Delivery is
//! at-least-once: the same transition can be announced more than once, and
//! no ordering holds across different tasks (within one well-behaved task,
//! events arrive in broker-emission order; consumers must not depend
//! on it).
//!
//! Every field beyond the owning `uuid` is optional on the wire; the stream
//! format is expected to evolve and a consumer must keep working when fields
//! are missing or new event kinds appear.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::error::{Result, TaskError};

/// Discriminator for the eight lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Sent,
    Received,
    Started,
    Succeeded,
    Failed,
    Rejected,
    Retried,
    Revoked,
}

impl EventKind {
    /// All kinds, in lifecycle order.
    pub const ALL: [EventKind; 8] = [
        EventKind::Sent,
        EventKind::Received,
        EventKind::Started,
        EventKind::Succeeded,
        EventKind::Failed,
        EventKind::Rejected,
        EventKind::Retried,
        EventKind::Revoked,
    ];

    /// The wire tag carried in the record's `"type"` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Sent => "task-sent",
            EventKind::Received => "task-received",
            EventKind::Started => "task-started",
            EventKind::Succeeded => "task-succeeded",
            EventKind::Failed => "task-failed",
            EventKind::Rejected => "task-rejected",
            EventKind::Retried => "task-retried",
            EventKind::Revoked => "task-revoked",
        }
    }

    /// Look up a kind by its wire tag. `None` for tags this version does
    /// not know about.
    pub fn from_wire(tag: &str) -> Option<EventKind> {
        match tag {
            "task-sent" => Some(EventKind::Sent),
            "task-received" => Some(EventKind::Received),
            "task-started" => Some(EventKind::Started),
            "task-succeeded" => Some(EventKind::Succeeded),
            "task-failed" => Some(EventKind::Failed),
            "task-rejected" => Some(EventKind::Rejected),
            "task-retried" => Some(EventKind::Retried),
            "task-revoked" => Some(EventKind::Revoked),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The broker accepted a submission and routed it to a queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSent {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Literal-encoded positional arguments, as carried on the wire.
    #[serde(default)]
    pub args: Option<String>,
    /// Literal-encoded keyword arguments, as carried on the wire.
    #[serde(default)]
    pub kwargs: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub routing_key: Option<String>,
    #[serde(default)]
    pub root_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// A worker picked the task up from its queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskReceived {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub kwargs: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub root_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Execution began on a worker process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStarted {
    pub uuid: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub pid: Option<String>,
}

/// The task finished and produced a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSucceeded {
    pub uuid: String,
    /// Literal-encoded result payload.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub runtime: Option<f64>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// The task finished with an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFailed {
    pub uuid: String,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// The worker refused the task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRejected {
    pub uuid: String,
    /// Whether the broker requeued the task after the rejection.
    #[serde(default)]
    pub requeue: bool,
}

/// The task failed and was scheduled for another attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRetried {
    pub uuid: String,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// The task was revoked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRevoked {
    pub uuid: String,
    /// Whether a running worker process was terminated.
    #[serde(default)]
    pub terminated: bool,
    /// Signal used for termination, when one was sent.
    #[serde(default)]
    pub signum: Option<i64>,
    /// Whether the revocation happened because the task expired.
    #[serde(default)]
    pub expired: bool,
}

/// One decoded lifecycle event, tagged by transition.
///
/// Created by the broker when the corresponding transition occurs, consumed
/// exactly once per handler registration by the event receiver, never
/// mutated after creation, and not persisted here.
#[derive(Debug, Clone, Serialize)]
pub enum TaskEvent {
    Sent(TaskSent),
    Received(TaskReceived),
    Started(TaskStarted),
    Succeeded(TaskSucceeded),
    Failed(TaskFailed),
    Rejected(TaskRejected),
    Retried(TaskRetried),
    Revoked(TaskRevoked),
}

impl TaskEvent {
    /// Decode one raw event record.
    ///
    /// Returns `Ok(None)` for records of a kind this version does not know
    /// about: the stream format may legitimately gain new kinds over time
    /// and must not halt an existing consumer. The drop is logged. A record
    /// without a `"type"` discriminator, or a known kind with a malformed
    /// payload, is a [`TaskError::Protocol`]: those are contract
    /// violations, not schema evolution.
    pub fn decode(record: &Value) -> Result<Option<TaskEvent>> {
        let tag = record
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TaskError::Protocol("event record missing 'type' discriminator".to_string())
            })?;
        let Some(kind) = EventKind::from_wire(tag) else {
            warn!(kind = tag, "dropping event of unknown kind");
            return Ok(None);
        };
        let event = match kind {
            EventKind::Sent => TaskEvent::Sent(payload(record)?),
            EventKind::Received => TaskEvent::Received(payload(record)?),
            EventKind::Started => TaskEvent::Started(payload(record)?),
            EventKind::Succeeded => TaskEvent::Succeeded(payload(record)?),
            EventKind::Failed => TaskEvent::Failed(payload(record)?),
            EventKind::Rejected => TaskEvent::Rejected(payload(record)?),
            EventKind::Retried => TaskEvent::Retried(payload(record)?),
            EventKind::Revoked => TaskEvent::Revoked(payload(record)?),
        };
        Ok(Some(event))
    }

    /// The transition this event announces.
    pub fn kind(&self) -> EventKind {
        match self {
            TaskEvent::Sent(_) => EventKind::Sent,
            TaskEvent::Received(_) => EventKind::Received,
            TaskEvent::Started(_) => EventKind::Started,
            TaskEvent::Succeeded(_) => EventKind::Succeeded,
            TaskEvent::Failed(_) => EventKind::Failed,
            TaskEvent::Rejected(_) => EventKind::Rejected,
            TaskEvent::Retried(_) => EventKind::Retried,
            TaskEvent::Revoked(_) => EventKind::Revoked,
        }
    }

    /// Identifier of the task this event belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Sent(p) => &p.uuid,
            TaskEvent::Received(p) => &p.uuid,
            TaskEvent::Started(p) => &p.uuid,
            TaskEvent::Succeeded(p) => &p.uuid,
            TaskEvent::Failed(p) => &p.uuid,
            TaskEvent::Rejected(p) => &p.uuid,
            TaskEvent::Retried(p) => &p.uuid,
            TaskEvent::Revoked(p) => &p.uuid,
        }
    }

    /// Unix timestamp reported by the broker, when the variant carries one.
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            TaskEvent::Sent(p) => p.timestamp,
            TaskEvent::Received(p) => p.timestamp,
            TaskEvent::Started(p) => p.timestamp,
            TaskEvent::Succeeded(p) => p.timestamp,
            TaskEvent::Failed(p) => p.timestamp,
            TaskEvent::Retried(p) => p.timestamp,
            TaskEvent::Rejected(_) | TaskEvent::Revoked(_) => None,
        }
    }

    /// Broker timestamp converted to UTC wall-clock time.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestamp()?;
        DateTime::from_timestamp(ts.trunc() as i64, (ts.fract() * 1e9) as u32)
    }
}

fn payload<T: DeserializeOwned>(record: &Value) -> Result<T> {
    serde_json::from_value(record.clone())
        .map_err(|e| TaskError::Protocol(format!("malformed event payload: {e}")))
}
