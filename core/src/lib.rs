//! # Conveyor Core
//!
//! Language-agnostic building blocks for the Conveyor task execution
//! platform: submit named tasks to an external broker, resolve their
//! terminal outcome through a polling-only monitoring source, and decode
//! the broker's live lifecycle event stream.
//!
//! ## What's in Core vs SDK
//!
//! **Core** contains the pieces any client needs, with no polling
//! coordination:
//! - Task identifier and state vocabulary (with terminal-state
//!   classification shared by the pull and push views)
//! - The lifecycle event model and its lenient decoder
//! - The error taxonomy
//! - Trait seams for the external boundaries (submission, status, events)
//! - The shipped transports: HTTP+JSON for the monitoring source, the
//!   line-framed broker protocol for submission and event subscription
//! - The status resolution policy
//!
//! **SDK** contains the high-level client: configuration and builder, the
//! polling driver, the event receiver with its handler table, and testing
//! utilities.

pub mod client;
pub mod error;
pub mod event;
pub mod task;

// Re-export error types
pub use error::{Result, TaskError};

// Re-export task vocabulary
pub use task::{TaskId, TaskState};

// Re-export event model
pub use event::{
    EventKind, TaskEvent, TaskFailed, TaskReceived, TaskRejected, TaskRetried, TaskRevoked,
    TaskSent, TaskStarted, TaskSucceeded,
};

// Re-export client boundaries and transports
pub use client::{
    BrokerConnection, Credentials, EventSource, HttpStatusSource, StatusResolver, StatusSource,
    TaskInfo, TaskSubmitter, WireEventSource, WireSubmitter,
};
