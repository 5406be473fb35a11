//! Conveyor SDK for Rust
//!
//! High-level client for the Conveyor task execution platform: submit named
//! tasks to the broker, await their terminal outcome through the monitoring
//! source, and observe the live lifecycle event stream.
//!
//! The pull view (status polling) and the push view (event dispatch) are
//! independent components joined only by the shared task identifier and
//! state vocabulary from `conveyor-core`; they can be used together or on
//! their own.

pub mod client;
pub mod config;
pub mod events;
pub mod testing;

// Re-export the core vocabulary
pub use conveyor_core::{
    BrokerConnection, Credentials, EventKind, EventSource, HttpStatusSource, Result,
    StatusResolver, StatusSource, TaskError, TaskEvent, TaskId, TaskInfo, TaskState, TaskSubmitter,
    WireEventSource, WireSubmitter,
};

// Re-export client types
pub use client::{ConveyorClient, ConveyorClientBuilder};
pub use config::ConveyorConfig;

// Re-export event dispatch types
pub use events::{
    logging_handlers, run_many, CaptureOptions, EventHandlers, EventReceiver, ReceiverHandle,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::{ConveyorClient, ConveyorClientBuilder};
    pub use crate::config::ConveyorConfig;
    pub use crate::events::{
        logging_handlers, run_many, CaptureOptions, EventHandlers, EventReceiver, ReceiverHandle,
    };
    pub use conveyor_core::{
        Credentials, EventKind, EventSource, Result, StatusResolver, StatusSource, TaskError,
        TaskEvent, TaskId, TaskInfo, TaskState, TaskSubmitter,
    };
    pub use serde_json::{json, Map, Value};
}
