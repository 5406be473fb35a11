//! Clients for the external boundaries of the system.
//!
//! The broker and the monitoring source are external collaborators; this
//! module defines the trait seams the rest of the client consumes
//! ([`TaskSubmitter`], [`StatusSource`], [`EventSource`]) together with the
//! shipped transports: HTTP+JSON for the monitoring source and the
//! line-framed broker protocol for submission and event subscription.

pub mod events;
pub mod resolver;
pub mod status;
pub mod submitter;
pub mod wire;

pub use events::EventSource;
pub use resolver::StatusResolver;
pub use status::{Credentials, HttpStatusSource, StatusSource, TaskInfo};
pub use submitter::TaskSubmitter;
pub use wire::{BrokerConnection, WireEventSource, WireSubmitter};
