//! Client configuration.

use std::time::Duration;

use conveyor_core::{Result, TaskError};

/// Process-wide inputs for the Conveyor client.
///
/// The values are supplied by the embedding application's configuration
/// loader; the client carries them opaquely. `result_expires` is forwarded
/// to the broker on submission so it knows how long to retain results.
#[derive(Debug, Clone)]
pub struct ConveyorConfig {
    /// Broker connection string (`host:port`).
    pub broker_addr: Option<String>,
    /// Base URL of the monitoring service, optionally with a path prefix.
    pub monitor_url: Option<String>,
    /// Default interval between status polls in `submit_and_wait`.
    pub poll_interval: Duration,
    /// Result retention forwarded to the broker on submission.
    pub result_expires: Duration,
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            broker_addr: None,
            monitor_url: None,
            poll_interval: Duration::from_secs(2),
            result_expires: Duration::from_secs(3600),
        }
    }
}

impl ConveyorConfig {
    /// Check the configuration for values that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(TaskError::InvalidConfiguration(
                "poll_interval must be positive".to_string(),
            ));
        }
        if self.result_expires.is_zero() {
            return Err(TaskError::InvalidConfiguration(
                "result_expires must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
