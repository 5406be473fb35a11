//! ConveyorClient builder for fluent configuration

use std::sync::Arc;
use std::time::Duration;

use conveyor_core::{
    Credentials, HttpStatusSource, Result, StatusSource, TaskError, TaskSubmitter, WireSubmitter,
};

use crate::client::ConveyorClient;
use crate::config::ConveyorConfig;

/// Builder for creating [`ConveyorClient`] instances.
///
/// Example:
/// ```ignore
/// let client = ConveyorClient::builder()
///     .broker_addr("broker:5672")
///     .monitor_url("http://monitor:5555/api")
///     .credentials(Credentials::new("monitor", "secret"))
///     .build()
///     .await?;
/// ```
pub struct ConveyorClientBuilder {
    config: ConveyorConfig,
    credentials: Option<Credentials>,
    custom_submitter: Option<Arc<dyn TaskSubmitter>>,
    custom_status_source: Option<Arc<dyn StatusSource>>,
}

impl Default for ConveyorClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConveyorClientBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: ConveyorConfig::default(),
            credentials: None,
            custom_submitter: None,
            custom_status_source: None,
        }
    }

    /// Set the broker connection string (`host:port`).
    pub fn broker_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.broker_addr = Some(addr.into());
        self
    }

    /// Set the monitoring service base URL. The base may carry a path
    /// prefix (for example `http://monitor:5555/api`).
    pub fn monitor_url(mut self, url: impl Into<String>) -> Self {
        self.config.monitor_url = Some(url.into());
        self
    }

    /// Set basic-auth credentials for the monitoring service.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the default interval between status polls.
    ///
    /// Default: 2 seconds
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the result retention forwarded to the broker on submission.
    ///
    /// Default: 1 hour
    pub fn result_expires(mut self, ttl: Duration) -> Self {
        self.config.result_expires = ttl;
        self
    }

    /// Inject a custom submission transport.
    ///
    /// When set, `broker_addr` is ignored.
    pub fn custom_submitter(mut self, submitter: Arc<dyn TaskSubmitter>) -> Self {
        self.custom_submitter = Some(submitter);
        self
    }

    /// Inject a custom status source.
    ///
    /// When set, `monitor_url` and `credentials` are ignored.
    pub fn custom_status_source(mut self, source: Arc<dyn StatusSource>) -> Self {
        self.custom_status_source = Some(source);
        self
    }

    /// Build the [`ConveyorClient`], connecting to the broker when no
    /// custom submitter was injected.
    pub async fn build(self) -> Result<ConveyorClient> {
        self.config.validate()?;

        let submitter: Arc<dyn TaskSubmitter> = match self.custom_submitter {
            Some(submitter) => submitter,
            None => {
                let addr = self.config.broker_addr.as_deref().ok_or_else(|| {
                    TaskError::InvalidConfiguration(
                        "broker_addr is required without a custom submitter".to_string(),
                    )
                })?;
                Arc::new(WireSubmitter::connect(addr, self.config.result_expires).await?)
            }
        };

        let status: Arc<dyn StatusSource> = match self.custom_status_source {
            Some(source) => source,
            None => {
                let url = self.config.monitor_url.as_deref().ok_or_else(|| {
                    TaskError::InvalidConfiguration(
                        "monitor_url is required without a custom status source".to_string(),
                    )
                })?;
                let mut source = HttpStatusSource::new(url);
                if let Some(credentials) = self.credentials {
                    source = source.with_credentials(credentials);
                }
                Arc::new(source)
            }
        };

        Ok(ConveyorClient::from_parts(submitter, status, self.config))
    }
}
