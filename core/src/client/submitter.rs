//! Submission boundary to the broker.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::task::TaskId;

/// Dispatches named units of work to the broker.
///
/// Implementations package the call and return the identifier the broker
/// assigns; nothing else is this boundary's responsibility. A submission
/// failure is fatal to that attempt and surfaces as
/// [`TaskError::Submission`](crate::error::TaskError::Submission); there
/// are no retries here.
#[async_trait]
pub trait TaskSubmitter: Send + Sync {
    /// Submit `name` with positional and keyword arguments, returning the
    /// assigned task identifier.
    async fn submit(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<TaskId>;
}
