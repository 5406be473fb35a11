//! Push boundary: subscription to the broker's live event channel.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A long-lived subscription yielding raw lifecycle event records.
///
/// One source is exclusively owned by one receiver; implementations must
/// not share a connection between consumers. `next` resolving to `Ok(None)`
/// means the peer closed the stream.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next raw event record.
    async fn next(&mut self) -> Result<Option<Value>>;

    /// Proactively ask the broker for a state snapshot.
    ///
    /// Default no-op for sources without snapshot support.
    async fn wakeup(&mut self) -> Result<()> {
        Ok(())
    }
}
