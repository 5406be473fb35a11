//! Subscribe to the broker's event channel and log every task lifecycle
//! transition until the stream goes quiet.

use std::time::Duration;

use conveyor_sdk::prelude::*;
use conveyor_sdk::WireEventSource;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let source = WireEventSource::connect("127.0.0.1:7050").await?;
    let receiver = EventReceiver::new(source, logging_handlers()).with_name("watcher");

    receiver
        .run(CaptureOptions::new().with_timeout(Duration::from_secs(30)))
        .await
}
