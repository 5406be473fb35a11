//! Submit a task and wait for its outcome.
//!
//! Expects a broker on 127.0.0.1:7050 and the monitoring service on
//! 127.0.0.1:5555.

use std::time::Duration;

use serde_json::{json, Map};

use conveyor_sdk::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let client = ConveyorClient::builder()
        .broker_addr("127.0.0.1:7050")
        .monitor_url("http://127.0.0.1:5555/api")
        .credentials(Credentials::new("monitor", "monitor"))
        .build()
        .await?;

    let mut kwargs = Map::new();
    kwargs.insert("d".to_string(), json!("que"));
    kwargs.insert("e".to_string(), json!("tal?"));

    let task_id = client
        .submit(
            "demo.short_task",
            vec![json!("hola"), json!("buenas"), json!("tardes")],
            kwargs,
        )
        .await?;

    let result = client
        .await_result(&task_id, Duration::from_secs(2), Some(Duration::from_secs(60)))
        .await?;

    println!("task {task_id} finished: {result}");
    Ok(())
}
