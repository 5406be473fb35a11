//! Line-framed JSON transport for the broker boundary.
//!
//! The broker speaks newline-delimited JSON over a byte stream. A connection
//! is used either for request/reply submission or as a dedicated event
//! subscription; the two are never multiplexed on one socket. The framing is
//! generic over the underlying stream so tests can drive it through
//! in-memory duplex pipes.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;
use uuid::Uuid;

use crate::client::events::EventSource;
use crate::client::submitter::TaskSubmitter;
use crate::error::{Result, TaskError};
use crate::task::TaskId;

/// A single framed connection to the broker.
pub struct BrokerConnection<S = TcpStream> {
    framed: Framed<S, LinesCodec>,
}

impl BrokerConnection<TcpStream> {
    /// Open a TCP connection to the broker at `addr` (`host:port`).
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TaskError::Connection(format!("broker {addr} unreachable: {e}")))?;
        Ok(Self::from_stream(stream))
    }
}

impl<S> BrokerConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an established byte stream.
    pub fn from_stream(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, LinesCodec::new()),
        }
    }

    /// Send one JSON record as a line.
    pub async fn send(&mut self, record: &Value) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.framed
            .send(line)
            .await
            .map_err(|e| TaskError::Connection(e.to_string()))
    }

    /// Read the next JSON record; `None` once the peer closed the stream.
    pub async fn next(&mut self) -> Result<Option<Value>> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(TaskError::Connection(e.to_string())),
            Some(Ok(line)) => serde_json::from_str(&line)
                .map(Some)
                .map_err(|e| TaskError::Protocol(format!("broker sent a non-JSON frame: {e}"))),
        }
    }
}

/// [`TaskSubmitter`] over a broker connection.
///
/// Submissions are request/reply: one `submit` envelope out, one
/// acknowledgement back. The candidate task id is generated client side;
/// the id in the broker's acknowledgement is authoritative.
pub struct WireSubmitter<S = TcpStream> {
    conn: Mutex<BrokerConnection<S>>,
    result_expires: Duration,
}

impl WireSubmitter<TcpStream> {
    /// Connect to the broker at `addr`.
    pub async fn connect(addr: &str, result_expires: Duration) -> Result<Self> {
        Ok(Self::new(
            BrokerConnection::connect(addr).await?,
            result_expires,
        ))
    }
}

impl<S> WireSubmitter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an established broker connection.
    pub fn new(conn: BrokerConnection<S>, result_expires: Duration) -> Self {
        Self {
            conn: Mutex::new(conn),
            result_expires,
        }
    }
}

#[async_trait]
impl<S> TaskSubmitter for WireSubmitter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn submit(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<TaskId> {
        let envelope = json!({
            "op": "submit",
            "id": Uuid::new_v4().to_string(),
            "name": name,
            "args": args,
            "kwargs": kwargs,
            "result_expires": self.result_expires.as_secs(),
        });

        let mut conn = self.conn.lock().await;
        conn.send(&envelope)
            .await
            .map_err(|e| TaskError::Submission(e.to_string()))?;
        let reply = conn
            .next()
            .await
            .map_err(|e| TaskError::Submission(e.to_string()))?
            .ok_or_else(|| {
                TaskError::Submission("broker closed the connection before acknowledging".to_string())
            })?;

        if reply.get("ok").and_then(Value::as_bool) == Some(true) {
            let id = reply.get("id").and_then(Value::as_str).ok_or_else(|| {
                TaskError::Protocol("submission acknowledgement carries no id".to_string())
            })?;
            debug!(task_id = id, task = name, "task accepted by broker");
            Ok(TaskId::new(id))
        } else {
            let error = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unspecified broker error");
            Err(TaskError::Submission(error.to_string()))
        }
    }
}

/// [`EventSource`] over a dedicated broker connection.
pub struct WireEventSource<S = TcpStream> {
    conn: BrokerConnection<S>,
}

impl WireEventSource<TcpStream> {
    /// Connect to the broker at `addr` and subscribe to the event channel.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::subscribe(BrokerConnection::connect(addr).await?).await
    }
}

impl<S> WireEventSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Subscribe on an established connection.
    pub async fn subscribe(mut conn: BrokerConnection<S>) -> Result<Self> {
        conn.send(&json!({ "op": "subscribe" })).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl<S> EventSource for WireEventSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn next(&mut self) -> Result<Option<Value>> {
        self.conn.next().await
    }

    async fn wakeup(&mut self) -> Result<()> {
        self.conn.send(&json!({ "op": "wakeup" })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_submit_round_trip() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let submitter = WireSubmitter::new(
            BrokerConnection::from_stream(client_io),
            Duration::from_secs(3600),
        );

        let server = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server_io);
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let envelope: Value = serde_json::from_str(line.trim()).unwrap();
            assert_eq!(envelope["op"], "submit");
            assert_eq!(envelope["name"], "demo.add");
            assert_eq!(envelope["args"], json!([1, 2]));
            assert_eq!(envelope["result_expires"], 3600);
            assert!(envelope["id"].as_str().is_some());
            write
                .write_all(b"{\"ok\":true,\"id\":\"task-1\"}\n")
                .await
                .unwrap();
        });

        let id = submitter
            .submit("demo.add", vec![json!(1), json!(2)], Map::new())
            .await
            .unwrap();
        assert_eq!(id.as_str(), "task-1");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_submission_is_a_submission_error() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let submitter = WireSubmitter::new(
            BrokerConnection::from_stream(client_io),
            Duration::from_secs(3600),
        );

        let server = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server_io);
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write
                .write_all(b"{\"ok\":false,\"error\":\"queue full\"}\n")
                .await
                .unwrap();
        });

        let err = submitter
            .submit("demo.add", vec![], Map::new())
            .await
            .unwrap_err();
        match err {
            TaskError::Submission(message) => assert_eq!(message, "queue full"),
            other => panic!("expected Submission, got {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_event_subscription_yields_records_until_close() {
        let (client_io, server_io) = tokio::io::duplex(4096);

        let server = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server_io);
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let handshake: Value = serde_json::from_str(line.trim()).unwrap();
            assert_eq!(handshake["op"], "subscribe");
            write
                .write_all(b"{\"type\":\"task-started\",\"uuid\":\"abc\"}\n")
                .await
                .unwrap();
            write
                .write_all(b"{\"type\":\"task-succeeded\",\"uuid\":\"abc\"}\n")
                .await
                .unwrap();
            // Dropping both halves closes the stream.
        });

        let mut source = WireEventSource::subscribe(BrokerConnection::from_stream(client_io))
            .await
            .unwrap();
        let first = source.next().await.unwrap().unwrap();
        assert_eq!(first["type"], "task-started");
        let second = source.next().await.unwrap().unwrap();
        assert_eq!(second["type"], "task-succeeded");
        assert!(source.next().await.unwrap().is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_wakeup_sends_snapshot_request() {
        let (client_io, server_io) = tokio::io::duplex(4096);

        let server = tokio::spawn(async move {
            let (read, _write) = tokio::io::split(server_io);
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            line.clear();
            reader.read_line(&mut line).await.unwrap();
            let wakeup: Value = serde_json::from_str(line.trim()).unwrap();
            assert_eq!(wakeup["op"], "wakeup");
        });

        let mut source = WireEventSource::subscribe(BrokerConnection::from_stream(client_io))
            .await
            .unwrap();
        source.wakeup().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_json_frame_is_a_protocol_error() {
        let (client_io, server_io) = tokio::io::duplex(4096);

        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server_io);
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write.write_all(b"not json\n").await.unwrap();
        });

        let mut source = WireEventSource::subscribe(BrokerConnection::from_stream(client_io))
            .await
            .unwrap();
        let err = source.next().await.unwrap_err();
        assert!(matches!(err, TaskError::Protocol(_)));
    }
}
