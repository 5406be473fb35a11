//! Long-lived consumption of the broker's event channel.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use conveyor_core::event::TaskEvent;
use conveyor_core::{EventSource, Result, TaskError};

use crate::events::EventHandlers;

/// Options controlling one capture run of an [`EventReceiver`].
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Stop after this many dispatched events. Unbounded if unset.
    pub limit: Option<usize>,
    /// Stop after this much idle time between events, not a cap on total
    /// runtime. Unbounded if unset.
    pub timeout: Option<Duration>,
    /// Whether to request a state snapshot from the broker on start.
    pub wakeup: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            limit: None,
            timeout: None,
            wakeup: true,
        }
    }
}

impl CaptureOptions {
    /// Create options with all defaults (unbounded capture, wakeup on).
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after `limit` dispatched events.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Stop after `timeout` of idle time between events.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable or disable the initial snapshot request.
    pub fn with_wakeup(mut self, wakeup: bool) -> Self {
        self.wakeup = wakeup;
        self
    }
}

/// Consumes one event subscription and dispatches each decoded event to the
/// handler registered for its kind.
///
/// A receiver exclusively owns its [`EventSource`]; running many receivers
/// means one connection each, with nothing shared between them. Failures in
/// one receiver never cascade into another.
pub struct EventReceiver {
    source: Box<dyn EventSource>,
    handlers: EventHandlers,
    name: String,
}

impl EventReceiver {
    /// Create a receiver over `source` dispatching to `handlers`.
    pub fn new(source: impl EventSource + 'static, handlers: EventHandlers) -> Self {
        Self {
            source: Box::new(source),
            handlers,
            name: "EventReceiver".to_string(),
        }
    }

    /// Name used in logs and failure reports.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The receiver's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume the subscription on the calling task, blocking it until the
    /// capture stops.
    ///
    /// Returns `Ok(())` when `capture.limit` events were dispatched or the
    /// idle `capture.timeout` elapsed. Connection loss surfaces as
    /// [`TaskError::Connection`]; there is no automatic reconnect here;
    /// reconnect policy belongs to the caller.
    pub async fn run(mut self, capture: CaptureOptions) -> Result<()> {
        if capture.wakeup {
            self.source.wakeup().await?;
        }
        info!(receiver = %self.name, "capturing task events");

        let mut dispatched: usize = 0;
        loop {
            if let Some(limit) = capture.limit {
                if dispatched >= limit {
                    debug!(receiver = %self.name, dispatched, "capture limit reached");
                    return Ok(());
                }
            }

            let next = match capture.timeout {
                Some(idle) => match tokio::time::timeout(idle, self.source.next()).await {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(receiver = %self.name, dispatched, "idle timeout reached");
                        return Ok(());
                    }
                },
                None => self.source.next().await,
            };

            let record = next?.ok_or_else(|| {
                TaskError::Connection(format!("event stream closed for receiver '{}'", self.name))
            })?;

            if let Some(event) = TaskEvent::decode(&record)? {
                dispatched += 1;
                self.handlers.dispatch(event);
            }
        }
    }

    /// Run the receiver on an independently-owned background task.
    ///
    /// The caller's context is never blocked and never sees a failure
    /// thrown back into its control flow: errors inside the background task
    /// are logged through the error sink and stored for
    /// [`ReceiverHandle::join`]. The receiver keeps running until
    /// `capture.limit`/`capture.timeout` is hit or the handle aborts it.
    pub fn spawn(self, capture: CaptureOptions) -> ReceiverHandle {
        let name = self.name.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            match self.run(capture).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    error!(receiver = %task_name, error = %e, "background receiver stopped with error");
                    Err(e)
                }
            }
        });
        ReceiverHandle { name, handle }
    }
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("name", &self.name)
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Handle for a receiver running in the background.
pub struct ReceiverHandle {
    name: String,
    handle: JoinHandle<Result<()>>,
}

impl ReceiverHandle {
    /// The receiver's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the background task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the receiver immediately.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the receiver to stop and return its outcome.
    ///
    /// An aborted receiver counts as a clean stop.
    pub async fn join(self) -> Result<()> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(TaskError::Other(format!(
                "receiver '{}' aborted unexpectedly: {e}",
                self.name
            ))),
        }
    }
}

/// Run many receivers concurrently and return once **all** have stopped.
///
/// Fan-out/fan-in barrier: each receiver owns its connection and its own
/// failure domain, so one failing does not terminate the others early. The
/// result vector surfaces every outcome positionally, partial failures
/// included; what to do about them is the caller's policy.
pub async fn run_many(
    receivers: impl IntoIterator<Item = (EventReceiver, CaptureOptions)>,
) -> Vec<Result<()>> {
    let runs: Vec<_> = receivers
        .into_iter()
        .map(|(receiver, capture)| receiver.run(capture))
        .collect();
    join_all(runs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventHandlers;
    use crate::testing::{records, ChannelEventSource};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_handlers(counter: Arc<AtomicUsize>) -> EventHandlers {
        EventHandlers::new()
            .on_started({
                let counter = counter.clone();
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_succeeded(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
    }

    #[tokio::test]
    async fn test_run_stops_at_limit() {
        let (feed, source) = ChannelEventSource::pair();
        feed.push(records::started("t1", "w1", 1.0, "10"));
        feed.push(records::succeeded("t1", &json!("ok"), 0.5));
        feed.push(records::started("t2", "w1", 2.0, "11"));

        let counter = Arc::new(AtomicUsize::new(0));
        let receiver = EventReceiver::new(source, counting_handlers(counter.clone()));
        receiver
            .run(CaptureOptions::new().with_limit(2))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_idle_timeout() {
        let (feed, source) = ChannelEventSource::pair();
        feed.push(records::started("t1", "w1", 1.0, "10"));

        let counter = Arc::new(AtomicUsize::new(0));
        let receiver = EventReceiver::new(source, counting_handlers(counter.clone()));
        receiver
            .run(
                CaptureOptions::new()
                    .with_limit(10)
                    .with_timeout(Duration::from_millis(200)),
            )
            .await
            .unwrap();

        // One event arrived, then the stream went quiet.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        drop(feed);
    }

    #[tokio::test]
    async fn test_closed_stream_is_a_connection_error() {
        let (feed, source) = ChannelEventSource::pair();
        drop(feed);

        let receiver = EventReceiver::new(source, EventHandlers::new()).with_name("closed");
        let err = receiver.run(CaptureOptions::new()).await.unwrap_err();
        match err {
            TaskError::Connection(message) => assert!(message.contains("closed")),
            other => panic!("expected Connection, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_kind_does_not_affect_subsequent_delivery() {
        let (feed, source) = ChannelEventSource::pair();
        feed.push(json!({ "type": "task-migrated", "uuid": "t1" }));
        feed.push(records::started("t1", "w1", 1.0, "10"));

        let counter = Arc::new(AtomicUsize::new(0));
        let receiver = EventReceiver::new(source, counting_handlers(counter.clone()));
        receiver
            .run(CaptureOptions::new().with_limit(1))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_known_kind_surfaces_as_protocol_error() {
        let (feed, source) = ChannelEventSource::pair();
        feed.push(json!({ "type": "task-started" }));

        let receiver = EventReceiver::new(source, EventHandlers::new());
        let err = receiver.run(CaptureOptions::new()).await.unwrap_err();
        assert!(matches!(err, TaskError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_events_without_handler_are_dropped_silently() {
        let (feed, source) = ChannelEventSource::pair();
        feed.push(records::retried("t1", "ValueError('x')"));
        feed.push(records::started("t1", "w1", 1.0, "10"));

        let counter = Arc::new(AtomicUsize::new(0));
        let receiver = EventReceiver::new(source, counting_handlers(counter.clone()));
        // Both events count toward the limit; only the started one has a
        // handler registered.
        receiver
            .run(CaptureOptions::new().with_limit(2))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_reports_failure_through_join() {
        let (feed, source) = ChannelEventSource::pair();
        feed.fail(TaskError::Connection("subscription lost".to_string()));

        let handle = EventReceiver::new(source, EventHandlers::new())
            .with_name("doomed")
            .spawn(CaptureOptions::new());

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, TaskError::Connection(_)));
    }

    #[tokio::test]
    async fn test_spawn_runs_to_limit_in_background() {
        let (feed, source) = ChannelEventSource::pair();

        let counter = Arc::new(AtomicUsize::new(0));
        let handle = EventReceiver::new(source, counting_handlers(counter.clone()))
            .with_name("background")
            .spawn(CaptureOptions::new().with_limit(2));

        feed.push(records::started("t1", "w1", 1.0, "10"));
        feed.push(records::succeeded("t1", &json!("ok"), 0.5));

        handle.join().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abort_counts_as_clean_stop() {
        let (feed, source) = ChannelEventSource::pair();
        let handle =
            EventReceiver::new(source, EventHandlers::new()).spawn(CaptureOptions::new());
        handle.abort();
        handle.join().await.unwrap();
        drop(feed);
    }

    #[tokio::test]
    async fn test_run_many_isolates_failures() {
        let (feed_a, source_a) = ChannelEventSource::pair();
        let (feed_b, source_b) = ChannelEventSource::pair();
        let (feed_c, source_c) = ChannelEventSource::pair();

        feed_a.push(records::started("t1", "w1", 1.0, "10"));
        feed_b.fail(TaskError::Connection("subscription lost".to_string()));
        feed_c.push(records::succeeded("t2", &json!("ok"), 0.5));

        let counter = Arc::new(AtomicUsize::new(0));
        let outcomes = run_many([
            (
                EventReceiver::new(source_a, counting_handlers(counter.clone())).with_name("a"),
                CaptureOptions::new().with_limit(1),
            ),
            (
                EventReceiver::new(source_b, EventHandlers::new()).with_name("b"),
                CaptureOptions::new(),
            ),
            (
                EventReceiver::new(source_c, counting_handlers(counter.clone())).with_name("c"),
                CaptureOptions::new().with_limit(1),
            ),
        ])
        .await;

        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(TaskError::Connection(_))));
        assert!(outcomes[2].is_ok());
        // The healthy receivers ran to completion despite the failure.
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wakeup_is_requested_when_enabled() {
        struct RecordingSource {
            wakeups: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl EventSource for RecordingSource {
            async fn next(&mut self) -> Result<Option<Value>> {
                Ok(None)
            }

            async fn wakeup(&mut self) -> Result<()> {
                self.wakeups.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let wakeups = Arc::new(AtomicUsize::new(0));
        let receiver = EventReceiver::new(
            RecordingSource {
                wakeups: wakeups.clone(),
            },
            EventHandlers::new(),
        );
        // The stream closes immediately; only the wakeup matters here.
        let _ = receiver.run(CaptureOptions::new()).await;
        assert_eq!(wakeups.load(Ordering::SeqCst), 1);

        let wakeups_off = Arc::new(AtomicUsize::new(0));
        let receiver = EventReceiver::new(
            RecordingSource {
                wakeups: wakeups_off.clone(),
            },
            EventHandlers::new(),
        );
        let _ = receiver.run(CaptureOptions::new().with_wakeup(false)).await;
        assert_eq!(wakeups_off.load(Ordering::SeqCst), 0);
    }
}
