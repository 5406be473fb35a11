//! Testing utilities: scripted status sources, in-memory submitters, and
//! channel-backed event sources for driving the client without a broker.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use conveyor_core::{
    EventSource, Result, StatusSource, TaskError, TaskId, TaskInfo, TaskState, TaskSubmitter,
};

enum Step {
    Info(TaskInfo),
    Transport { status: Option<u16>, message: String },
}

/// Scripted [`StatusSource`].
///
/// Answers `task_info` with the pushed steps in order; the last step repeats
/// once the script is exhausted. Revocations are recorded, never forwarded.
///
/// # Example
///
/// ```ignore
/// let source = MockStatusSource::new()
///     .push_state(TaskState::Started)
///     .push_success(&json!("Finished"));
/// ```
#[derive(Default)]
pub struct MockStatusSource {
    steps: Vec<Step>,
    calls: AtomicUsize,
    revocations: Mutex<Vec<(TaskId, bool)>>,
}

impl MockStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer one poll with `state` and no result payload.
    pub fn push_state(mut self, state: TaskState) -> Self {
        self.steps.push(Step::Info(TaskInfo {
            state: state.as_str().to_string(),
            ..TaskInfo::default()
        }));
        self
    }

    /// Answer one poll with a raw state label, bypassing the known set.
    pub fn push_raw_state(mut self, state: &str) -> Self {
        self.steps.push(Step::Info(TaskInfo {
            state: state.to_string(),
            ..TaskInfo::default()
        }));
        self
    }

    /// Answer one poll with SUCCESS and the literal-encoded `result`.
    pub fn push_success(mut self, result: &Value) -> Self {
        self.steps.push(Step::Info(TaskInfo {
            state: TaskState::Success.as_str().to_string(),
            result: Some(result.to_string()),
            ..TaskInfo::default()
        }));
        self
    }

    /// Answer one poll with FAILURE carrying `error` as the remote text.
    pub fn push_failure(mut self, error: &str) -> Self {
        self.steps.push(Step::Info(TaskInfo {
            state: TaskState::Failure.as_str().to_string(),
            result: Some(error.to_string()),
            ..TaskInfo::default()
        }));
        self
    }

    /// Answer one poll with a full status record.
    pub fn push_info(mut self, info: TaskInfo) -> Self {
        self.steps.push(Step::Info(info));
        self
    }

    /// Fail one poll with a transport error.
    pub fn push_transport_error(mut self, status: u16, message: &str) -> Self {
        self.steps.push(Step::Transport {
            status: Some(status),
            message: message.to_string(),
        });
        self
    }

    /// Number of `task_info` calls answered so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Revocation requests received, in order.
    pub fn revocations(&self) -> Vec<(TaskId, bool)> {
        self.revocations.lock().clone()
    }
}

#[async_trait]
impl StatusSource for MockStatusSource {
    async fn task_info(&self, _task_id: &TaskId) -> Result<TaskInfo> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(
            !self.steps.is_empty(),
            "MockStatusSource polled but no responses were scripted"
        );
        let step = &self.steps[call.min(self.steps.len() - 1)];
        match step {
            Step::Info(info) => Ok(info.clone()),
            Step::Transport { status, message } => Err(TaskError::Transport {
                status: *status,
                message: message.clone(),
            }),
        }
    }

    async fn revoke(&self, task_id: &TaskId, terminate: bool) -> Result<()> {
        self.revocations.lock().push((task_id.clone(), terminate));
        Ok(())
    }
}

/// One submission recorded by a [`MockSubmitter`].
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub name: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub task_id: TaskId,
}

/// In-memory [`TaskSubmitter`] that records submissions and assigns fresh
/// identifiers, or rejects everything when built with
/// [`rejecting`](MockSubmitter::rejecting).
#[derive(Default)]
pub struct MockSubmitter {
    submissions: Mutex<Vec<RecordedSubmission>>,
    reject_with: Option<String>,
}

impl MockSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A submitter that fails every submission with `error`.
    pub fn rejecting(error: &str) -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            reject_with: Some(error.to_string()),
        }
    }

    /// Submissions accepted so far, in order.
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl TaskSubmitter for MockSubmitter {
    async fn submit(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<TaskId> {
        if let Some(error) = &self.reject_with {
            return Err(TaskError::Submission(error.clone()));
        }
        let task_id = TaskId::new(Uuid::new_v4().to_string());
        self.submissions.lock().push(RecordedSubmission {
            name: name.to_string(),
            args,
            kwargs,
            task_id: task_id.clone(),
        });
        Ok(task_id)
    }
}

/// Feeding side of a [`ChannelEventSource`].
///
/// Dropping every clone closes the stream, which a receiver reports as a
/// connection loss.
#[derive(Clone)]
pub struct EventFeed {
    tx: mpsc::UnboundedSender<Result<Value>>,
}

impl EventFeed {
    /// Queue one raw event record.
    pub fn push(&self, record: Value) {
        let _ = self.tx.send(Ok(record));
    }

    /// Queue a failure the source will surface from `next`.
    pub fn fail(&self, error: TaskError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Channel-backed [`EventSource`] for driving receivers in tests.
pub struct ChannelEventSource {
    rx: mpsc::UnboundedReceiver<Result<Value>>,
}

impl ChannelEventSource {
    /// Create a connected feed/source pair.
    pub fn pair() -> (EventFeed, ChannelEventSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventFeed { tx }, ChannelEventSource { rx })
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next(&mut self) -> Result<Option<Value>> {
        match self.rx.recv().await {
            None => Ok(None),
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(error)) => Err(error),
        }
    }
}

/// Minimal raw event records for the eight lifecycle kinds.
pub mod records {
    use serde_json::{json, Value};

    pub fn sent(uuid: &str, name: &str, queue: &str) -> Value {
        json!({ "type": "task-sent", "uuid": uuid, "name": name, "queue": queue })
    }

    pub fn received(uuid: &str, name: &str, hostname: &str) -> Value {
        json!({ "type": "task-received", "uuid": uuid, "name": name, "hostname": hostname })
    }

    pub fn started(uuid: &str, hostname: &str, timestamp: f64, pid: &str) -> Value {
        json!({
            "type": "task-started",
            "uuid": uuid,
            "hostname": hostname,
            "timestamp": timestamp,
            "pid": pid
        })
    }

    pub fn succeeded(uuid: &str, result: &Value, runtime: f64) -> Value {
        json!({
            "type": "task-succeeded",
            "uuid": uuid,
            "result": result.to_string(),
            "runtime": runtime
        })
    }

    pub fn failed(uuid: &str, exception: &str) -> Value {
        json!({ "type": "task-failed", "uuid": uuid, "exception": exception })
    }

    pub fn rejected(uuid: &str, requeue: bool) -> Value {
        json!({ "type": "task-rejected", "uuid": uuid, "requeue": requeue })
    }

    pub fn retried(uuid: &str, exception: &str) -> Value {
        json!({ "type": "task-retried", "uuid": uuid, "exception": exception })
    }

    pub fn revoked(uuid: &str, terminated: bool) -> Value {
        json!({ "type": "task-revoked", "uuid": uuid, "terminated": terminated })
    }
}
