//! ConveyorClient - main entry point for the Conveyor SDK
//!
//! The client joins the two independent views of a task: submission plus
//! pull-based status polling here, and the push-based event stream in
//! [`crate::events`]. The views share only the task identifier and state
//! vocabulary; neither depends on the other's retry or dispatch logic.

pub mod builder;

pub use builder::ConveyorClientBuilder;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use conveyor_core::{
    Result, StatusResolver, StatusSource, TaskError, TaskId, TaskState, TaskSubmitter,
};

use crate::config::ConveyorConfig;

/// Main client for submitting tasks and awaiting their outcome.
///
/// Any number of `await_result` flows may run concurrently, one per task
/// identifier; they share no mutable state and each is safe to cancel
/// individually.
pub struct ConveyorClient {
    submitter: Arc<dyn TaskSubmitter>,
    status: Arc<dyn StatusSource>,
    resolver: StatusResolver,
    config: ConveyorConfig,
}

impl std::fmt::Debug for ConveyorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConveyorClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConveyorClient {
    /// Create a new builder for `ConveyorClient`.
    pub fn builder() -> ConveyorClientBuilder {
        ConveyorClientBuilder::new()
    }

    pub(crate) fn from_parts(
        submitter: Arc<dyn TaskSubmitter>,
        status: Arc<dyn StatusSource>,
        config: ConveyorConfig,
    ) -> Self {
        let resolver = StatusResolver::new(Arc::clone(&status));
        Self {
            submitter,
            status,
            resolver,
            config,
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ConveyorConfig {
        &self.config
    }

    /// Submit a named task with positional and keyword arguments.
    ///
    /// Delegates entirely to the broker; a failure is fatal to this attempt
    /// and surfaces immediately as [`TaskError::Submission`].
    pub async fn submit(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<TaskId> {
        let task_id = self.submitter.submit(name, args, kwargs).await?;
        info!(task = name, task_id = %task_id, "task submitted");
        Ok(task_id)
    }

    /// Resolve the task's outcome with a single status query.
    ///
    /// See [`StatusResolver::resolve`] for the full policy; in particular
    /// [`TaskError::NotFinished`] means "try again later" and is the only
    /// error [`await_result`](Self::await_result) retries on.
    pub async fn resolve(&self, task_id: &TaskId) -> Result<Value> {
        self.resolver.resolve(task_id).await
    }

    /// Poll until the task reaches a terminal outcome.
    ///
    /// Suspends for `poll_interval` between attempts. `timeout` is a hard
    /// wall-clock budget measured from the first poll; when it elapses while
    /// the task is still unfinished the call fails with
    /// [`TaskError::Timeout`]. Every error other than
    /// [`TaskError::NotFinished`] propagates immediately without further
    /// polling. This loop is the only place retry logic lives.
    pub async fn await_result(
        &self,
        task_id: &TaskId,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let started = Instant::now();
        loop {
            match self.resolver.resolve(task_id).await {
                Err(TaskError::NotFinished { .. }) => {
                    let elapsed = started.elapsed();
                    if let Some(budget) = timeout {
                        if elapsed >= budget {
                            warn!(task_id = %task_id, ?elapsed, "gave up waiting for task");
                            return Err(TaskError::Timeout {
                                task_id: task_id.clone(),
                                elapsed,
                            });
                        }
                    }
                    debug!(task_id = %task_id, "task not finished yet, polling again");
                    sleep(poll_interval).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Submit a task and wait for its outcome with the configured default
    /// poll interval.
    pub async fn submit_and_wait(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let task_id = self.submit(name, args, kwargs).await?;
        self.await_result(&task_id, self.config.poll_interval, timeout)
            .await
    }

    /// Revoke a task that has not been picked up yet.
    ///
    /// Checks the pull view first: a task that already started, finished,
    /// or was revoked cannot be revoked again, and the call returns
    /// `Ok(false)` without touching the backend. Returns `Ok(true)` after a
    /// successful revocation request.
    pub async fn revoke(&self, task_id: &TaskId, terminate: bool) -> Result<bool> {
        let info = self.status.task_info(task_id).await?;
        let state: TaskState = info.state.parse()?;
        if !state.can_revoke() {
            debug!(task_id = %task_id, state = %state, "revocation skipped");
            return Ok(false);
        }
        self.status.revoke(task_id, terminate).await?;
        info!(task_id = %task_id, terminate, "task revocation requested");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockStatusSource, MockSubmitter};
    use serde_json::json;

    fn client_with_status(status: Arc<MockStatusSource>) -> ConveyorClient {
        ConveyorClient::from_parts(
            Arc::new(MockSubmitter::new()),
            status,
            ConveyorConfig::default(),
        )
    }

    fn task_id() -> TaskId {
        TaskId::new("abc")
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_result_polls_until_success() {
        let status = Arc::new(
            MockStatusSource::new()
                .push_state(TaskState::Started)
                .push_state(TaskState::Started)
                .push_success(&json!("Finished")),
        );
        let client = client_with_status(status.clone());

        let result = client
            .await_result(&task_id(), Duration::from_secs(2), None)
            .await
            .unwrap();

        assert_eq!(result, json!("Finished"));
        assert_eq!(status.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_result_stops_on_first_revoked_poll() {
        let status = Arc::new(MockStatusSource::new().push_state(TaskState::Revoked));
        let client = client_with_status(status.clone());

        let err = client
            .await_result(&task_id(), Duration::from_secs(2), None)
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Revoked { .. }));
        assert_eq!(status.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_result_times_out_while_unfinished() {
        let status = Arc::new(MockStatusSource::new().push_state(TaskState::Pending));
        let client = client_with_status(status.clone());

        let err = client
            .await_result(
                &task_id(),
                Duration::from_secs(2),
                Some(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();

        match err {
            TaskError::Timeout { elapsed, .. } => assert!(elapsed >= Duration::from_secs(5)),
            other => panic!("expected Timeout, got {other}"),
        }
        // Polls at t=0s, 2s, 4s, and 6s; the budget expires on the last one.
        assert_eq!(status.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_result_propagates_transport_errors_without_retry() {
        let status = Arc::new(MockStatusSource::new().push_transport_error(503, "down"));
        let client = client_with_status(status.clone());

        let err = client
            .await_result(&task_id(), Duration::from_secs(2), None)
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Transport { .. }));
        assert_eq!(status.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_result_propagates_task_failure() {
        let status = Arc::new(
            MockStatusSource::new()
                .push_state(TaskState::Started)
                .push_failure("ValueError('bad input')"),
        );
        let client = client_with_status(status.clone());

        let err = client
            .await_result(&task_id(), Duration::from_secs(2), None)
            .await
            .unwrap_err();

        assert!(err.is_terminal_outcome());
        assert_eq!(status.calls(), 2);
    }

    #[tokio::test]
    async fn test_submit_returns_broker_assigned_id() {
        let submitter = Arc::new(MockSubmitter::new());
        let client = ConveyorClient::from_parts(
            submitter.clone(),
            Arc::new(MockStatusSource::new().push_state(TaskState::Pending)),
            ConveyorConfig::default(),
        );

        let mut kwargs = Map::new();
        kwargs.insert("d".to_string(), json!("que"));
        let task_id = client
            .submit("demo.short_task", vec![json!("hola")], kwargs)
            .await
            .unwrap();

        let submissions = submitter.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].name, "demo.short_task");
        assert_eq!(submissions[0].task_id, task_id);
    }

    #[tokio::test]
    async fn test_submission_failure_is_fatal() {
        let client = ConveyorClient::from_parts(
            Arc::new(MockSubmitter::rejecting("queue full")),
            Arc::new(MockStatusSource::new().push_state(TaskState::Pending)),
            ConveyorConfig::default(),
        );

        let err = client
            .submit("demo.short_task", vec![], Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Submission(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_and_wait_round_trip() {
        let status = Arc::new(
            MockStatusSource::new()
                .push_state(TaskState::Pending)
                .push_success(&json!({ "answer": 42 })),
        );
        let client = ConveyorClient::from_parts(
            Arc::new(MockSubmitter::new()),
            status,
            ConveyorConfig::default(),
        );

        let result = client
            .submit_and_wait("demo.short_task", vec![json!(40), json!(2)], Map::new(), None)
            .await
            .unwrap();
        assert_eq!(result, json!({ "answer": 42 }));
    }

    #[tokio::test]
    async fn test_revoke_pending_task() {
        let status = Arc::new(MockStatusSource::new().push_state(TaskState::Pending));
        let client = client_with_status(status.clone());

        let revoked = client.revoke(&task_id(), true).await.unwrap();
        assert!(revoked);
        assert_eq!(status.revocations(), vec![(task_id(), true)]);
    }

    #[tokio::test]
    async fn test_revoke_skips_non_revokable_states() {
        for state in TaskState::NON_REVOKABLE {
            let status = Arc::new(MockStatusSource::new().push_state(state));
            let client = client_with_status(status.clone());

            let revoked = client.revoke(&task_id(), false).await.unwrap();
            assert!(!revoked, "{state} must not be revokable");
            assert!(status.revocations().is_empty());
        }
    }
}
