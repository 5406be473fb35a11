//! Dispatch of broker lifecycle events to registered handlers.
//!
//! The push view of a task: the broker announces every lifecycle transition
//! on its event channel and the [`EventReceiver`] routes each decoded event
//! to the handler registered for its kind. Delivery is at-least-once and
//! unordered across tasks, so handlers must be idempotent or tolerate
//! duplicates. That responsibility is the caller's; this module documents
//! it rather than hiding it behind deduplication state.

pub mod receiver;

pub use receiver::{run_many, CaptureOptions, EventReceiver, ReceiverHandle};

use std::fmt;

use tracing::{info, trace};

use conveyor_core::event::{
    EventKind, TaskEvent, TaskFailed, TaskReceived, TaskRejected, TaskRetried, TaskRevoked,
    TaskSent, TaskStarted, TaskSucceeded,
};

type Handler<P> = Box<dyn Fn(P) + Send + Sync>;

/// Table of per-kind event handlers.
///
/// All eight registrations are optional; events of unregistered kinds are
/// dropped silently: a receiver must not fail just because a caller is
/// uninterested in, say, `task-retried`. Handlers run inline on the
/// receiver's execution context and the table is read-only once a receiver
/// starts: keep handlers fast and side-effect isolated, or synchronize
/// externally.
#[derive(Default)]
pub struct EventHandlers {
    sent: Option<Handler<TaskSent>>,
    received: Option<Handler<TaskReceived>>,
    started: Option<Handler<TaskStarted>>,
    succeeded: Option<Handler<TaskSucceeded>>,
    failed: Option<Handler<TaskFailed>>,
    rejected: Option<Handler<TaskRejected>>,
    retried: Option<Handler<TaskRetried>>,
    revoked: Option<Handler<TaskRevoked>>,
}

impl EventHandlers {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `task-sent` events.
    pub fn on_sent(mut self, handler: impl Fn(TaskSent) + Send + Sync + 'static) -> Self {
        self.sent = Some(Box::new(handler));
        self
    }

    /// Register a handler for `task-received` events.
    pub fn on_received(mut self, handler: impl Fn(TaskReceived) + Send + Sync + 'static) -> Self {
        self.received = Some(Box::new(handler));
        self
    }

    /// Register a handler for `task-started` events.
    pub fn on_started(mut self, handler: impl Fn(TaskStarted) + Send + Sync + 'static) -> Self {
        self.started = Some(Box::new(handler));
        self
    }

    /// Register a handler for `task-succeeded` events.
    pub fn on_succeeded(mut self, handler: impl Fn(TaskSucceeded) + Send + Sync + 'static) -> Self {
        self.succeeded = Some(Box::new(handler));
        self
    }

    /// Register a handler for `task-failed` events.
    pub fn on_failed(mut self, handler: impl Fn(TaskFailed) + Send + Sync + 'static) -> Self {
        self.failed = Some(Box::new(handler));
        self
    }

    /// Register a handler for `task-rejected` events.
    pub fn on_rejected(mut self, handler: impl Fn(TaskRejected) + Send + Sync + 'static) -> Self {
        self.rejected = Some(Box::new(handler));
        self
    }

    /// Register a handler for `task-retried` events.
    pub fn on_retried(mut self, handler: impl Fn(TaskRetried) + Send + Sync + 'static) -> Self {
        self.retried = Some(Box::new(handler));
        self
    }

    /// Register a handler for `task-revoked` events.
    pub fn on_revoked(mut self, handler: impl Fn(TaskRevoked) + Send + Sync + 'static) -> Self {
        self.revoked = Some(Box::new(handler));
        self
    }

    /// Kinds with a registered handler.
    pub fn registered_kinds(&self) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        if self.sent.is_some() {
            kinds.push(EventKind::Sent);
        }
        if self.received.is_some() {
            kinds.push(EventKind::Received);
        }
        if self.started.is_some() {
            kinds.push(EventKind::Started);
        }
        if self.succeeded.is_some() {
            kinds.push(EventKind::Succeeded);
        }
        if self.failed.is_some() {
            kinds.push(EventKind::Failed);
        }
        if self.rejected.is_some() {
            kinds.push(EventKind::Rejected);
        }
        if self.retried.is_some() {
            kinds.push(EventKind::Retried);
        }
        if self.revoked.is_some() {
            kinds.push(EventKind::Revoked);
        }
        kinds
    }

    pub(crate) fn dispatch(&self, event: TaskEvent) {
        match event {
            TaskEvent::Sent(payload) => deliver(&self.sent, EventKind::Sent, payload),
            TaskEvent::Received(payload) => deliver(&self.received, EventKind::Received, payload),
            TaskEvent::Started(payload) => deliver(&self.started, EventKind::Started, payload),
            TaskEvent::Succeeded(payload) => {
                deliver(&self.succeeded, EventKind::Succeeded, payload)
            }
            TaskEvent::Failed(payload) => deliver(&self.failed, EventKind::Failed, payload),
            TaskEvent::Rejected(payload) => deliver(&self.rejected, EventKind::Rejected, payload),
            TaskEvent::Retried(payload) => deliver(&self.retried, EventKind::Retried, payload),
            TaskEvent::Revoked(payload) => deliver(&self.revoked, EventKind::Revoked, payload),
        }
    }
}

fn deliver<P>(handler: &Option<Handler<P>>, kind: EventKind, payload: P) {
    match handler {
        Some(handler) => handler(payload),
        None => trace!(kind = %kind, "no handler registered, event dropped"),
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("registered", &self.registered_kinds())
            .finish()
    }
}

/// Handlers that log every lifecycle event through `tracing`, one per kind.
pub fn logging_handlers() -> EventHandlers {
    EventHandlers::new()
        .on_sent(|p| info!(task_id = %p.uuid, name = ?p.name, queue = ?p.queue, "task sent"))
        .on_received(|p| info!(task_id = %p.uuid, hostname = ?p.hostname, "task received"))
        .on_started(|p| info!(task_id = %p.uuid, hostname = ?p.hostname, pid = ?p.pid, "task started"))
        .on_succeeded(|p| info!(task_id = %p.uuid, runtime = ?p.runtime, "task succeeded"))
        .on_failed(|p| info!(task_id = %p.uuid, exception = ?p.exception, "task failed"))
        .on_rejected(|p| info!(task_id = %p.uuid, requeue = p.requeue, "task rejected"))
        .on_retried(|p| info!(task_id = %p.uuid, exception = ?p.exception, "task retried"))
        .on_revoked(|p| info!(task_id = %p.uuid, terminated = p.terminated, "task revoked"))
}
