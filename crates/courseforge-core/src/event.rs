//! Audit events: immutable records of what happened during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AgentKind, EventId, RunId, TaskId};

/// An immutable audit record of something that happened during a run.
///
/// The event log is append-only and is the sole source of "what happened
/// when"; events are never rewritten or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,

    /// The run this event belongs to.
    pub run_id: RunId,

    /// The task this event belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    /// The agent stage the event concerns.
    pub agent: AgentKind,

    /// What happened.
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Sanitized, length-capped human-readable text.
    pub message: String,

    /// Redacted structured payload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
}

/// Type of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Task created and placed on the pending list.
    TaskQueued,
    /// Task picked up by a queue worker.
    TaskStarted,
    /// Task finished and its result was stored.
    TaskSucceeded,
    /// Task's agent handler returned an error.
    TaskFailed,
    /// Agent handler invocation began.
    AgentStarted,
    /// Agent produced output (carried in event meta).
    AgentOutputReady,
    /// Agent handler finished successfully.
    AgentCompleted,
    /// Agent handler errored.
    AgentFailed,
    /// First stage task of the run started executing.
    RunStarted,
    /// Run finished with a passing validation verdict.
    RunCompleted,
    /// Run reached the failed state.
    RunFailed,
    /// Run was cancelled by an explicit request.
    RunCancelled,
}

impl EventType {
    /// Event type name as it appears in API payloads and compact logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskQueued => "task_queued",
            Self::TaskStarted => "task_started",
            Self::TaskSucceeded => "task_succeeded",
            Self::TaskFailed => "task_failed",
            Self::AgentStarted => "agent_started",
            Self::AgentOutputReady => "agent_output_ready",
            Self::AgentCompleted => "agent_completed",
            Self::AgentFailed => "agent_failed",
            Self::RunStarted => "run_started",
            Self::RunCompleted => "run_completed",
            Self::RunFailed => "run_failed",
            Self::RunCancelled => "run_cancelled",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for appending an Event through the store.
///
/// The store sanitizes `message` and redacts `meta` before the event is
/// materialized, so raw agent text can be passed in directly.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// The run this event belongs to.
    pub run_id: RunId,

    /// The task this event belongs to, if any.
    pub task_id: Option<TaskId>,

    /// The agent stage the event concerns.
    pub agent: AgentKind,

    /// What happened.
    pub event_type: EventType,

    /// Unsanitized message text.
    pub message: String,

    /// Unredacted structured payload, if any.
    pub meta: Option<Value>,
}

impl NewEvent {
    /// Create a run-level event input (no task association).
    pub fn for_run(
        run_id: RunId,
        agent: AgentKind,
        event_type: EventType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            task_id: None,
            agent,
            event_type,
            message: message.into(),
            meta: None,
        }
    }

    /// Create a task-level event input.
    pub fn for_task(
        run_id: RunId,
        task_id: TaskId,
        agent: AgentKind,
        event_type: EventType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            task_id: Some(task_id),
            agent,
            event_type,
            message: message.into(),
            meta: None,
        }
    }

    /// Builder method to attach a structured payload.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::TaskQueued.as_str(), "task_queued");
        assert_eq!(EventType::AgentOutputReady.as_str(), "agent_output_ready");
        assert_eq!(EventType::RunFailed.to_string(), "run_failed");
    }

    #[test]
    fn test_for_task_carries_task_id() {
        let run_id = RunId::generate();
        let task_id = TaskId::generate();
        let event = NewEvent::for_task(
            run_id.clone(),
            task_id.clone(),
            AgentKind::Discovery,
            EventType::TaskStarted,
            "task started",
        );
        assert_eq!(event.run_id, run_id);
        assert_eq!(event.task_id, Some(task_id));
        assert!(event.meta.is_none());
    }

    #[test]
    fn test_with_meta() {
        let event = NewEvent::for_run(
            RunId::generate(),
            AgentKind::Validation,
            EventType::RunCompleted,
            "run completed",
        )
        .with_meta(serde_json::json!({"pass": true}));
        assert!(event.meta.is_some());
    }
}
