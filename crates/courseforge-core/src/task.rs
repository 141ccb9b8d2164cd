//! The Task entity: one stage's unit of work within a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AgentKind, RunId, TaskId, TaskStatus};

/// A Task is one unit of work for a single agent stage, owned by exactly
/// one Run.
///
/// Status transitions are monotonic along Queued -> Running ->
/// {Succeeded | Failed}; `result` is set at most once, on the transition
/// to Succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// The run this task belongs to.
    pub run_id: RunId,

    /// Current task status.
    pub status: TaskStatus,

    /// The agent stage that executes this task.
    pub agent: AgentKind,

    /// Instructions for the agent, built from prior stage outputs.
    pub description: String,

    /// Opaque agent output. Success only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// When the task was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new queued Task.
    pub fn new(run_id: RunId, agent: AgentKind, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            run_id,
            status: TaskStatus::Queued,
            agent,
            description: description.into(),
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Input for creating a Task through the queue.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// The owning run.
    pub run_id: RunId,

    /// The agent stage to execute.
    pub agent: AgentKind,

    /// Instructions for the agent.
    pub description: String,
}

impl NewTask {
    /// Create a new task input.
    pub fn new(run_id: RunId, agent: AgentKind, description: impl Into<String>) -> Self {
        Self {
            run_id,
            agent,
            description: description.into(),
        }
    }
}
