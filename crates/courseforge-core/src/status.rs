//! Status enums for Runs and Tasks.

use serde::{Deserialize, Serialize};

/// Status of a Run (one end-to-end pipeline execution).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run created but no task has started yet.
    #[default]
    Created,
    /// At least one stage task has started executing.
    Running,
    /// Run is paused waiting on a human decision.
    AwaitingHuman,
    /// Pipeline finished and validation passed.
    Completed,
    /// Pipeline failed or validation did not pass.
    Failed,
    /// Run was cancelled by an explicit external request.
    Cancelled,
}

impl RunStatus {
    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the run is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Status name as it appears in API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::AwaitingHuman => "awaiting_human",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    ///
    /// Terminal states are final. Re-asserting the current status is
    /// treated as legal so repeated updates are harmless.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Created => matches!(next, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => matches!(
                next,
                Self::AwaitingHuman | Self::Completed | Self::Failed | Self::Cancelled
            ),
            Self::AwaitingHuman => matches!(
                next,
                Self::Running | Self::Completed | Self::Failed | Self::Cancelled
            ),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

/// Status of a Task (one stage's unit of work within a run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task created and waiting in the pending list.
    #[default]
    Queued,
    /// Task is executing on a queue worker.
    Running,
    /// Task finished and its result is stored.
    Succeeded,
    /// Task's agent handler returned an error.
    Failed,
    /// Task is gated on work that has not finished.
    Blocked,
}

impl TaskStatus {
    /// Status name as it appears in API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }

    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the task is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_run_states_are_final() {
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(RunStatus::Running));
            assert!(!terminal.can_transition_to(RunStatus::Created));
        }
    }

    #[test]
    fn test_created_to_running_is_legal() {
        assert!(RunStatus::Created.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Created.can_transition_to(RunStatus::Cancelled));
        assert!(!RunStatus::Created.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn test_self_transition_is_legal() {
        assert!(RunStatus::Running.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn test_task_terminal() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Queued.is_active());
        assert!(TaskStatus::Blocked.is_active());
    }
}
