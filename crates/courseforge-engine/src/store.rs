//! In-memory state authority for runs, tasks, events, and feedback.
//!
//! All mutation goes through the methods here; nothing outside this
//! module writes entity fields directly. Lookups by unknown id return
//! `None`/empty rather than erroring - the caller decides whether that
//! is a failure.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use courseforge_core::{
    Event, EventId, Feedback, FeedbackId, NewEvent, NewFeedback, NewTask, Run, RunId, RunStatus,
    Task, TaskId, TaskStatus,
};

use crate::redact::redact_pii_deep;
use crate::sanitize::sanitize_message;

/// Single source of truth for the engine's entities.
///
/// Safe under concurrent access from multiple in-flight queue workers;
/// each entity family sits behind its own `RwLock`. Construct once per
/// process and pass around as `Arc<Store>`.
pub struct Store {
    runs: RwLock<HashMap<RunId, Run>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    events: RwLock<HashMap<RunId, Vec<Event>>>,
    feedback: RwLock<Vec<Feedback>>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            events: RwLock::new(HashMap::new()),
            feedback: RwLock::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Create a new run in the `Created` state.
    pub async fn create_run(&self, input: Value) -> Run {
        let run = Run::new(input);
        debug!(run_id = %run.id, "Run created");
        self.runs
            .write()
            .await
            .insert(run.id.clone(), run.clone());
        run
    }

    /// Get a run by id.
    pub async fn get_run(&self, id: &RunId) -> Option<Run> {
        self.runs.read().await.get(id).cloned()
    }

    /// List all runs, newest first.
    pub async fn list_runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });
        runs
    }

    /// Update a run's status, enforcing the transition table.
    ///
    /// Returns `None` for an unknown id or an illegal transition;
    /// terminal states are final.
    pub async fn update_run_status(&self, id: &RunId, status: RunStatus) -> Option<Run> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(id)?;
        if !run.status.can_transition_to(status) {
            warn!(
                run_id = %id,
                from = ?run.status,
                to = ?status,
                "Ignoring illegal run status transition"
            );
            return None;
        }
        run.status = status;
        run.updated_at = chrono::Utc::now();
        Some(run.clone())
    }

    /// Store a run's assembled output, deep-redacting PII first.
    ///
    /// Skipped if the run is unknown or already carries an error -
    /// `output` and `error` are mutually exclusive.
    pub async fn set_run_output(&self, id: &RunId, output: Value) -> Option<Run> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(id)?;
        if run.error.is_some() {
            warn!(run_id = %id, "Refusing to set output on a failed run");
            return None;
        }
        run.output = Some(redact_pii_deep(&output));
        run.updated_at = chrono::Utc::now();
        Some(run.clone())
    }

    /// Mark a run failed with an error message.
    ///
    /// This is the one store operation that changes status as a side
    /// effect: the run moves to `Failed` unconditionally.
    pub async fn set_run_error(&self, id: &RunId, error: impl Into<String>) -> Option<Run> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(id)?;
        run.status = RunStatus::Failed;
        run.error = Some(error.into());
        run.output = None;
        run.updated_at = chrono::Utc::now();
        Some(run.clone())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Create a new queued task.
    pub async fn create_task(&self, new: NewTask) -> Task {
        let task = Task::new(new.run_id, new.agent, new.description);
        debug!(task_id = %task.id, run_id = %task.run_id, agent = %task.agent, "Task created");
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        task
    }

    /// Get a task by id.
    pub async fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Update a task's status, optionally attaching a result.
    ///
    /// Terminal task states are final: further updates are ignored. The
    /// result is sticky - an update without one preserves whatever was
    /// stored before.
    pub async fn update_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        result: Option<Value>,
    ) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(id)?;
        if task.status.is_terminal() && task.status != status {
            warn!(
                task_id = %id,
                from = ?task.status,
                to = ?status,
                "Ignoring status update on a terminal task"
            );
            return None;
        }
        task.status = status;
        if let Some(result) = result {
            task.result = Some(result);
        }
        task.updated_at = chrono::Utc::now();
        Some(task.clone())
    }

    /// List a run's tasks in creation order.
    pub async fn list_tasks_by_run(&self, run_id: &RunId) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| &t.run_id == run_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        tasks
    }

    /// List every task in the store, in creation order.
    pub async fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        tasks
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Append an audit event for a run.
    ///
    /// The message is sanitized (whitespace-normalized, redacted, capped)
    /// and the meta payload deep-redacted before the event is stored.
    /// Prior events are never mutated or removed.
    pub async fn append_event(&self, new: NewEvent) -> Event {
        let event = Event {
            id: EventId::generate(),
            run_id: new.run_id.clone(),
            task_id: new.task_id,
            agent: new.agent,
            event_type: new.event_type,
            message: sanitize_message(&new.message),
            meta: new.meta.as_ref().map(redact_pii_deep),
            timestamp: chrono::Utc::now(),
        };
        self.events
            .write()
            .await
            .entry(new.run_id)
            .or_default()
            .push(event.clone());
        event
    }

    /// List a run's events in append (chronological) order.
    pub async fn list_events_by_run(&self, run_id: &RunId) -> Vec<Event> {
        self.events
            .read()
            .await
            .get(run_id)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------

    /// Record feedback for a run.
    pub async fn create_feedback(&self, run_id: RunId, new: NewFeedback) -> Feedback {
        let feedback = Feedback {
            id: FeedbackId::generate(),
            run_id,
            decision: new.decision,
            rating: new.rating,
            comment: new.comment,
            created_at: chrono::Utc::now(),
        };
        self.feedback.write().await.push(feedback.clone());
        feedback
    }

    /// List feedback recorded for one run, oldest first.
    pub async fn list_feedback_by_run(&self, run_id: &RunId) -> Vec<Feedback> {
        self.feedback
            .read()
            .await
            .iter()
            .filter(|f| &f.run_id == run_id)
            .cloned()
            .collect()
    }

    /// List all feedback across runs, oldest first.
    pub async fn list_all_feedback(&self) -> Vec<Feedback> {
        self.feedback.read().await.clone()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courseforge_core::{AgentKind, EventType, FeedbackDecision};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_get_run() {
        let store = Store::new();
        let run = store.create_run(json!({"topic": "Rust"})).await;
        let fetched = store.get_run(&run.id).await.unwrap();
        assert_eq!(fetched.id, run.id);
        assert_eq!(fetched.status, RunStatus::Created);
    }

    #[tokio::test]
    async fn test_unknown_run_lookups_are_empty() {
        let store = Store::new();
        let missing = RunId::generate();
        assert!(store.get_run(&missing).await.is_none());
        assert!(store
            .update_run_status(&missing, RunStatus::Running)
            .await
            .is_none());
        assert!(store.set_run_error(&missing, "boom").await.is_none());
        assert!(store.list_events_by_run(&missing).await.is_empty());
        assert!(store.list_tasks_by_run(&missing).await.is_empty());
    }

    #[tokio::test]
    async fn test_illegal_run_transition_is_ignored() {
        let store = Store::new();
        let run = store.create_run(json!({})).await;
        store
            .update_run_status(&run.id, RunStatus::Running)
            .await
            .unwrap();
        store
            .update_run_status(&run.id, RunStatus::Completed)
            .await
            .unwrap();

        assert!(store
            .update_run_status(&run.id, RunStatus::Running)
            .await
            .is_none());
        let fetched = store.get_run(&run.id).await.unwrap();
        assert_eq!(fetched.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_set_run_error_flips_status() {
        let store = Store::new();
        let run = store.create_run(json!({})).await;
        let failed = store.set_run_error(&run.id, "agent blew up").await.unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("agent blew up"));
        assert!(failed.output.is_none());
    }

    #[tokio::test]
    async fn test_output_and_error_are_mutually_exclusive() {
        let store = Store::new();
        let run = store.create_run(json!({})).await;
        store.set_run_error(&run.id, "failed first").await.unwrap();
        assert!(store
            .set_run_output(&run.id, json!({"x": 1}))
            .await
            .is_none());
        let fetched = store.get_run(&run.id).await.unwrap();
        assert!(fetched.output.is_none());
        assert!(fetched.error.is_some());
    }

    #[tokio::test]
    async fn test_run_output_is_redacted() {
        let store = Store::new();
        let run = store.create_run(json!({})).await;
        store
            .set_run_output(&run.id, json!({"contact": "alice@example.com"}))
            .await
            .unwrap();
        let fetched = store.get_run(&run.id).await.unwrap();
        assert_eq!(fetched.output.unwrap()["contact"], "[email redacted]");
    }

    #[tokio::test]
    async fn test_list_runs_newest_first() {
        let store = Store::new();
        let first = store.create_run(json!({"n": 1})).await;
        let second = store.create_run(json!({"n": 2})).await;
        let runs = store.list_runs().await;
        assert_eq!(runs.len(), 2);
        assert!(runs[0].created_at >= runs[1].created_at);
        assert!(runs.iter().any(|r| r.id == first.id));
        assert!(runs.iter().any(|r| r.id == second.id));
    }

    #[tokio::test]
    async fn test_task_result_is_sticky() {
        let store = Store::new();
        let run = store.create_run(json!({})).await;
        let task = store
            .create_task(NewTask::new(run.id.clone(), AgentKind::Discovery, "dig"))
            .await;

        store
            .update_task_status(&task.id, TaskStatus::Running, None)
            .await
            .unwrap();
        store
            .update_task_status(&task.id, TaskStatus::Succeeded, Some(json!({"found": true})))
            .await
            .unwrap();

        // Re-asserting the terminal status without a result keeps it.
        let updated = store
            .update_task_status(&task.id, TaskStatus::Succeeded, None)
            .await
            .unwrap();
        assert_eq!(updated.result.unwrap()["found"], true);
    }

    #[tokio::test]
    async fn test_terminal_task_status_is_final() {
        let store = Store::new();
        let run = store.create_run(json!({})).await;
        let task = store
            .create_task(NewTask::new(run.id.clone(), AgentKind::Generation, "write"))
            .await;
        store
            .update_task_status(&task.id, TaskStatus::Failed, None)
            .await
            .unwrap();

        assert!(store
            .update_task_status(&task.id, TaskStatus::Running, None)
            .await
            .is_none());
        assert_eq!(
            store.get_task(&task.id).await.unwrap().status,
            TaskStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_events_append_in_order() {
        let store = Store::new();
        let run = store.create_run(json!({})).await;
        for n in 0..5 {
            store
                .append_event(NewEvent::for_run(
                    run.id.clone(),
                    AgentKind::Workflow,
                    EventType::RunStarted,
                    format!("event {}", n),
                ))
                .await;
        }
        let events = store.list_events_by_run(&run.id).await;
        assert_eq!(events.len(), 5);
        for window in events.windows(2) {
            assert!(window[0].timestamp <= window[1].timestamp);
        }
        assert_eq!(events[0].message, "event 0");
        assert_eq!(events[4].message, "event 4");
    }

    #[tokio::test]
    async fn test_event_message_is_sanitized_and_meta_redacted() {
        let store = Store::new();
        let run = store.create_run(json!({})).await;
        let event = store
            .append_event(
                NewEvent::for_run(
                    run.id.clone(),
                    AgentKind::Discovery,
                    EventType::AgentCompleted,
                    "done\n\nwrote to   bob@example.com",
                )
                .with_meta(json!({"phone": "+1 555 123 4567"})),
            )
            .await;
        assert_eq!(event.message, "done wrote to [email redacted]");
        assert_eq!(event.meta.unwrap()["phone"], "[number redacted]");
    }

    #[tokio::test]
    async fn test_feedback_queries() {
        let store = Store::new();
        let run_a = store.create_run(json!({})).await;
        let run_b = store.create_run(json!({})).await;
        store
            .create_feedback(
                run_a.id.clone(),
                NewFeedback {
                    decision: FeedbackDecision::Accept,
                    rating: Some(5),
                    comment: None,
                },
            )
            .await;
        store
            .create_feedback(
                run_b.id.clone(),
                NewFeedback {
                    decision: FeedbackDecision::Reject,
                    rating: Some(1),
                    comment: Some("off topic".into()),
                },
            )
            .await;

        assert_eq!(store.list_feedback_by_run(&run_a.id).await.len(), 1);
        assert_eq!(store.list_all_feedback().await.len(), 2);
    }
}
