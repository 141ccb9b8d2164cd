//! The run workflow state machine.
//!
//! Drives one run through the four pipeline stages in dependency order:
//! discovery -> strategy-selection -> generation -> validation. Each
//! stage's task is enqueued only after the previous stage reached a
//! terminal state, and each description carries truncated summaries of
//! the prior outputs. The validation verdict decides whether the run
//! completes or fails.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use courseforge_core::{
    AgentKind, EventType, NewEvent, NewTask, Run, RunId, RunStatus, TaskId, TaskStatus,
};

use crate::queue::TaskQueue;
use crate::store::Store;

/// Maximum characters of a prior-stage summary embedded in a description.
pub const SUMMARY_MAX_CHARS: usize = 800;

/// How long to wait for a single stage task before failing the run.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Poll interval used only if a task's completion channel is gone.
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_millis(50);

const DISCOVERY_INSTRUCTIONS: &str = "Survey the subject area for the requested content: \
     identify the target audience, prerequisites, and the key themes to cover.";

/// Errors raised while driving a run's pipeline.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A stage task reached the failed state. The stage-specific error
    /// text is in the task's events, not here.
    #[error("Task failed")]
    TaskFailed,

    /// A stage task did not reach a terminal state within the wait
    /// timeout.
    #[error("Timed out waiting for task completion")]
    WaitTimeout,

    /// A stage task disappeared from the store mid-wait.
    #[error("Task vanished: {0}")]
    TaskVanished(TaskId),
}

/// Owns the run state machine; one instance serves every run.
pub struct Orchestrator {
    store: Arc<Store>,
    queue: Arc<TaskQueue>,
    wait_timeout: Duration,
}

impl Orchestrator {
    /// Create an orchestrator over the given store and queue.
    pub fn new(store: Arc<Store>, queue: Arc<TaskQueue>) -> Self {
        Self {
            store,
            queue,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Builder method to override the per-stage wait timeout.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Execute a run to completion and return its final state.
    pub async fn start_run(&self, input: Value) -> Run {
        let run = self.store.create_run(input).await;
        self.drive(run).await
    }

    /// Create a run, continue the workflow in the background, and return
    /// the run id immediately.
    pub async fn start_run_async(self: &Arc<Self>, input: Value) -> RunId {
        let run = self.store.create_run(input).await;
        let run_id = run.id.clone();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive(run).await;
        });
        run_id
    }

    /// Cancel a run: flips the stored status only.
    ///
    /// In-flight agent handlers are not interrupted; a workflow already
    /// past validation loses the race at the transition guard, so the
    /// cancel wins. Terminal runs are returned unchanged.
    pub async fn cancel_run(&self, run_id: &RunId) -> Option<Run> {
        let run = self.store.get_run(run_id).await?;
        if run.is_terminal() {
            return Some(run);
        }
        let cancelled = match self
            .store
            .update_run_status(run_id, RunStatus::Cancelled)
            .await
        {
            Some(run) => run,
            // Lost a race against another terminal transition.
            None => return self.store.get_run(run_id).await,
        };
        self.store
            .append_event(NewEvent::for_run(
                run_id.clone(),
                AgentKind::Workflow,
                EventType::RunCancelled,
                "Run cancelled by request",
            ))
            .await;
        info!(run_id = %run_id, "Run cancelled");
        Some(cancelled)
    }

    /// Run the pipeline and convert any error into run failure, exactly
    /// once. Returns the run's final stored state.
    async fn drive(&self, run: Run) -> Run {
        let run_id = run.id.clone();
        if let Err(e) = self.run_pipeline(&run_id).await {
            warn!(run_id = %run_id, error = %e, "Run pipeline failed");
            self.fail_run(&run_id, e.to_string()).await;
        }
        self.store.get_run(&run_id).await.unwrap_or(run)
    }

    /// Steps 2-7: the four stages in order, then the verdict.
    async fn run_pipeline(&self, run_id: &RunId) -> Result<(), WorkflowError> {
        let discovery = self
            .run_stage(run_id, AgentKind::Discovery, DISCOVERY_INSTRUCTIONS.to_string())
            .await?;

        let discovery_summary = summarize(&discovery);
        let strategy = self
            .run_stage(
                run_id,
                AgentKind::StrategySelection,
                format!(
                    "Choose the teaching strategy best suited to the findings below.\n\n\
                     Discovery findings: {}",
                    discovery_summary
                ),
            )
            .await?;

        let strategy_summary = summarize(&strategy);
        let generation = self
            .run_stage(
                run_id,
                AgentKind::Generation,
                format!(
                    "Produce the course content.\n\nDiscovery findings: {}\n\n\
                     Selected strategy: {}",
                    discovery_summary, strategy_summary
                ),
            )
            .await?;

        let mut validation_description = format!(
            "Assess the generated content for andragogical and pedagogical quality.\n\n\
             Generated content: {}",
            summarize(&generation)
        );
        if !strategy_summary.is_empty() {
            validation_description
                .push_str(&format!("\n\nSelected strategy: {}", strategy_summary));
        }
        let validation = self
            .run_stage(run_id, AgentKind::Validation, validation_description)
            .await?;

        if !validation_passes(&validation) {
            info!(run_id = %run_id, "Validation verdict failed the run");
            self.fail_run(run_id, "Validation did not pass.".to_string())
                .await;
            return Ok(());
        }

        // Completion loses to a concurrent cancel at the transition guard;
        // in that case the output is not stored either.
        if self
            .store
            .update_run_status(run_id, RunStatus::Completed)
            .await
            .is_some()
        {
            let output = json!({
                "discovery": discovery,
                "strategySelection": strategy,
                "generation": generation,
                "validation": validation,
            });
            self.store.set_run_output(run_id, output).await;
            self.store
                .append_event(NewEvent::for_run(
                    run_id.clone(),
                    AgentKind::Workflow,
                    EventType::RunCompleted,
                    "Run completed",
                ))
                .await;
            info!(run_id = %run_id, "Run completed");
        } else {
            warn!(run_id = %run_id, "Run no longer active, skipping completion");
        }
        Ok(())
    }

    /// Enqueue one stage task and wait for its terminal state.
    async fn run_stage(
        &self,
        run_id: &RunId,
        agent: AgentKind,
        description: String,
    ) -> Result<Value, WorkflowError> {
        let task = self
            .queue
            .enqueue(NewTask::new(run_id.clone(), agent, description))
            .await;
        self.wait_for_task(&task.id).await
    }

    /// Suspend until the task reaches a terminal state.
    ///
    /// Resolves with the task's result on success, rejects with a generic
    /// failure on `Failed` (the specific agent error is in the events),
    /// and rejects with a timeout if the handler hangs past the limit.
    async fn wait_for_task(&self, task_id: &TaskId) -> Result<Value, WorkflowError> {
        match tokio::time::timeout(self.wait_timeout, self.await_terminal(task_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(task_id = %task_id, timeout = ?self.wait_timeout, "Gave up waiting for task");
                Err(WorkflowError::WaitTimeout)
            }
        }
    }

    async fn await_terminal(&self, task_id: &TaskId) -> Result<Value, WorkflowError> {
        let mut rx: Option<watch::Receiver<TaskStatus>> = self.queue.watch_task(task_id);
        loop {
            // The store is authoritative; the channel only decides when
            // to look again.
            match self.store.get_task(task_id).await {
                Some(task) => match task.status {
                    TaskStatus::Succeeded => return Ok(task.result.unwrap_or(Value::Null)),
                    TaskStatus::Failed => return Err(WorkflowError::TaskFailed),
                    _ => {}
                },
                None => return Err(WorkflowError::TaskVanished(task_id.clone())),
            }
            match rx {
                Some(ref mut receiver) => {
                    if receiver.changed().await.is_err() {
                        rx = None;
                    }
                }
                None => tokio::time::sleep(FALLBACK_POLL_INTERVAL).await,
            }
        }
    }

    /// Move the run to failed, exactly once.
    ///
    /// The guard is the run's own state machine: a run already in a
    /// terminal state is left untouched, so repeated failures collapse
    /// into a single `run_failed` event.
    async fn fail_run(&self, run_id: &RunId, message: String) {
        match self.store.get_run(run_id).await {
            Some(run) if !run.is_terminal() => {}
            _ => return,
        }
        self.store.set_run_error(run_id, &message).await;
        self.store
            .append_event(NewEvent::for_run(
                run_id.clone(),
                AgentKind::Workflow,
                EventType::RunFailed,
                message,
            ))
            .await;
    }
}

/// Compress a stage result into a single-line summary for the next
/// stage's description.
pub fn summarize(result: &Value) -> String {
    let text = match result {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    crate::sanitize::truncate_chars(&collapsed, SUMMARY_MAX_CHARS)
}

/// Evaluate the validation verdict.
///
/// An explicit boolean `pass` wins verbatim. Otherwise both quality
/// scores must clear 0.3, with missing scores counting as 0 (failing),
/// not as unknown.
pub fn validation_passes(verdict: &Value) -> bool {
    if let Some(pass) = verdict.get("pass").and_then(Value::as_bool) {
        return pass;
    }
    let andragogy = verdict
        .get("andragogyScore")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let pedagogy = verdict
        .get("pedagogyScore")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    andragogy >= 0.3 && pedagogy >= 0.3
}
