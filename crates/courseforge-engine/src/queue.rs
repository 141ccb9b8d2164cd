//! Bounded-concurrency task queue.
//!
//! Tasks from every run share one FIFO pending list; at most
//! `concurrency` of them execute at once, each on its own spawned tokio
//! task. Completing a task immediately drains the next pending one, so a
//! freed slot never sits idle while work is waiting.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use courseforge_core::{
    AgentKind, EventType, NewEvent, NewTask, RunId, RunStatus, Task, TaskId, TaskStatus,
};

use crate::handler::AgentRegistry;
use crate::store::Store;

/// Concurrency ceiling used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Best-effort observability counters for the queue.
///
/// `queued`, `running`, and `active_workers` are live gauges;
/// `completed` and `failed` are lifetime counters. None of these are
/// authoritative - the store is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub active_workers: usize,
    pub concurrency: usize,
}

/// Scheduling state shared by enqueue, drain, and the workers.
struct QueueInner {
    pending: VecDeque<TaskId>,
    active: usize,
    completed: u64,
    failed: u64,
    stopped: bool,
}

/// In-process task scheduler with a fixed concurrency ceiling.
pub struct TaskQueue {
    store: Arc<Store>,
    registry: Arc<AgentRegistry>,
    concurrency: usize,
    inner: Mutex<QueueInner>,
    completions: Mutex<HashMap<TaskId, watch::Sender<TaskStatus>>>,
    idle: Notify,
}

impl TaskQueue {
    /// Create a queue over the given store and handler registry.
    ///
    /// The concurrency ceiling is fixed for the queue's lifetime.
    pub fn new(store: Arc<Store>, registry: Arc<AgentRegistry>, concurrency: usize) -> Arc<Self> {
        let concurrency = concurrency.max(1);
        info!(concurrency, "Task queue created");
        Arc::new(Self {
            store,
            registry,
            concurrency,
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                active: 0,
                completed: 0,
                failed: 0,
                stopped: false,
            }),
            completions: Mutex::new(HashMap::new()),
            idle: Notify::new(),
        })
    }

    /// Create, record, and schedule a task.
    ///
    /// Returns the created task as soon as it is queued; execution
    /// proceeds asynchronously on the worker slots. If the queue is
    /// stopped the task is still created and recorded but will never
    /// start.
    pub async fn enqueue(self: &Arc<Self>, new: NewTask) -> Task {
        let task = self.store.create_task(new).await;
        self.store
            .append_event(NewEvent::for_task(
                task.run_id.clone(),
                task.id.clone(),
                task.agent,
                EventType::TaskQueued,
                format!("Task queued for agent {}", task.agent),
            ))
            .await;

        let (tx, _rx) = watch::channel(TaskStatus::Queued);
        self.completions
            .lock()
            .expect("completions lock poisoned")
            .insert(task.id.clone(), tx);

        {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            inner.pending.push_back(task.id.clone());
        }
        self.drain();
        task
    }

    /// Subscribe to a task's status transitions.
    ///
    /// The latest status is always readable from the receiver; terminal
    /// states are final, so last-value semantics cannot miss completion.
    pub fn watch_task(&self, task_id: &TaskId) -> Option<watch::Receiver<TaskStatus>> {
        self.completions
            .lock()
            .expect("completions lock poisoned")
            .get(task_id)
            .map(watch::Sender::subscribe)
    }

    /// Current queue counters.
    pub fn queue_state(&self) -> QueueState {
        let inner = self.inner.lock().expect("queue lock poisoned");
        QueueState {
            queued: inner.pending.len(),
            running: inner.active,
            completed: inner.completed,
            failed: inner.failed,
            active_workers: inner.active,
            concurrency: self.concurrency,
        }
    }

    /// Stop draining and wait for in-flight work to finish.
    ///
    /// Pending tasks that have not started are left `Queued` forever;
    /// this is a drain, not a hard cancel. Resolves immediately when no
    /// worker is active.
    pub async fn shutdown(&self) {
        info!("Task queue shutting down");
        loop {
            let notified = self.idle.notified();
            {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                inner.stopped = true;
                if inner.active == 0 {
                    return;
                }
                debug!(active = inner.active, "Waiting for active workers to finish");
            }
            notified.await;
        }
    }

    /// Start pending tasks while worker slots are free.
    fn drain(self: &Arc<Self>) {
        let mut to_start = Vec::new();
        {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            while !inner.stopped
                && inner.active < self.concurrency
                && !inner.pending.is_empty()
            {
                if let Some(task_id) = inner.pending.pop_front() {
                    inner.active += 1;
                    to_start.push(task_id);
                }
            }
        }
        for task_id in to_start {
            let queue = Arc::clone(self);
            tokio::spawn(async move {
                queue.execute(task_id).await;
                queue.finish_slot();
            });
        }
    }

    /// Release a worker slot and pull in further pending work.
    fn finish_slot(self: &Arc<Self>) {
        let stopped = {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            inner.active -= 1;
            if inner.stopped && inner.active == 0 {
                self.idle.notify_one();
            }
            inner.stopped
        };
        if !stopped {
            self.drain();
        }
    }

    /// Execute one task end to end: status transitions, events, handler
    /// dispatch, and result/failure recording.
    async fn execute(&self, task_id: TaskId) {
        let Some(task) = self.store.get_task(&task_id).await else {
            error!(task_id = %task_id, "Task vanished before execution");
            return;
        };
        let run_id = task.run_id.clone();
        let agent = task.agent;

        let task = match self
            .store
            .update_task_status(&task_id, TaskStatus::Running, None)
            .await
        {
            Some(task) => task,
            None => {
                warn!(task_id = %task_id, "Task no longer runnable, skipping");
                return;
            }
        };
        self.publish_status(&task_id, TaskStatus::Running);

        // First task of a run pulls the run into Running; the run_started
        // event is tied to that exact transition.
        if let Some(run) = self.store.get_run(&run_id).await {
            if run.status == RunStatus::Created
                && self
                    .store
                    .update_run_status(&run_id, RunStatus::Running)
                    .await
                    .is_some()
            {
                self.store
                    .append_event(NewEvent::for_task(
                        run_id.clone(),
                        task_id.clone(),
                        agent,
                        EventType::RunStarted,
                        "Run started",
                    ))
                    .await;
            }
        }

        self.store
            .append_event(NewEvent::for_task(
                run_id.clone(),
                task_id.clone(),
                agent,
                EventType::TaskStarted,
                format!("Task started on agent {}", agent),
            ))
            .await;
        self.store
            .append_event(NewEvent::for_task(
                run_id.clone(),
                task_id.clone(),
                agent,
                EventType::AgentStarted,
                format!("Agent {} invoked", agent),
            ))
            .await;

        let Some(handler) = self.registry.resolve(agent) else {
            // Unreachable with a normally-constructed registry: the
            // default no-op handler is installed at construction.
            error!(task_id = %task_id, agent = %agent, "No handler available, failing task");
            self.record_failure(&run_id, &task_id, agent, "no handler registered".to_string())
                .await;
            return;
        };

        debug!(task_id = %task_id, run_id = %run_id, agent = %agent, "Invoking agent handler");
        match handler.handle(&task).await {
            Ok(result) => {
                // Count before the store shows the terminal status so the
                // lifetime counters never lag behind a completion observer.
                self.inner.lock().expect("queue lock poisoned").completed += 1;
                self.store
                    .update_task_status(&task_id, TaskStatus::Succeeded, Some(result.clone()))
                    .await;
                self.store
                    .append_event(NewEvent::for_task(
                        run_id.clone(),
                        task_id.clone(),
                        agent,
                        EventType::TaskSucceeded,
                        format!("Task succeeded on agent {}", agent),
                    ))
                    .await;
                self.store
                    .append_event(
                        NewEvent::for_task(
                            run_id.clone(),
                            task_id.clone(),
                            agent,
                            EventType::AgentOutputReady,
                            format!("Agent {} produced output", agent),
                        )
                        .with_meta(json!({"result": result})),
                    )
                    .await;
                self.store
                    .append_event(NewEvent::for_task(
                        run_id.clone(),
                        task_id.clone(),
                        agent,
                        EventType::AgentCompleted,
                        format!("Agent {} completed", agent),
                    ))
                    .await;
                self.publish_status(&task_id, TaskStatus::Succeeded);
            }
            Err(e) => {
                warn!(task_id = %task_id, agent = %agent, error = %e, "Agent handler failed");
                self.record_failure(&run_id, &task_id, agent, e.to_string())
                    .await;
            }
        }
    }

    /// Mark a task failed and append the failure events.
    async fn record_failure(
        &self,
        run_id: &RunId,
        task_id: &TaskId,
        agent: AgentKind,
        error: String,
    ) {
        self.inner.lock().expect("queue lock poisoned").failed += 1;
        self.store
            .update_task_status(task_id, TaskStatus::Failed, None)
            .await;
        self.store
            .append_event(NewEvent::for_task(
                run_id.clone(),
                task_id.clone(),
                agent,
                EventType::TaskFailed,
                format!("Task failed: {}", error),
            ))
            .await;
        self.store
            .append_event(NewEvent::for_task(
                run_id.clone(),
                task_id.clone(),
                agent,
                EventType::AgentFailed,
                format!("Agent {} failed: {}", agent, error),
            ))
            .await;
        self.publish_status(task_id, TaskStatus::Failed);
    }

    /// Publish a status transition on the task's completion channel.
    fn publish_status(&self, task_id: &TaskId, status: TaskStatus) {
        if let Some(tx) = self
            .completions
            .lock()
            .expect("completions lock poisoned")
            .get(task_id)
        {
            tx.send_replace(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{AgentHandler, HandlerError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Handler that tracks how many invocations overlap.
    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyProbe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AgentHandler for Arc<ConcurrencyProbe> {
        async fn handle(&self, _task: &Task) -> Result<Value, HandlerError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({"ok": true}))
        }
    }

    /// Handler that records the order tasks started in.
    struct StartOrderProbe {
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AgentHandler for Arc<StartOrderProbe> {
        async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
            self.order
                .lock()
                .expect("order lock")
                .push(task.description.clone());
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Value::Null)
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl AgentHandler for FailingHandler {
        async fn handle(&self, _task: &Task) -> Result<Value, HandlerError> {
            Err(HandlerError::Failed("fixture store unreadable".into()))
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl AgentHandler for SlowHandler {
        async fn handle(&self, _task: &Task) -> Result<Value, HandlerError> {
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok(json!({"ok": true}))
        }
    }

    async fn wait_for_terminal(queue: &Arc<TaskQueue>, store: &Arc<Store>, task_id: &TaskId) {
        let mut rx = queue.watch_task(task_id).expect("watch channel");
        loop {
            if let Some(task) = store.get_task(task_id).await {
                if task.is_terminal() {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let store = Arc::new(Store::new());
        let probe = ConcurrencyProbe::new();
        let registry = Arc::new(
            AgentRegistry::new().with_handler(AgentKind::Discovery, Arc::new(Arc::clone(&probe))),
        );
        let queue = TaskQueue::new(Arc::clone(&store), registry, 2);

        let run = store.create_run(json!({})).await;
        let mut ids = Vec::new();
        for n in 0..6 {
            let task = queue
                .enqueue(NewTask::new(
                    run.id.clone(),
                    AgentKind::Discovery,
                    format!("task {}", n),
                ))
                .await;
            ids.push(task.id);
        }
        for id in &ids {
            wait_for_terminal(&queue, &store, id).await;
        }
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(queue.queue_state().completed, 6);
    }

    #[tokio::test]
    async fn test_fifo_start_order_with_single_worker() {
        let store = Arc::new(Store::new());
        let probe = Arc::new(StartOrderProbe {
            order: Mutex::new(Vec::new()),
        });
        let registry = Arc::new(
            AgentRegistry::new().with_handler(AgentKind::Generation, Arc::new(Arc::clone(&probe))),
        );
        let queue = TaskQueue::new(Arc::clone(&store), registry, 1);

        let run = store.create_run(json!({})).await;
        let mut ids = Vec::new();
        for n in 0..4 {
            let task = queue
                .enqueue(NewTask::new(
                    run.id.clone(),
                    AgentKind::Generation,
                    format!("{}", n),
                ))
                .await;
            ids.push(task.id);
        }
        for id in &ids {
            wait_for_terminal(&queue, &store, id).await;
        }
        let order = probe.order.lock().expect("order lock").clone();
        assert_eq!(order, vec!["0", "1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_first_task_pulls_run_to_running_with_one_run_started_event() {
        let store = Arc::new(Store::new());
        let registry = Arc::new(AgentRegistry::new());
        let queue = TaskQueue::new(Arc::clone(&store), registry, 2);

        let run = store.create_run(json!({})).await;
        let a = queue
            .enqueue(NewTask::new(run.id.clone(), AgentKind::Discovery, "a"))
            .await;
        wait_for_terminal(&queue, &store, &a.id).await;
        let b = queue
            .enqueue(NewTask::new(run.id.clone(), AgentKind::Generation, "b"))
            .await;
        wait_for_terminal(&queue, &store, &b.id).await;

        assert_eq!(
            store.get_run(&run.id).await.unwrap().status,
            RunStatus::Running
        );
        let events = store.list_events_by_run(&run.id).await;
        let started = events
            .iter()
            .filter(|e| e.event_type == EventType::RunStarted)
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_failed_handler_records_failure_events() {
        let store = Arc::new(Store::new());
        let registry = Arc::new(
            AgentRegistry::new().with_handler(AgentKind::Validation, Arc::new(FailingHandler)),
        );
        let queue = TaskQueue::new(Arc::clone(&store), registry, 1);

        let run = store.create_run(json!({})).await;
        let task = queue
            .enqueue(NewTask::new(run.id.clone(), AgentKind::Validation, "check"))
            .await;
        wait_for_terminal(&queue, &store, &task.id).await;

        let stored = store.get_task(&task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.result.is_none());

        let events = store.list_events_by_run(&run.id).await;
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert!(types.contains(&EventType::TaskFailed));
        assert!(types.contains(&EventType::AgentFailed));
        assert!(!types.contains(&EventType::TaskSucceeded));
        assert_eq!(queue.queue_state().failed, 1);
    }

    #[tokio::test]
    async fn test_unregistered_agent_uses_default_noop() {
        let store = Arc::new(Store::new());
        let registry = Arc::new(AgentRegistry::new());
        let queue = TaskQueue::new(Arc::clone(&store), registry, 1);

        let run = store.create_run(json!({})).await;
        let task = queue
            .enqueue(NewTask::new(run.id.clone(), AgentKind::StrategySelection, "x"))
            .await;
        wait_for_terminal(&queue, &store, &task.id).await;

        let stored = store.get_task(&task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Succeeded);
        assert_eq!(stored.result.unwrap()["source"], "noop");
    }

    #[tokio::test]
    async fn test_shutdown_drains_active_and_abandons_pending() {
        let store = Arc::new(Store::new());
        let registry = Arc::new(
            AgentRegistry::new().with_handler(AgentKind::Discovery, Arc::new(SlowHandler)),
        );
        let queue = TaskQueue::new(Arc::clone(&store), registry, 1);

        let run = store.create_run(json!({})).await;
        let mut ids = Vec::new();
        for n in 0..3 {
            let task = queue
                .enqueue(NewTask::new(
                    run.id.clone(),
                    AgentKind::Discovery,
                    format!("task {}", n),
                ))
                .await;
            ids.push(task.id);
        }
        // Let the first task get picked up before stopping.
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.shutdown().await;

        let first = store.get_task(&ids[0]).await.unwrap();
        assert_eq!(first.status, TaskStatus::Succeeded);
        for id in &ids[1..] {
            assert_eq!(
                store.get_task(id).await.unwrap().status,
                TaskStatus::Queued
            );
        }
        let state = queue.queue_state();
        assert_eq!(state.active_workers, 0);
        assert_eq!(state.queued, 2);
    }

    #[tokio::test]
    async fn test_shutdown_resolves_immediately_when_idle() {
        let store = Arc::new(Store::new());
        let queue = TaskQueue::new(store, Arc::new(AgentRegistry::new()), 2);
        queue.shutdown().await;
        assert_eq!(queue.queue_state().active_workers, 0);
    }
}
