//! HTTP routes for the orchestration API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use courseforge_core::{Event, NewFeedback, RunId};
use courseforge_engine::{Orchestrator, Store, TaskQueue};

use crate::responses::{failure, run_not_found, success, success_with_status};

/// Shared application state: the engine's injectable pieces.
pub struct AppContext {
    pub store: Arc<Store>,
    pub queue: Arc<TaskQueue>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Create the API router.
pub fn create_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/orchestrations", post(start_run).get(list_runs))
        .route("/orchestrations/:id", get(get_run))
        .route("/orchestrations/:id/tasks", get(list_run_tasks))
        .route("/orchestrations/:id/logs", get(list_run_logs))
        .route("/orchestrations/:id/logs/compact", get(list_run_logs_compact))
        .route(
            "/orchestrations/:id/feedback",
            get(list_run_feedback).post(post_run_feedback),
        )
        .route("/orchestrations/:id/cancel", post(cancel_run))
        .route("/admin/runs", get(admin_runs))
        .route("/admin/tasks", get(admin_tasks))
        .route("/admin/queue", get(admin_queue))
        .route("/admin/evaluations", get(admin_evaluations))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Start a run; the workflow continues in the background.
async fn start_run(State(ctx): State<Arc<AppContext>>, Json(input): Json<Value>) -> Response {
    let run_id = ctx.orchestrator.start_run_async(input).await;
    info!(run_id = %run_id, "Run accepted");
    success_with_status(StatusCode::CREATED, json!({ "runId": run_id }))
}

/// List all runs, newest first.
async fn list_runs(State(ctx): State<Arc<AppContext>>) -> Response {
    success(ctx.store.list_runs().await)
}

/// Get a run by id.
async fn get_run(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> Response {
    match ctx.store.get_run(&RunId::from(id)).await {
        Some(run) => success(run),
        None => run_not_found(),
    }
}

/// List a run's tasks in creation order.
async fn list_run_tasks(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> Response {
    let run_id = RunId::from(id);
    if ctx.store.get_run(&run_id).await.is_none() {
        return run_not_found();
    }
    success(ctx.store.list_tasks_by_run(&run_id).await)
}

/// List a run's events in chronological order.
async fn list_run_logs(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> Response {
    let run_id = RunId::from(id);
    if ctx.store.get_run(&run_id).await.is_none() {
        return run_not_found();
    }
    success(ctx.store.list_events_by_run(&run_id).await)
}

/// List a run's events as single-line strings.
async fn list_run_logs_compact(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Response {
    let run_id = RunId::from(id);
    if ctx.store.get_run(&run_id).await.is_none() {
        return run_not_found();
    }
    let lines: Vec<String> = ctx
        .store
        .list_events_by_run(&run_id)
        .await
        .iter()
        .map(render_compact)
        .collect();
    success(lines)
}

/// Render one event as `<iso-timestamp> [<agent>] <type>: <message>`.
fn render_compact(event: &Event) -> String {
    format!(
        "{} [{}] {}: {}",
        event.timestamp.to_rfc3339(),
        event.agent,
        event.event_type,
        event.message
    )
}

/// List a run's feedback.
async fn list_run_feedback(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Response {
    let run_id = RunId::from(id);
    if ctx.store.get_run(&run_id).await.is_none() {
        return run_not_found();
    }
    success(ctx.store.list_feedback_by_run(&run_id).await)
}

/// Record feedback for a run.
async fn post_run_feedback(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(new): Json<NewFeedback>,
) -> Response {
    let run_id = RunId::from(id);
    if ctx.store.get_run(&run_id).await.is_none() {
        return run_not_found();
    }
    if let Err(e) = new.validate() {
        return failure(StatusCode::BAD_REQUEST, &e.to_string());
    }
    let feedback = ctx.store.create_feedback(run_id, new).await;
    success_with_status(StatusCode::CREATED, feedback)
}

/// Cancel a run. Flips the stored status only; in-flight work finishes.
async fn cancel_run(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> Response {
    match ctx.orchestrator.cancel_run(&RunId::from(id)).await {
        Some(run) => success(run),
        None => run_not_found(),
    }
}

/// All runs, for introspection.
async fn admin_runs(State(ctx): State<Arc<AppContext>>) -> Response {
    success(ctx.store.list_runs().await)
}

/// All tasks, for introspection.
async fn admin_tasks(State(ctx): State<Arc<AppContext>>) -> Response {
    success(ctx.store.list_tasks().await)
}

/// Queue counters, for introspection.
async fn admin_queue(State(ctx): State<Arc<AppContext>>) -> Response {
    success(ctx.queue.queue_state())
}

/// All recorded feedback, for introspection.
async fn admin_evaluations(State(ctx): State<Arc<AppContext>>) -> Response {
    success(ctx.store.list_all_feedback().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courseforge_core::{AgentKind, EventId, EventType};

    #[test]
    fn test_render_compact_line() {
        let event = Event {
            id: EventId::new("e1"),
            run_id: RunId::new("r1"),
            task_id: None,
            agent: AgentKind::Discovery,
            event_type: EventType::TaskStarted,
            message: "Task started on agent discovery".to_string(),
            meta: None,
            timestamp: chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        };
        let line = render_compact(&event);
        assert!(line.starts_with("2025-06-01T12:00:00"));
        assert!(line.contains("[discovery] task_started: Task started on agent discovery"));
    }
}
