//! HTTP response envelope types.
//!
//! Every endpoint answers with the same convention:
//! success `{ "ok": true, "data": ... }`, failure
//! `{ "ok": false, "error": { "message": ... } }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// Wrap a payload in the success envelope.
pub fn success<T: Serialize>(data: T) -> Response {
    Json(json!({ "ok": true, "data": data })).into_response()
}

/// Wrap a payload in the success envelope with an explicit status.
pub fn success_with_status<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "ok": true, "data": data }))).into_response()
}

/// Wrap a message in the failure envelope.
pub fn failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "ok": false, "error": { "message": message } })),
    )
        .into_response()
}

/// The 404 every run-scoped endpoint answers for an unknown run id.
pub fn run_not_found() -> Response {
    failure(StatusCode::NOT_FOUND, "Run not found")
}
