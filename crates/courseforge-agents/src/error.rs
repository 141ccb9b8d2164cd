//! Agent-layer errors.

use thiserror::Error;

/// Errors from the model layer.
///
/// These never propagate out of a stage handler - they are absorbed into
/// the simulation fallback - but the distinction feeds the `reason` tag
/// on the fallback result and the handler's log lines.
#[derive(Debug, Error)]
pub enum AgentError {
    /// HTTP request to the model failed.
    #[error("Model request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The model returned no usable candidate text.
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// The model's text could not be parsed as JSON.
    #[error("Model output was not valid JSON: {0}")]
    Unparseable(String),
}
