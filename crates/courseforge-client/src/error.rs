//! Error types for the API client.

use thiserror::Error;

/// Errors that can occur when talking to the orchestration API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with its error envelope.
    #[error("API error: {0}")]
    Api(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
