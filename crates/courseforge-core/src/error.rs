//! Core domain errors.

use thiserror::Error;

/// Core domain errors for Courseforge.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Run not found.
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
