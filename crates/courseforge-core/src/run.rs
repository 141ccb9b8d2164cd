//! The Run entity: one end-to-end pipeline execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{RunId, RunStatus};

/// A Run represents one user-initiated pipeline execution.
///
/// `output` and `error` are mutually exclusive: `output` is set only when
/// the run completes and validation passes, `error` only when it fails.
/// Both stay empty until a terminal status is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// Unique run identifier.
    pub id: RunId,

    /// Current run status.
    pub status: RunStatus,

    /// Opaque request payload as submitted by the client.
    pub input: Value,

    /// Assembled stage outputs, PII-redacted. Success only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Failure message. Failure only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the run was created.
    pub created_at: DateTime<Utc>,

    /// When the run was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Create a new Run in the `Created` state.
    pub fn new(input: Value) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::generate(),
            status: RunStatus::Created,
            input,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether this run requested simulation mode (`input.simulation == true`).
    pub fn simulation_requested(&self) -> bool {
        self.input
            .get("simulation")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The topic the run declared, if any.
    pub fn topic(&self) -> Option<&str> {
        self.input.get("topic").and_then(Value::as_str)
    }
}
