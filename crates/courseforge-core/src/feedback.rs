//! User feedback attached to a run's artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FeedbackId, RunId};

/// The user's judgment of a run's artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackDecision {
    /// Artifact accepted as-is.
    Accept,
    /// Artifact accepted after manual edits.
    Edit,
    /// Artifact rejected.
    Reject,
}

/// Feedback attached to a run. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// Unique feedback identifier.
    pub id: FeedbackId,

    /// The run the feedback concerns.
    pub run_id: RunId,

    /// Accept / edit / reject.
    pub decision: FeedbackDecision,

    /// Optional 1-5 rating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,

    /// Optional free-form comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// When the feedback was recorded.
    pub created_at: DateTime<Utc>,
}

/// Input for recording feedback through the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedback {
    /// Accept / edit / reject.
    pub decision: FeedbackDecision,

    /// Optional 1-5 rating.
    #[serde(default)]
    pub rating: Option<u8>,

    /// Optional free-form comment.
    #[serde(default)]
    pub comment: Option<String>,
}

impl NewFeedback {
    /// Validate the rating range (1-5) if a rating is present.
    pub fn validate(&self) -> Result<(), crate::CoreError> {
        match self.rating {
            Some(r) if !(1..=5).contains(&r) => Err(crate::CoreError::InvalidInput(format!(
                "rating must be between 1 and 5, got {}",
                r
            ))),
            _ => Ok(()),
        }
    }
}
