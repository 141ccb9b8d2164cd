//! The pipeline stage enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The agent stage a task belongs to.
///
/// Stages are a closed set; anything else (a typo, a stage from a newer
/// client) deserializes to [`AgentKind::Default`], which resolves to the
/// registry's no-op fallback handler instead of failing the lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    /// Researches the subject area for the requested content.
    Discovery,
    /// Picks the pedagogical strategy based on discovery findings.
    StrategySelection,
    /// Produces the course/project artifact.
    Generation,
    /// Scores the generated artifact and decides pass/fail.
    Validation,
    /// Not a stage: attributed to run-level events the orchestrator emits.
    Workflow,
    /// Fallback stage for unknown or unregistered agents.
    #[default]
    #[serde(other)]
    Default,
}

impl AgentKind {
    /// Stage name as it appears in events and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::StrategySelection => "strategy-selection",
            Self::Generation => "generation",
            Self::Validation => "validation",
            Self::Workflow => "workflow",
            Self::Default => "default",
        }
    }

    /// The four pipeline stages in execution order.
    pub fn pipeline() -> [AgentKind; 4] {
        [
            Self::Discovery,
            Self::StrategySelection,
            Self::Generation,
            Self::Validation,
        ]
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
