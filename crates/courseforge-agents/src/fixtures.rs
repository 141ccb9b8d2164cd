//! Canned stage results used by every simulation path.
//!
//! A run in simulation mode (or a run whose model calls fail) produces
//! exactly this content, so the end-to-end pipeline stays testable
//! without a network.

use serde_json::{json, Value};

use courseforge_core::AgentKind;

/// The fixture result for a stage, themed to the run's topic when one
/// was declared.
pub fn fixture_for(stage: AgentKind, topic: Option<&str>) -> Value {
    let topic = topic.unwrap_or("the subject");
    match stage {
        AgentKind::Discovery => json!({
            "audience": "working professionals new to the subject",
            "priorKnowledge": ["basic computer literacy"],
            "keyThemes": [
                format!("core concepts of {}", topic),
                "hands-on practice",
                "common pitfalls",
            ],
            "recommendedDepth": "introductory",
        }),
        AgentKind::StrategySelection => json!({
            "strategy": "project-based",
            "rationale": "adult learners retain more when concepts are applied to a running project",
            "techniques": ["worked examples", "incremental project milestones", "peer review"],
        }),
        AgentKind::Generation => json!({
            "title": format!("Getting Productive with {}", topic),
            "overview": format!(
                "A practical introduction to {} built around one growing project.",
                topic
            ),
            "modules": [
                {
                    "title": "Orientation",
                    "summary": format!("Why {} matters and what the project will build.", topic),
                    "activities": ["environment setup", "project kickoff"],
                },
                {
                    "title": "Core Concepts",
                    "summary": "The fundamentals, applied immediately to the project.",
                    "activities": ["guided exercises", "first milestone"],
                },
                {
                    "title": "Putting It Together",
                    "summary": "Finishing the project and reviewing the result.",
                    "activities": ["final milestone", "peer review session"],
                },
            ],
        }),
        AgentKind::Validation => json!({
            "pass": true,
            "andragogyScore": 0.82,
            "pedagogyScore": 0.78,
            "reasons": [],
        }),
        AgentKind::Workflow | AgentKind::Default => json!({}),
    }
}
