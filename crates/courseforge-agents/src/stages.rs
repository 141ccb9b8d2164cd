//! The four stage handlers and their shared execution ladder.
//!
//! Every handler resolves the same way: simulation mode returns the
//! stage fixture; live mode calls Gemini and normalizes the output; a
//! missing or misbehaving model falls back to the fixture with a
//! `reason` tag. Model problems therefore never fail a task.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use courseforge_core::{AgentKind, Run, Task};
use courseforge_engine::handler::{AgentHandler, AgentRegistry, HandlerError};
use courseforge_engine::store::Store;

use crate::fixtures::fixture_for;
use crate::gemini::GeminiClient;
use crate::normalize::normalize_stage;

/// Result source tag for fixture-backed results.
pub const SOURCE_SIMULATION: &str = "simulation";

/// Result source tag for live model results.
pub const SOURCE_GEMINI: &str = "gemini";

/// Result source tag for the validation relevance pre-check.
pub const SOURCE_RELEVANCE_FILTER: &str = "relevance-filter";

/// Shared state every stage handler needs: the store (for the owning
/// run's input and sibling task results), the process-wide simulation
/// flag, and the optional model client.
pub struct StageContext {
    store: Arc<Store>,
    simulate_all: bool,
    gemini: Option<GeminiClient>,
}

/// How a stage should execute for a given task.
enum Mode {
    /// Return the fixture, optionally tagged with a fallback reason.
    Simulate(Option<&'static str>),
    /// Call the model.
    Live,
}

impl StageContext {
    /// Create a context. Pass `gemini: None` to run fixtures-only.
    pub fn new(store: Arc<Store>, simulate_all: bool, gemini: Option<GeminiClient>) -> Arc<Self> {
        Arc::new(Self {
            store,
            simulate_all,
            gemini,
        })
    }

    /// The owning run, if it still exists.
    async fn run_for(&self, task: &Task) -> Option<Run> {
        self.store.get_run(&task.run_id).await
    }

    /// Resolve the execution mode for a task.
    fn mode_for(&self, run: Option<&Run>) -> Mode {
        let requested = run.map(Run::simulation_requested).unwrap_or(false);
        if requested || self.simulate_all {
            return Mode::Simulate(None);
        }
        if self.gemini.is_none() {
            return Mode::Simulate(Some("gemini_unavailable"));
        }
        Mode::Live
    }

    /// The shared ladder: fixture, or live call with fixture fallback.
    async fn execute_stage(&self, stage: AgentKind, task: &Task) -> Value {
        let run = self.run_for(task).await;
        let topic = run.as_ref().and_then(|r| r.topic().map(str::to_owned));

        match self.mode_for(run.as_ref()) {
            Mode::Simulate(reason) => {
                debug!(task_id = %task.id, agent = %stage, reason = ?reason, "Serving fixture result");
                tag(fixture_for(stage, topic.as_deref()), SOURCE_SIMULATION, reason)
            }
            Mode::Live => {
                let Some(client) = self.gemini.as_ref() else {
                    return tag(
                        fixture_for(stage, topic.as_deref()),
                        SOURCE_SIMULATION,
                        Some("gemini_unavailable"),
                    );
                };
                let prompt = build_prompt(stage, task);
                match client.generate_json(&prompt).await {
                    Ok(raw) => match normalize_stage(stage, raw) {
                        Some(normalized) => tag(normalized, SOURCE_GEMINI, None),
                        None => {
                            warn!(task_id = %task.id, agent = %stage, "Model output had no usable shape");
                            tag(
                                fixture_for(stage, topic.as_deref()),
                                SOURCE_SIMULATION,
                                Some("gemini_call_failed"),
                            )
                        }
                    },
                    Err(e) => {
                        warn!(task_id = %task.id, agent = %stage, error = %e, "Model call failed");
                        tag(
                            fixture_for(stage, topic.as_deref()),
                            SOURCE_SIMULATION,
                            Some("gemini_call_failed"),
                        )
                    }
                }
            }
        }
    }
}

/// Attach the source (and optional reason) tag to a result.
fn tag(mut value: Value, source: &str, reason: Option<&str>) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("source".to_string(), json!(source));
        if let Some(reason) = reason {
            map.insert("reason".to_string(), json!(reason));
        }
    }
    value
}

/// The prompt sent to the model for a stage: the task's description plus
/// the stage's output-shape contract.
fn build_prompt(stage: AgentKind, task: &Task) -> String {
    let shape = match stage {
        AgentKind::Discovery => {
            r#"{"audience": string, "priorKnowledge": [string], "keyThemes": [string], "recommendedDepth": string}"#
        }
        AgentKind::StrategySelection => {
            r#"{"strategy": string, "rationale": string, "techniques": [string]}"#
        }
        AgentKind::Generation => {
            r#"{"title": string, "overview": string, "modules": [{"title": string, "summary": string, "activities": [string]}]}"#
        }
        AgentKind::Validation => {
            r#"{"pass": boolean, "andragogyScore": number, "pedagogyScore": number, "reasons": [string]}"#
        }
        AgentKind::Workflow | AgentKind::Default => "{}",
    };
    format!(
        "{}\n\nRespond with a single JSON object shaped like:\n{}",
        task.description, shape
    )
}

/// Discovery stage: surveys the subject area.
pub struct DiscoveryAgent {
    ctx: Arc<StageContext>,
}

#[async_trait]
impl AgentHandler for DiscoveryAgent {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        Ok(self.ctx.execute_stage(AgentKind::Discovery, task).await)
    }
}

/// Strategy-selection stage: picks the teaching approach.
pub struct StrategyAgent {
    ctx: Arc<StageContext>,
}

#[async_trait]
impl AgentHandler for StrategyAgent {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        Ok(self
            .ctx
            .execute_stage(AgentKind::StrategySelection, task)
            .await)
    }
}

/// Generation stage: produces the course artifact.
pub struct GenerationAgent {
    ctx: Arc<StageContext>,
}

#[async_trait]
impl AgentHandler for GenerationAgent {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        Ok(self.ctx.execute_stage(AgentKind::Generation, task).await)
    }
}

/// Validation stage: scores the artifact, with a relevance pre-check.
pub struct ValidationAgent {
    ctx: Arc<StageContext>,
}

#[async_trait]
impl AgentHandler for ValidationAgent {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        if let Some(verdict) = self.relevance_check(task).await {
            return Ok(verdict);
        }
        Ok(self.ctx.execute_stage(AgentKind::Validation, task).await)
    }
}

impl ValidationAgent {
    /// Short-circuit verdict for off-topic live generations.
    ///
    /// Applies only when the run declared a topic and the generation
    /// output came from the live model: at least half the topic's tokens
    /// must appear in the artifact text, or validation fails without a
    /// model call. Simulated generations skip the check.
    async fn relevance_check(&self, task: &Task) -> Option<Value> {
        let run = self.ctx.run_for(task).await?;
        let topic = run.topic()?.to_owned();

        let generation = self
            .ctx
            .store
            .list_tasks_by_run(&run.id)
            .await
            .into_iter()
            .find(|t| t.agent == AgentKind::Generation)
            .and_then(|t| t.result)?;
        if generation.get("source").and_then(Value::as_str) != Some(SOURCE_GEMINI) {
            return None;
        }

        if topic_is_covered(&topic, &generation.to_string()) {
            return None;
        }

        warn!(
            run_id = %run.id,
            topic = %topic,
            "Generated content does not cover the requested topic"
        );
        Some(json!({
            "pass": false,
            "andragogyScore": 0.05,
            "pedagogyScore": 0.05,
            "reasons": ["generated content does not address the requested topic"],
            "source": SOURCE_RELEVANCE_FILTER,
        }))
    }
}

/// True when at least half of the topic's tokens appear in the text.
fn topic_is_covered(topic: &str, text: &str) -> bool {
    let haystack = text.to_lowercase();
    let tokens: Vec<String> = topic
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect();
    if tokens.is_empty() {
        return true;
    }
    let matched = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    matched * 2 >= tokens.len()
}

/// Build the full registry: the four stage handlers over one shared
/// context, plus the engine's no-op default.
pub fn build_registry(ctx: &Arc<StageContext>) -> AgentRegistry {
    AgentRegistry::new()
        .with_handler(
            AgentKind::Discovery,
            Arc::new(DiscoveryAgent { ctx: Arc::clone(ctx) }),
        )
        .with_handler(
            AgentKind::StrategySelection,
            Arc::new(StrategyAgent { ctx: Arc::clone(ctx) }),
        )
        .with_handler(
            AgentKind::Generation,
            Arc::new(GenerationAgent { ctx: Arc::clone(ctx) }),
        )
        .with_handler(
            AgentKind::Validation,
            Arc::new(ValidationAgent { ctx: Arc::clone(ctx) }),
        )
}
