//! Normalization of live model output into canonical stage shapes.
//!
//! Model JSON varies: field names drift (`targetAudience` vs `audience`),
//! and arrays sometimes arrive as numeric-keyed objects
//! (`{"0": ..., "1": ...}`). Each stage's raw output is coerced and then
//! deserialized through a canonical struct whose serde aliases absorb the
//! drift; anything that still fails is treated as unparseable and the
//! caller falls back to fixtures.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use courseforge_core::AgentKind;

/// Canonical discovery output.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryOutcome {
    #[serde(alias = "targetAudience", alias = "audienceProfile", default)]
    pub audience: String,

    #[serde(alias = "prerequisites", alias = "assumedKnowledge", default)]
    pub prior_knowledge: Vec<String>,

    #[serde(alias = "themes", alias = "topics", default)]
    pub key_themes: Vec<String>,

    #[serde(alias = "depth", default)]
    pub recommended_depth: String,
}

/// Canonical strategy-selection output.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOutcome {
    #[serde(alias = "selectedStrategy", alias = "approach", default)]
    pub strategy: String,

    #[serde(alias = "reason", alias = "justification", default)]
    pub rationale: String,

    #[serde(alias = "methods", alias = "tactics", default)]
    pub techniques: Vec<String>,
}

/// Canonical generation output.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    #[serde(alias = "courseTitle", alias = "name", default)]
    pub title: String,

    #[serde(alias = "summary", alias = "description", default)]
    pub overview: String,

    #[serde(alias = "units", alias = "sections", default)]
    pub modules: Vec<Module>,
}

/// One module of generated content.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    #[serde(alias = "name", alias = "heading", default)]
    pub title: String,

    #[serde(alias = "description", alias = "content", default)]
    pub summary: String,

    #[serde(alias = "exercises", alias = "tasks", default)]
    pub activities: Vec<String>,
}

/// Canonical validation output.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    #[serde(default)]
    pub pass: Option<bool>,

    #[serde(alias = "andragogy", default)]
    pub andragogy_score: Option<f64>,

    #[serde(alias = "pedagogy", default)]
    pub pedagogy_score: Option<f64>,

    #[serde(alias = "issues", alias = "feedback", default)]
    pub reasons: Vec<String>,
}

/// Normalize a stage's raw model output into its canonical JSON shape.
///
/// Returns `None` when the output cannot be coerced into the stage's
/// shape; the caller treats that exactly like a failed model call.
pub fn normalize_stage(stage: AgentKind, raw: Value) -> Option<Value> {
    let coerced = coerce_numeric_arrays(raw);
    let normalized = match stage {
        AgentKind::Discovery => to_value::<DiscoveryOutcome>(coerced)?,
        AgentKind::StrategySelection => to_value::<StrategyOutcome>(coerced)?,
        AgentKind::Generation => to_value::<GenerationOutcome>(coerced)?,
        AgentKind::Validation => to_value::<ValidationOutcome>(coerced)?,
        AgentKind::Workflow | AgentKind::Default => coerced,
    };
    Some(normalized)
}

fn to_value<T: serde::de::DeserializeOwned + Serialize>(raw: Value) -> Option<Value> {
    let outcome: T = serde_json::from_value(raw).ok()?;
    serde_json::to_value(outcome).ok()
}

/// Rewrite numeric-keyed objects (`{"0": a, "1": b}`) as arrays, deeply.
///
/// Keys must form the exact sequence 0..n; anything else stays an object.
pub fn coerce_numeric_arrays(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if is_numeric_sequence(&map) {
                let mut items: Vec<(usize, Value)> = map
                    .into_iter()
                    .map(|(k, v)| (k.parse::<usize>().unwrap_or(usize::MAX), v))
                    .collect();
                items.sort_by_key(|(idx, _)| *idx);
                Value::Array(
                    items
                        .into_iter()
                        .map(|(_, v)| coerce_numeric_arrays(v))
                        .collect(),
                )
            } else {
                Value::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, coerce_numeric_arrays(v)))
                        .collect(),
                )
            }
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(coerce_numeric_arrays).collect())
        }
        other => other,
    }
}

fn is_numeric_sequence(map: &Map<String, Value>) -> bool {
    if map.is_empty() {
        return false;
    }
    let mut indices: Vec<usize> = Vec::with_capacity(map.len());
    for key in map.keys() {
        match key.parse::<usize>() {
            Ok(idx) => indices.push(idx),
            Err(_) => return false,
        }
    }
    indices.sort_unstable();
    indices.iter().enumerate().all(|(expected, &idx)| expected == idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_aliases_absorb_drift() {
        let raw = json!({
            "targetAudience": "university students",
            "prerequisites": ["algebra"],
            "themes": ["functions", "recursion"],
        });
        let out = normalize_stage(AgentKind::Discovery, raw).unwrap();
        assert_eq!(out["audience"], "university students");
        assert_eq!(out["priorKnowledge"][0], "algebra");
        assert_eq!(out["keyThemes"][1], "recursion");
    }

    #[test]
    fn test_numeric_keyed_object_becomes_array() {
        let raw = json!({
            "title": "Course",
            "modules": {
                "0": {"name": "Intro", "content": "start here"},
                "1": {"name": "Practice", "content": "do things"},
            },
        });
        let out = normalize_stage(AgentKind::Generation, raw).unwrap();
        let modules = out["modules"].as_array().unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0]["title"], "Intro");
        assert_eq!(modules[1]["summary"], "do things");
    }

    #[test]
    fn test_gapped_numeric_keys_stay_an_object() {
        let raw = json!({"0": "a", "2": "b"});
        let out = coerce_numeric_arrays(raw);
        assert!(out.is_object());
    }

    #[test]
    fn test_validation_scores_pass_through() {
        let raw = json!({"andragogy": 0.7, "pedagogyScore": 0.4});
        let out = normalize_stage(AgentKind::Validation, raw).unwrap();
        assert_eq!(out["andragogyScore"], 0.7);
        assert_eq!(out["pedagogyScore"], 0.4);
    }

    #[test]
    fn test_hopeless_shape_is_rejected() {
        // A bare scalar cannot become a generation outcome.
        assert!(normalize_stage(AgentKind::Generation, json!(42)).is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let out = normalize_stage(AgentKind::StrategySelection, json!({})).unwrap();
        assert_eq!(out["strategy"], "");
        assert_eq!(out["techniques"].as_array().unwrap().len(), 0);
    }
}
