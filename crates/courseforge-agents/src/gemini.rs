//! Gemini HTTP client.
//!
//! Thin JSON client for the `generateContent` endpoint. The stage
//! handlers treat every error here as a cue to fall back to fixtures;
//! nothing in this module retries.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::AgentError;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable overriding the model name.
pub const MODEL_ENV: &str = "GEMINI_MODEL";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Client for the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    inner: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a client with an explicit key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            inner: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build a client from the environment.
    ///
    /// Returns `None` when no API key is configured - the caller treats
    /// that as "model unavailable" and stays on fixtures.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())?;
        let model =
            std::env::var(MODEL_ENV).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(api_key, model))
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a prompt and parse the response text as JSON.
    pub async fn generate_json(&self, prompt: &str) -> Result<Value, AgentError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            API_BASE, self.model, self.api_key
        );
        debug!(model = %self.model, prompt_len = prompt.len(), "Calling Gemini");

        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"responseMimeType": "application/json"},
        });

        let response = self
            .inner
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: GenerateResponse = response.json().await?;

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }

        let cleaned = strip_code_fences(&text);
        serde_json::from_str(cleaned).map_err(|e| AgentError::Unparseable(e.to_string()))
    }
}

/// Strip a surrounding markdown code fence, if present.
///
/// Models frequently wrap JSON in ```json ... ``` even when asked not
/// to; the fence label on the opening line is discarded with it.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
