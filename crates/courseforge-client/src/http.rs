//! HTTP client for the orchestration API.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use courseforge_core::{Event, Feedback, Run, Task};

use crate::error::ClientError;

/// One `{ ok, data | error }` response envelope.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    message: String,
}

/// Client for the Courseforge orchestration API.
pub struct ApiClient {
    inner: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client against the given base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check if the server is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = format!("{}/health", self.base_url);
        debug!(url = %url, "Checking health");

        let response = self.inner.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Start a run; returns the new run id.
    pub async fn start_run(&self, input: Value) -> Result<String, ClientError> {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Started {
            run_id: String,
        }
        let started: Started = self.post_json("/orchestrations", &input).await?;
        Ok(started.run_id)
    }

    /// Get a run by id.
    pub async fn get_run(&self, run_id: &str) -> Result<Run, ClientError> {
        self.get_json(&format!("/orchestrations/{}", run_id)).await
    }

    /// List all runs, newest first.
    pub async fn list_runs(&self) -> Result<Vec<Run>, ClientError> {
        self.get_json("/orchestrations").await
    }

    /// List a run's tasks.
    pub async fn list_tasks(&self, run_id: &str) -> Result<Vec<Task>, ClientError> {
        self.get_json(&format!("/orchestrations/{}/tasks", run_id))
            .await
    }

    /// List a run's events.
    pub async fn list_logs(&self, run_id: &str) -> Result<Vec<Event>, ClientError> {
        self.get_json(&format!("/orchestrations/{}/logs", run_id))
            .await
    }

    /// List a run's events as single-line strings.
    pub async fn list_logs_compact(&self, run_id: &str) -> Result<Vec<String>, ClientError> {
        self.get_json(&format!("/orchestrations/{}/logs/compact", run_id))
            .await
    }

    /// Cancel a run.
    pub async fn cancel_run(&self, run_id: &str) -> Result<Run, ClientError> {
        self.post_json(&format!("/orchestrations/{}/cancel", run_id), &Value::Null)
            .await
    }

    /// Record feedback for a run.
    pub async fn post_feedback(
        &self,
        run_id: &str,
        feedback: Value,
    ) -> Result<Feedback, ClientError> {
        self.post_json(&format!("/orchestrations/{}/feedback", run_id), &feedback)
            .await
    }

    /// List a run's feedback.
    pub async fn list_feedback(&self, run_id: &str) -> Result<Vec<Feedback>, ClientError> {
        self.get_json(&format!("/orchestrations/{}/feedback", run_id))
            .await
    }

    /// Current queue counters.
    pub async fn queue_state(&self) -> Result<Value, ClientError> {
        self.get_json("/admin/queue").await
    }

    /// GET a path and unwrap the envelope.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await?;
        Self::unwrap_envelope(path, response).await
    }

    /// POST a JSON body and unwrap the envelope.
    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST request");

        let response = self.inner.post(&url).json(body).send().await?;
        Self::unwrap_envelope(path, response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))?;

        if envelope.ok {
            envelope
                .data
                .ok_or_else(|| ClientError::Serialization("missing data field".to_string()))
        } else {
            let message = envelope
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {}", status));
            if status == reqwest::StatusCode::NOT_FOUND {
                Err(ClientError::NotFound(format!("{}: {}", path, message)))
            } else {
                Err(ClientError::Api(message))
            }
        }
    }
}
