//! HTTP oracle against an OpenAI-compatible chat completions endpoint.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{OracleError, OracleRequest, OracleResult, ReasoningOracle};

/// Fenced ```json blocks in a free-text answer.
static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("FENCED_JSON_RE regex should compile")
});

/// Connection settings for [`HttpOracle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Chat completions URL
    pub endpoint: String,
    /// Model name sent with every request
    pub model: String,
    /// Bearer token, if the endpoint needs one
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token limit
    pub max_tokens: u32,
    /// Skip the network entirely and take every fallback
    pub offline: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/v1/chat/completions".to_string(),
            model: "default".to_string(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.2,
            max_tokens: 1024,
            offline: false,
        }
    }
}

/// Oracle backed by an LLM router.
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> OracleResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    fn build_body(&self, request: &OracleRequest) -> serde_json::Value {
        let subject = serde_json::to_string_pretty(&request.subject)
            .unwrap_or_else(|_| request.subject.to_string());
        let user_prompt = format!(
            "Task: {}\n\nSubject:\n{}\n\nRespond with a single JSON object of this shape and nothing else:\n{}",
            request.kind, subject, request.expected_shape
        );

        serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": request.role_context },
                { "role": "user", "content": user_prompt }
            ]
        })
    }
}

#[async_trait]
impl ReasoningOracle for HttpOracle {
    async fn query(&self, request: &OracleRequest) -> OracleResult<serde_json::Value> {
        let start = Instant::now();

        let mut builder = self
            .client
            .post(&self.config.endpoint)
            .json(&self.build_body(request));
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::RequestFailed(format!(
                "oracle endpoint error ({}): {}",
                status, body
            )));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::ParseError(e.to_string()))?;

        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");

        debug!(
            kind = %request.kind,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Oracle responded"
        );

        extract_json(content)
    }
}

/// Pull the first JSON object out of a free-text answer.
///
/// Accepts a bare object, a fenced ```json block, or prose with an embedded
/// object (first `{` to last `}`).
pub fn extract_json(text: &str) -> OracleResult<serde_json::Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(OracleError::ParseError("empty answer".to_string()));
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }

    if let Some(captures) = FENCED_JSON_RE.captures(trimmed) {
        if let Ok(value) = serde_json::from_str(&captures[1]) {
            return Ok(value);
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| OracleError::ParseError(e.to_string())),
        _ => Err(OracleError::ParseError(
            "no JSON object in answer".to_string(),
        )),
    }
}
