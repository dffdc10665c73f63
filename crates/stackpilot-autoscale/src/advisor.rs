//! Reasoning service client (Gemini `generateContent`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stackpilot_core::config::AdvisorConfig;

use crate::error::{AdvisorError, AdvisorResult};

/// External text-generation backend consulted for scaling advice.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Free-form completion of `prompt`.
    async fn generate(&self, prompt: &str) -> AdvisorResult<String>;
}

// ── Wire types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// `candidates[0].content.parts[0].text`
    fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

// ── Client ────────────────────────────────────────────────────────

/// [`ReasoningService`] over the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(config: &AdvisorConfig, api_key: impl Into<String>) -> AdvisorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AdvisorError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    /// Client for `config`, or `None` when no API key is configured.
    pub fn from_config(config: &AdvisorConfig) -> AdvisorResult<Option<Self>> {
        match config.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Self::new(config, key).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ReasoningService for GeminiClient {
    async fn generate(&self, prompt: &str) -> AdvisorResult<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model);
        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
                top_p: 0.8,
                top_k: 10,
            },
        };

        // The key travels in the query string; keep it out of error text.
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AdvisorError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdvisorError::Status(status.as_u16()));
        }
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AdvisorError::Decode(e.without_url().to_string()))?;

        let text = parsed.into_text().ok_or(AdvisorError::EmptyResponse)?;
        debug!(model = %self.model, chars = text.len(), "reasoning response received");
        Ok(text)
    }
}
