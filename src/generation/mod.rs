//! Answer generation through a hosted large language model.
//!
//! The processing layer hands a fully composed prompt to a [`GenerationClient`] and returns the
//! model's text untouched. The Gemini client issues `generateContent` requests directly over
//! HTTP, mirroring the embedding adapter.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider could not be reached or the model does not exist.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response (auth, quota, content policy).
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed or carried no text.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Request passed to the generation provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Prompt assembled by the processing pipeline.
    pub prompt: String,
    /// Decoding temperature.
    pub temperature: f32,
}

/// Interface implemented by generative language providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a completion for the prompt and return its text verbatim.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Build the generation client for the given configuration.
pub fn get_generation_client(config: &Config) -> Box<dyn GenerationClient> {
    if config.api_key.is_none() {
        tracing::warn!("API_KEY is not set; answer generation requests will be rejected");
    }
    Box::new(GeminiGenerationClient::new(
        config.gemini_base_url.clone(),
        config.api_key.clone().unwrap_or_default(),
    ))
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiGenerationClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiGenerationClient {
    /// Build a client against `base_url` (for example `https://generativelanguage.googleapis.com/v1beta`).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = Client::builder()
            .user_agent("rusty-docqa/generate")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.trim_start_matches("models/");
        format!(
            "{}/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[async_trait]
impl GenerationClient for GeminiGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let payload = GenerateContentRequest {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        };

        let endpoint = self.endpoint(&request.model);
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationClientError::ProviderUnavailable(format!(
                "Gemini endpoint {endpoint} returned 404"
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let body: GenerateContentResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Gemini response: {error}"
            ))
        })?;

        if let Some(reason) = body
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            return Err(GenerationClientError::GenerationFailed(format!(
                "prompt blocked: {reason}"
            )));
        }

        let candidate = body.candidates.into_iter().next().ok_or_else(|| {
            GenerationClientError::InvalidResponse("response contained no candidates".into())
        })?;
        let finish_reason = candidate.finish_reason;
        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GenerationClientError::InvalidResponse(format!(
                "candidate carried no text (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        tracing::debug!(
            model = %request.model,
            finish_reason = finish_reason.as_deref().unwrap_or("unknown"),
            characters = text.chars().count(),
            "Gemini answer received"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "gemini-2.5-flash".into(),
            prompt: "Context: x, Question: y".into(),
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn gemini_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = GeminiGenerationClient::new(server.base_url(), "secret");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-2.5-flash:generateContent")
                    .header("x-goog-api-key", "secret")
                    .json_body(json!({
                        "contents": [{
                            "role": "user",
                            "parts": [{ "text": "Context: x, Question: y" }]
                        }],
                        "generationConfig": { "temperature": 0.3 }
                    }));
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "The answer " }, { "text": "is 42." }] },
                        "finishReason": "STOP"
                    }]
                }));
            })
            .await;

        let answer = client.generate(request()).await.expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "The answer is 42.");
    }

    #[tokio::test]
    async fn gemini_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = GeminiGenerationClient::new(server.base_url(), "bad-key");

        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(403).body("API key not valid");
            })
            .await;

        let error = client.generate(request()).await.expect_err("error response");
        assert!(
            matches!(error, GenerationClientError::GenerationFailed(ref message) if message.contains("403"))
        );
    }

    #[tokio::test]
    async fn blocked_prompt_is_an_error() {
        let server = MockServer::start_async().await;
        let client = GeminiGenerationClient::new(server.base_url(), "secret");

        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({
                    "promptFeedback": { "blockReason": "SAFETY" }
                }));
            })
            .await;

        let error = client.generate(request()).await.expect_err("blocked");
        assert!(
            matches!(error, GenerationClientError::GenerationFailed(ref message) if message.contains("SAFETY"))
        );
    }

    #[tokio::test]
    async fn empty_candidate_is_invalid_response() {
        let server = MockServer::start_async().await;
        let client = GeminiGenerationClient::new(server.base_url(), "secret");

        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({
                    "candidates": [{ "finishReason": "MAX_TOKENS" }]
                }));
            })
            .await;

        let error = client.generate(request()).await.expect_err("empty");
        assert!(
            matches!(error, GenerationClientError::InvalidResponse(ref message) if message.contains("MAX_TOKENS"))
        );
    }

    #[test]
    fn endpoint_accepts_prefixed_model_names() {
        let client = GeminiGenerationClient::new("https://example.test/v1beta/", "k");
        assert_eq!(
            client.endpoint("models/gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
