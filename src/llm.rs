//! Gemini `generateContent` client.
//!
//! One prompt in, one request out. Failures are sorted into a
//! [`ModelError`] category that carries the provider's message verbatim and
//! a short hint for the user. There is no retry and no backoff: whatever
//! the first call returns is what the user sees.
//!
//! An HTTP 200 whose candidates carry no text (safety filtering, recitation
//! checks, a blocked prompt) is not an error. It comes back as an empty
//! [`Generation`] with the reasons collected in `diagnostics`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ApiKey, ModelConfig};
use crate::traits::{Generation, GenerationParams, GenerativeModel};

/// A failed model call, by cause.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("quota exceeded: {0}")]
    Quota(String),
    #[error("request too large: {0}")]
    PayloadTooLarge(String),
    #[error("content blocked: {0}")]
    ContentBlocked(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ModelError {
    pub fn category(&self) -> &'static str {
        match self {
            ModelError::Authentication(_) => "authentication",
            ModelError::Quota(_) => "quota",
            ModelError::PayloadTooLarge(_) => "payload_too_large",
            ModelError::ContentBlocked(_) => "content_blocked",
            ModelError::Server(_) => "server",
            ModelError::Transport(_) => "transport",
            ModelError::InvalidRequest(_) => "invalid_request",
            ModelError::MalformedResponse(_) => "malformed_response",
        }
    }

    /// The provider's own message, unmodified.
    pub fn detail(&self) -> &str {
        match self {
            ModelError::Authentication(d)
            | ModelError::Quota(d)
            | ModelError::PayloadTooLarge(d)
            | ModelError::ContentBlocked(d)
            | ModelError::Server(d)
            | ModelError::Transport(d)
            | ModelError::InvalidRequest(d)
            | ModelError::MalformedResponse(d) => d,
        }
    }

    pub fn guidance(&self) -> &'static str {
        match self {
            ModelError::Authentication(_) => {
                "Check that the API key is valid and enabled for the Generative Language API."
            }
            ModelError::Quota(_) => "Rate limit or quota reached. Wait a moment or check billing.",
            ModelError::PayloadTooLarge(_) => {
                "The prompt is too large. Lower query.cutoff_chars or upload fewer files."
            }
            ModelError::ContentBlocked(_) => {
                "The provider refused the content. Rephrase the question or remove sensitive files."
            }
            ModelError::Server(_) => "The provider had a temporary problem. Try again later.",
            ModelError::Transport(_) => "Could not reach the provider. Check the network and endpoint.",
            ModelError::InvalidRequest(_) => "The request was rejected. Check the model name and settings.",
            ModelError::MalformedResponse(_) => "The provider answered in an unexpected format.",
        }
    }
}

pub fn generation_params(config: &ModelConfig) -> GenerationParams {
    GenerationParams {
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
    }
}

// ============ Client ============

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: ApiKey,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig, api_key: ApiKey) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ModelError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig::from_params(params),
        };

        tracing::debug!(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "sending generateContent"
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify(status.as_u16(), &body));
        }
        parse_response(&body)
    }
}

// ============ Wire format ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    fn from_params(params: &GenerationParams) -> Option<Self> {
        if params.temperature.is_none() && params.max_output_tokens.is_none() {
            return None;
        }
        Some(Self {
            temperature: params.temperature,
            max_output_tokens: params.max_output_tokens,
        })
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PromptFeedback {
    block_reason: Option<String>,
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SafetyRating {
    category: String,
    probability: String,
    blocked: bool,
}

impl SafetyRating {
    fn is_notable(&self) -> bool {
        self.blocked || matches!(self.probability.as_str(), "MEDIUM" | "HIGH")
    }

    fn describe(&self) -> String {
        let mut s = format!("{}: {}", self.category, self.probability);
        if self.blocked {
            s.push_str(" (blocked)");
        }
        s
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Text of the first candidate, or an empty generation with the reasons
/// the provider gave for not answering.
fn parse_response(body: &str) -> Result<Generation, ModelError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

    let text: String = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if !text.trim().is_empty() {
        return Ok(Generation::answer(text));
    }

    let mut diagnostics = Vec::new();
    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            diagnostics.push(format!("prompt blocked: {}", reason));
        }
        diagnostics.extend(
            feedback
                .safety_ratings
                .iter()
                .filter(|r| r.is_notable())
                .map(SafetyRating::describe),
        );
    }
    for candidate in &response.candidates {
        if let Some(reason) = &candidate.finish_reason {
            if reason != "STOP" {
                diagnostics.push(format!("finish reason: {}", reason));
            }
        }
        diagnostics.extend(
            candidate
                .safety_ratings
                .iter()
                .filter(|r| r.is_notable())
                .map(SafetyRating::describe),
        );
    }

    Ok(Generation {
        text: String::new(),
        diagnostics,
    })
}

/// Sort a non-2xx response into a category, keeping the message verbatim.
fn classify(status: u16, body: &str) -> ModelError {
    let (message, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => (env.error.message, env.error.status),
        Err(_) => (body.chars().take(1000).collect(), String::new()),
    };
    let detail = if api_status.is_empty() {
        format!("HTTP {}: {}", status, message)
    } else {
        format!("HTTP {} {}: {}", status, api_status, message)
    };
    let lower = message.to_lowercase();

    match status {
        401 | 403 => ModelError::Authentication(detail),
        400 if lower.contains("api key") || api_status == "UNAUTHENTICATED" => {
            ModelError::Authentication(detail)
        }
        429 => ModelError::Quota(detail),
        413 => ModelError::PayloadTooLarge(detail),
        400 if lower.contains("exceeds the maximum") || lower.contains("too large") => {
            ModelError::PayloadTooLarge(detail)
        }
        400 if lower.contains("safety") || lower.contains("blocked") => {
            ModelError::ContentBlocked(detail)
        }
        s if s >= 500 => ModelError::Server(detail),
        _ => ModelError::InvalidRequest(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"6"},{"text":"0"}]},"finishReason":"STOP"}]}"#;
        let out = parse_response(body).unwrap();
        assert_eq!(out.text, "60");
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn blocked_prompt_is_empty_with_diagnostics() {
        let body = r#"{
            "promptFeedback": {
                "blockReason": "SAFETY",
                "safetyRatings": [
                    {"category": "HARM_CATEGORY_HARASSMENT", "probability": "HIGH", "blocked": true},
                    {"category": "HARM_CATEGORY_HATE_SPEECH", "probability": "NEGLIGIBLE"}
                ]
            }
        }"#;
        let out = parse_response(body).unwrap();
        assert!(out.is_empty());
        assert_eq!(
            out.diagnostics,
            vec![
                "prompt blocked: SAFETY".to_string(),
                "HARM_CATEGORY_HARASSMENT: HIGH (blocked)".to_string(),
            ]
        );
    }

    #[test]
    fn empty_candidate_reports_finish_reason() {
        let body = r#"{"candidates":[{"finishReason":"RECITATION"}]}"#;
        let out = parse_response(body).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.diagnostics, vec!["finish reason: RECITATION".to_string()]);
    }

    #[test]
    fn no_diagnostics_when_provider_says_nothing() {
        let out = parse_response(r#"{"candidates":[]}"#).unwrap();
        assert!(out.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn garbage_body_is_malformed() {
        let err = parse_response("<html>oops</html>").unwrap_err();
        assert_eq!(err.category(), "malformed_response");
    }

    #[test]
    fn classify_by_status_and_message() {
        let bad_key = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let err = classify(400, bad_key);
        assert_eq!(err.category(), "authentication");
        assert_eq!(
            err.detail(),
            "HTTP 400 INVALID_ARGUMENT: API key not valid. Please pass a valid API key."
        );

        assert_eq!(classify(429, "{}").category(), "quota");
        assert_eq!(classify(413, "too big").category(), "payload_too_large");
        assert_eq!(classify(503, "unavailable").category(), "server");
        assert_eq!(classify(404, "no such model").category(), "invalid_request");
        assert_eq!(
            classify(
                400,
                r#"{"error":{"message":"The input token count (3000000) exceeds the maximum number of tokens allowed"}}"#
            )
            .category(),
            "payload_too_large"
        );
    }

    #[test]
    fn generation_config_omitted_without_params() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: "hi" }],
            }],
            generation_config: GenerationConfig::from_params(&GenerationParams::default()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("generationConfig").is_none());

        let params = GenerationParams {
            temperature: Some(0.2),
            max_output_tokens: Some(256),
        };
        let cfg = serde_json::to_value(GenerationConfig::from_params(&params)).unwrap();
        assert_eq!(cfg["maxOutputTokens"], 256);
        assert!(cfg.get("temperature").is_some());
    }
}
