//! Multimodal inference client
//!
//! Thin client for an OpenAI-compatible chat-completions endpoint that
//! accepts an image payload plus a textual context payload and returns
//! structured JSON text. The service is treated as unreliable: responses may
//! be malformed, fields may be missing, and calls may time out — callers
//! validate everything downstream.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Inference call errors. A timeout is treated identically to any other
/// call failure by callers.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Inference call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference service rejected the request: {0}")]
    Api(String),

    #[error("Inference service returned an empty completion")]
    Empty,
}

/// One completion request against the multimodal capability
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// JPEG bytes of the frame under analysis, if the stage is image-driven
    pub image: Option<Vec<u8>>,
    /// Structured context (prior stage outputs, temporal window contents)
    pub context: Option<serde_json::Value>,
    /// Ask the service for a JSON-only response
    pub json_only: bool,
}

/// External multimodal inference capability
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, InferenceError>;
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the OpenAI-compatible endpoint (no trailing path)
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("FRAMESIGHT_INFERENCE_URL")
                .unwrap_or_else(|_| "http://localhost:1234/v1".to_string()),
            model: std::env::var("FRAMESIGHT_INFERENCE_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            api_key: std::env::var("FRAMESIGHT_INFERENCE_API_KEY").ok(),
            timeout: Duration::from_secs(60),
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatMessage {
    Text { role: &'static str, content: String },
    Parts {
        role: &'static str,
        content: Vec<ContentPart>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible multimodal endpoint
pub struct HttpInferenceClient {
    client: reqwest::Client,
    config: InferenceConfig,
}

impl HttpInferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InferenceError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }
}

fn build_body(config: &InferenceConfig, request: &CompletionRequest) -> ChatRequest {
    let mut user_text = request.user_prompt.clone();
    if let Some(context) = &request.context {
        user_text.push_str("\n\nContext:\n");
        user_text.push_str(&context.to_string());
    }

    let mut parts = vec![ContentPart::Text { text: user_text }];
    if let Some(image) = &request.image {
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(image));
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl { url: data_url },
        });
    }

    ChatRequest {
        model: config.model.clone(),
        messages: vec![
            ChatMessage::Text {
                role: "system",
                content: request.system_prompt.clone(),
            },
            ChatMessage::Parts {
                role: "user",
                content: parts,
            },
        ],
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        response_format: request
            .json_only
            .then_some(ResponseFormat {
                format_type: "json_object",
            }),
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, InferenceError> {
        let body = build_body(&self.config, &request);
        let url = format!("{}/chat/completions", self.config.endpoint);
        debug!(model = %self.config.model, url = %url, "Issuing inference call");

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(self.config.timeout)
            } else {
                InferenceError::Http(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api(format!("{status}: {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Http(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(InferenceError::Empty)
    }
}

/// Strip markdown code fences a model may wrap its JSON in
#[must_use]
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line ("json", "JSON", or empty)
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences_variants() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_body_includes_image_and_context() {
        let config = InferenceConfig {
            endpoint: "http://localhost".to_string(),
            model: "test-model".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
            max_tokens: 256,
            temperature: 0.0,
        };
        let request = CompletionRequest {
            system_prompt: "be terse".to_string(),
            user_prompt: "describe".to_string(),
            image: Some(vec![1, 2, 3]),
            context: Some(serde_json::json!({"objects": ["dog"]})),
            json_only: true,
        };

        let body = serde_json::to_value(build_body(&config, &request)).unwrap();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");

        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        let text = parts[0]["text"].as_str().unwrap();
        assert!(text.contains("describe"));
        assert!(text.contains("objects"));
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_body_without_image_has_single_part() {
        let config = InferenceConfig {
            endpoint: "http://localhost".to_string(),
            model: "test-model".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
            max_tokens: 256,
            temperature: 0.0,
        };
        let request = CompletionRequest {
            system_prompt: "s".to_string(),
            user_prompt: "u".to_string(),
            image: None,
            context: None,
            json_only: false,
        };

        let body = serde_json::to_value(build_body(&config, &request)).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"][1]["content"].as_array().unwrap().len(), 1);
    }
}
