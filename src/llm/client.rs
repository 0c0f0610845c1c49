//! Judge client trait and the OpenAI-compatible implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

use super::pool::EndpointPool;
use super::types::{ChatMessage, CompletionRequest};

/// Judge client surface: one content string per requested completion.
///
/// Implementations may fail transiently; callers own the retry policy.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// Issue a completion request and return the generated texts in order.
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<String>>;
}

/// Configuration for the OpenAI-compatible judge client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Sampling temperature applied when the request leaves it unset.
    pub temperature: f64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs: 300,
            temperature: 0.7,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Judge client speaking the OpenAI chat-completions wire format, rotating
/// requests across an [`EndpointPool`].
pub struct OpenAiCompatClient {
    config: ClientConfig,
    pool: EndpointPool,
    http: Client,
}

impl OpenAiCompatClient {
    pub fn new(config: ClientConfig, pool: EndpointPool) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, pool, http })
    }

    /// Number of endpoints this client rotates over.
    pub fn endpoint_count(&self) -> usize {
        self.pool.len()
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    n: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl JudgeClient for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<String>> {
        let endpoint = self.pool.next_endpoint();
        let url = format!("{}/chat/completions", endpoint.trim_end_matches('/'));

        let api_request = ApiRequest {
            model: &self.config.model,
            messages: &request.messages,
            n: request.completions,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::transport(format!("request to {} failed: {}", endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                return Err(Error::transport(format!(
                    "judge error at {} ({}): {}",
                    endpoint, status, error.error.message
                )));
            }
            return Err(Error::transport(format!(
                "judge error at {} ({}): {}",
                endpoint, status, body
            )));
        }

        let api_response: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| Error::transport(format!("failed to parse response: {}", e)))?;

        if api_response.choices.is_empty() {
            return Err(Error::transport("no choices in response".to_string()));
        }

        Ok(api_response
            .choices
            .into_iter()
            .map(|choice| choice.message.content)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("test-key", "judge-8b")
            .with_timeout(60)
            .with_temperature(0.2);

        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.model, "judge-8b");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.temperature, 0.2);
    }

    #[test]
    fn test_api_request_wire_shape() {
        let messages = vec![ChatMessage::user("hi")];
        let api_request = ApiRequest {
            model: "judge-8b",
            messages: &messages,
            n: 2,
            temperature: 0.7,
            max_tokens: None,
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
        };
        let json = serde_json::to_string(&api_request).unwrap();
        assert!(json.contains("\"n\":2"));
        assert!(json.contains("\"response_format\":{\"type\":\"json_object\"}"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_api_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"first"}},{"message":{"role":"assistant","content":"second"}}]}"#;
        let response: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices.len(), 2);
        assert_eq!(response.choices[0].message.content, "first");
    }
}
