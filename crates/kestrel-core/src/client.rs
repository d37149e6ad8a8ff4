//! OpenRouter HTTP transport — the seam between session state and the wire.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{KestrelError, Result};
use crate::message::ChatMessage;
use crate::model::ModelDescriptor;

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

/// One chat-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Provider-reported usage for one completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub total_cost: f64,
}

/// The assistant reply plus usage accounting for one completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub message: ChatMessage,
    pub usage: CompletionUsage,
}

/// Transport trait — implement this to talk to a different endpoint,
/// or stub it out in tests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Fetch the model catalog.
    async fn fetch_models(&self, api_key: &str) -> Result<Vec<ModelDescriptor>>;

    /// Send a chat completion request.
    async fn complete(&self, api_key: &str, request: CompletionRequest) -> Result<Completion>;
}

/// HTTP client for the OpenRouter API.
pub struct OpenRouterClient {
    client: Client,
    api_base: String,
    referer: Option<String>,
}

impl OpenRouterClient {
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Use a non-default API base (tests, proxies).
    pub fn with_api_base(api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            referer: None,
        }
    }

    /// Attach an `HTTP-Referer` header to completion requests.
    /// OpenRouter uses it for app attribution.
    pub fn with_referer(mut self, referer: &str) -> Self {
        self.referer = Some(referer.to_string());
        self
    }
}

impl Default for OpenRouterClient {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Wire Types ────────────────────────────────────────────

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelDescriptor>,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
    total_cost: Option<f64>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl ChatTransport for OpenRouterClient {
    async fn fetch_models(&self, api_key: &str) -> Result<Vec<ModelDescriptor>> {
        let url = format!("{}/models", self.api_base);

        info!("Fetching model catalog");

        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        debug!("Catalog response status: {}, body length: {}", status, body.len());

        if !status.is_success() {
            return Err(KestrelError::Remote {
                status: Some(status.as_u16()),
                message: format!("HTTP error {}", status.as_u16()),
            });
        }

        let catalog: ModelsResponse = serde_json::from_str(&body)?;
        Ok(catalog.data)
    }

    async fn complete(&self, api_key: &str, request: CompletionRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.api_base);

        info!("Requesting completion from {}", request.model);

        let body = ApiRequest {
            model: request.model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(referer) = &self.referer {
            req = req.header("HTTP-Referer", referer.as_str());
        }

        let resp = req.send().await?;

        let status = resp.status();
        let body_text = resp.text().await?;

        debug!(
            "Completion response status: {}, body length: {}",
            status,
            body_text.len()
        );

        if !status.is_success() {
            // Prefer the provider's own error message when the body has one
            if let Ok(err) = serde_json::from_str::<ApiError>(&body_text) {
                return Err(KestrelError::Remote {
                    status: Some(status.as_u16()),
                    message: err.error.message,
                });
            }
            return Err(KestrelError::Remote {
                status: Some(status.as_u16()),
                message: format!("HTTP error {}", status.as_u16()),
            });
        }

        let api_resp: ApiResponse = serde_json::from_str(&body_text).map_err(|e| {
            KestrelError::Protocol(format!("Failed to parse response: {}", e))
        })?;

        let content = api_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| KestrelError::Protocol("Invalid response from API".to_string()))?;

        let usage = api_resp
            .usage
            .map(|u| CompletionUsage {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
                total_cost: u.total_cost.unwrap_or(0.0),
            })
            .unwrap_or_default();

        Ok(Completion {
            message: ChatMessage::assistant(&content),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "openai/gpt-4-turbo".to_string(),
            messages: vec![ChatMessage::user("What is 2+2?")],
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    #[tokio::test]
    async fn test_fetch_models_parses_catalog() {
        let mut server = mockito::Server::new_async().await;

        let body = r#"{
            "data": [
                {
                    "id": "anthropic/claude-3-sonnet:beta",
                    "name": "Claude 3 Sonnet",
                    "description": "Balanced",
                    "context_length": 200000,
                    "pricing": { "prompt": 0.000003, "completion": 0.000015 }
                },
                {
                    "id": "openai/gpt-3.5-turbo",
                    "name": "GPT-3.5 Turbo",
                    "description": "Fast",
                    "context_length": 16385,
                    "pricing": { "prompt": 0.0000005, "completion": 0.0000015 }
                }
            ]
        }"#;

        let mock = server
            .mock("GET", "/models")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create();

        let client = OpenRouterClient::with_api_base(&server.url());
        let models = client.fetch_models("test-key").await.unwrap();

        mock.assert();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "anthropic/claude-3-sonnet:beta");
        assert_eq!(models[1].name, "GPT-3.5 Turbo");
    }

    #[tokio::test]
    async fn test_fetch_models_unauthorized() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/models")
            .with_status(401)
            .with_body(r#"{"error":{"message":"No auth credentials found","type":"auth","code":401}}"#)
            .create();

        let client = OpenRouterClient::with_api_base(&server.url());
        let err = client.fetch_models("bad-key").await.unwrap_err();

        mock.assert();
        match err {
            KestrelError::Remote { status, message } => {
                assert_eq!(status, Some(401));
                assert!(message.contains("401"));
            }
            other => panic!("expected Remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_basic() {
        let mut server = mockito::Server::new_async().await;

        let body = r#"{
            "choices": [{ "message": { "role": "assistant", "content": "4" } }],
            "usage": {
                "prompt_tokens": 5,
                "completion_tokens": 1,
                "total_tokens": 6,
                "total_cost": 0.0001
            }
        }"#;

        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create();

        let client = OpenRouterClient::with_api_base(&server.url());
        let completion = client.complete("test-key", request()).await.unwrap();

        mock.assert();
        assert_eq!(completion.message.content, "4");
        assert_eq!(completion.usage.prompt_tokens, 5);
        assert_eq!(completion.usage.completion_tokens, 1);
        assert_eq!(completion.usage.total_tokens, 6);
        assert_eq!(completion.usage.total_cost, 0.0001);
    }

    #[tokio::test]
    async fn test_complete_provider_error_body() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit exceeded","type":"rate_limit","code":429}}"#)
            .create();

        let client = OpenRouterClient::with_api_base(&server.url());
        let err = client.complete("test-key", request()).await.unwrap_err();

        mock.assert();
        match err {
            KestrelError::Remote { status, message } => {
                assert_eq!(status, Some(429));
                assert_eq!(message, "Rate limit exceeded");
            }
            other => panic!("expected Remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_missing_choices() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create();

        let client = OpenRouterClient::with_api_base(&server.url());
        let err = client.complete("test-key", request()).await.unwrap_err();

        mock.assert();
        assert!(matches!(err, KestrelError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_complete_sends_referer() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("http-referer", "https://example.app")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"ok"}}]}"#)
            .create();

        let client =
            OpenRouterClient::with_api_base(&server.url()).with_referer("https://example.app");
        let completion = client.complete("test-key", request()).await.unwrap();

        mock.assert();
        assert_eq!(completion.message.content, "ok");
        // No usage block in the body falls back to zeroed accounting
        assert_eq!(completion.usage.total_tokens, 0);
    }
}
