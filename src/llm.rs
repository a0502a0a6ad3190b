//! Model client for agent reasoning and relevance classification

use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::types::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One completion from the model, with its token accounting.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Seam for the language model. The agent loop and the relevance scorer
/// only depend on this trait; tests substitute scripted fakes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> AgentResult<ChatCompletion>;
}

/// Anthropic Messages API client.
pub struct AnthropicModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicModel {
    pub fn new(config: &AgentConfig) -> AgentResult<Self> {
        let api_key = config.get_api_key().ok_or_else(|| {
            AgentError::Configuration(
                "API key not configured. Set ANTHROPIC_API_KEY environment variable or set api_key"
                    .to_string(),
            )
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AgentError::Provider(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.clone(),
            model: config.model_name().to_string(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> AgentResult<ChatCompletion> {
        let url = format!("{}/v1/messages", self.base_url);
        let request_body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature,
            system: Some(system.to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: user.to_string(),
            }],
        };

        debug!(
            "calling model {} (temperature {}, user prompt {} chars)",
            self.model,
            temperature,
            user.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AgentError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("failed to parse API response: {e}")))?;

        let text = body
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| AgentError::Provider("no content in response".to_string()))?;

        let usage = TokenUsage {
            prompt_tokens: body.usage.input_tokens,
            completion_tokens: body.usage.output_tokens,
            total_tokens: body.usage.input_tokens + body.usage.output_tokens,
        };

        Ok(ChatCompletion { text, usage })
    }
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
