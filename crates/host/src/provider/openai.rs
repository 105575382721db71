//! Hosted OpenAI-compatible chat backend.

use super::{Provider, ProviderConfig, TurnResult, classify_turn, system_prompt};
use crate::catalog::ToolCatalog;
use crate::error::{HostError, Result};
use crate::types::{Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MAX_TOKENS: u32 = 16384;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Hosted-API adapter (any OpenAI-compatible `/chat/completions`).
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: u32,
    timeout_ms: u64,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_default(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout_ms: config.request_timeout.as_millis() as u64,
        }
    }

    fn wire_messages(history: &[Message], catalog: &ToolCatalog) -> Vec<WireMessage> {
        let mut messages = vec![WireMessage {
            role: "system",
            content: system_prompt(catalog),
            tool_call_id: None,
        }];
        for m in history {
            messages.push(WireMessage {
                role: role_str(m.role),
                content: m.content.clone(),
                tool_call_id: m.tool_call_id.clone(),
            });
        }
        messages
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(&self, history: &[Message], catalog: &ToolCatalog) -> Result<TurnResult> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: Self::wire_messages(history, catalog),
            max_tokens: self.max_tokens,
            stream: false,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                HostError::ProviderTimeout(self.timeout_ms)
            } else {
                HostError::ProviderUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HostError::ProviderUnavailable(format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| HostError::ProviderProtocol(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| HostError::ProviderProtocol("response had no choices".to_string()))?;

        Ok(classify_turn(&choice.message.content))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
