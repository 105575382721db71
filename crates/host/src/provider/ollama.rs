//! Local model backend (Ollama chat API).

use super::{Provider, ProviderConfig, TurnResult, classify_turn, system_prompt};
use crate::catalog::ToolCatalog;
use crate::error::{HostError, Result};
use crate::types::{Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Options>,
}

#[derive(Debug, Serialize)]
struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Local-model adapter talking to an Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_ms: u64,
}

impl OllamaProvider {
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
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_ms: config.request_timeout.as_millis() as u64,
        }
    }

    fn wire_messages(history: &[Message], catalog: &ToolCatalog) -> Vec<WireMessage> {
        let mut messages = vec![WireMessage {
            role: "system",
            content: system_prompt(catalog),
        }];
        for m in history {
            messages.push(WireMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                },
                content: m.content.clone(),
            });
        }
        messages
    }

    fn options(&self) -> Option<Options> {
        if self.temperature.is_none() && self.max_tokens.is_none() {
            return None;
        }
        Some(Options {
            temperature: self.temperature,
            num_predict: self.max_tokens,
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn complete(&self, history: &[Message], catalog: &ToolCatalog) -> Result<TurnResult> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: Self::wire_messages(history, catalog),
            stream: false,
            options: self.options(),
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
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

        Ok(classify_turn(&parsed.message.content))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
