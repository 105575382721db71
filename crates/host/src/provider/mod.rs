//! LLM provider abstraction.
//!
//! A [`Provider`] turns a conversation snapshot plus the tool catalog
//! into one model turn: either a plain text reply or a request to call
//! a tool. Tool use rides on a prompt protocol — the catalog is
//! rendered into the system prompt and the model answers a tool call
//! with a bare JSON object — so any chat-completion backend works.

mod ollama;
mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::catalog::ToolCatalog;
use crate::error::{HostError, Result};
use crate::types::Message;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Default wall-clock budget for one completion round-trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Which backend implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local model server (Ollama chat API).
    Ollama,
    /// Hosted OpenAI-compatible API.
    Openai,
}

/// Backend selection, fixed at session construction.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            base_url: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// One logical model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnResult {
    /// Plain text reply for the user.
    Text(String),
    /// The model wants a tool executed.
    ToolCall {
        name: String,
        arguments: Map<String, Value>,
    },
}

/// Trait over interchangeable model backends.
///
/// Implementations never mutate the history they are given; the turn
/// is derived purely from the snapshot and the catalog.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, history: &[Message], catalog: &ToolCatalog) -> Result<TurnResult>;

    fn model(&self) -> &str;
}

/// Construct the backend selected by the config.
///
/// The hosted backend requires credentials; their absence is a startup
/// fault, never discovered mid-session.
pub fn build(config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    match config.kind {
        ProviderKind::Ollama => Ok(Box::new(OllamaProvider::new(config))),
        ProviderKind::Openai => {
            if config.api_key.is_none() {
                return Err(HostError::MissingApiKey);
            }
            Ok(Box::new(OpenAiProvider::new(config)))
        }
    }
}

/// Build the system prompt: tool listing plus the call protocol.
pub(crate) fn system_prompt(catalog: &ToolCatalog) -> String {
    if catalog.is_empty() {
        return "You are a helpful assistant. Reply directly to the user.".to_string();
    }
    format!(
        "You are a helpful assistant with access to these tools:\n\n\
         {}\n\n\
         Choose the appropriate tool based on the user's question. \
         If no tool is needed, reply directly.\n\n\
         IMPORTANT: when you need to use a tool, respond with ONLY the \
         exact JSON object below, with no surrounding prose or markdown:\n\
         {{\n    \"tool\": \"tool-name\",\n    \"arguments\": {{\n        \"argument-name\": \"value\"\n    }}\n}}\n\n\
         After receiving a tool's response, transform the raw data into \
         a natural, concise answer focused on the user's question. Use \
         only the tools explicitly listed above.",
        catalog.render_for_prompt()
    )
}

/// Classify raw assistant text as a tool call or a plain reply.
///
/// A tool call is the bare JSON object the prompt asks for; models
/// routinely wrap it in a markdown fence anyway, so one fence layer is
/// stripped before giving up. Anything else is a text reply — that is
/// an ordinary branch, not an error.
pub(crate) fn classify_turn(raw: &str) -> TurnResult {
    if let Some((name, arguments)) = extract_tool_call(raw) {
        TurnResult::ToolCall { name, arguments }
    } else {
        TurnResult::Text(raw.to_string())
    }
}

fn extract_tool_call(raw: &str) -> Option<(String, Map<String, Value>)> {
    let trimmed = raw.trim();
    parse_tool_object(trimmed).or_else(|| parse_tool_object(strip_fence(trimmed)?))
}

fn parse_tool_object(candidate: &str) -> Option<(String, Map<String, Value>)> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let obj = value.as_object()?;
    let name = obj.get("tool")?.as_str()?.to_string();
    let arguments = obj.get("arguments")?.as_object()?.clone();
    Some((name, arguments))
}

/// Remove one surrounding markdown code fence, if present.
fn strip_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    // Tolerate a language tag on the opening fence.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").map(str::trim)
}
