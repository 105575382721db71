//! Conversation types shared across the host.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in the session transcript. Append-only; the ordered
/// sequence is replayed verbatim to the model every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A tool-role message carrying an execution result (or error text)
    /// back to the model, correlated to the originating request.
    pub fn tool(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A staged tool invocation awaiting human approval.
///
/// At most one exists per session; it is destroyed when resolved by
/// approval or denial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub request_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// Stage a new request with a fresh correlation id.
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// The staged call as the JSON object shape the model emitted.
    pub fn as_json(&self) -> Value {
        serde_json::json!({
            "tool": self.tool_name,
            "arguments": self.arguments,
        })
    }
}
