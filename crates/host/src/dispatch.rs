//! Turn orchestration: user input, model turns, approval, tool dispatch.

use crate::catalog::ToolCatalog;
use crate::error::{HostError, Result};
use crate::provider::{Provider, TurnResult};
use crate::session::{PendingToolCall, SessionSnapshot, SessionState};
use crate::tools::ToolServer;
use crate::types::{Message, Role, ToolCallRequest};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How many times one turn may bounce back to the model after it
/// requests a tool the catalog does not have. Stops a misbehaving
/// model from looping the turn forever.
const MAX_TURN_HOPS: usize = 3;

/// Outcome of `handle_user_input` / `handle_approval`, shaped for the
/// transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub requires_approval: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<PendingToolCall>,
}

impl TurnResponse {
    fn text(content: String) -> Self {
        Self {
            role: Role::Assistant,
            message: Some(content),
            request_id: None,
            requires_approval: false,
            tool: None,
        }
    }

    fn approval_required(request: &ToolCallRequest) -> Self {
        Self {
            role: Role::Assistant,
            message: Some(format!(
                "Approval required to run tool '{}'.",
                request.tool_name
            )),
            request_id: Some(request.request_id.clone()),
            requires_approval: true,
            tool: Some(PendingToolCall {
                tool: request.tool_name.clone(),
                arguments: Value::Object(request.arguments.clone()),
            }),
        }
    }

    fn denied(request: &ToolCallRequest) -> Self {
        Self {
            role: Role::Assistant,
            message: Some(format!("Tool call '{}' denied.", request.tool_name)),
            request_id: Some(request.request_id.clone()),
            requires_approval: false,
            tool: Some(PendingToolCall {
                tool: request.tool_name.clone(),
                arguments: Value::Object(request.arguments.clone()),
            }),
        }
    }
}

/// Drives one session end to end.
///
/// Owns the session state exclusively; callers serialize access (one
/// mutex per session, see `SessionManager`), which is what makes the
/// approval guards sound.
pub struct Dispatcher {
    state: SessionState,
    provider: Arc<dyn Provider>,
    catalog: Arc<ToolCatalog>,
    servers: HashMap<String, Arc<dyn ToolServer>>,
    tool_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn Provider>,
        catalog: Arc<ToolCatalog>,
        servers: Vec<Arc<dyn ToolServer>>,
        tool_timeout: Duration,
    ) -> Self {
        let servers = servers
            .into_iter()
            .map(|s| (s.server_id().to_string(), s))
            .collect();
        Self {
            state: SessionState::new(),
            provider,
            catalog,
            servers,
            tool_timeout,
        }
    }

    /// Accept a user utterance and run model turns until the model
    /// either answers in text or requests a tool call (which is staged
    /// for approval, not executed).
    pub async fn handle_user_input(&mut self, input: &str) -> Result<TurnResponse> {
        self.state.begin_user_turn(input)?;
        info!(model = %self.provider.model(), "user turn started");
        self.model_turn().await
    }

    /// Resolve the staged tool call named by `request_id`.
    ///
    /// Denial records the fact and returns to idle without invoking
    /// anything. Approval executes the tool, feeds the result (or the
    /// failure) back to the model, and continues the turn — which may
    /// immediately stage another approval.
    pub async fn handle_approval(
        &mut self,
        request_id: &str,
        approve: bool,
    ) -> Result<TurnResponse> {
        if !approve {
            let request = self.state.deny(request_id)?;
            warn!(tool = %request.tool_name, request_id = %request.request_id, "tool call denied");
            self.state.push(Message::system(format!(
                "The user denied execution of tool '{}'. Do not retry it for this request.",
                request.tool_name
            )));
            return Ok(TurnResponse::denied(&request));
        }

        let request = self.state.approve(request_id)?;
        info!(tool = %request.tool_name, request_id = %request.request_id, "tool call approved");

        // Record the call the model asked for ahead of its result.
        self.state.push(Message {
            role: Role::Assistant,
            content: request.as_json().to_string(),
            tool_name: Some(request.tool_name.clone()),
            tool_call_id: Some(request.request_id.clone()),
        });

        // Tool faults are folded into the transcript so the model can
        // react; only the dispatcher makes that call.
        let content = match self.invoke(&request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %request.tool_name, error = %e, "tool invocation failed");
                format!("Tool execution failed: {e}")
            }
        };
        self.state
            .push(Message::tool(&request.tool_name, &request.request_id, content));
        self.state.finish_execution();

        self.model_turn().await
    }

    /// Reinstall a fresh transcript, dropping any staged call.
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Read-only view for the inspection endpoint.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    async fn model_turn(&mut self) -> Result<TurnResponse> {
        for _ in 0..MAX_TURN_HOPS {
            let turn = self
                .provider
                .complete(self.state.history(), &self.catalog)
                .await?;

            match turn {
                TurnResult::Text(content) => {
                    self.state.push(Message::assistant(&content));
                    return Ok(TurnResponse::text(content));
                }
                TurnResult::ToolCall { name, arguments } => {
                    if self.catalog.lookup(&name).is_none() {
                        // The model is told, rather than the user being
                        // shown a protocol error; it may retry in text.
                        warn!(tool = %name, "model requested a tool not in the catalog");
                        self.state.push(Message::assistant(
                            serde_json::json!({"tool": name, "arguments": arguments}).to_string(),
                        ));
                        self.state.push(Message::system(format!(
                            "Tool '{name}' does not exist. Use one of the listed tools or answer directly."
                        )));
                        continue;
                    }

                    let request = ToolCallRequest::new(name, arguments);
                    info!(
                        tool = %request.tool_name,
                        request_id = %request.request_id,
                        "tool call staged, awaiting approval"
                    );
                    let response = TurnResponse::approval_required(&request);
                    self.state.stage(request)?;
                    return Ok(response);
                }
            }
        }

        Err(HostError::ProviderProtocol(format!(
            "model requested unknown tools {MAX_TURN_HOPS} times in one turn"
        )))
    }

    async fn invoke(&self, request: &ToolCallRequest) -> Result<String> {
        let descriptor = self
            .catalog
            .lookup(&request.tool_name)
            .ok_or_else(|| HostError::UnknownTool(request.tool_name.clone()))?;
        let server = self.servers.get(&descriptor.server_id).ok_or_else(|| {
            HostError::ToolInvocation(format!(
                "no connection for server '{}'",
                descriptor.server_id
            ))
        })?;
        server
            .invoke(&request.tool_name, &request.arguments, self.tool_timeout)
            .await
    }
}
