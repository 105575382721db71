//! Per-session conversation state and approval state machine.

use crate::error::{HostError, Result};
use crate::types::{Message, ToolCallRequest};
use serde::Serialize;
use serde_json::Value;

/// Approval phase of a session.
///
/// The pending request lives inside the phase variant, so a pending
/// request exists exactly when the session awaits approval; no
/// separate flag can drift out of sync.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// No tool call in flight.
    Idle,
    /// A tool call is staged and waiting for a human decision.
    AwaitingApproval(ToolCallRequest),
    /// An approved tool call is currently running.
    Executing(ToolCallRequest),
}

/// One conversation's full mutable state: transcript plus phase.
///
/// Owned exclusively by the dispatcher; everything else sees read-only
/// snapshots.
#[derive(Debug)]
pub struct SessionState {
    history: Vec<Message>,
    phase: Phase,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            phase: Phase::Idle,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// The staged request, when one awaits approval.
    pub fn pending(&self) -> Option<&ToolCallRequest> {
        match &self.phase {
            Phase::AwaitingApproval(req) => Some(req),
            _ => None,
        }
    }

    /// Append a message to the transcript. Append-only; nothing is
    /// ever rewritten or dropped.
    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Accept a new user utterance.
    ///
    /// Rejected without touching history while a tool call is staged
    /// or executing: the pending call must never be silently dropped.
    pub fn begin_user_turn(&mut self, input: &str) -> Result<()> {
        if !self.is_idle() {
            return Err(HostError::SessionBusy);
        }
        self.history.push(Message::user(input));
        Ok(())
    }

    /// Stage a tool call, transitioning `Idle → AwaitingApproval`.
    pub fn stage(&mut self, request: ToolCallRequest) -> Result<()> {
        if !self.is_idle() {
            return Err(HostError::SessionBusy);
        }
        self.phase = Phase::AwaitingApproval(request);
        Ok(())
    }

    /// Approve the staged call, transitioning to `Executing`.
    ///
    /// Fails with `UnknownOrStaleRequest`, mutating nothing, unless
    /// the session awaits approval and the id matches. A second
    /// resolve of the same id therefore fails, guaranteeing
    /// at-most-once execution per request id.
    pub fn approve(&mut self, request_id: &str) -> Result<ToolCallRequest> {
        let req = self.match_pending(request_id)?;
        self.phase = Phase::Executing(req.clone());
        Ok(req)
    }

    /// Deny the staged call, transitioning directly back to `Idle`.
    /// Same guard as [`approve`](Self::approve).
    pub fn deny(&mut self, request_id: &str) -> Result<ToolCallRequest> {
        let req = self.match_pending(request_id)?;
        self.phase = Phase::Idle;
        Ok(req)
    }

    /// Mark the approved execution finished, returning to `Idle`.
    pub fn finish_execution(&mut self) {
        if matches!(self.phase, Phase::Executing(_)) {
            self.phase = Phase::Idle;
        }
    }

    /// Drop the transcript and any staged call.
    pub fn reset(&mut self) {
        self.history.clear();
        self.phase = Phase::Idle;
    }

    /// Read-only view for inspection endpoints.
    pub fn snapshot(&self) -> SessionSnapshot {
        let pending = self.pending();
        SessionSnapshot {
            messages: self.history.clone(),
            pending_request_id: pending.map(|r| r.request_id.clone()),
            pending_tool_call: pending.map(|r| PendingToolCall {
                tool: r.tool_name.clone(),
                arguments: Value::Object(r.arguments.clone()),
            }),
        }
    }

    fn match_pending(&self, request_id: &str) -> Result<ToolCallRequest> {
        match &self.phase {
            Phase::AwaitingApproval(req) if req.request_id == request_id => Ok(req.clone()),
            _ => Err(HostError::UnknownOrStaleRequest(request_id.to_string())),
        }
    }
}

/// Immutable view of a session for callers outside the dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub pending_request_id: Option<String>,
    pub pending_tool_call: Option<PendingToolCall>,
}

/// The staged call as exposed over the inspection surface.
#[derive(Debug, Clone, Serialize)]
pub struct PendingToolCall {
    pub tool: String,
    pub arguments: Value,
}
