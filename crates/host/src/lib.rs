//! Toolgate host core — sessions, providers, and approval-gated tools.
//!
//! The host sits between a chat client, tool servers, and an LLM
//! backend. It is organized around these concepts:
//!
//! - **ToolCatalog**: the merged, name-unique set of tools from every
//!   connected server.
//! - **Provider**: a trait over interchangeable model backends (local
//!   Ollama, hosted OpenAI-compatible).
//! - **SessionState**: one conversation's transcript plus the approval
//!   state machine.
//! - **Dispatcher**: drives a turn end to end and is the only place
//!   that decides whether a fault is folded into the conversation or
//!   surfaced to the caller.
//! - **SessionManager**: id-keyed table of independently locked
//!   sessions.
//!
//! The invariant the whole crate is built around: a session has at
//! most one tool call in flight, and that call never executes without
//! an explicit approval carrying its request id.

mod catalog;
mod dispatch;
mod error;
mod manager;
pub mod provider;
mod session;
mod tools;
mod types;

pub use catalog::{ToolCatalog, ToolDescriptor};
pub use dispatch::{Dispatcher, TurnResponse};
pub use error::{HostError, Result};
pub use manager::{SessionManager, SharedSession};
pub use provider::{Provider, ProviderConfig, ProviderKind, TurnResult};
pub use session::{PendingToolCall, Phase, SessionSnapshot, SessionState};
pub use tools::{McpToolServer, ToolServer};
pub use types::{Message, Role, ToolCallRequest};
