//! Connection error types.

use crate::wire::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn tool server: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("connection not initialized")]
    NotInitialized,

    #[error("tool server exited unexpectedly")]
    ServerExited,

    #[error("timed out after {0}ms waiting for tool server")]
    Timeout(u64),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("tool server error: {0}")]
    Rpc(#[from] RpcError),

    #[error("tool call failed: {0}")]
    CallFailed(String),

    #[error("response too large: {size} bytes (max {max})")]
    ResponseTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
