use thiserror::Error;

/// Host-level error taxonomy.
///
/// Client misuse variants are always reported to the caller and never
/// fatal to the session. Backend faults are either folded into the
/// conversation by the dispatcher or surfaced as a clean failure.
/// Configuration faults only occur at startup.
#[derive(Debug, Error)]
pub enum HostError {
    // --- client misuse ---
    #[error("session busy: a tool call is awaiting approval")]
    SessionBusy,

    #[error("unknown or stale request id: {0}")]
    UnknownOrStaleRequest(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    // --- backend faults ---
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider timed out after {0}ms")]
    ProviderTimeout(u64),

    #[error("malformed provider response: {0}")]
    ProviderProtocol(String),

    #[error("tool invocation timed out after {0}ms")]
    ToolTimeout(u64),

    #[error("tool invocation failed: {0}")]
    ToolInvocation(String),

    // --- configuration faults ---
    #[error("duplicate tool name {name:?}: registered by {existing:?}, re-registered by {incoming:?}")]
    DuplicateToolName {
        name: String,
        existing: String,
        incoming: String,
    },

    #[error("missing API key for hosted provider")]
    MissingApiKey,

    #[error("config error: {0}")]
    Config(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),
}

pub type Result<T> = std::result::Result<T, HostError>;
