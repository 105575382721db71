//! Binary-level error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or parsed.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// A tool server failed to start or complete its handshake.
    #[error("tool server '{name}' failed to start: {source}")]
    ServerStartup {
        name: String,
        #[source]
        source: mcp::Error,
    },

    /// Startup-fatal host fault (duplicate tool, missing credentials).
    #[error(transparent)]
    Host(#[from] host::HostError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
