//! Tool-server client (JSON-RPC 2.0 over child-process stdio).
//!
//! One [`Connection`] per configured tool server: spawn the process,
//! run the protocol handshake, cache the advertised tool list, and
//! invoke tools with client-side argument validation.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Connection, ServerConfig, DEFAULT_TIMEOUT};
//! use std::collections::HashMap;
//!
//! # async fn example() -> mcp::Result<()> {
//! let conn = Connection::spawn(ServerConfig {
//!     name: "filesystem".to_string(),
//!     command: "mcp-filesystem".to_string(),
//!     args: vec!["--root".to_string(), "./workspace".to_string()],
//!     env: HashMap::new(),
//! })
//! .await?;
//! conn.initialize().await?;
//!
//! for tool in conn.tools().await? {
//!     println!("tool: {}", tool.name);
//! }
//!
//! let result = conn
//!     .invoke(
//!         "read_file",
//!         Some(serde_json::json!({"path": "./README.md"})),
//!         DEFAULT_TIMEOUT,
//!     )
//!     .await?;
//! println!("{}", result.text());
//!
//! conn.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
mod wire;

pub use connection::{Connection, DEFAULT_TIMEOUT, MAX_RESPONSE_SIZE, ServerConfig};
pub use error::{Error, Result};
pub use wire::{CallToolResult, Content, PeerInfo, RpcError, Tool};
