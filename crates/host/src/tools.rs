//! Tool execution seam between the dispatcher and side effects.

use crate::catalog::ToolDescriptor;
use crate::error::{HostError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// A connected tool server as the dispatcher sees it.
///
/// This is the boundary between the session loop and process I/O;
/// tests substitute scripted implementations.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Stable id this server's descriptors are registered under.
    fn server_id(&self) -> &str;

    /// Tools this server owns.
    async fn descriptors(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke an owned tool; returns the textual result fed back to
    /// the model.
    async fn invoke(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<String>;

    /// Whether invocations may run concurrently on this connection.
    fn supports_concurrent_invocations(&self) -> bool {
        false
    }
}

/// [`ToolServer`] backed by a live child-process connection.
pub struct McpToolServer {
    connection: Arc<mcp::Connection>,
}

impl McpToolServer {
    pub fn new(connection: Arc<mcp::Connection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl ToolServer for McpToolServer {
    fn server_id(&self) -> &str {
        self.connection.name()
    }

    async fn descriptors(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = self.connection.tools().await.map_err(map_mcp_error)?;
        Ok(tools
            .into_iter()
            .map(|t| ToolDescriptor {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t.input_schema,
                server_id: self.connection.name().to_string(),
            })
            .collect())
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<String> {
        let args = if arguments.is_empty() {
            None
        } else {
            Some(Value::Object(arguments.clone()))
        };
        let result = self
            .connection
            .invoke(name, args, timeout)
            .await
            .map_err(map_mcp_error)?;
        Ok(result.text())
    }

    fn supports_concurrent_invocations(&self) -> bool {
        self.connection.supports_concurrent_invocations()
    }
}

fn map_mcp_error(e: mcp::Error) -> HostError {
    match e {
        mcp::Error::Timeout(ms) => HostError::ToolTimeout(ms),
        mcp::Error::UnknownTool(name) => HostError::UnknownTool(name),
        mcp::Error::InvalidArguments { tool, reason } => {
            HostError::InvalidArguments { tool, reason }
        }
        other => HostError::ToolInvocation(other.to_string()),
    }
}
