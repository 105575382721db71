//! Tool-server connection lifecycle (spawn, handshake, invoke, teardown).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use jsonschema::Validator;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::wire::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, ListToolsResult, Request,
    RequestId, Response, Tool,
};

/// Default timeout for protocol operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum accepted response line (1MB). Sized for large tool outputs.
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Launch configuration for one tool server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Stdio pipes of the child. Held behind one lock so a request and its
/// response form an atomic exchange; stdio transports cannot interleave
/// concurrent calls.
struct Pipes {
    stdin: tokio::process::ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
}

/// Cached tool table built during the handshake.
#[derive(Default)]
struct ToolTable {
    initialized: bool,
    tools: Vec<Tool>,
    validators: HashMap<String, Validator>,
}

/// A live connection to one tool server process.
pub struct Connection {
    config: ServerConfig,
    process: Mutex<Child>,
    pipes: Mutex<Pipes>,
    next_id: AtomicI64,
    table: RwLock<ToolTable>,
}

impl Connection {
    /// Spawn the server process and wire up its stdio.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        Ok(Self {
            config,
            process: Mutex::new(process),
            pipes: Mutex::new(Pipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            next_id: AtomicI64::new(1),
            table: RwLock::new(ToolTable::default()),
        })
    }

    /// Server name from the launch configuration.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether this connection can run invocations concurrently.
    ///
    /// Stdio transports serialize every exchange, so this is false; a
    /// future transport may report true.
    pub fn supports_concurrent_invocations(&self) -> bool {
        false
    }

    /// Perform the protocol handshake and cache the tool list.
    ///
    /// Idempotent: calling again after success is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        {
            let table = self.table.read().await;
            if table.initialized {
                return Ok(());
            }
        }

        let init: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;
        self.notify("notifications/initialized", None::<()>).await?;
        debug!(
            server = %self.config.name,
            peer = %init.server_info.name,
            protocol = %init.protocol_version,
            "tool server initialized"
        );

        let listed: ListToolsResult = self.request("tools/list", None::<()>).await?;

        let mut validators = HashMap::new();
        for tool in &listed.tools {
            match jsonschema::validator_for(&tool.input_schema) {
                Ok(v) => {
                    validators.insert(tool.name.clone(), v);
                }
                // A broken schema disables pre-dispatch validation for
                // that tool only; the server still enforces its own.
                Err(e) => warn!(
                    server = %self.config.name,
                    tool = %tool.name,
                    error = %e,
                    "unusable input schema, skipping client-side validation"
                ),
            }
        }

        let mut table = self.table.write().await;
        table.tools = listed.tools;
        table.validators = validators;
        table.initialized = true;
        Ok(())
    }

    /// Tools advertised by this server.
    pub async fn tools(&self) -> Result<Vec<Tool>> {
        let table = self.table.read().await;
        if !table.initialized {
            return Err(Error::NotInitialized);
        }
        Ok(table.tools.clone())
    }

    /// Invoke a tool owned by this server.
    ///
    /// Rejects names the server never advertised and arguments that
    /// fail the tool's input schema, before anything hits the wire.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<Value>,
        call_timeout: Duration,
    ) -> Result<CallToolResult> {
        {
            let table = self.table.read().await;
            if !table.initialized {
                return Err(Error::NotInitialized);
            }
            if !table.tools.iter().any(|t| t.name == name) {
                return Err(Error::UnknownTool(name.to_string()));
            }
            if let Some(validator) = table.validators.get(name) {
                let instance = arguments.clone().unwrap_or_else(|| Value::Object(Default::default()));
                if let Err(e) = validator.validate(&instance) {
                    return Err(Error::InvalidArguments {
                        tool: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self
            .request_with_timeout("tools/call", Some(params), call_timeout)
            .await?;

        if result.is_error {
            return Err(Error::CallFailed(result.text()));
        }
        Ok(result)
    }

    /// Whether the child process is still alive.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }

    /// Kill the server process. `kill_on_drop` backstops paths that
    /// never get here.
    pub async fn shutdown(&self) {
        let mut process = self.process.lock().await;
        if let Err(e) = process.kill().await {
            warn!(server = %self.config.name, error = %e, "failed to kill tool server");
        }
    }

    // --- wire plumbing ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        self.request_with_timeout(method, params, DEFAULT_TIMEOUT)
            .await
    }

    async fn request_with_timeout<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        deadline: Duration,
    ) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = Request::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }
        let line = serde_json::to_string(&request)?;

        // One lock across write+read keeps the exchange atomic.
        let mut pipes = self.pipes.lock().await;
        let response = timeout(deadline, Self::exchange(&mut pipes, &line))
            .await
            .map_err(|_| Error::Timeout(deadline.as_millis() as u64))??;

        if response.id != id {
            return Err(Error::InvalidResponse(format!(
                "response id mismatch: expected {id:?}, got {:?}",
                response.id
            )));
        }

        let value = response.into_result()?;
        Ok(serde_json::from_value(value)?)
    }

    async fn exchange(pipes: &mut Pipes, line: &str) -> Result<Response> {
        pipes.stdin.write_all(line.as_bytes()).await?;
        pipes.stdin.write_all(b"\n").await?;
        pipes.stdin.flush().await?;

        let mut buf = String::new();
        let read = pipes.stdout.read_line(&mut buf).await?;
        if read == 0 {
            return Err(Error::ServerExited);
        }
        if buf.len() > MAX_RESPONSE_SIZE {
            return Err(Error::ResponseTooLarge {
                size: buf.len(),
                max: MAX_RESPONSE_SIZE,
            });
        }
        Ok(serde_json::from_str(&buf)?)
    }

    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<()>
    where
        P: serde::Serialize,
    {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.and_then(|p| serde_json::to_value(p).ok()),
        });
        let line = serde_json::to_string(&notification)?;

        let mut pipes = self.pipes.lock().await;
        pipes.stdin.write_all(line.as_bytes()).await?;
        pipes.stdin.write_all(b"\n").await?;
        pipes.stdin.flush().await?;
        Ok(())
    }
}
