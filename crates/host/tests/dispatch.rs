//! End-to-end dispatcher scenarios with scripted backends.

use async_trait::async_trait;
use host::{
    Dispatcher, HostError, Message, Provider, Role, SessionManager, ToolCatalog, ToolDescriptor,
    ToolServer, TurnResult,
};
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider that replays a fixed script of turns.
struct ScriptedProvider {
    script: Mutex<VecDeque<host::Result<TurnResult>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(turns: Vec<host::Result<TurnResult>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(turns.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(
        &self,
        _history: &[Message],
        _catalog: &ToolCatalog,
    ) -> host::Result<TurnResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("provider script exhausted"))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Tool server that records invocations and answers from a canned
/// result.
struct FakeServer {
    id: &'static str,
    tools: Vec<&'static str>,
    result: host::Result<String>,
    invocations: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl FakeServer {
    fn new(id: &'static str, tools: Vec<&'static str>, result: host::Result<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            tools,
            result,
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn invocations(&self) -> Vec<(String, Map<String, Value>)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolServer for FakeServer {
    fn server_id(&self) -> &str {
        self.id
    }

    async fn descriptors(&self) -> host::Result<Vec<ToolDescriptor>> {
        Ok(self
            .tools
            .iter()
            .map(|name| descriptor(name, self.id))
            .collect())
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        _timeout: Duration,
    ) -> host::Result<String> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        match &self.result {
            Ok(text) => Ok(text.clone()),
            Err(_) => Err(HostError::ToolInvocation("tool server crashed".to_string())),
        }
    }
}

fn descriptor(name: &str, server_id: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: format!("{name} tool"),
        input_schema: json!({"type": "object"}),
        server_id: server_id.to_string(),
    }
}

fn tool_call(name: &str, args: Value) -> TurnResult {
    TurnResult::ToolCall {
        name: name.to_string(),
        arguments: args.as_object().cloned().unwrap_or_default(),
    }
}

fn dispatcher(
    provider: Arc<ScriptedProvider>,
    server: Arc<FakeServer>,
) -> Dispatcher {
    let mut catalog = ToolCatalog::new();
    catalog
        .register(
            server.id,
            server
                .tools
                .iter()
                .map(|name| descriptor(name, server.id))
                .collect(),
        )
        .unwrap();
    Dispatcher::new(
        provider,
        Arc::new(catalog),
        vec![server as Arc<dyn ToolServer>],
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn approved_tool_call_runs_and_model_summarizes() {
    let provider = ScriptedProvider::new(vec![
        Ok(tool_call("list_dir", json!({"path": "/tmp"}))),
        Ok(TurnResult::Text("Two files: a.txt and b.txt.".to_string())),
    ]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("a.txt\nb.txt".to_string()));
    let mut dispatcher = dispatcher(provider.clone(), server.clone());

    let staged = dispatcher
        .handle_user_input("list files in /tmp")
        .await
        .unwrap();
    assert!(staged.requires_approval);
    let request_id = staged.request_id.clone().unwrap();
    let tool = staged.tool.unwrap();
    assert_eq!(tool.tool, "list_dir");
    assert_eq!(tool.arguments["path"], "/tmp");

    // Nothing ran yet.
    assert!(server.invocations().is_empty());

    let done = dispatcher.handle_approval(&request_id, true).await.unwrap();
    assert!(!done.requires_approval);
    assert_eq!(done.message.as_deref(), Some("Two files: a.txt and b.txt."));

    let invocations = server.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].0, "list_dir");
    assert_eq!(invocations[0].1["path"], "/tmp");

    // Transcript: user, assistant(call), tool(result), assistant(text).
    let snap = dispatcher.snapshot();
    assert!(snap.pending_request_id.is_none());
    let roles: Vec<Role> = snap.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(
        snap.messages[2].tool_call_id.as_deref(),
        Some(request_id.as_str())
    );
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn denied_tool_call_never_invokes() {
    let provider = ScriptedProvider::new(vec![Ok(tool_call("list_dir", json!({"path": "/tmp"})))]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("unused".to_string()));
    let mut dispatcher = dispatcher(provider, server.clone());

    let staged = dispatcher
        .handle_user_input("list files in /tmp")
        .await
        .unwrap();
    let request_id = staged.request_id.unwrap();

    let denied = dispatcher
        .handle_approval(&request_id, false)
        .await
        .unwrap();
    assert!(!denied.requires_approval);
    assert!(denied.message.unwrap().contains("denied"));
    assert!(server.invocations().is_empty());

    // Back to idle: new input accepted.
    let snap = dispatcher.snapshot();
    assert!(snap.pending_request_id.is_none());
    assert!(
        snap.messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains("denied"))
    );
}

#[tokio::test]
async fn input_while_awaiting_approval_is_rejected() {
    let provider = ScriptedProvider::new(vec![Ok(tool_call("list_dir", json!({})))]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("unused".to_string()));
    let mut dispatcher = dispatcher(provider, server);

    dispatcher.handle_user_input("first").await.unwrap();
    let before = dispatcher.snapshot().messages.len();

    let err = dispatcher.handle_user_input("second").await.unwrap_err();
    assert!(matches!(err, HostError::SessionBusy));
    assert_eq!(dispatcher.snapshot().messages.len(), before);
    assert!(dispatcher.snapshot().pending_request_id.is_some());
}

#[tokio::test]
async fn mismatched_request_id_executes_nothing() {
    let provider = ScriptedProvider::new(vec![Ok(tool_call("list_dir", json!({})))]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("unused".to_string()));
    let mut dispatcher = dispatcher(provider, server.clone());

    dispatcher.handle_user_input("go").await.unwrap();
    let before = dispatcher.snapshot().messages.len();

    let err = dispatcher
        .handle_approval("deadbeef", true)
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::UnknownOrStaleRequest(_)));
    assert!(server.invocations().is_empty());
    assert_eq!(dispatcher.snapshot().messages.len(), before);
    // The real request is still approvable afterwards.
    assert!(dispatcher.snapshot().pending_request_id.is_some());
}

#[tokio::test]
async fn resolving_twice_executes_at_most_once() {
    let provider = ScriptedProvider::new(vec![
        Ok(tool_call("list_dir", json!({}))),
        Ok(TurnResult::Text("done".to_string())),
    ]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("ok".to_string()));
    let mut dispatcher = dispatcher(provider, server.clone());

    let staged = dispatcher.handle_user_input("go").await.unwrap();
    let request_id = staged.request_id.unwrap();

    dispatcher.handle_approval(&request_id, true).await.unwrap();
    let err = dispatcher
        .handle_approval(&request_id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::UnknownOrStaleRequest(_)));
    assert_eq!(server.invocations().len(), 1);
}

#[tokio::test]
async fn unknown_tool_is_bounced_back_to_the_model() {
    let provider = ScriptedProvider::new(vec![
        Ok(tool_call("make_coffee", json!({}))),
        Ok(TurnResult::Text("I cannot do that.".to_string())),
    ]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("unused".to_string()));
    let mut dispatcher = dispatcher(provider.clone(), server.clone());

    let response = dispatcher.handle_user_input("coffee please").await.unwrap();
    assert!(!response.requires_approval);
    assert_eq!(response.message.as_deref(), Some("I cannot do that."));
    assert!(server.invocations().is_empty());
    assert_eq!(provider.calls(), 2);

    let snap = dispatcher.snapshot();
    assert!(
        snap.messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains("make_coffee"))
    );
}

#[tokio::test]
async fn persistent_unknown_tool_requests_fail_cleanly() {
    let provider = ScriptedProvider::new(vec![
        Ok(tool_call("nope", json!({}))),
        Ok(tool_call("nope", json!({}))),
        Ok(tool_call("nope", json!({}))),
    ]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("unused".to_string()));
    let mut dispatcher = dispatcher(provider, server);

    let err = dispatcher.handle_user_input("go").await.unwrap_err();
    assert!(matches!(err, HostError::ProviderProtocol(_)));
    // No approval left dangling.
    assert!(dispatcher.snapshot().pending_request_id.is_none());
}

#[tokio::test]
async fn tool_failure_is_fed_back_to_the_model() {
    let provider = ScriptedProvider::new(vec![
        Ok(tool_call("list_dir", json!({"path": "/tmp"}))),
        Ok(TurnResult::Text("The tool failed, sorry.".to_string())),
    ]);
    let server = FakeServer::new(
        "files",
        vec!["list_dir"],
        Err(HostError::ToolInvocation(String::new())),
    );
    let mut dispatcher = dispatcher(provider, server.clone());

    let staged = dispatcher.handle_user_input("go").await.unwrap();
    let request_id = staged.request_id.unwrap();

    let done = dispatcher.handle_approval(&request_id, true).await.unwrap();
    assert!(!done.requires_approval);
    assert_eq!(server.invocations().len(), 1);

    let snap = dispatcher.snapshot();
    let tool_msg = snap
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert!(tool_msg.content.contains("Tool execution failed"));
    assert!(snap.pending_request_id.is_none());
}

#[tokio::test]
async fn approved_call_may_stage_a_follow_up() {
    let provider = ScriptedProvider::new(vec![
        Ok(tool_call("list_dir", json!({"path": "/tmp"}))),
        Ok(tool_call("read_file", json!({"path": "/tmp/a.txt"}))),
        Ok(TurnResult::Text("a.txt says hello".to_string())),
    ]);
    let server = FakeServer::new(
        "files",
        vec!["list_dir", "read_file"],
        Ok("a.txt".to_string()),
    );
    let mut dispatcher = dispatcher(provider, server.clone());

    let first = dispatcher.handle_user_input("what's in /tmp?").await.unwrap();
    let first_id = first.request_id.unwrap();

    let second = dispatcher.handle_approval(&first_id, true).await.unwrap();
    assert!(second.requires_approval);
    let second_id = second.request_id.unwrap();
    assert_ne!(first_id, second_id);
    assert_eq!(second.tool.unwrap().tool, "read_file");

    let done = dispatcher.handle_approval(&second_id, true).await.unwrap();
    assert_eq!(done.message.as_deref(), Some("a.txt says hello"));
    assert_eq!(server.invocations().len(), 2);
}

#[tokio::test]
async fn provider_fault_on_first_turn_surfaces_cleanly() {
    let provider = ScriptedProvider::new(vec![Err(HostError::ProviderUnavailable(
        "connection refused".to_string(),
    ))]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("unused".to_string()));
    let mut dispatcher = dispatcher(provider, server);

    let err = dispatcher.handle_user_input("hello").await.unwrap_err();
    assert!(matches!(err, HostError::ProviderUnavailable(_)));
    // The user message stays in history; the session is still usable.
    assert!(dispatcher.snapshot().pending_request_id.is_none());
}

#[tokio::test]
async fn reset_returns_session_to_blank_idle() {
    let provider = ScriptedProvider::new(vec![Ok(tool_call("list_dir", json!({})))]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("unused".to_string()));
    let mut dispatcher = dispatcher(provider, server);

    dispatcher.handle_user_input("go").await.unwrap();
    assert!(dispatcher.snapshot().pending_request_id.is_some());

    dispatcher.reset();
    let snap = dispatcher.snapshot();
    assert!(snap.messages.is_empty());
    assert!(snap.pending_request_id.is_none());
}

#[tokio::test]
async fn manager_tracks_sessions_by_id() {
    let manager = SessionManager::new();
    assert!(manager.is_empty().await);

    let provider = ScriptedProvider::new(vec![Ok(TurnResult::Text("hi".to_string()))]);
    let server = FakeServer::new("files", vec!["list_dir"], Ok("unused".to_string()));
    let id = manager.create(dispatcher(provider, server)).await;
    assert_eq!(manager.len().await, 1);

    let session = manager.get(&id).await.unwrap();
    let response = session.lock().await.handle_user_input("hello").await.unwrap();
    assert_eq!(response.message.as_deref(), Some("hi"));

    manager.remove(&id).await.unwrap();
    assert!(matches!(
        manager.get(&id).await,
        Err(HostError::SessionNotFound(_))
    ));
    assert!(manager.is_empty().await);
}
