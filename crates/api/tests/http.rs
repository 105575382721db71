//! End-to-end HTTP tests against a real listener.

use api::{AppState, create_router};
use async_trait::async_trait;
use host::{
    Dispatcher, Message, Provider, Result as HostResult, ToolCatalog, ToolDescriptor, ToolServer,
    TurnResult,
};
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a canned sequence of model turns.
struct ScriptedProvider {
    turns: Mutex<VecDeque<HostResult<TurnResult>>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<HostResult<TurnResult>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
        })
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, _: &[Message], _: &ToolCatalog) -> HostResult<TurnResult> {
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider called more times than scripted")
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// In-process stand-in for a tool server; records invocations.
struct FakeServer {
    invocations: Mutex<Vec<(String, Value)>>,
}

impl FakeServer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolServer for FakeServer {
    fn server_id(&self) -> &str {
        "fake"
    }

    async fn descriptors(&self) -> HostResult<Vec<ToolDescriptor>> {
        Ok(vec![ToolDescriptor {
            name: "echo".to_string(),
            description: "Echo the input".to_string(),
            input_schema: json!({"type": "object"}),
            server_id: "fake".to_string(),
        }])
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        _timeout: Duration,
    ) -> HostResult<String> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), Value::Object(arguments.clone())));
        Ok("echoed".to_string())
    }
}

/// Boot a server on an ephemeral port and hand back its base URL.
async fn spawn_server(provider: Arc<ScriptedProvider>, server: Arc<FakeServer>) -> String {
    let mut catalog = ToolCatalog::new();
    catalog
        .register(
            "fake",
            vec![ToolDescriptor {
                name: "echo".to_string(),
                description: "Echo the input".to_string(),
                input_schema: json!({"type": "object"}),
                server_id: "fake".to_string(),
            }],
        )
        .unwrap();
    let catalog = Arc::new(catalog);

    let factory: api::SessionFactory = Box::new(move || {
        Dispatcher::new(
            provider.clone(),
            catalog.clone(),
            vec![server.clone() as Arc<dyn ToolServer>],
            Duration::from_secs(5),
        )
    });

    let state = Arc::new(AppState::new(factory).await);
    let app = create_router(state);
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let local = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{local}")
}

fn text(content: &str) -> HostResult<TurnResult> {
    Ok(TurnResult::Text(content.to_string()))
}

fn tool_call(name: &str, arguments: Value) -> HostResult<TurnResult> {
    Ok(TurnResult::ToolCall {
        name: name.to_string(),
        arguments: arguments.as_object().unwrap().clone(),
    })
}

#[tokio::test]
async fn health_reports_service_status() {
    let base = spawn_server(ScriptedProvider::new(vec![]), FakeServer::new()).await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sessions"], 1);
}

#[tokio::test]
async fn plain_text_turn_round_trips() {
    let base = spawn_server(
        ScriptedProvider::new(vec![text("Hello there.")]),
        FakeServer::new(),
    )
    .await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "hi"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Hello there.");
    assert_eq!(body["requires_approval"], false);
    assert!(body["session_id"].is_string());
}

#[tokio::test]
async fn approved_tool_call_executes_and_summarizes() {
    let server = FakeServer::new();
    let base = spawn_server(
        ScriptedProvider::new(vec![
            tool_call("echo", json!({"text": "ping"})),
            text("The tool said: echoed"),
        ]),
        server.clone(),
    )
    .await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "use the tool"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["requires_approval"], true);
    assert_eq!(body["tool"]["tool"], "echo");
    let request_id = body["request_id"].as_str().unwrap().to_string();
    assert_eq!(server.invocation_count(), 0);

    // The snapshot shows the staged call before anything runs.
    let snapshot: Value = client
        .get(format!("{base}/session_state"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["pending_request_id"], request_id.as_str());
    assert_eq!(snapshot["pending_tool_call"]["tool"], "echo");

    let body: Value = client
        .post(format!("{base}/approve"))
        .json(&json!({"request_id": request_id, "approve": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"], "The tool said: echoed");
    assert_eq!(body["requires_approval"], false);
    assert_eq!(server.invocation_count(), 1);
}

#[tokio::test]
async fn denied_tool_call_never_runs() {
    let server = FakeServer::new();
    let base = spawn_server(
        ScriptedProvider::new(vec![tool_call("echo", json!({}))]),
        server.clone(),
    )
    .await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "go"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let request_id = body["request_id"].as_str().unwrap();

    let resp = client
        .post(format!("{base}/approve"))
        .json(&json!({"request_id": request_id, "approve": false}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["requires_approval"], false);
    assert_eq!(server.invocation_count(), 0);
}

#[tokio::test]
async fn input_while_awaiting_approval_is_a_conflict() {
    let base = spawn_server(
        ScriptedProvider::new(vec![tool_call("echo", json!({}))]),
        FakeServer::new(),
    )
    .await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "go"}))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "another"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "SESSION_BUSY");
}

#[tokio::test]
async fn stale_request_id_is_a_conflict() {
    let server = FakeServer::new();
    let base = spawn_server(
        ScriptedProvider::new(vec![tool_call("echo", json!({}))]),
        server.clone(),
    )
    .await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "go"}))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/approve"))
        .json(&json!({"request_id": "not-the-one", "approve": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(server.invocation_count(), 0);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let base = spawn_server(ScriptedProvider::new(vec![]), FakeServer::new()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "hi", "session_id": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn reset_discards_transcript_and_staged_call() {
    let base = spawn_server(
        ScriptedProvider::new(vec![tool_call("echo", json!({}))]),
        FakeServer::new(),
    )
    .await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "go"}))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/reset"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let snapshot: Value = client
        .get(format!("{base}/session_state"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["messages"].as_array().unwrap().len(), 0);
    assert!(snapshot["pending_request_id"].is_null());
}

#[tokio::test]
async fn created_sessions_are_independent() {
    let base = spawn_server(
        ScriptedProvider::new(vec![tool_call("echo", json!({})), text("fresh session")]),
        FakeServer::new(),
    )
    .await;
    let client = reqwest::Client::new();

    // Occupy the default session with a staged call.
    client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "go"}))
        .send()
        .await
        .unwrap();

    let created: Value = client
        .post(format!("{base}/session"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = created["session_id"].as_str().unwrap();

    // The new session is idle and accepts input immediately.
    let resp = client
        .post(format!("{base}/user_request"))
        .json(&json!({"input": "hi", "session_id": session_id}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "fresh session");
    assert_eq!(body["session_id"], session_id);
}
