//! HTTP route handlers.

use crate::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use host::{HostError, SessionSnapshot, TurnResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub sessions: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        sessions: state.session_count().await,
    })
}

/// API error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

/// A host error dressed for the wire.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<HostError> for ApiError {
    fn from(e: HostError) -> Self {
        let (status, code) = match &e {
            HostError::SessionBusy => (StatusCode::CONFLICT, "SESSION_BUSY"),
            HostError::UnknownOrStaleRequest(_) => (StatusCode::CONFLICT, "STALE_REQUEST"),
            HostError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            HostError::UnknownTool(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_TOOL"),
            HostError::InvalidArguments { .. } => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENTS"),
            HostError::ProviderUnavailable(_)
            | HostError::ProviderTimeout(_)
            | HostError::ProviderProtocol(_)
            | HostError::ToolTimeout(_)
            | HostError::ToolInvocation(_) => (StatusCode::BAD_GATEWAY, "BACKEND_FAULT"),
            HostError::DuplicateToolName { .. }
            | HostError::MissingApiKey
            | HostError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        };
        if status.is_server_error() {
            error!(error = %e, code, "request failed");
        } else {
            debug!(error = %e, code, "request rejected");
        }
        Self {
            status,
            body: ErrorBody {
                error: e.to_string(),
                code,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// A dispatcher turn plus the session it belongs to.
#[derive(Debug, Serialize)]
pub struct TurnBody {
    #[serde(flatten)]
    pub turn: TurnResponse,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub input: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /user_request`: run one user turn. A staged tool call comes
/// back with `requires_approval = true` and is not executed.
pub async fn user_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserRequest>,
) -> Result<Json<TurnBody>, ApiError> {
    let session = state.session(req.session_id.as_deref()).await?;
    let mut dispatcher = session.lock().await;
    let turn = dispatcher.handle_user_input(&req.input).await?;
    Ok(Json(TurnBody {
        turn,
        session_id: state.resolve_id(req.session_id),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub request_id: String,
    pub approve: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /approve`: resolve the staged tool call.
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<TurnBody>, ApiError> {
    let session = state.session(req.session_id.as_deref()).await?;
    let mut dispatcher = session.lock().await;
    let turn = dispatcher.handle_approval(&req.request_id, req.approve).await?;
    Ok(Json(TurnBody {
        turn,
        session_id: state.resolve_id(req.session_id),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SessionStateQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `GET /session_state`: read-only snapshot of a session.
pub async fn session_state(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionStateQuery>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.session(query.session_id.as_deref()).await?;
    let dispatcher = session.lock().await;
    Ok(Json(dispatcher.snapshot()))
}

#[derive(Debug, Deserialize, Default)]
pub struct ResetRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub session_id: String,
}

/// `POST /reset`: drop a session's transcript and any staged call.
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, ApiError> {
    let session = state.session(req.session_id.as_deref()).await?;
    session.lock().await.reset();
    Ok(Json(ResetResponse {
        session_id: state.resolve_id(req.session_id),
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: String,
}

/// `POST /session`: create an independent session.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Json<SessionCreated> {
    Json(SessionCreated {
        session_id: state.create_session().await,
    })
}
