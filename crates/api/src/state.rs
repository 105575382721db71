//! Shared application state for the HTTP layer.

use host::{Dispatcher, SessionManager, SharedSession};
use std::time::Instant;

/// Builds a fresh dispatcher for each new session. Sessions share the
/// provider, catalog, and tool-server connections behind `Arc`s; only
/// the conversation state is per-session.
pub type SessionFactory = Box<dyn Fn() -> Dispatcher + Send + Sync>;

/// State handed to every handler.
pub struct AppState {
    sessions: SessionManager,
    factory: SessionFactory,
    default_session: String,
    start_time: Instant,
}

impl AppState {
    /// Create the state with one default session, used whenever a
    /// request names no `session_id`.
    pub async fn new(factory: SessionFactory) -> Self {
        let sessions = SessionManager::new();
        let default_session = sessions.create(factory()).await;
        Self {
            sessions,
            factory,
            default_session,
            start_time: Instant::now(),
        }
    }

    /// Resolve a request's session, falling back to the default.
    pub async fn session(&self, id: Option<&str>) -> host::Result<SharedSession> {
        self.sessions
            .get(id.unwrap_or(&self.default_session))
            .await
    }

    /// Spin up an independent session and return its id.
    pub async fn create_session(&self) -> String {
        self.sessions.create((self.factory)()).await
    }

    pub fn resolve_id(&self, id: Option<String>) -> String {
        id.unwrap_or_else(|| self.default_session.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
