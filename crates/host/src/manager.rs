//! Session table: id-keyed, independently lockable sessions.

use crate::dispatch::Dispatcher;
use crate::error::{HostError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A session behind its own lock. Holding the lock across a whole
/// `handle_user_input` / `handle_approval` call is what serializes
/// mutation per session; different sessions proceed in parallel.
pub type SharedSession = Arc<Mutex<Dispatcher>>;

/// Uuid-keyed table of active sessions.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SharedSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, returning its fresh id.
    pub async fn create(&self, dispatcher: Dispatcher) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(dispatcher)));
        id
    }

    pub async fn get(&self, id: &str) -> Result<SharedSession> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::SessionNotFound(id.to_string()))
    }

    /// Tear a session down. In-flight calls holding the session lock
    /// finish first; tool-server connections are shared process-wide
    /// and stay up.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| HostError::SessionNotFound(id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
