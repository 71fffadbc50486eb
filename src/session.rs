//! Session registry: named sessions, each exclusively owning a Recorder or
//! Player plus an Interceptor. The registry is the only cross-session
//! shared structure and is guarded by a single-writer-at-a-time discipline
//! via an async mutex per session plus an outer mutex over the map.

use crate::error::SessionError;
use crate::handler::PlatformBridge;
use crate::interceptor::Interceptor;
use crate::player::Player;
use crate::recorder::Recorder;
use chrono::{DateTime, Utc};
use harness_protocol::SessionMode;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct Session {
    pub id: String,
    pub mode: SessionMode,
    pub recorder: Option<Recorder>,
    pub player: Option<Player>,
    pub interceptor: Interceptor,
    pub opened_at: DateTime<Utc>,
    /// Connects program-channel forwards to whichever connection is bound
    /// as `platform` for this session (the passthrough/record forwarding
    /// path). Kept outside the `Mutex<Session>` guard's critical section during
    /// the actual forward-and-await so a slow upstream never blocks other
    /// session bookkeeping.
    pub platform_bridge: Arc<PlatformBridge>,
}

impl Session {
    fn new(id: String, mode: SessionMode) -> Self {
        Self {
            id,
            mode,
            recorder: None,
            player: None,
            interceptor: Interceptor::new(),
            opened_at: Utc::now(),
            platform_bridge: Arc::new(PlatformBridge::new()),
        }
    }
}

/// Default scenario name derived from the session id when the caller does
/// not supply one: every persisted recording is self-describing without
/// requiring an explicit name.
pub fn default_scenario_name(session_id: &str) -> String {
    format!("session-{session_id}")
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, id: String, mode: SessionMode) -> Result<Arc<Mutex<Session>>, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&id) {
            return Err(SessionError::Conflict(id));
        }
        let session = Arc::new(Mutex::new(Session::new(id.clone(), mode)));
        sessions.insert(id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Removes the session and, in record mode, flushes its recorder.
    /// An unknown id is a conflict here; the control-channel handler for
    /// `close_session` treats that specific error as a no-op instead of
    /// surfacing it, making `close_session` idempotent without weakening
    /// the registry's own contract for other callers.
    pub async fn close(&self, id: &str) -> Result<(), SessionError> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(id).ok_or_else(|| SessionError::NotFound(id.to_owned()))?
        };
        let session = session.lock().await;
        if session.mode == SessionMode::Record {
            if let Some(recorder) = &session.recorder {
                recorder.flush()?;
            }
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }
}
