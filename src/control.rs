//! Control channel command processing: `get_status`, `create_session`,
//! `close_session`, `list_sessions`, `register_intercept`,
//! `unregister_intercept`.
//!
//! The wire protocol's `register_intercept`/`unregister_intercept` commands
//! carry no `sessionId` field. Intercepts are session-scoped here: they
//! apply to whichever session the issuing control connection is bound
//! to, which `dispatch` takes as `bound_session`.

use crate::error::{InterceptError, RecordingError, SessionError};
use crate::player::Player;
use crate::recorder::Recorder;
use crate::recording;
use crate::session::{default_scenario_name, SessionRegistry};
use harness_protocol::{ControlCommand, InterceptSpec, SessionMode, WireError};
use std::path::PathBuf;
use ulid::Ulid;

/// Dispatches one control command against the registry, returning the
/// `payload` half of a `ControlResponse` on success.
pub async fn dispatch(
    registry: &SessionRegistry,
    bound_session: Option<&str>,
    command: ControlCommand,
) -> Result<serde_json::Value, WireError> {
    match command {
        ControlCommand::GetStatus => Ok(serde_json::json!({ "sessions": registry.list().await })),
        ControlCommand::CreateSession { session_id, mode, recording_path } => {
            create_session(registry, session_id, mode, recording_path).await
        }
        ControlCommand::CloseSession { session_id } => close_session(registry, session_id).await,
        ControlCommand::ListSessions => Ok(serde_json::json!({ "sessions": registry.list().await })),
        ControlCommand::RegisterIntercept { spec } => {
            let session_id = require_bound_session(bound_session)?;
            let id = register_intercept_on_session(registry, session_id, spec).await?;
            Ok(serde_json::json!({ "interceptId": id.to_string() }))
        }
        ControlCommand::UnregisterIntercept { intercept_id } => {
            let session_id = require_bound_session(bound_session)?;
            let id = Ulid::from_string(&intercept_id)
                .map_err(|_| to_wire_error_intercept(InterceptError::Invalid(format!("not a ulid: {intercept_id}"))))?;
            let removed = unregister_intercept_on_session(registry, session_id, id).await?;
            Ok(serde_json::json!({ "removed": removed }))
        }
    }
}

fn require_bound_session(bound_session: Option<&str>) -> Result<&str, WireError> {
    bound_session.ok_or_else(|| {
        to_wire_error_intercept(InterceptError::Invalid(
            "register_intercept/unregister_intercept require a session-bound control connection".to_owned(),
        ))
    })
}

async fn create_session(
    registry: &SessionRegistry,
    session_id: String,
    mode: SessionMode,
    recording_path: Option<String>,
) -> Result<serde_json::Value, WireError> {
    let session = registry.create(session_id.clone(), mode).await.map_err(to_wire_error_session)?;

    if mode == SessionMode::Record {
        let path = recording_path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{session_id}.json")));
        let mut guard = session.lock().await;
        guard.recorder = Some(Recorder::new(default_scenario_name(&session_id), path));
    } else if mode == SessionMode::Playback {
        let Some(path) = recording_path.map(PathBuf::from) else {
            return Err(to_wire_error_recording(RecordingError::Io(std::io::Error::from(
                std::io::ErrorKind::InvalidInput,
            ))));
        };
        let lazy = recording::load_lazy(&path).await.map_err(to_wire_error_recording)?;
        let mut guard = session.lock().await;
        guard.player = Some(Player::new(lazy).await);
    }

    Ok(serde_json::json!({ "sessionId": session_id }))
}

async fn close_session(registry: &SessionRegistry, session_id: String) -> Result<serde_json::Value, WireError> {
    match registry.close(&session_id).await {
        // Closing an already-gone session is success, not an error, even
        // though the registry's own `close` reports NotFound to other callers.
        Ok(()) | Err(SessionError::NotFound(_)) => Ok(serde_json::json!({ "sessionId": session_id })),
        Err(err) => Err(to_wire_error_session(err)),
    }
}

/// Registers an intercept on a specific, already-bound session.
pub async fn register_intercept_on_session(
    registry: &SessionRegistry,
    session_id: &str,
    spec: InterceptSpec,
) -> Result<Ulid, WireError> {
    if spec.service.is_empty() {
        return Err(to_wire_error_intercept(InterceptError::Invalid("service must not be empty".to_owned())));
    }
    let session = registry
        .get(session_id)
        .await
        .ok_or_else(|| to_wire_error_session(SessionError::NotFound(session_id.to_owned())))?;
    let mut guard = session.lock().await;
    Ok(guard.interceptor.register(spec.service, spec.url_pattern, spec.response, spec.times))
}

pub async fn unregister_intercept_on_session(
    registry: &SessionRegistry,
    session_id: &str,
    intercept_id: Ulid,
) -> Result<bool, WireError> {
    let session = registry
        .get(session_id)
        .await
        .ok_or_else(|| to_wire_error_session(SessionError::NotFound(session_id.to_owned())))?;
    let mut guard = session.lock().await;
    Ok(guard.interceptor.unregister(intercept_id))
}

fn to_wire_error_session(err: SessionError) -> WireError {
    WireError { code: err.code().to_owned(), message: err.to_string(), hash: None, session_id: None }
}

fn to_wire_error_recording(err: RecordingError) -> WireError {
    WireError { code: err.code().to_owned(), message: err.to_string(), hash: None, session_id: None }
}

fn to_wire_error_intercept(err: InterceptError) -> WireError {
    WireError { code: err.code().to_owned(), message: err.to_string(), hash: None, session_id: None }
}
