//! Handler: the per-connection dispatcher that routes a program request
//! through Intercept → Player/platform → Recorder, the heart of the
//! system. Kept free of actual socket I/O (that lives in `server.rs`, which
//! owns the `tokio_tungstenite` streams) so the routing logic is unit
//! testable against plain session state.

use crate::error::{HandlerError, PlayerError};
use crate::id_translation::IdTranslator;
use crate::session::{Session, SessionRegistry};
use chrono::Utc;
use harness_protocol::{Direction, Envelope, Payload, SessionMode, WireError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use ulid::Ulid;

/// What the program connection's write-half should do with a command.
pub enum ProgramAction {
    /// Send this envelope straight back to the program client.
    Reply(Envelope),
    /// A non-fatal error frame (e.g. `playback_miss`); session stays alive.
    Error(WireError),
    /// Forward to the platform connection and await its `EventClose`
    /// (passthrough/record). The caller drives the actual send/await via
    /// [`PlatformBridge`].
    Forward(Envelope),
}

/// Per-session bridge from program commands to the platform connection,
/// used only in passthrough/record modes. Lives outside `Session` because
/// it owns connection-lifetime channel endpoints, not replay state.
#[derive(Default)]
pub struct PlatformBridge {
    to_platform: Mutex<Option<tokio::sync::mpsc::UnboundedSender<Envelope>>>,
    waiters: Mutex<HashMap<Ulid, oneshot::Sender<Envelope>>>,
}

impl PlatformBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bind_platform(&self, sender: tokio::sync::mpsc::UnboundedSender<Envelope>) {
        *self.to_platform.lock().await = Some(sender);
    }

    /// Forwards `command` to the platform connection and waits for the
    /// matching `EventClose`, keyed by `streamId` (the platform echoes the
    /// live id verbatim; no translation happens on this path).
    pub async fn forward_and_await(&self, command: Envelope) -> Result<Envelope, HandlerError> {
        let stream_id = command.stream_id;
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(stream_id, tx);

        let sender = self.to_platform.lock().await.clone().ok_or_else(|| {
            HandlerError::Internal("no platform connection bound for passthrough/record".to_owned())
        })?;
        sender
            .send(command)
            .map_err(|_| HandlerError::Internal("platform connection closed".to_owned()))?;

        rx.await
            .map_err(|_| HandlerError::Internal("platform connection closed before replying".to_owned()))
    }

    /// Called from the platform connection's read loop when an `EventClose`
    /// arrives; resolves the matching waiter, if any.
    pub async fn deliver_platform_reply(&self, reply: Envelope) {
        if let Some(tx) = self.waiters.lock().await.remove(&reply.stream_id) {
            let _ = tx.send(reply);
        }
    }
}

pub struct Handler {
    registry: Arc<SessionRegistry>,
}

impl Handler {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The program-channel request flow: compute the hash, check
    /// intercepts, then branch on session mode.
    pub async fn handle_program_command(
        &self,
        session: &Arc<Mutex<Session>>,
        mut envelope: Envelope,
        translator: &mut IdTranslator,
    ) -> Result<ProgramAction, HandlerError> {
        let Payload::CommandOpen { service, payload } = &envelope.payload else {
            return Err(HandlerError::Internal(
                "handle_program_command called with a non-CommandOpen payload".to_owned(),
            ));
        };
        let hash = harness_protocol::request_hash(service, payload);
        envelope.payload_hash = Some(hash.clone());

        let mut session_guard = session.lock().await;
        let mode = session_guard.mode;

        if let Some(response) = session_guard.interceptor.match_command(service, payload) {
            if mode == SessionMode::Playback {
                if let Some(player) = session_guard.player.as_mut() {
                    player.consume_by_hash(&hash);
                }
            }
            if mode == SessionMode::Record {
                if let Some(recorder) = session_guard.recorder.as_mut() {
                    recorder.append(Direction::ToHarness, envelope.clone());
                }
            }
            let reply = synthesize_event_close(&envelope, service.clone(), response);
            if mode == SessionMode::Record {
                if let Some(recorder) = session_guard.recorder.as_mut() {
                    recorder.append(Direction::FromHarness, reply.clone());
                }
            }
            return Ok(ProgramAction::Reply(reply));
        }

        match mode {
            SessionMode::Passthrough => Ok(ProgramAction::Forward(envelope)),
            SessionMode::Record => {
                if let Some(recorder) = session_guard.recorder.as_mut() {
                    recorder.append(Direction::ToHarness, envelope.clone());
                }
                Ok(ProgramAction::Forward(envelope))
            }
            SessionMode::Playback => {
                let Some(player) = session_guard.player.as_mut() else {
                    return Err(HandlerError::Internal(
                        "playback session has no player bound".to_owned(),
                    ));
                };
                match player.find_match(&hash)? {
                    Some((index, matched)) => {
                        let following = player.find_following(index)?.ok_or_else(|| {
                            HandlerError::Internal(format!(
                                "recording index {index} matched but has no following response"
                            ))
                        })?;
                        if following.envelope.stream_id != matched.envelope.stream_id {
                            tracing::warn!(
                                index,
                                matched_stream_id = %matched.envelope.stream_id,
                                following_stream_id = %following.envelope.stream_id,
                                "recorded pair has mismatched streamIds; using index-order pairing anyway"
                            );
                        }
                        translator.bind(following.envelope.stream_id, envelope.stream_id);
                        translator.bind(following.envelope.trace_id, envelope.trace_id);
                        let reply = retime_and_translate(following.envelope, translator);
                        Ok(ProgramAction::Reply(reply))
                    }
                    None => {
                        let session_id = session_guard.id.clone();
                        Ok(ProgramAction::Error(playback_miss_error(hash, session_id)))
                    }
                }
            }
        }
    }

    /// Records the platform's `EventClose` in record mode. Passthrough mode
    /// has nothing to append.
    pub async fn handle_platform_reply(&self, session: &Arc<Mutex<Session>>, reply: &Envelope) {
        let mut session_guard = session.lock().await;
        if session_guard.mode == SessionMode::Record {
            if let Some(recorder) = session_guard.recorder.as_mut() {
                recorder.append(Direction::FromHarness, reply.clone());
            }
        }
    }
}

fn synthesize_event_close(request: &Envelope, service: String, response: serde_json::Value) -> Envelope {
    Envelope {
        stream_id: request.stream_id,
        trace_id: request.trace_id,
        causation_stream_id: Some(request.stream_id),
        parent_stream_id: request.parent_stream_id,
        sibling_index: request.sibling_index,
        event_seq: request.event_seq + 1,
        timestamp: Utc::now().to_rfc3339(),
        channel: request.channel,
        payload_hash: request.payload_hash.clone(),
        payload: Payload::EventClose { service, payload: response },
    }
}

/// Rewrites a recorded `EventClose`'s timestamp to now and substitutes the
/// live stream/trace ids for the original recorded ones.
fn retime_and_translate(mut envelope: Envelope, translator: &IdTranslator) -> Envelope {
    envelope.timestamp = Utc::now().to_rfc3339();
    envelope.stream_id = translator.translate_to_live(envelope.stream_id);
    envelope.trace_id = translator.translate_to_live(envelope.trace_id);
    if let Some(id) = envelope.causation_stream_id {
        envelope.causation_stream_id = Some(translator.translate_to_live(id));
    }
    if let Some(id) = envelope.parent_stream_id {
        envelope.parent_stream_id = Some(translator.translate_to_live(id));
    }
    envelope
}

fn playback_miss_error(hash: String, session_id: String) -> WireError {
    let error = PlayerError::Miss { hash: hash.clone(), session_id: session_id.clone() };
    WireError {
        code: error.code().to_owned(),
        message: error.to_string(),
        hash: Some(hash),
        session_id: Some(session_id),
    }
}
