//! Wire envelope, persisted recording schema, and control-channel protocol types.
//!
//! `payload.payload` (the inner opaque JSON carried by `CommandOpen`/`EventOpen`/
//! `EventClose`) is never interpreted here — only hashed, by [`crate::hash`].

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// The current recording schema version. Bumping this is a breaking change:
/// `loadEager`/`loadLazy` reject any other value.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Which side of the harness a connection (and therefore an envelope) speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Program,
    Platform,
    Control,
}

/// The common wrapper around every on-wire message.
///
/// `streamId` identifies one request/response pair; `traceId` groups related
/// streams. Both are ULIDs so they sort lexicographically by creation time,
/// which is convenient for log correlation even though the harness never
/// relies on that ordering for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "streamId")]
    pub stream_id: Ulid,
    #[serde(rename = "traceId")]
    pub trace_id: Ulid,
    #[serde(rename = "causationStreamId", skip_serializing_if = "Option::is_none", default)]
    pub causation_stream_id: Option<Ulid>,
    #[serde(rename = "parentStreamId", skip_serializing_if = "Option::is_none", default)]
    pub parent_stream_id: Option<Ulid>,
    #[serde(rename = "siblingIndex", default)]
    pub sibling_index: u64,
    #[serde(rename = "eventSeq", default)]
    pub event_seq: u64,
    pub timestamp: String,
    pub channel: Channel,
    #[serde(rename = "payloadHash", skip_serializing_if = "Option::is_none", default)]
    pub payload_hash: Option<String>,
    pub payload: Payload,
}

/// The tagged payload variants a program or platform connection can send.
///
/// `service` is a free-form identifier (`"http"`, `"llm"`, `"s3"`, …);
/// `payload` is opaque JSON the core never parses except to hash it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    CommandOpen {
        service: String,
        payload: serde_json::Value,
    },
    CommandClose,
    EventOpen {
        service: String,
        payload: serde_json::Value,
    },
    EventClose {
        service: String,
        payload: serde_json::Value,
    },
}

impl Payload {
    /// The `service` field, for variants that carry one.
    pub fn service(&self) -> Option<&str> {
        match self {
            Payload::CommandOpen { service, .. }
            | Payload::EventOpen { service, .. }
            | Payload::EventClose { service, .. } => Some(service),
            Payload::CommandClose => None,
        }
    }

    /// The opaque `payload` value, for variants that carry one.
    pub fn inner_payload(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::CommandOpen { payload, .. }
            | Payload::EventOpen { payload, .. }
            | Payload::EventClose { payload, .. } => Some(payload),
            Payload::CommandClose => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted recording schema
// ---------------------------------------------------------------------------

/// Which direction a recorded message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToHarness,
    FromHarness,
}

/// One recorded exchange leg: an envelope plus when and which way it went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedMessage {
    pub envelope: Envelope,
    #[serde(rename = "recordedAt")]
    pub recorded_at: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hash: Option<String>,
}

/// The full persisted recording file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "scenarioName")]
    pub scenario_name: String,
    #[serde(rename = "recordedAt")]
    pub recorded_at: String,
    pub messages: Vec<RecordedMessage>,
}

impl Recording {
    pub fn new(scenario_name: impl Into<String>, recorded_at: impl Into<String>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            scenario_name: scenario_name.into(),
            recorded_at: recorded_at.into(),
            messages: Vec::new(),
        }
    }

    /// Append a message, preserving insertion order.
    pub fn append(&mut self, message: RecordedMessage) {
        self.messages.push(message);
    }
}

// ---------------------------------------------------------------------------
// Control channel protocol
// ---------------------------------------------------------------------------

/// One intercept registration, as carried over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptSpec {
    pub service: String,
    #[serde(rename = "urlPattern", skip_serializing_if = "Option::is_none", default)]
    pub url_pattern: Option<String>,
    pub response: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub times: Option<u32>,
}

/// Recognised control-channel commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    GetStatus,
    CreateSession {
        #[serde(rename = "sessionId")]
        session_id: String,
        mode: SessionMode,
        #[serde(rename = "recordingPath", skip_serializing_if = "Option::is_none", default)]
        recording_path: Option<String>,
    },
    CloseSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    ListSessions,
    RegisterIntercept {
        #[serde(flatten)]
        spec: InterceptSpec,
    },
    UnregisterIntercept {
        #[serde(rename = "interceptId")]
        intercept_id: String,
    },
}

/// The session's current mode of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Passthrough,
    Record,
    Playback,
}

/// An envelope on the `control` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub channel: ControlChannelTag,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub payload: ControlCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlChannelTag {
    Control,
}

/// The control-channel response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub channel: ControlChannelTag,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<WireError>,
}

/// Frozen error codes surfaced to clients.
pub mod error_codes {
    pub const SCHEMA_INCOMPATIBLE: &str = "schema_incompatible";
    pub const IO_ERROR: &str = "io_error";
    pub const PARSE_ERROR: &str = "parse_error";
    pub const PLAYBACK_MISS: &str = "playback_miss";
    pub const SESSION_CONFLICT: &str = "session_conflict";
    pub const INTERCEPT_INVALID: &str = "intercept_invalid";
    pub const INTERNAL: &str = "internal";
}

/// A stable, wire-visible error: a `code` string plus a human message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hash: Option<String>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
}
