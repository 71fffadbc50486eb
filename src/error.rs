//! Error categories, one `thiserror` enum per module plus a top-level
//! aggregate for call sites (CLI bootstrap, control channel) that need a
//! single propagated type.

use harness_protocol::error_codes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("schema version {found} incompatible with {expected}")]
    SchemaIncompatible { found: u32, expected: u32 },
    #[error("compression: {0}")]
    Compression(#[from] CompressionError),
}

impl RecordingError {
    pub fn code(&self) -> &'static str {
        match self {
            RecordingError::Io(_) => error_codes::IO_ERROR,
            RecordingError::Parse(_) => error_codes::PARSE_ERROR,
            RecordingError::SchemaIncompatible { .. } => error_codes::SCHEMA_INCOMPATIBLE,
            RecordingError::Compression(_) => error_codes::IO_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("zstd: {0}")]
    Zstd(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("playback miss for hash {hash} in session {session_id}")]
    Miss { hash: String, session_id: String },
}

impl PlayerError {
    pub fn code(&self) -> &'static str {
        error_codes::PLAYBACK_MISS
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} already exists")]
    Conflict(String),
    #[error("session {0} not found")]
    NotFound(String),
    #[error("recording: {0}")]
    Recording(#[from] RecordingError),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Conflict(_) | SessionError::NotFound(_) => error_codes::SESSION_CONFLICT,
            SessionError::Recording(e) => e.code(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("intercept invalid: {0}")]
    Invalid(String),
}

impl InterceptError {
    pub fn code(&self) -> &'static str {
        error_codes::INTERCEPT_INVALID
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("ws: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("session: {0}")]
    Session(#[from] SessionError),
    #[error("intercept: {0}")]
    Intercept(#[from] InterceptError),
    #[error("player: {0}")]
    Player(#[from] PlayerError),
    #[error("recording: {0}")]
    Recording(#[from] RecordingError),
    #[error("internal: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::Ws(_) => error_codes::IO_ERROR,
            HandlerError::Parse(_) => error_codes::PARSE_ERROR,
            HandlerError::Session(e) => e.code(),
            HandlerError::Intercept(e) => e.code(),
            HandlerError::Player(e) => e.code(),
            HandlerError::Recording(e) => e.code(),
            HandlerError::Internal(_) => error_codes::INTERNAL,
        }
    }
}

/// Top-level error aggregate used at process bootstrap and on the control channel.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Intercept(#[from] InterceptError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl HarnessError {
    pub fn code(&self) -> &'static str {
        match self {
            HarnessError::Io(_) => error_codes::IO_ERROR,
            HarnessError::Recording(e) => e.code(),
            HarnessError::Session(e) => e.code(),
            HarnessError::Intercept(e) => e.code(),
            HarnessError::Handler(e) => e.code(),
        }
    }
}
