//! Recorder: append-only capture of both directions of a session, flushed
//! to the recording store on session close.

use crate::error::RecordingError;
use crate::recording;
use chrono::Utc;
use harness_protocol::{Direction, Envelope, Payload, RecordedMessage, Recording};
use std::path::{Path, PathBuf};

pub struct Recorder {
    recording: Recording,
    path: PathBuf,
}

impl Recorder {
    pub fn new(scenario_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            recording: Recording::new(scenario_name, Utc::now().to_rfc3339()),
            path: path.into(),
        }
    }

    /// Timestamps `envelope` with the current wall clock, computes `hash`
    /// for `to_harness` `CommandOpen`s, and appends in arrival order.
    pub fn append(&mut self, direction: Direction, envelope: Envelope) {
        let hash = match (direction, &envelope.payload) {
            (Direction::ToHarness, Payload::CommandOpen { service, payload }) => {
                Some(harness_protocol::request_hash(service, payload))
            }
            _ => None,
        };
        recording::append(
            &mut self.recording,
            RecordedMessage {
                envelope,
                recorded_at: Utc::now().to_rfc3339(),
                direction,
                hash,
            },
        );
    }

    pub fn flush(&self) -> Result<(), RecordingError> {
        recording::save(&self.path, &self.recording)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
