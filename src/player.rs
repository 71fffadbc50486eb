//! Player: stateful lookup of the next unused recorded match for a given
//! hash, with the consumed-set discipline that keeps intercepts and
//! playback in sync.

use crate::error::RecordingError;
use crate::hash_index::{build_index, HashIndex};
use crate::lazy::LazyRecording;
use harness_protocol::RecordedMessage;
use std::collections::HashSet;

pub struct Player {
    recording: LazyRecording,
    index: HashIndex,
    consumed: HashSet<usize>,
}

impl Player {
    pub async fn new(recording: LazyRecording) -> Self {
        let index = build_index(&recording).await;
        Self {
            recording,
            index,
            consumed: HashSet::new(),
        }
    }

    /// Finds and marks consumed the first unconsumed bucket entry for
    /// `hash`, in file order. Also marks `index + 1` consumed under the
    /// paired-response contract — the caller is expected to read that
    /// following message as the reply.
    fn consume(&mut self, hash: &str) -> Option<usize> {
        let bucket = self.index.bucket(hash)?;
        let found = bucket.iter().copied().find(|i| !self.consumed.contains(i))?;
        self.consumed.insert(found);
        self.consumed.insert(found + 1);
        Some(found)
    }

    /// On a match, fully decodes the chosen message (everything else in
    /// its bucket stays raw) and returns it alongside its recording index.
    pub fn find_match(&mut self, hash: &str) -> Result<Option<(usize, RecordedMessage)>, RecordingError> {
        let Some(found) = self.consume(hash) else {
            return Ok(None);
        };
        let raw = self
            .recording
            .messages
            .iter()
            .find(|m| m.index == found)
            .expect("consumed index always names a message present in this recording");
        Ok(Some((found, raw.decode()?)))
    }

    /// The message immediately following a match, decoded so the Handler
    /// can deliver it as the paired response.
    pub fn find_following(&self, index: usize) -> Result<Option<RecordedMessage>, RecordingError> {
        match self.recording.messages.iter().find(|m| m.index == index + 1) {
            Some(raw) => Ok(Some(raw.decode()?)),
            None => Ok(None),
        }
    }

    /// Consumes a match without decoding it — used when an intercept
    /// pre-empts a playback hit, so the consumed-set stays aligned with the
    /// logical exchange count. A miss here is a no-op, not an error:
    /// intercepts may answer hashes absent from the recording.
    pub fn consume_by_hash(&mut self, hash: &str) {
        self.consume(hash);
    }
}
