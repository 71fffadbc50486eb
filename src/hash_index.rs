//! Hash index: maps a request hash to the recording positions that can
//! answer it, in file order, so duplicate hashes resolve deterministically.

use crate::lazy::{LazyRecording, CHUNK};
use std::collections::HashMap;

/// `hash -> [index, …]` in insertion (file) order. Buckets hold the
/// `messages` index of each `to_harness` entry carrying that hash.
#[derive(Debug, Default, Clone)]
pub struct HashIndex {
    buckets: HashMap<String, Vec<usize>>,
}

impl HashIndex {
    pub fn bucket(&self, hash: &str) -> Option<&[usize]> {
        self.buckets.get(hash).map(Vec::as_slice)
    }
}

/// Builds the index by scanning each message's pre-extracted `hash` field
/// (no payload decode). Yields every [`CHUNK`] messages so a large recording
/// never monopolizes the scheduler.
pub async fn build_index(recording: &LazyRecording) -> HashIndex {
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    for (scanned, message) in recording.messages.iter().enumerate() {
        if let Some(hash) = &message.hash {
            buckets.entry(hash.clone()).or_default().push(message.index);
        }
        if (scanned + 1) % CHUNK == 0 {
            tokio::task::yield_now().await;
        }
    }
    HashIndex { buckets }
}
