//! Id translation: a per-session bijection between a recording's original
//! stream/trace ids and the ids the live program presents on replay, built
//! incrementally as streams are first observed.

use std::collections::HashMap;
use ulid::Ulid;

#[derive(Debug, Default)]
pub struct IdTranslator {
    original_to_live: HashMap<Ulid, Ulid>,
    live_to_original: HashMap<Ulid, Ulid>,
}

impl IdTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `original` (as recorded) to `live` (as presented now). A
    /// rebind to the same pair is a no-op; binding either id to a
    /// different counterpart overwrites the stale mapping in both maps.
    pub fn bind(&mut self, original: Ulid, live: Ulid) {
        if let Some(old_live) = self.original_to_live.insert(original, live) {
            if old_live != live {
                self.live_to_original.remove(&old_live);
            }
        }
        self.live_to_original.insert(live, original);
    }

    pub fn live_for(&self, original: Ulid) -> Option<Ulid> {
        self.original_to_live.get(&original).copied()
    }

    pub fn original_for(&self, live: Ulid) -> Option<Ulid> {
        self.live_to_original.get(&live).copied()
    }

    /// Substitutes `id` with its live counterpart if one is bound, leaving
    /// it unchanged otherwise (used for ids the session hasn't seen yet,
    /// e.g. a freshly-minted `causationStreamId`).
    pub fn translate_to_live(&self, id: Ulid) -> Ulid {
        self.live_for(id).unwrap_or(id)
    }
}
