//! harness-protocol: wire and persisted-recording types for the replay harness,
//! plus the canonical-JSON hashing used to key replay lookups.

pub mod envelope;
pub mod hash;

pub use envelope::*;
pub use hash::{canonical_json, request_hash};
