//! Persisted recording store: eager/lazy loaders and the saver.
//!
//! Compression uses `zstd::{Decoder, Encoder}` wrapping a plain byte
//! buffer. `save` always writes the `.zstd` sibling and removes the
//! uncompressed file once the compressed write succeeds.

use crate::error::{CompressionError, RecordingError};
use crate::lazy::{self, LazyRecording};
use harness_protocol::{Recording, CURRENT_SCHEMA_VERSION};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

fn compress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 0)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Resolves `path` to the file that actually exists on disk, preferring the
/// compressed sibling when both exist.
fn resolve_existing(path: &Path) -> Option<(PathBuf, bool)> {
    let zstd_path = zstd_sibling(path);
    if zstd_path.exists() {
        return Some((zstd_path, true));
    }
    if path.exists() {
        return Some((path.to_path_buf(), false));
    }
    None
}

fn zstd_sibling(path: &Path) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some("zstd") {
        path.to_path_buf()
    } else {
        let mut os = path.as_os_str().to_owned();
        os.push(".zstd");
        PathBuf::from(os)
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, RecordingError> {
    let (resolved, is_compressed) = resolve_existing(path)
        .ok_or_else(|| RecordingError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))?;
    let raw = std::fs::read(&resolved)?;
    if is_compressed {
        Ok(decompress(&raw)?)
    } else {
        Ok(raw)
    }
}

fn check_schema_version(version: u32) -> Result<(), RecordingError> {
    if version != CURRENT_SCHEMA_VERSION {
        return Err(RecordingError::SchemaIncompatible {
            found: version,
            expected: CURRENT_SCHEMA_VERSION,
        });
    }
    Ok(())
}

/// Fully decodes every message.
pub fn load_eager(path: &Path) -> Result<Recording, RecordingError> {
    let bytes = read_bytes(path)?;
    let recording: Recording = serde_json::from_slice(&bytes)?;
    check_schema_version(recording.schema_version)?;
    Ok(recording)
}

/// Parses the envelope but leaves `messages` as raw JSON. Yields to the
/// scheduler as it streams the `messages` array.
pub async fn load_lazy(path: &Path) -> Result<LazyRecording, RecordingError> {
    let bytes = read_bytes(path)?;
    let text = String::from_utf8(bytes).map_err(|e| {
        use serde::de::Error as _;
        RecordingError::Parse(serde_json::Error::custom(e.to_string()))
    })?;
    let lazy = lazy::parse_lazy(&text).await?;
    check_schema_version(lazy.schema_version)?;
    Ok(lazy)
}

/// Writes `<path>.json.zstd`, removing the plain sibling after a successful
/// compressed write.
pub fn save(path: &Path, recording: &Recording) -> Result<(), RecordingError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec(recording)?;
    let compressed = compress(&json)?;
    let zstd_path = zstd_sibling(path);
    std::fs::write(&zstd_path, compressed)?;
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    Ok(())
}

/// Appends a message, preserving insertion order.
pub fn append(recording: &mut Recording, message: harness_protocol::RecordedMessage) {
    recording.append(message);
}
