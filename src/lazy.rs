//! Streaming array parser for lazy recording loads.
//!
//! Parses only the envelope fields of the top-level `Recording` object
//! eagerly; the `messages` array is scanned with a brace-depth tracker that
//! extracts each element's raw JSON substring without decoding its interior,
//! and yields to the scheduler every [`CHUNK`] elements or [`YIELD_CHARS`]
//! scanned characters so a large recording never monopolizes the scheduler.

use crate::error::RecordingError;
use harness_protocol::RecordedMessage;

/// Elements emitted per yield (the index builder uses the same constant).
pub const CHUNK: usize = 50;
/// Characters scanned per yield, independent of element boundaries.
pub const YIELD_CHARS: usize = 10_000;

/// A message whose envelope/payload has not been decoded; only its `hash`
/// field (if present) has been extracted, via a shallow scan.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub index: usize,
    pub raw: String,
    pub hash: Option<String>,
}

impl RawMessage {
    /// Fully decodes this message. Called lazily, once, by the Player on a match.
    pub fn decode(&self) -> Result<RecordedMessage, RecordingError> {
        Ok(serde_json::from_str(&self.raw)?)
    }
}

#[derive(Debug, Clone)]
pub struct LazyRecording {
    pub schema_version: u32,
    pub scenario_name: String,
    pub recorded_at: String,
    pub messages: Vec<RawMessage>,
}

/// The eagerly-decoded envelope fields of a `Recording`, i.e. everything
/// except `messages`.
#[derive(serde::Deserialize)]
struct RecordingHeader {
    #[serde(rename = "schemaVersion")]
    schema_version: u32,
    #[serde(rename = "scenarioName")]
    scenario_name: String,
    #[serde(rename = "recordedAt")]
    recorded_at: String,
}

pub async fn parse_lazy(text: &str) -> Result<LazyRecording, RecordingError> {
    let header: RecordingHeader = serde_json::from_str(text)?;
    let messages_span = find_messages_array(text)?;
    let messages = split_top_level_elements(messages_span).await;

    let mut raw_messages = Vec::with_capacity(messages.len());
    for (index, raw) in messages.into_iter().enumerate() {
        let hash = extract_top_level_string_field(raw, "hash");
        raw_messages.push(RawMessage {
            index,
            raw: raw.to_owned(),
            hash,
        });
    }

    Ok(LazyRecording {
        schema_version: header.schema_version,
        scenario_name: header.scenario_name,
        recorded_at: header.recorded_at,
        messages: raw_messages,
    })
}

/// Locates the `[ ... ]` span of the top-level `"messages"` key via a plain
/// substring search plus a balanced-bracket scan — sufficient because
/// `Recording` only ever carries one field literally named `"messages"`.
fn find_messages_array(text: &str) -> Result<&str, RecordingError> {
    let key_pos = text.find("\"messages\"").ok_or_else(|| {
        RecordingError::Parse(serde_json::Error::custom_missing_messages())
    })?;
    let after_key = &text[key_pos + "\"messages\"".len()..];
    let colon_pos = after_key
        .find(':')
        .ok_or_else(|| RecordingError::Parse(serde_json::Error::custom_missing_messages()))?;
    let after_colon = after_key[colon_pos + 1..].trim_start();
    if !after_colon.starts_with('[') {
        return Err(RecordingError::Parse(serde_json::Error::custom_missing_messages()));
    }
    let bracket_offset = text.len() - after_colon.len();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let bytes = after_colon.as_bytes();
    let mut end = None;
    for (i, &b) in bytes.iter().enumerate() {
        let c = b as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let end = end.ok_or_else(|| RecordingError::Parse(serde_json::Error::custom_missing_messages()))?;
    Ok(&text[bracket_offset..bracket_offset + end])
}

/// Splits a `[ ... ]` span into its top-level element substrings, yielding
/// to the scheduler every [`CHUNK`] elements or [`YIELD_CHARS`] scanned.
async fn split_top_level_elements(array_span: &str) -> Vec<&str> {
    let inner = &array_span[1..array_span.len().saturating_sub(1)];
    let mut elements = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut start: Option<usize> = None;
    let mut chars_since_yield = 0usize;

    for (i, c) in inner.char_indices() {
        chars_since_yield += 1;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                if start.is_none() {
                    start = Some(i);
                }
            }
            '{' | '[' => {
                if depth == 0 && start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    let s = start.take().expect("element start tracked at depth 0 entry");
                    elements.push(inner[s..=i].trim());
                    if elements.len() % CHUNK == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }
            _ => {}
        }
        if chars_since_yield >= YIELD_CHARS {
            chars_since_yield = 0;
            tokio::task::yield_now().await;
        }
    }
    elements
}

/// Finds `"field": <value>` at the top level of a JSON object substring
/// (depth 1, i.e. not nested inside `payload`), and decodes the value if
/// it is a string or null. Used to extract `hash` without decoding the
/// envelope's `payload`.
fn extract_top_level_string_field(raw: &str, field: &str) -> Option<String> {
    let needle = format!("\"{field}\"");
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0usize;
    while i < raw.len() {
        let c = bytes[i] as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                if depth == 1 && raw[i..].starts_with(&needle) {
                    let after_key = &raw[i + needle.len()..];
                    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();
                    if let Some(rest) = after_colon.strip_prefix('"') {
                        let end = rest.find('"')?;
                        return Some(rest[..end].to_owned());
                    } else if after_colon.starts_with("null") {
                        return None;
                    }
                }
                in_string = true;
            }
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

trait CustomMissingMessages {
    fn custom_missing_messages() -> Self;
}

impl CustomMissingMessages for serde_json::Error {
    fn custom_missing_messages() -> Self {
        use serde::de::Error;
        serde_json::Error::custom("recording is missing a well-formed \"messages\" array")
    }
}
