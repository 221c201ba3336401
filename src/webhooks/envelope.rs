//! Relay envelope parsing.
//!
//! Relayed deliveries wrap the raw webhook body (base64) and its headers.
//! Current relays send JSON:
//!
//! ```text
//! {"rawBodyB64": "eyJ...", "headers": {"X-GitHub-Event": "issues", ...}}
//! ```
//!
//! Older relays stringified the same map without quoting:
//!
//! ```text
//! {rawBodyB64=eyJ..., headers={X-GitHub-Event=issues, ...}}
//! ```
//!
//! Both are accepted through [`parse_envelope`].

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("message is neither a JSON envelope nor the legacy map form")]
    InvalidEnvelope,

    #[error("rawBodyB64 is not valid base64: {0}")]
    Body(#[from] base64::DecodeError),
}

/// A relayed delivery: the still-encoded body plus its HTTP headers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "rawBodyB64")]
    pub raw_body_b64: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Envelope {
    /// Decodes the raw body bytes the signature was computed over.
    pub fn raw_body(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(STANDARD.decode(self.raw_body_b64.trim())?)
    }
}

/// Parses canonical JSON first, then the legacy map form.
pub fn parse_envelope(raw: &str) -> Result<Envelope, EnvelopeError> {
    if let Ok(envelope) = serde_json::from_str::<Envelope>(raw) {
        return Ok(envelope);
    }
    parse_legacy(raw).ok_or(EnvelopeError::InvalidEnvelope)
}

fn parse_legacy(raw: &str) -> Option<Envelope> {
    let inner = raw.trim().strip_prefix('{')?.strip_suffix('}')?;

    let mut raw_body_b64 = None;
    let mut headers = BTreeMap::new();
    for field in split_top_level(inner)? {
        let (key, value) = field.split_once('=')?;
        match key.trim() {
            "rawBodyB64" => raw_body_b64 = Some(value.trim().to_string()),
            "headers" => headers = parse_legacy_map(value.trim())?,
            _ => {}
        }
    }

    Some(Envelope {
        raw_body_b64: raw_body_b64?,
        headers,
    })
}

/// `{k=v, k=v}`. Values may contain `=` (signature headers do).
fn parse_legacy_map(raw: &str) -> Option<BTreeMap<String, String>> {
    let inner = raw.strip_prefix('{')?.strip_suffix('}')?;
    let mut map = BTreeMap::new();
    for entry in split_top_level(inner)? {
        if entry.trim().is_empty() {
            continue;
        }
        let (key, value) = entry.split_once('=')?;
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Some(map)
}

/// Splits on commas outside braces. `None` on unbalanced braces.
fn split_top_level(s: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&s[start..]);
    Some(parts)
}
