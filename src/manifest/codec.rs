//! Chunked, checksummed manifest encoding.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::{
    CHECKSUM_KEY, CHUNK_COUNT_KEY, ENCODING_ID, ENCODING_KEY, MAX_CHUNK_LEN, MAX_CHUNKS,
    SCHEMA_VERSION, SCHEMA_VERSION_KEY, chunk_key,
};
use crate::workers::{ValidationError, WorkerManifest, parse};

#[derive(Debug, Error)]
pub enum ManifestError {
    /// The encoded manifest needs more slots than the transport has.
    #[error("encoded manifest needs {required} chunks, transport allows {max}")]
    SizeLimit { required: usize, max: usize },

    #[error("unsupported manifest encoding '{found}', expected '{}'", ENCODING_ID)]
    UnsupportedEncoding { found: String },

    #[error("unsupported manifest schema version '{found}', expected '{}'", SCHEMA_VERSION)]
    UnsupportedSchema { found: String },

    #[error("invalid manifest chunk count '{value}'")]
    InvalidChunkCount { value: String },

    #[error("manifest chunk {index} is missing")]
    MissingChunk { index: usize },

    #[error("manifest payload is corrupt at {stage}: {message}")]
    Corrupt { stage: &'static str, message: String },

    #[error("manifest checksum mismatch: computed {computed}, stored {stored}")]
    ChecksumMismatch { computed: String, stored: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to compress manifest: {0}")]
    Compress(#[from] std::io::Error),
}

impl ManifestError {
    /// Whether the stored values are damaged or do not belong together.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            ManifestError::UnsupportedEncoding { .. }
                | ManifestError::UnsupportedSchema { .. }
                | ManifestError::InvalidChunkCount { .. }
                | ManifestError::MissingChunk { .. }
                | ManifestError::Corrupt { .. }
                | ManifestError::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// Transport values for one manifest.
///
/// Always carries every chunk slot so a deploy overwrites whatever an earlier,
/// larger manifest left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedManifest {
    pub values: BTreeMap<String, String>,
}

impl EncodedManifest {
    pub fn checksum(&self) -> &str {
        self.values.get(CHECKSUM_KEY).map_or("", String::as_str)
    }

    pub fn chunk_count(&self) -> usize {
        self.values
            .get(CHUNK_COUNT_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn into_values(self) -> BTreeMap<String, String> {
        self.values
    }
}

/// Encodes a manifest for the transport.
///
/// An empty manifest produces the all-empty sentinel with a chunk count of 0,
/// which [`decode`] reads back as "nothing deployed".
pub fn encode(manifest: &WorkerManifest) -> Result<EncodedManifest> {
    if manifest.is_empty() {
        return Ok(sentinel());
    }
    let canonical = serde_json::to_vec(manifest)?;
    encode_bytes(&canonical, MAX_CHUNK_LEN, MAX_CHUNKS)
}

/// Decodes transport values back into a manifest.
///
/// Returns `Ok(None)` when no manifest was deployed (checksum or chunk count
/// absent, or the empty sentinel).
pub fn decode(values: &BTreeMap<String, String>) -> Result<Option<WorkerManifest>> {
    let (Some(stored), Some(count)) = (non_empty(values, CHECKSUM_KEY), non_empty(values, CHUNK_COUNT_KEY))
    else {
        return Ok(None);
    };

    let count: usize = count
        .parse()
        .ok()
        .filter(|n| *n <= MAX_CHUNKS)
        .ok_or_else(|| ManifestError::InvalidChunkCount {
            value: count.to_string(),
        })?;
    if count == 0 {
        return Ok(None);
    }

    let encoding = values.get(ENCODING_KEY).map_or("", String::as_str);
    if encoding != ENCODING_ID {
        return Err(ManifestError::UnsupportedEncoding {
            found: encoding.to_string(),
        });
    }
    let schema = values.get(SCHEMA_VERSION_KEY).map_or("", String::as_str);
    if schema != SCHEMA_VERSION {
        return Err(ManifestError::UnsupportedSchema {
            found: schema.to_string(),
        });
    }

    let mut joined = String::new();
    for index in 0..count {
        let chunk =
            non_empty(values, &chunk_key(index)).ok_or(ManifestError::MissingChunk { index })?;
        joined.push_str(chunk);
    }

    let compressed = STANDARD
        .decode(joined.as_bytes())
        .map_err(|e| corrupt("base64", e))?;
    let mut canonical = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut canonical)
        .map_err(|e| corrupt("gzip", e))?;

    let computed = sha256_hex(&canonical);
    if computed != stored {
        return Err(ManifestError::ChecksumMismatch {
            computed,
            stored: stored.to_string(),
        });
    }

    let raw: Value = serde_json::from_slice(&canonical).map_err(|e| corrupt("json", e))?;
    let Value::Array(items) = raw else {
        return Err(corrupt("json", "expected a list of worker definitions"));
    };
    let workers = items
        .iter()
        .enumerate()
        .map(|(i, item)| parse(item, &format!("manifest[{}]", i)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    debug!(checksum = %stored, chunks = count, workers = workers.len(), "Decoded worker manifest");
    Ok(Some(WorkerManifest::new(workers)?))
}

fn encode_bytes(canonical: &[u8], chunk_len: usize, max_chunks: usize) -> Result<EncodedManifest> {
    let checksum = sha256_hex(canonical);

    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(canonical)?;
    let text = STANDARD.encode(gz.finish()?);

    let required = text.len().div_ceil(chunk_len);
    if required > max_chunks {
        return Err(ManifestError::SizeLimit {
            required,
            max: max_chunks,
        });
    }

    let mut values = base_values(ENCODING_ID, &checksum, SCHEMA_VERSION, required);
    // Base64 output is ASCII, so byte offsets are char boundaries.
    for (index, start) in (0..text.len()).step_by(chunk_len).enumerate() {
        let end = (start + chunk_len).min(text.len());
        values.insert(chunk_key(index), text[start..end].to_string());
    }

    debug!(checksum = %checksum, chunks = required, bytes = text.len(), "Encoded worker manifest");
    Ok(EncodedManifest { values })
}

fn sentinel() -> EncodedManifest {
    EncodedManifest {
        values: base_values("", "", "", 0),
    }
}

fn base_values(encoding: &str, checksum: &str, schema: &str, count: usize) -> BTreeMap<String, String> {
    let mut values: BTreeMap<String, String> =
        (0..MAX_CHUNKS).map(|i| (chunk_key(i), String::new())).collect();
    values.insert(ENCODING_KEY.to_string(), encoding.to_string());
    values.insert(CHECKSUM_KEY.to_string(), checksum.to_string());
    values.insert(SCHEMA_VERSION_KEY.to_string(), schema.to_string());
    values.insert(CHUNK_COUNT_KEY.to_string(), count.to_string());
    values
}

fn non_empty<'a>(values: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    values
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn corrupt(stage: &'static str, err: impl std::fmt::Display) -> ManifestError {
    ManifestError::Corrupt {
        stage,
        message: err.to_string(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
