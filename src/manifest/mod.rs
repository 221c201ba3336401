//! Manifest transport encoding.
//!
//! The deployed manifest travels through a key/value parameter store whose
//! values are capped in length and whose slot set is fixed. [`encode`] turns a
//! [`WorkerManifest`](crate::workers::WorkerManifest) into that shape: canonical
//! JSON, checksummed, gzip-compressed, base64'd and split into numbered chunks.
//! [`decode`] reverses it and refuses anything whose checksum does not match.

pub mod cache;
pub mod codec;

pub use cache::ManifestCache;
pub use codec::{EncodedManifest, ManifestError, decode, encode};

pub use crate::workers::{load_dir, load_file};

/// Encoding identifier stored alongside the chunks.
pub const ENCODING_ID: &str = "gzip+base64/v1";
pub const SCHEMA_VERSION: &str = "1";

/// Longest value a single transport slot accepts.
pub const MAX_CHUNK_LEN: usize = 4000;
/// Number of chunk slots the transport declares.
pub const MAX_CHUNKS: usize = 40;

// ─── Transport keys ───

pub const KEY_PREFIX: &str = "WorkerManifest";
pub const ENCODING_KEY: &str = "WorkerManifestEncoding";
pub const CHECKSUM_KEY: &str = "WorkerManifestSha256";
pub const SCHEMA_VERSION_KEY: &str = "WorkerManifestSchemaVersion";
pub const CHUNK_COUNT_KEY: &str = "WorkerManifestChunkCount";

/// Key of chunk slot `index` (`WorkerManifestChunk00`, `WorkerManifestChunk01`, ...).
pub fn chunk_key(index: usize) -> String {
    format!("{}Chunk{:02}", KEY_PREFIX, index)
}

/// Collects the transport keys from the process environment.
pub fn values_from_env() -> std::collections::BTreeMap<String, String> {
    values_from_vars(std::env::vars())
}

/// Keeps only the manifest transport keys from a set of variables.
pub fn values_from_vars(
    vars: impl IntoIterator<Item = (String, String)>,
) -> std::collections::BTreeMap<String, String> {
    vars.into_iter()
        .filter(|(k, _)| k.starts_with(KEY_PREFIX))
        .collect()
}
