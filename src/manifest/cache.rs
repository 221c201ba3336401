//! Decoded-manifest cache for one execution context.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::CHECKSUM_KEY;
use super::codec::{Result, decode};
use crate::workers::WorkerManifest;

/// Holds the most recently decoded manifest, keyed by its checksum.
///
/// A redeploy changes the checksum, so the next [`resolve`](Self::resolve)
/// decodes again. The cache is only an optimisation; losing it costs one
/// decode.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entry: Option<(String, Arc<WorkerManifest>)>,
}

impl ManifestCache {
    pub fn new() -> Self {
        ManifestCache::default()
    }

    /// Returns the manifest the transport values describe, decoding only when
    /// the checksum differs from the cached one.
    pub fn resolve(
        &mut self,
        values: &BTreeMap<String, String>,
    ) -> Result<Option<Arc<WorkerManifest>>> {
        let checksum = values.get(CHECKSUM_KEY).map_or("", String::as_str);

        if let Some((cached, manifest)) = &self.entry {
            if !checksum.is_empty() && cached == checksum {
                debug!(checksum = %checksum, "Manifest cache hit");
                return Ok(Some(Arc::clone(manifest)));
            }
        }

        let Some(manifest) = decode(values)? else {
            self.entry = None;
            return Ok(None);
        };
        let manifest = Arc::new(manifest);
        self.entry = Some((checksum.to_string(), Arc::clone(&manifest)));
        Ok(Some(manifest))
    }
}
