//! Checkpoint snapshots of a project's current input.
//!
//! Every mutating operation records a checkpoint first: a byte-for-byte copy
//! of the current input (`checkpoint_<id>.<ext>`) plus a sibling metadata
//! file (`checkpoint_<id>.json`). Restoring rewinds the project's current
//! input to a snapshot, optionally discarding the checkpoints after it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store;

/// Metadata recorded alongside each snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub id: u32,
    pub timestamp: DateTime<Utc>,
    /// Human-readable description of the operation that followed the
    /// checkpoint ("edit", "merge", ...).
    pub operation: String,
    /// The raw user request that triggered the operation, if any.
    #[serde(default)]
    pub request: Option<String>,
    /// Filename of the input that was snapshotted.
    pub source_file: String,
    /// Snapshot size in bytes.
    pub size: u64,
}

/// A snapshot together with its metadata.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub meta: CheckpointMeta,
    pub snapshot: PathBuf,
}

/// What to do with the checkpoints recorded after a restored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// Leave later checkpoints in place; a subsequent edit simply branches.
    #[default]
    KeepHistory,
    /// Delete every checkpoint with an id greater than the restored one.
    Truncate,
}

/// Checkpoint store over a single project directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

/// Parse `checkpoint_<id>.<ext>` and report whether the file is the
/// metadata sibling (`.json`) or the snapshot itself.
fn parse_checkpoint_name(file_name: &str) -> Option<(u32, bool)> {
    let rest = file_name.strip_prefix("checkpoint_")?;
    let (digits, ext) = rest.split_once('.')?;
    let id = digits.parse::<u32>().ok()?;
    Some((id, ext == "json"))
}

impl CheckpointStore {
    pub fn new(project_dir: PathBuf) -> Self {
        Self { dir: project_dir }
    }

    /// Highest checkpoint id present, or 0 when the project has none.
    fn max_id(&self) -> fm_core::Result<u32> {
        let mut max = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((id, _)) = parse_checkpoint_name(&name) {
                max = max.max(id);
            }
        }
        Ok(max)
    }

    /// Snapshot the given input file and record its metadata. Returns the
    /// new checkpoint's id.
    ///
    /// Ids are allocated as max + 1: unlike input versions, a gap below the
    /// highest id is never reused, so checkpoint references in logs stay
    /// unambiguous across a restore that keeps history.
    pub fn create(
        &self,
        input: &Path,
        operation: &str,
        request: Option<&str>,
    ) -> fm_core::Result<u32> {
        let source_file = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                fm_core::Error::checkpoint(format!("cannot snapshot {}", input.display()))
            })?;
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .ok_or_else(|| {
                fm_core::Error::checkpoint(format!("input has no extension: {source_file}"))
            })?;

        let id = self.max_id()? + 1;
        let snapshot = self.dir.join(format!("checkpoint_{id}.{ext}"));
        let size = std::fs::copy(input, &snapshot)?;

        let meta = CheckpointMeta {
            id,
            timestamp: Utc::now(),
            operation: operation.to_string(),
            request: request.map(str::to_string),
            source_file,
            size,
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| fm_core::Error::checkpoint(format!("serialize metadata: {e}")))?;
        std::fs::write(self.dir.join(format!("checkpoint_{id}.json")), json)?;

        tracing::info!(id, "recorded checkpoint {}", snapshot.display());
        Ok(id)
    }

    fn snapshot_path(&self, id: u32) -> fm_core::Result<Option<PathBuf>> {
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((found, is_meta)) = parse_checkpoint_name(&name) {
                if found == id && !is_meta {
                    return Ok(Some(entry.path()));
                }
            }
        }
        Ok(None)
    }

    fn read_meta(&self, id: u32) -> fm_core::Result<Option<CheckpointMeta>> {
        let path = self.dir.join(format!("checkpoint_{id}.json"));
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta = serde_json::from_str(&contents).map_err(|e| {
            fm_core::Error::checkpoint(format!("corrupt metadata for checkpoint {id}: {e}"))
        })?;
        Ok(Some(meta))
    }

    /// All checkpoints with intact metadata and snapshot, ordered by id.
    pub fn list(&self) -> fm_core::Result<Vec<Checkpoint>> {
        let mut ids: Vec<u32> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((id, is_meta)) = parse_checkpoint_name(&name) {
                if is_meta && !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();

        let mut checkpoints = Vec::with_capacity(ids.len());
        for id in ids {
            let meta = match self.read_meta(id)? {
                Some(meta) => meta,
                None => continue,
            };
            if let Some(snapshot) = self.snapshot_path(id)? {
                checkpoints.push(Checkpoint { meta, snapshot });
            }
        }
        Ok(checkpoints)
    }

    /// Rewind the project's current input to the given checkpoint.
    ///
    /// Every existing input candidate is removed first, then the snapshot is
    /// copied back out as `input.<ext>` using the snapshot's own extension.
    /// The snapshot itself is never consumed. Returns the restored input
    /// path.
    pub fn restore(&self, id: u32, mode: RestoreMode) -> fm_core::Result<PathBuf> {
        if self.read_meta(id)?.is_none() {
            return Err(fm_core::Error::checkpoint(format!(
                "metadata for checkpoint {id} is missing"
            )));
        }
        let snapshot = self.snapshot_path(id)?.ok_or_else(|| {
            fm_core::Error::checkpoint(format!("snapshot for checkpoint {id} is missing"))
        })?;
        let ext = snapshot
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .ok_or_else(|| {
                fm_core::Error::checkpoint(format!("snapshot for checkpoint {id} has no extension"))
            })?;

        store::clear_input_candidates(&self.dir)?;
        let restored = self.dir.join(format!("input.{ext}"));
        std::fs::copy(&snapshot, &restored)?;

        if mode == RestoreMode::Truncate {
            for entry in std::fs::read_dir(&self.dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                if let Some((found, _)) = parse_checkpoint_name(&name) {
                    if found > id {
                        std::fs::remove_file(entry.path())?;
                    }
                }
            }
        }

        tracing::info!(id, "restored {}", restored.display());
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn checkpoint_name_parsing() {
        assert_eq!(parse_checkpoint_name("checkpoint_1.mp4"), Some((1, false)));
        assert_eq!(parse_checkpoint_name("checkpoint_12.json"), Some((12, true)));
        assert_eq!(parse_checkpoint_name("checkpoint_x.mp4"), None);
        assert_eq!(parse_checkpoint_name("input_1.mp4"), None);
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(dir.path(), "input.mp4", b"v0");
        let store = CheckpointStore::new(dir.path().to_path_buf());

        assert_eq!(store.create(&input, "edit", Some("trim")).unwrap(), 1);
        assert_eq!(store.create(&input, "edit", None).unwrap(), 2);
        assert_eq!(store.create(&input, "merge", None).unwrap(), 3);

        // A history-keeping restore leaves ids 2 and 3 in place, so the
        // next checkpoint takes a fresh id above them.
        store.restore(1, RestoreMode::KeepHistory).unwrap();
        assert_eq!(store.create(&input, "edit", None).unwrap(), 4);
    }

    #[test]
    fn snapshot_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(dir.path(), "input.mov", b"original frames");
        let store = CheckpointStore::new(dir.path().to_path_buf());

        let id = store.create(&input, "edit", Some("make it gif")).unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        let cp = &listed[0];
        assert_eq!(cp.meta.id, id);
        assert_eq!(cp.meta.operation, "edit");
        assert_eq!(cp.meta.request.as_deref(), Some("make it gif"));
        assert_eq!(cp.meta.source_file, "input.mov");
        assert_eq!(cp.meta.size, 15);
        assert_eq!(cp.snapshot.file_name().unwrap(), "checkpoint_1.mov");
        assert_eq!(std::fs::read(&cp.snapshot).unwrap(), b"original frames");
    }

    #[test]
    fn restore_rewinds_the_current_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().to_path_buf());

        // Project history: input.mov snapshotted as checkpoint 1, then two
        // edits that changed the extension along the way.
        let original = write(dir.path(), "input.mov", b"mov bytes");
        store.create(&original, "edit", None).unwrap();
        let v1 = write(dir.path(), "input_1.mp4", b"mp4 bytes");
        store.create(&v1, "edit", None).unwrap();
        write(dir.path(), "input_2.gif", b"gif bytes");

        let restored = store.restore(1, RestoreMode::KeepHistory).unwrap();
        assert_eq!(restored.file_name().unwrap(), "input.mov");
        assert_eq!(std::fs::read(&restored).unwrap(), b"mov bytes");

        // Other candidates are gone; the resolver picks the restored file.
        assert!(!dir.path().join("input_1.mp4").exists());
        assert!(!dir.path().join("input_2.gif").exists());
        assert_eq!(store::resolve_current_input(dir.path()).unwrap(), restored);

        // KeepHistory leaves later checkpoints intact.
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn truncate_discards_later_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().to_path_buf());

        let input = write(dir.path(), "input.mp4", b"v0");
        store.create(&input, "edit", None).unwrap();
        store.create(&input, "edit", None).unwrap();
        store.create(&input, "edit", None).unwrap();

        store.restore(1, RestoreMode::Truncate).unwrap();
        let remaining = store.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].meta.id, 1);
        assert!(!dir.path().join("checkpoint_2.mp4").exists());
        assert!(!dir.path().join("checkpoint_3.json").exists());
    }

    #[test]
    fn restore_distinguishes_missing_pieces() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().to_path_buf());
        let input = write(dir.path(), "input.mp4", b"v0");
        store.create(&input, "edit", None).unwrap();

        // Unknown id: metadata missing.
        let err = store.restore(9, RestoreMode::KeepHistory).unwrap_err();
        assert!(err.to_string().contains("metadata for checkpoint 9"));

        // Metadata present but snapshot deleted.
        std::fs::remove_file(dir.path().join("checkpoint_1.mp4")).unwrap();
        let err = store.restore(1, RestoreMode::KeepHistory).unwrap_err();
        assert!(err.to_string().contains("snapshot for checkpoint 1"));
    }
}
