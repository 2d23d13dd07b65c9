//! Project directory management: creation, current-input resolution, and
//! asset ingestion.
//!
//! A project is a directory named by its creation timestamp. It contains the
//! current input (`input.<ext>` or `input_<N>.<ext>`), an `assets/`
//! subdirectory for attached auxiliary files, checkpoint snapshots, a probe
//! cache file, and optional display-name metadata.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Subdirectory holding ingested auxiliary files.
pub const ASSETS_DIR: &str = "assets";

/// Probe cache filename inside a project directory.
pub const PROBE_CACHE_FILE: &str = "probe_cache.json";

/// Display-name metadata filename.
const PROJECT_META_FILE: &str = "project.json";

/// Upper bound on collision-suffix attempts during asset ingestion.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Store rooted at a projects directory (one subdirectory per project).
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectMeta {
    #[serde(default)]
    display_name: Option<String>,
}

impl ProjectStore {
    /// Create a store over the given projects root.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The projects root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new timestamp-named project directory (with its `assets/`
    /// subdirectory) and return its path.
    pub fn create_project(&self) -> fm_core::Result<PathBuf> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| fm_core::Error::Internal(format!("system clock error: {e}")))?
            .as_secs();

        // Timestamps collide when projects are created within one second;
        // bump until a free slot is found.
        let mut candidate = self.root.join(ts.to_string());
        let mut bump = 0u64;
        while candidate.exists() {
            bump += 1;
            candidate = self.root.join((ts + bump).to_string());
        }

        std::fs::create_dir_all(candidate.join(ASSETS_DIR))?;
        tracing::info!("created project {}", candidate.display());
        Ok(candidate)
    }

    /// List project directories, newest first. Only numeric (timestamp)
    /// directory names qualify.
    pub fn list_projects(&self) -> fm_core::Result<Vec<PathBuf>> {
        let mut projects: Vec<(u64, PathBuf)> = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Ok(ts) = name.to_string_lossy().parse::<u64>() {
                projects.push((ts, entry.path()));
            }
        }

        projects.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(projects.into_iter().map(|(_, p)| p).collect())
    }
}

/// Set the human-readable display name of a project.
pub fn set_display_name(project_dir: &Path, name: &str) -> fm_core::Result<()> {
    let meta = ProjectMeta {
        display_name: Some(name.to_string()),
    };
    let json = serde_json::to_string_pretty(&meta)
        .map_err(|e| fm_core::Error::Internal(format!("serialize project meta: {e}")))?;
    std::fs::write(project_dir.join(PROJECT_META_FILE), json)?;
    Ok(())
}

/// Read a project's display name, if one was set.
pub fn display_name(project_dir: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(project_dir.join(PROJECT_META_FILE)).ok()?;
    let meta: ProjectMeta = serde_json::from_str(&contents).ok()?;
    meta.display_name
}

/// Copy a source media file into the project as version 0 of the input
/// (`input.<ext>`), returning the destination path.
pub fn ingest_input(src: &Path, project_dir: &Path) -> fm_core::Result<PathBuf> {
    let ext = src
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .ok_or_else(|| {
            fm_core::Error::Validation(format!(
                "input file has no extension: {}",
                src.display()
            ))
        })?;
    let dst = project_dir.join(format!("input.{ext}"));
    std::fs::copy(src, &dst)?;
    Ok(dst)
}

/// Parse `input.<ext>` / `input_<N>.<ext>` into its version number.
/// Returns `None` for filenames that are not input candidates.
fn input_version(file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix("input")?;
    let (version, ext) = match rest.strip_prefix('_') {
        Some(numbered) => {
            let (digits, ext) = numbered.split_once('.')?;
            (digits.parse::<u32>().ok()?, ext)
        }
        None => (0, rest.strip_prefix('.')?),
    };
    if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(version)
    } else {
        None
    }
}

/// All input candidates in a project directory as (version, path) pairs.
fn input_candidates(project_dir: &Path) -> fm_core::Result<Vec<(u32, PathBuf)>> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(project_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(version) = input_version(&name) {
            candidates.push((version, entry.path()));
        }
    }
    Ok(candidates)
}

/// Resolve the single live input of a project: the candidate with the
/// highest version number, with `input.<ext>` counting as version 0.
pub fn resolve_current_input(project_dir: &Path) -> fm_core::Result<PathBuf> {
    input_candidates(project_dir)?
        .into_iter()
        .max_by_key(|(version, _)| *version)
        .map(|(_, path)| path)
        .ok_or_else(|| {
            fm_core::Error::Validation(format!(
                "project {} has no input file",
                project_dir.display()
            ))
        })
}

/// The smallest unused input version number >= 1.
///
/// Input versions deliberately reuse freed slots (restore-then-edit can
/// produce `input_1` again); the checkpoint counter is the strictly
/// monotonic one. The two numbering schemes are independent.
pub fn next_input_version(project_dir: &Path) -> fm_core::Result<u32> {
    let used: Vec<u32> = input_candidates(project_dir)?
        .into_iter()
        .map(|(version, _)| version)
        .collect();
    let mut n = 1;
    while used.contains(&n) {
        n += 1;
    }
    Ok(n)
}

/// Promote a produced output file to the new current input
/// (`input_<N>.<ext>` for the next free N), returning the new path.
pub fn advance_current_input(project_dir: &Path, output: &Path) -> fm_core::Result<PathBuf> {
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .ok_or_else(|| {
            fm_core::Error::Consistency(format!(
                "produced output has no extension: {}",
                output.display()
            ))
        })?;
    let version = next_input_version(project_dir)?;
    let dst = project_dir.join(format!("input_{version}.{ext}"));
    std::fs::rename(output, &dst)?;
    tracing::info!("current input advanced to {}", dst.display());
    Ok(dst)
}

/// Remove every input candidate in the project directory. Used by restore
/// to eliminate ambiguity before writing the snapshot back out.
pub fn clear_input_candidates(project_dir: &Path) -> fm_core::Result<()> {
    for (_, path) in input_candidates(project_dir)? {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

/// Strip a filename down to a safe alphanumeric/`.`/`_`/`-` set,
/// substituting `_` and guaranteeing a non-empty basename.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // A name of only dots/underscores would vanish as a stem; anchor it.
    let stem_is_empty = sanitized
        .rsplit_once('.')
        .map(|(stem, _)| stem.is_empty())
        .unwrap_or(sanitized.is_empty());
    if stem_is_empty {
        format!("asset{sanitized}")
    } else {
        sanitized
    }
}

/// Project-relative paths of all ingested assets, sorted by name.
pub fn list_assets(project_dir: &Path) -> fm_core::Result<Vec<String>> {
    let assets = project_dir.join(ASSETS_DIR);
    let entries = match std::fs::read_dir(&assets) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(format!(
                "{ASSETS_DIR}/{}",
                entry.file_name().to_string_lossy()
            ));
        }
    }
    names.sort_unstable();
    Ok(names)
}

/// Copy an auxiliary file into the project's `assets/` subdirectory with a
/// sanitized, collision-free name. Returns the project-relative and
/// absolute destination paths.
pub fn ingest_asset(src: &Path, project_dir: &Path) -> fm_core::Result<(String, PathBuf)> {
    let assets = project_dir.join(ASSETS_DIR);
    std::fs::create_dir_all(&assets)?;

    let original = src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "asset".to_string());
    let sanitized = sanitize_file_name(&original);

    let (stem, ext) = match sanitized.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), Some(ext.to_string())),
        None => (sanitized.clone(), None),
    };

    let mut name = sanitized;
    let mut attempt = 0u32;
    while assets.join(&name).exists() {
        attempt += 1;
        if attempt > MAX_NAME_ATTEMPTS {
            return Err(fm_core::Error::Validation(format!(
                "could not find a free name for asset '{original}' after {MAX_NAME_ATTEMPTS} attempts"
            )));
        }
        name = match &ext {
            Some(ext) => format!("{stem}_{attempt}.{ext}"),
            None => format!("{stem}_{attempt}"),
        };
    }

    let dst = assets.join(&name);
    std::fs::copy(src, &dst)?;
    Ok((format!("{ASSETS_DIR}/{name}"), dst))
}
