//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! sub-configs for external tools, the translator endpoint, project storage,
//! and execution limits. Every section defaults sensibly so a completely
//! empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub translator: TranslatorConfig,
    pub projects: ProjectsConfig,
    pub execution: ExecutionConfig,
    pub merge: MergeConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Internal(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.translator.endpoint.is_empty() {
            warnings.push("translator.endpoint is empty; edit requests will fail".into());
        }
        if self.translator.model.is_empty() {
            warnings.push("translator.model is empty".into());
        }
        if self.execution.timeout_secs == 0 {
            warnings.push("execution.timeout_secs is 0; commands will be killed immediately".into());
        }
        if let Some(ref p) = self.tools.ffmpeg_path {
            if !p.exists() {
                warnings.push(format!(
                    "tools.ffmpeg_path '{}' does not exist; falling back to PATH",
                    p.display()
                ));
            }
        }
        if let Some(ref p) = self.tools.ffprobe_path {
            if !p.exists() {
                warnings.push(format!(
                    "tools.ffprobe_path '{}' does not exist; falling back to PATH",
                    p.display()
                ));
            }
        }

        warnings
    }
}

/// Paths to external CLI tools. `None` means "search PATH and the common
/// install locations".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Settings for the external natural-language-to-command translator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// HTTP endpoint of the completion API.
    pub endpoint: String,
    /// Model name passed to the endpoint.
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_translator_timeout")]
    pub timeout_secs: u64,
}

fn default_translator_timeout() -> u64 {
    200
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/generate".into(),
            model: "qwen3:latest".into(),
            timeout_secs: default_translator_timeout(),
        }
    }
}

/// Project storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectsConfig {
    /// Directory under which project directories are created.
    pub root: PathBuf,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: home.join(".ffmigo").join("projects"),
        }
    }
}

/// Command execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Hard wall-clock timeout for a single command, in seconds.
    #[serde(default = "default_exec_timeout")]
    pub timeout_secs: u64,
    /// Number of corrected-command retries after a failed run
    /// (total attempts = retries + 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_exec_timeout() -> u64 {
    1800
}

fn default_max_retries() -> u32 {
    2
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_exec_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ExecutionConfig {
    /// The configured timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Encode settings used by the merge engine's normalize path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    #[serde(default = "default_video_crf")]
    pub video_crf: u32,
    #[serde(default = "default_video_preset")]
    pub video_preset: String,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    /// Target sample rate all audio is resampled to on the normalize path.
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,
}

fn default_video_crf() -> u32 {
    18
}
fn default_video_preset() -> String {
    "veryfast".into()
}
fn default_audio_bitrate() -> String {
    "192k".into()
}
fn default_audio_sample_rate() -> u32 {
    44_100
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            video_crf: default_video_crf(),
            video_preset: default_video_preset(),
            audio_bitrate: default_audio_bitrate(),
            audio_sample_rate: default_audio_sample_rate(),
        }
    }
}
