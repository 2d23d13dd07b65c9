//! # fm-av
//!
//! External tool management, command validation and execution, media
//! probing, and merge planning for the ffmigo pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command validation** ([`CommandPolicy`]) -- the safety gate every
//!   externally generated command string must pass before execution.
//! - **Command execution** ([`ToolCommand`]) -- async builder with working
//!   directory, timeout, and cancellation support; captures full output.
//! - **Media probing** ([`probe::Prober`], [`probe::ProbeCache`]) -- ffprobe
//!   metadata extraction memoized by content fingerprint.
//! - **Merge planning** ([`merge::MergeEngine`]) -- lossless concat vs.
//!   normalizing re-encode, decided from probe results.

pub mod command;
pub mod merge;
pub mod probe;
pub mod progress;
pub mod tools;
pub mod validate;

// ---- Re-exports for convenience ----

pub use command::{ExecResult, ExecStatus, ToolCommand};
pub use merge::{CompatibilityReport, MergeEngine, MergeReport, MergeStrategy};
pub use probe::{MediaAnalysis, ProbeCache, Prober};
pub use progress::ProgressSender;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use validate::CommandPolicy;
