//! # fm-project
//!
//! On-disk project state for the ffmigo pipeline: the project directory
//! layout, current-input resolution and versioning, asset ingestion, and
//! the append-only checkpoint history that keeps destructive edits
//! undoable.

pub mod checkpoint;
pub mod store;

pub use checkpoint::{Checkpoint, CheckpointMeta, CheckpointStore, RestoreMode};
pub use store::ProjectStore;
