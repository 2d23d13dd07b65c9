//! fm-core: shared error type and configuration for the ffmigo pipeline.
//!
//! This crate is the foundational dependency for all other fm-* crates,
//! providing the unified error taxonomy and application configuration.

pub mod config;
pub mod error;

// Re-export the most commonly used items at the crate root.
pub use config::Config;
pub use error::{Error, Result};
