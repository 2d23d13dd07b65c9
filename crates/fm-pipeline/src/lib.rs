//! # fm-pipeline
//!
//! Orchestration of a single natural-language edit: translate the request
//! into an ffmpeg command, validate it, checkpoint the project, execute the
//! command with timeout and cancellation, verify the produced output, and
//! advance the project's current input. Failed attempts are retried with
//! the failure fed back to the translator.

pub mod session;
pub mod translator;

pub use session::{EditOutcome, EditSession};
pub use translator::{TranslateContext, Translator};
