//! The seam between the pipeline and whatever turns a natural-language
//! request into an ffmpeg command line.

use async_trait::async_trait;

/// Everything a translator may want to know about the current attempt.
///
/// On a retry, `previous_command` and `previous_stderr` carry the failed
/// attempt so the translator can correct itself.
#[derive(Debug, Clone, Default)]
pub struct TranslateContext {
    /// Filename of the current input inside the project directory
    /// (e.g. `input_2.mp4`). Generated commands must reference exactly
    /// this file.
    pub input_name: String,
    /// Extension of the current input, without the dot.
    pub input_ext: String,
    /// One-line probe summary of the input, when probing succeeded.
    pub media_summary: Option<String>,
    /// Project-relative paths of ingested auxiliary files.
    pub assets: Vec<String>,
    /// The command that failed on the previous attempt.
    pub previous_command: Option<String>,
    /// Tail of the failed attempt's stderr.
    pub previous_error: Option<String>,
}

/// Produces a single-line ffmpeg command for a user request.
///
/// Implementations are external and untrusted; everything they return goes
/// through [`fm_av::CommandPolicy`] before execution.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        request: &str,
        ctx: &TranslateContext,
    ) -> fm_core::Result<String>;
}
