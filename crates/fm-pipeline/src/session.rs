//! The edit loop: checkpoint, translate, validate, execute, verify,
//! promote.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use fm_av::{CommandPolicy, Prober, ProgressSender, ToolCommand, ToolRegistry};
use fm_av::command::ExecStatus;
use fm_core::config::ExecutionConfig;
use fm_project::{store, CheckpointStore};

use crate::translator::{TranslateContext, Translator};

/// Stderr fed back to the translator is capped at this many characters;
/// ffmpeg failures routinely dump the full build configuration first.
const FEEDBACK_TAIL: usize = 2000;

/// What a successful edit produced.
#[derive(Debug)]
pub struct EditOutcome {
    /// Checkpoint recorded before the input was touched.
    pub checkpoint_id: u32,
    /// The command that finally succeeded.
    pub command: String,
    /// The promoted new current input.
    pub new_input: PathBuf,
    /// How many attempts it took (1 = first command worked).
    pub attempts: u32,
}

/// Runs natural-language edits against one project.
///
/// A session holds no locks; callers must not run two mutating operations
/// (edits, merges, restores) against the same project concurrently, since
/// both would race on the current-input files.
pub struct EditSession {
    project_dir: PathBuf,
    tools: ToolRegistry,
    policy: CommandPolicy,
    execution: ExecutionConfig,
}

impl EditSession {
    pub fn new(project_dir: PathBuf, tools: ToolRegistry, execution: ExecutionConfig) -> Self {
        Self {
            project_dir,
            tools,
            policy: CommandPolicy::default(),
            execution,
        }
    }

    /// Replace the default command policy.
    pub fn with_policy(mut self, policy: CommandPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run one edit end to end and return the promoted input.
    ///
    /// A checkpoint of the current input is recorded before anything runs,
    /// so a failed or cancelled edit never loses state. Only a run that
    /// exits non-zero is fed back to the translator and retried, up to
    /// `execution.max_retries` extra times; everything else is terminal.
    ///
    /// # Errors
    ///
    /// [`fm_core::Error::Validation`] when the translated command is
    /// rejected, [`fm_core::Error::Consistency`] when a run reports
    /// success but the promised output does not exist,
    /// [`fm_core::Error::Execution`] on timeout or cancellation,
    /// [`fm_core::Error::RetryExhausted`] when every attempt failed, plus
    /// any translator, tool-resolution, or I/O error.
    pub async fn run_edit(
        &self,
        translator: &dyn Translator,
        request: &str,
        prober: Option<&Prober>,
        cancellation: CancellationToken,
        progress: &ProgressSender,
    ) -> fm_core::Result<EditOutcome> {
        let input = store::resolve_current_input(&self.project_dir)?;
        let input_name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let input_ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();

        // A probe failure degrades the prompt, not the edit.
        let media_summary = match prober {
            Some(prober) => match prober.probe(&input).await {
                Ok(analysis) => Some(analysis.summary()),
                Err(e) => {
                    tracing::warn!("probe failed, translating without media info: {e}");
                    None
                }
            },
            None => None,
        };
        let assets = store::list_assets(&self.project_dir)?;

        progress.send(5.0, "Recording checkpoint");
        let checkpoints = CheckpointStore::new(self.project_dir.clone());
        let checkpoint_id = checkpoints.create(&input, "edit", Some(request))?;

        let max_attempts = 1 + self.execution.max_retries;
        let mut previous_command: Option<String> = None;
        let mut previous_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            let ctx = TranslateContext {
                input_name: input_name.clone(),
                input_ext: input_ext.clone(),
                media_summary: media_summary.clone(),
                assets: assets.clone(),
                previous_command: previous_command.take(),
                previous_error: previous_error.take(),
            };

            progress.send(15.0, "Translating request");
            let command = translator.translate(request, &ctx).await?;
            tracing::info!(attempt, "translated command: {command}");

            // A rejected command is terminal: nothing unsafe ever ran, so
            // there is no tool failure for the translator to correct.
            self.policy.validate(&command)?;
            let output_name = fm_av::validate::output_token(&command).ok_or_else(|| {
                fm_core::Error::Internal("validated command lost its output token".into())
            })?;

            let mut cmd = ToolCommand::from_line(&command, &self.tools)?;
            cmd.workdir(&self.project_dir)
                .timeout(self.execution.timeout())
                .cancellation(cancellation.clone());

            // A leftover output from an earlier failed attempt must not
            // satisfy this attempt's existence check.
            let output = self.project_dir.join(&output_name);
            match std::fs::remove_file(&output) {
                Ok(()) => tracing::debug!("removed stale {output_name}"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            progress.send(30.0, "Running ffmpeg");
            let result = cmd.execute().await?;

            match result.status {
                ExecStatus::Cancelled => {
                    return Err(fm_core::Error::execution("edit cancelled"));
                }
                ExecStatus::TimedOut => {
                    return Err(fm_core::Error::execution(format!(
                        "command timed out after {}s",
                        self.execution.timeout_secs
                    )));
                }
                ExecStatus::Completed(0) => {
                    if !output.exists() {
                        // Success without the promised artifact is the one
                        // failure that must never be retried or papered
                        // over: exit code and side effect disagree.
                        return Err(fm_core::Error::Consistency(format!(
                            "command reported success but produced no {output_name}"
                        )));
                    }

                    progress.send(90.0, "Promoting output");
                    let new_input = store::advance_current_input(&self.project_dir, &output)?;
                    progress.send(100.0, "Done");
                    return Ok(EditOutcome {
                        checkpoint_id,
                        command,
                        new_input,
                        attempts: attempt,
                    });
                }
                ExecStatus::Completed(_) => {
                    let summary = tail(&result.failure_summary(), FEEDBACK_TAIL);
                    tracing::warn!(attempt, "command failed: {summary}");
                    previous_error = Some(summary);
                    previous_command = Some(command);
                }
            }
        }

        Err(fm_core::Error::RetryExhausted {
            attempts: max_attempts,
            last_error: previous_error.unwrap_or_else(|| "no attempt recorded".into()),
        })
    }
}

fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        s.to_string()
    } else {
        s.chars().skip(count - max_chars).collect()
    }
}
