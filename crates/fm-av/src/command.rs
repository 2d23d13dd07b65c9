//! Typed builder for executing external tool commands.
//!
//! [`ToolCommand`] is the only way the pipeline spawns a process: arguments
//! are held as a structured list (never re-parsed from a string after
//! validation), the working directory is pinned to the project directory,
//! and a hard wall-clock timeout plus a cooperative cancellation token bound
//! every run. Output is captured incrementally so that whatever arrived
//! before a timeout or cancellation is still returned for diagnostics.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::tools::ToolRegistry;

/// Default command timeout: 30 minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

/// How a command run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// The process exited on its own with the given code
    /// (-1 if terminated by a signal).
    Completed(i32),
    /// The wall-clock timeout expired and the process was killed.
    TimedOut,
    /// The cancellation token fired and the process was killed.
    Cancelled,
}

/// Uniform result of every command-running operation.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// How the run ended.
    pub status: ExecStatus,
    /// Captured standard output (lossy UTF-8), possibly partial on
    /// timeout or cancellation.
    pub stdout: String,
    /// Captured standard error (lossy UTF-8), possibly partial on
    /// timeout or cancellation.
    pub stderr: String,
}

impl ExecResult {
    /// `true` only for a clean zero exit.
    pub fn success(&self) -> bool {
        matches!(self.status, ExecStatus::Completed(0))
    }

    /// Exit code of the run; -1 for timeout, cancellation, or a
    /// signal-terminated process.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            ExecStatus::Completed(code) => code,
            ExecStatus::TimedOut | ExecStatus::Cancelled => -1,
        }
    }

    /// One-line description of a failed run, fit for user display and for
    /// feeding back to the translator.
    pub fn failure_summary(&self) -> String {
        match self.status {
            ExecStatus::Completed(code) => {
                format!("exited with code {code}: {}", self.stderr.trim())
            }
            ExecStatus::TimedOut => format!("timed out: {}", self.stderr.trim()),
            ExecStatus::Cancelled => "cancelled".to_string(),
        }
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use fm_av::ToolCommand;
/// use std::path::{Path, PathBuf};
///
/// # async fn example() -> fm_core::Result<()> {
/// let result = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-y")
///     .arg("-i").arg("input.mp4")
///     .arg("output.mp4")
///     .workdir(Path::new("/projects/12345"))
///     .execute()
///     .await?;
/// assert!(result.success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    timeout: Duration,
    cancellation: CancellationToken,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            workdir: None,
            timeout: DEFAULT_TIMEOUT,
            cancellation: CancellationToken::new(),
        }
    }

    /// Build a command from a validated raw command line.
    ///
    /// The line is tokenized respecting shell-style quoting. The leading
    /// token names the tool and is resolved through the registry; the
    /// remaining tokens become the argument list verbatim. The string is
    /// never handed to a shell.
    ///
    /// # Errors
    ///
    /// - [`fm_core::Error::Execution`] if the line is empty or has
    ///   unbalanced quoting.
    /// - [`fm_core::Error::ToolNotFound`] if the leading token is not a
    ///   discovered tool.
    pub fn from_line(line: &str, tools: &ToolRegistry) -> fm_core::Result<Self> {
        let tokens = shell_words::split(line)
            .map_err(|e| fm_core::Error::execution(format!("cannot tokenize command: {e}")))?;

        let (tool, args) = tokens
            .split_first()
            .ok_or_else(|| fm_core::Error::execution("empty command"))?;

        let config = tools.require(tool)?;
        let mut cmd = Self::new(config.path.clone());
        cmd.args(args.iter().cloned());
        Ok(cmd)
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the working directory the process runs in.
    pub fn workdir(&mut self, dir: &Path) -> &mut Self {
        self.workdir = Some(dir.to_path_buf());
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Attach a cancellation token; when it fires the child is terminated
    /// and the run resolves to [`ExecStatus::Cancelled`].
    pub fn cancellation(&mut self, token: CancellationToken) -> &mut Self {
        self.cancellation = token;
        self
    }

    /// The argument list (for logging and inspection).
    pub fn argv(&self) -> &[String] {
        &self.args
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// A non-zero exit is **not** an error at this layer: the captured
    /// triple is the uniform contract and the caller decides whether to
    /// retry. Only a failure to spawn or to manage the process is an
    /// [`fm_core::Error::Execution`].
    pub async fn execute(&self) -> fm_core::Result<ExecResult> {
        let program_name = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.workdir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!("spawning {program_name} {}", self.args.join(" "));

        let mut child = cmd.spawn().map_err(|e| {
            fm_core::Error::execution(format!("failed to spawn {program_name}: {e}"))
        })?;

        // Drain both pipes concurrently with waiting so a chatty child can
        // never fill a pipe buffer and stall, and so partial output survives
        // a kill.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stdout_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = tokio::select! {
            wait = child.wait() => {
                let exit = wait.map_err(|e| {
                    fm_core::Error::execution(format!(
                        "I/O error waiting for {program_name}: {e}"
                    ))
                })?;
                ExecStatus::Completed(exit.code().unwrap_or(-1))
            }
            _ = tokio::time::sleep(self.timeout) => {
                tracing::warn!("{program_name} timed out after {:?}; killing", self.timeout);
                let _ = child.start_kill();
                let _ = child.wait().await;
                ExecStatus::TimedOut
            }
            _ = self.cancellation.cancelled() => {
                tracing::info!("{program_name} cancelled; killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
                ExecStatus::Cancelled
            }
        };

        // The pipes close once the child is gone, so these joins terminate.
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let result = ExecResult {
            status,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        };

        match result.status {
            ExecStatus::Completed(0) => {
                tracing::debug!("{program_name} completed");
            }
            ExecStatus::Completed(code) => {
                tracing::warn!("{program_name} exited with code {code}");
            }
            ExecStatus::TimedOut | ExecStatus::Cancelled => {}
        }

        Ok(result)
    }
}
