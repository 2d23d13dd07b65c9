use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffmigo")]
#[command(author, version, about = "Natural-language video editing on top of ffmpeg")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a project from a video file
    New {
        /// Video file to import
        #[arg(required = true)]
        input: PathBuf,

        /// Human-readable project name
        #[arg(long)]
        name: Option<String>,
    },

    /// Apply a natural-language edit to a project's current video
    Edit {
        /// What to do, in plain words (e.g. "convert to gif at 10 fps")
        #[arg(required = true)]
        request: String,

        /// Project directory (defaults to the most recent project)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// Concatenate video files into one output
    Merge {
        /// Input files, in order
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long, required = true)]
        output: PathBuf,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Attach an auxiliary file (audio, image, ...) to a project
    Attach {
        /// File to attach
        #[arg(required = true)]
        file: PathBuf,

        /// Project directory (defaults to the most recent project)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// List the checkpoints of a project
    Checkpoints {
        /// Project directory (defaults to the most recent project)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// Restore a project to a checkpoint
    Restore {
        /// Checkpoint id to restore
        #[arg(required = true)]
        id: u32,

        /// Project directory (defaults to the most recent project)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Also delete every checkpoint after the restored one
        #[arg(long)]
        truncate: bool,
    },

    /// List projects, newest first
    Projects,

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
