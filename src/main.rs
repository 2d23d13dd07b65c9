mod cli;
mod translator;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use fm_av::{MergeEngine, ProbeCache, Prober, ProgressSender, ToolRegistry};
use fm_core::config::Config;
use fm_pipeline::EditSession;
use fm_project::{store, CheckpointStore, ProjectStore, RestoreMode};
use translator::OllamaTranslator;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "ffmigo=trace,fm_av=trace,fm_pipeline=trace,fm_project=debug,fm_core=debug".to_string()
        } else {
            "ffmigo=info,fm_av=info,fm_pipeline=info,fm_project=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config_path = cli.config.clone().or_else(default_config_path);
    let config = Config::load_or_default(config_path.as_deref());
    for warning in config.validate() {
        tracing::warn!("config: {warning}");
    }

    match cli.command {
        Commands::New { input, name } => new_project(&config, &input, name.as_deref()),
        Commands::Edit { request, project } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(edit(&config, project, &request))
        }
        Commands::Merge { inputs, output } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(merge(&config, &inputs, &output))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe(&config, &file, json))
        }
        Commands::Attach { file, project } => attach(&config, project, &file),
        Commands::Checkpoints { project } => list_checkpoints(&config, project),
        Commands::Restore {
            id,
            project,
            truncate,
        } => restore(&config, project, id, truncate),
        Commands::Projects => list_projects(&config),
        Commands::CheckTools => check_tools(&config),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("ffmigo {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ffmigo").join("config.json"))
}

/// The project named on the command line, or the most recent one.
fn resolve_project(config: &Config, project: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = project {
        if !dir.is_dir() {
            anyhow::bail!("Project directory does not exist: {}", dir.display());
        }
        return Ok(dir);
    }

    let projects = ProjectStore::new(config.projects.root.clone()).list_projects()?;
    projects
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No projects yet; create one with `ffmigo new <video>`"))
}

/// Cancel the token on Ctrl-C so the running tool is killed cleanly.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, cancelling");
            token.cancel();
        }
    });
}

fn console_progress() -> ProgressSender {
    ProgressSender::new(|pct, step| {
        println!("[{pct:>3.0}%] {step}");
    })
}

fn new_project(config: &Config, input: &Path, name: Option<&str>) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }

    let project_store = ProjectStore::new(config.projects.root.clone());
    let project = project_store.create_project()?;
    let imported = store::ingest_input(input, &project)?;
    if let Some(name) = name {
        store::set_display_name(&project, name)?;
    }

    println!("Created project: {}", project.display());
    println!("Imported: {}", imported.display());
    Ok(())
}

async fn edit(config: &Config, project: Option<PathBuf>, request: &str) -> Result<()> {
    let project = resolve_project(config, project)?;
    let tools = ToolRegistry::discover(&config.tools);

    // A missing ffprobe degrades the prompt but does not block editing.
    let cache = Arc::new(ProbeCache::open(project.join(store::PROBE_CACHE_FILE)));
    let prober = match Prober::new(&tools, cache) {
        Ok(prober) => Some(prober),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    };

    let translator = OllamaTranslator::new(&config.translator)?;
    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());

    let session = EditSession::new(project.clone(), tools, config.execution.clone());
    let outcome = session
        .run_edit(
            &translator,
            request,
            prober.as_ref(),
            token,
            &console_progress(),
        )
        .await?;

    println!("\nEdit complete ({} attempt(s))", outcome.attempts);
    println!("Command: {}", outcome.command);
    println!("Checkpoint: {}", outcome.checkpoint_id);
    println!("Current video: {}", outcome.new_input.display());
    Ok(())
}

async fn merge(config: &Config, inputs: &[PathBuf], output: &Path) -> Result<()> {
    for input in inputs {
        if !input.exists() {
            anyhow::bail!("Input file does not exist: {}", input.display());
        }
    }

    let tools = ToolRegistry::discover(&config.tools);
    let cache = Arc::new(ProbeCache::open(
        config.projects.root.join("probe_cache.json"),
    ));
    let prober = Prober::new(&tools, cache)?;

    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());

    let engine = MergeEngine::new(tools, config.merge.clone()).with_cancellation(token);
    let report = engine
        .merge(&prober, inputs, output, &console_progress())
        .await?;

    println!("\nMerge complete ({:?})", report.strategy);
    if !report.incompatibilities.is_empty() {
        println!("Inputs were normalized because:");
        for reason in &report.incompatibilities {
            println!("  - {reason}");
        }
    }
    println!("Output: {}", report.output.display());
    Ok(())
}

async fn probe(config: &Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let tools = ToolRegistry::discover(&config.tools);
    let cache = Arc::new(ProbeCache::open(
        config.projects.root.join("probe_cache.json"),
    ));
    let prober = Prober::new(&tools, cache)?;
    let analysis = prober.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        println!("File: {}", analysis.file_path.display());
        println!("Format: {}", analysis.format_name);
        println!("Duration: {:.2}s", analysis.duration);
        println!("Size: {} bytes", analysis.size);

        println!("\nVideo streams: {}", analysis.video_streams.len());
        for (i, stream) in analysis.video_streams.iter().enumerate() {
            println!(
                "  [{}] {} {}x{} @ {:.3} fps",
                i, stream.codec, stream.width, stream.height, stream.frame_rate
            );
        }

        println!("\nAudio streams: {}", analysis.audio_streams.len());
        for (i, stream) in analysis.audio_streams.iter().enumerate() {
            println!(
                "  [{}] {} {} Hz {}ch",
                i, stream.codec, stream.sample_rate, stream.channels
            );
        }
    }

    Ok(())
}

fn attach(config: &Config, project: Option<PathBuf>, file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let project = resolve_project(config, project)?;
    let (relative, _) = store::ingest_asset(file, &project)?;
    println!("Attached as {relative}");
    Ok(())
}

fn list_checkpoints(config: &Config, project: Option<PathBuf>) -> Result<()> {
    let project = resolve_project(config, project)?;
    let checkpoints = CheckpointStore::new(project).list()?;

    if checkpoints.is_empty() {
        println!("No checkpoints yet.");
        return Ok(());
    }

    for cp in &checkpoints {
        print!(
            "{:>4}  {}  {:<6}  {:>10} bytes",
            cp.meta.id,
            cp.meta.timestamp.format("%Y-%m-%d %H:%M:%S"),
            cp.meta.operation,
            cp.meta.size
        );
        if let Some(ref request) = cp.meta.request {
            print!("  \"{request}\"");
        }
        println!();
    }

    Ok(())
}

fn restore(config: &Config, project: Option<PathBuf>, id: u32, truncate: bool) -> Result<()> {
    let project = resolve_project(config, project)?;
    let mode = if truncate {
        RestoreMode::Truncate
    } else {
        RestoreMode::KeepHistory
    };

    let restored = CheckpointStore::new(project).restore(id, mode)?;
    println!("Restored checkpoint {id}: {}", restored.display());
    Ok(())
}

fn list_projects(config: &Config) -> Result<()> {
    let projects = ProjectStore::new(config.projects.root.clone()).list_projects()?;

    if projects.is_empty() {
        println!("No projects yet.");
        return Ok(());
    }

    for project in &projects {
        print!("{}", project.display());
        if let Some(name) = store::display_name(project) {
            print!("  ({name})");
        }
        match store::resolve_current_input(project) {
            Ok(input) => {
                if let Some(file_name) = input.file_name() {
                    print!("  [{}]", file_name.to_string_lossy());
                }
            }
            Err(_) => print!("  [empty]"),
        }
        println!();
    }

    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let registry = ToolRegistry::discover(&config.tools);
    let tools = registry.check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)?;
            let config = Config::from_json(&contents)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("✓ Configuration is valid");
            } else {
                println!("Configuration parsed with warnings:");
                for w in &warnings {
                    println!("  - {w}");
                }
            }
            println!("  Translator: {} ({})", config.translator.endpoint, config.translator.model);
            println!("  Projects root: {}", config.projects.root.display());
            println!(
                "  Execution: {}s timeout, {} retries",
                config.execution.timeout_secs, config.execution.max_retries
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!("  Translator: {} ({})", config.translator.endpoint, config.translator.model);
            println!("  Projects root: {}", config.projects.root.display());
        }
    }

    Ok(())
}
