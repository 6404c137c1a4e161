// ABOUTME: CLI entry point for boltforge.
// ABOUTME: Dispatches to parse, replay, init and version subcommands.

use anyhow::{Context, Result};
use boltforge_cli::{cumulative_prefixes, VERSION};
use boltforge_core::alert::ChannelAlertSink;
use boltforge_core::build::ShellBuildService;
use boltforge_core::fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
use boltforge_core::parser::{ParserEvent, StreamingMessageParser};
use boltforge_core::runner::ActionRunner;
use boltforge_core::shell::{DryRunShell, LocalShell, ShellFacade};
use boltforge_core::workbench::Workbench;
use boltforge_core::Config;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "boltforge")]
#[command(about = "Parse and run artifact actions from assistant transcripts")]
#[command(version)]
struct Cli {
    /// Log to ~/.config/boltforge/boltforge.log (WARN and above) instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    /// Only show boltforge-core logs, everything else at WARN
    #[arg(long, global = true)]
    core_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print parser events for a transcript as JSON lines, then the rendered text
    Parse {
        /// Transcript file
        file: PathBuf,

        /// Message id used for action ids
        #[arg(long, default_value = "message")]
        message_id: String,
    },

    /// Stream a transcript through the workbench and run its actions
    Replay {
        /// Transcript file
        file: PathBuf,

        /// Project directory (defaults to the configured workspace)
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Bytes added per simulated stream chunk
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,

        /// Use an in-memory filesystem and record shell commands instead of running them
        #[arg(long)]
        dry_run: bool,

        /// Treat the transcript as already applied: record actions without side effects
        #[arg(long)]
        suppress: bool,

        /// Load configuration from a file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Message id used for action ids
        #[arg(long, default_value = "message")]
        message_id: String,
    },

    /// Write the default config to ~/.config/boltforge/config.toml
    Init,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if cli.log_file {
        boltforge_log::init_file("boltforge");
    } else if cli.core_logs {
        boltforge_log::init_for("boltforge-core");
    } else {
        boltforge_log::init();
    }

    match cli.command {
        Commands::Parse { file, message_id } => {
            let text = read_transcript(&file)?;
            run_parse(&text, &message_id, &mut std::io::stdout().lock())
        }
        Commands::Replay {
            file,
            workdir,
            chunk_size,
            dry_run,
            suppress,
            config,
            message_id,
        } => {
            let config = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };
            let workdir = workdir.unwrap_or_else(|| config.workspace_path());
            let text = read_transcript(&file)?;
            run_replay(ReplayOptions {
                text,
                workdir,
                chunk_size,
                dry_run,
                suppress,
                message_id,
                config,
            })
            .await
        }
        Commands::Init => run_init(),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn read_transcript(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript from {}", path.display()))
}

fn run_parse(text: &str, message_id: &str, out: &mut impl Write) -> Result<()> {
    let mut parser = StreamingMessageParser::new();
    let mut events: Vec<ParserEvent> = Vec::new();
    let output = parser.parse(message_id, text, true, &mut events);

    for event in &events {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
    }
    writeln!(out, "---")?;
    writeln!(out, "{}", output.rendered)?;
    Ok(())
}

struct ReplayOptions {
    text: String,
    workdir: PathBuf,
    chunk_size: usize,
    dry_run: bool,
    suppress: bool,
    message_id: String,
    config: Config,
}

async fn run_replay(opts: ReplayOptions) -> Result<()> {
    let workdir = if opts.dry_run {
        opts.workdir.clone()
    } else {
        opts.workdir
            .canonicalize()
            .with_context(|| format!("Workdir does not exist: {}", opts.workdir.display()))?
    };

    let memory_fs = opts
        .dry_run
        .then(|| Arc::new(MemoryFileSystem::new(&workdir)));
    let dry_shell = opts.dry_run.then(|| Arc::new(DryRunShell::new()));

    let fs: Arc<dyn FileSystem> = match &memory_fs {
        Some(memory) => memory.clone(),
        None => Arc::new(LocalFileSystem::new(&workdir)),
    };
    let shell: Arc<dyn ShellFacade> = match &dry_shell {
        Some(dry) => dry.clone(),
        None => Arc::new(
            LocalShell::new(&workdir)
                .with_program(opts.config.shell.program.clone())
                .with_timeout(opts.config.shell_timeout()),
        ),
    };
    let build = Arc::new(ShellBuildService::new(
        shell.clone(),
        fs.clone(),
        opts.config.build_commands(),
    ));
    let (alerts, mut alert_rx) = ChannelAlertSink::new();

    tracing::info!(
        workdir = %workdir.display(),
        dry_run = opts.dry_run,
        chunk_size = opts.chunk_size,
        "Replaying transcript"
    );

    let runner = ActionRunner::new(
        fs,
        shell,
        build,
        Arc::new(alerts),
        opts.config.runner_config(),
    );
    let mut workbench = Workbench::new(runner);

    let mut rendered = String::new();
    for prefix in cumulative_prefixes(&opts.text, opts.chunk_size) {
        let output = workbench.on_chunk(&opts.message_id, prefix, opts.suppress);
        rendered.push_str(&output.rendered);
    }
    workbench.wait_idle().await;

    let mut out = std::io::stdout().lock();
    writeln!(out, "{rendered}")?;
    writeln!(out, "---")?;
    while let Ok(alert) = alert_rx.try_recv() {
        writeln!(out, "{}", serde_json::to_string(&alert)?)?;
    }
    for state in workbench.runner().actions() {
        writeln!(out, "{}", serde_json::to_string(&state)?)?;
    }

    if let Some(memory) = &memory_fs {
        for path in memory.writes() {
            writeln!(out, "would write: {}", path.display())?;
        }
    }
    if let Some(dry) = &dry_shell {
        for command in dry.commands() {
            writeln!(out, "would run: {command}")?;
        }
    }
    Ok(())
}

fn run_init() -> Result<()> {
    let path = Config::init()?;
    println!("Config written to {}", path.display());
    Ok(())
}

/// Print version information
fn print_version() {
    println!("boltforge {VERSION}");
    println!();
    println!("Component versions:");
    println!("  boltforge-cli:  {VERSION}");
    println!("  boltforge-core: (linked)");
}
