use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use debate_agents::console::{entry_markdown, report_markdown, ControlCommand, CONTROL_HELP};
use debate_agents::{build_registry, dry_run_registry, AgentsConfig, DebateFile, JsonFileStore};
use debate_scheduler::debate::{
    DebateRun, DebateScheduler, IntegrityStatus, ModelProvider, ModelRegistry, RunControl,
    RunSnapshot, RunState, SchedulerError, TranscriptEntry, MAX_TURN_LIMIT,
};
use debate_scheduler::storage::{HistoryLog, SettingsStore, StoragePort};
use tracing::{info, warn};
use uuid::Uuid;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file holding history and settings (overrides DEBATE_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a debate defined in a TOML file
    Run {
        /// Debate definition
        file: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Continue a debate from a checkpoint written by `run --checkpoint`
    Resume {
        checkpoint: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Browse saved debates
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show or change stored defaults
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct RunOpts {
    /// Delay between turns in milliseconds (overrides the stored setting)
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// Write a resumable snapshot here after every turn
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Use scripted offline models instead of the provider APIs
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List saved debates, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one saved debate
    Show { id: Uuid },
    /// Delete one saved debate
    Remove { id: Uuid },
    /// Delete every saved debate
    Clear,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    SetProvider { provider: ModelProvider },
    SetTurnLimit { limit: u32 },
    SetPacing { ms: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut agents = AgentsConfig::default();
    if let Some(path) = cli.store {
        agents.store_path = path;
    }
    let store: Arc<dyn StoragePort> = Arc::new(JsonFileStore::new(&agents.store_path));

    match cli.command {
        Command::Run { file, opts } => run_debate(&agents, store, &file, opts).await,
        Command::Resume { checkpoint, opts } => {
            resume_debate(&agents, store, &checkpoint, opts).await
        }
        Command::History { action } => history(store, action),
        Command::Settings { action } => settings(store, action),
    }
}

fn registry(agents: &AgentsConfig, opts: &RunOpts) -> Result<ModelRegistry> {
    if opts.dry_run {
        info!("dry run: using scripted models");
        return Ok(dry_run_registry(Duration::from_millis(150)));
    }
    build_registry(agents).context("failed to build provider clients")
}

fn build_scheduler(
    agents: &AgentsConfig,
    store: Arc<dyn StoragePort>,
    opts: &RunOpts,
) -> Result<DebateScheduler> {
    let settings = SettingsStore::new(store.clone())
        .load()
        .context("failed to load settings")?;
    let pacing = Duration::from_millis(opts.pacing_ms.unwrap_or(settings.pacing_ms));
    let checkpoint = opts.checkpoint.clone();

    Ok(DebateScheduler::new(registry(agents, opts)?)
        .with_history(HistoryLog::new(store))
        .with_pacing(pacing)
        .on_turn(move |entry: &TranscriptEntry, run: &DebateRun| {
            println!("{}", entry_markdown(entry));
            if let Some(path) = &checkpoint {
                save_checkpoint(run, path);
            }
        }))
}

async fn run_debate(
    agents: &AgentsConfig,
    store: Arc<dyn StoragePort>,
    file: &Path,
    opts: RunOpts,
) -> Result<()> {
    let settings = SettingsStore::new(store.clone())
        .load()
        .context("failed to load settings")?;
    let config = DebateFile::load(file)
        .and_then(|f| f.into_config(&settings))
        .with_context(|| format!("failed to load {}", file.display()))?;

    let mut scheduler = build_scheduler(agents, store, &opts)?;
    println!("# {}\n", config.topic);
    scheduler.start(config).context("debate could not start")?;
    drive(scheduler, opts.checkpoint.as_deref()).await
}

async fn resume_debate(
    agents: &AgentsConfig,
    store: Arc<dyn StoragePort>,
    checkpoint: &Path,
    opts: RunOpts,
) -> Result<()> {
    let snapshot = RunSnapshot::load(checkpoint)
        .with_context(|| format!("failed to read {}", checkpoint.display()))?;
    let (run, status) = snapshot.restore().context("checkpoint rejected")?;
    if let IntegrityStatus::Recoverable { warnings } = &status {
        for warning in warnings {
            warn!(%warning, "checkpoint warning");
        }
    }

    let state = run.state();
    if !matches!(state, RunState::Paused | RunState::Analyzing) {
        println!("{}", run.status_line());
        bail!("a {state} run cannot be resumed");
    }

    if let Ok(config) = run.config() {
        println!("# {}\n", config.topic);
    }
    for entry in run.transcript().entries() {
        println!("{}", entry_markdown(entry));
    }

    let mut opts = opts;
    opts.checkpoint = opts.checkpoint.or_else(|| Some(checkpoint.to_path_buf()));
    let mut scheduler = build_scheduler(agents, store, &opts)?.with_run(run);

    if state == RunState::Analyzing {
        let report = scheduler.analyze().await.context("analysis failed")?;
        println!("{}", report_markdown(&report));
        return Ok(());
    }
    scheduler.resume().context("could not resume")?;
    drive(scheduler, opts.checkpoint.as_deref()).await
}

/// Run to the end while stdin and Ctrl-C steer through the control handle.
async fn drive(mut scheduler: DebateScheduler, checkpoint: Option<&Path>) -> Result<()> {
    let control = scheduler.control();
    spawn_stdin_reader(control.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling debate");
            control.cancel();
        }
    });
    eprintln!("{CONTROL_HELP}");

    let result = scheduler.run_to_completion().await;
    if let Some(path) = checkpoint {
        save_checkpoint(scheduler.run(), path);
    }

    match result {
        Ok(report) => {
            println!("{}", report_markdown(&report));
            Ok(())
        }
        Err(SchedulerError::Cancelled) => {
            eprintln!("Debate cancelled. {}", scheduler.run().status_line());
            Ok(())
        }
        Err(e) => Err(e).context("debate failed"),
    }
}

/// Read control commands on a plain thread so a blocked stdin read never
/// holds up runtime shutdown.
fn spawn_stdin_reader(control: RunControl) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match ControlCommand::parse(&line) {
                Some(command) => {
                    info!(?command, "control command");
                    command.apply(&control);
                }
                None => eprintln!("{CONTROL_HELP}"),
            }
            if control.is_cancelled() {
                break;
            }
        }
    });
}

fn save_checkpoint(run: &DebateRun, path: &Path) {
    if let Err(e) = RunSnapshot::capture(run).save(path) {
        warn!(path = %path.display(), error = %e, "failed to write checkpoint");
    }
}

fn history(store: Arc<dyn StoragePort>, action: HistoryAction) -> Result<()> {
    let log = HistoryLog::new(store);
    match action {
        HistoryAction::List { limit } => {
            let records = log.recent(limit).context("failed to read history")?;
            if records.is_empty() {
                println!("No saved debates.");
            }
            for record in records {
                println!("{}", record.list_line());
            }
        }
        HistoryAction::Show { id } => {
            let Some(record) = log.get(id).context("failed to read history")? else {
                bail!("no saved debate with id {id}");
            };
            println!("# {}\n", record.topic);
            println!("_{}_\n", record.timestamp.format("%Y-%m-%d %H:%M UTC"));
            for entry in record.payload.transcript.entries() {
                println!("{}", entry_markdown(entry));
            }
            println!(
                "{}",
                debate_agents::console::analysis_markdown(&record.payload.analysis)
            );
        }
        HistoryAction::Remove { id } => {
            if !log.remove(id).context("failed to update history")? {
                bail!("no saved debate with id {id}");
            }
            println!("Removed {id}");
        }
        HistoryAction::Clear => {
            log.clear().context("failed to clear history")?;
            println!("History cleared.");
        }
    }
    Ok(())
}

fn settings(store: Arc<dyn StoragePort>, action: SettingsAction) -> Result<()> {
    let settings = SettingsStore::new(store);
    let current = match action {
        SettingsAction::Show => settings.load(),
        SettingsAction::SetProvider { provider } => {
            settings.update(|s| s.default_provider = provider)
        }
        SettingsAction::SetTurnLimit { limit } => {
            if !(1..=MAX_TURN_LIMIT).contains(&limit) {
                bail!("turn limit must be between 1 and {MAX_TURN_LIMIT}");
            }
            settings.update(|s| s.turn_limit = limit)
        }
        SettingsAction::SetPacing { ms } => settings.update(|s| s.pacing_ms = ms),
    }
    .context("failed to access settings")?;
    println!("{}", serde_json::to_string_pretty(&current)?);
    Ok(())
}
