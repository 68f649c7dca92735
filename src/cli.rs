use crate::engine::{
    locate_program, DialogueExtractor, ExternalEngine, ExternalExtractor, Toolchain,
};
use crate::model::{Operation, OperationOutcome, TaskEvent};
use crate::orchestrator::{self, Action, Applied, FieldValues, UiCommand, UiContext};
use crate::preferences::{self, keys, Preferences};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Engine program used when neither `--engine` nor the preference is set.
pub const DEFAULT_ENGINE: &str = "coilsnake-cli";

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "rom-workbench",
    version,
    about = "Decompile, compile and upgrade ROM hack projects, with an optional TUI"
)]
pub struct Cli {
    /// Preferences file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub preferences: Option<PathBuf>,

    /// Engine executable (overrides the "engine" preference)
    #[arg(long, global = true)]
    pub engine: Option<PathBuf>,

    /// Dialogue extractor executable (overrides the "extractor" preference)
    #[arg(long, global = true)]
    pub extractor: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print the operation outcome as JSON (headless mode)
    #[arg(long, global = true)]
    pub json: bool,

    /// Run one operation without the TUI
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Decompile a ROM to create a new project
    Decompile { rom: String, project: String },
    /// Compile a project to create a new ROM
    Compile {
        project: String,
        base_rom: String,
        output_rom: String,
    },
    /// Upgrade a project created with an older engine version
    Upgrade { base_rom: String, project: String },
    /// Extract a ROM's dialogue into an existing project's script folder
    ExtractDialogue { rom: String, project: String },
    /// Expand a ROM to 32 MBit (or 48 MBit with --ex)
    Expand {
        #[arg(long)]
        ex: bool,
        rom: String,
    },
    /// Add a copier header to a ROM
    AddHeader { rom: String },
    /// Remove the copier header from a ROM
    StripHeader { rom: String },
    /// Open a ROM in the configured emulator
    RunRom { rom: String },
    /// Open a project in the configured project editor
    EditProject { project: String },
    /// Show or change stored preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsCommand>,
    },
}

#[derive(Debug, Subcommand, Clone, PartialEq, Eq)]
pub enum PrefsCommand {
    /// List every stored preference
    List,
    /// Print one preference
    Get { key: String },
    /// Store a preference
    Set { key: String, value: String },
}

/// Resolved configuration: CLI flag > preference > default.
pub struct Settings {
    pub preferences: Preferences,
    pub engine: PathBuf,
    pub extractor: Option<PathBuf>,
}

pub fn load_settings(args: &Cli) -> Result<Settings> {
    let path = match args.preferences.clone() {
        Some(p) => p,
        None => preferences::default_path()?,
    };
    let preferences = Preferences::load(path)?;
    let engine = args
        .engine
        .clone()
        .or_else(|| preferences.non_empty(keys::ENGINE).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE));
    let extractor = args
        .extractor
        .clone()
        .or_else(|| preferences.non_empty(keys::EXTRACTOR).map(PathBuf::from));
    Ok(Settings {
        preferences,
        engine,
        extractor,
    })
}

/// Build the engine collaborators. A configured extractor that cannot be found
/// is treated as not installed.
pub fn build_toolchain(settings: &Settings) -> Toolchain {
    let extractor = settings.extractor.as_ref().and_then(|p| {
        let found = locate_program(p);
        if found.is_none() {
            tracing::warn!(extractor = %p.display(), "dialogue extractor not found");
        }
        found
    });
    Toolchain::new(
        Arc::new(ExternalEngine::new(&settings.engine)),
        extractor.map(|p| Arc::new(ExternalExtractor::new(p)) as Arc<dyn DialogueExtractor>),
    )
}

pub async fn run(args: Cli) -> Result<()> {
    let settings = load_settings(&args)?;

    let command = match args.command.clone() {
        Some(command) => command,
        None => return run_interactive(args, settings).await,
    };

    crate::logging::init_logging(args.verbose, args.quiet, None);
    run_command(&args, settings, command).await
}

#[cfg(feature = "tui")]
async fn run_interactive(args: Cli, settings: Settings) -> Result<()> {
    crate::tui::run(args, settings).await
}

#[cfg(not(feature = "tui"))]
async fn run_interactive(_args: Cli, _settings: Settings) -> Result<()> {
    anyhow::bail!("built without TUI support; pass a subcommand (see --help)")
}

/// What a subcommand asks for.
#[derive(Debug, PartialEq)]
pub enum Plan {
    /// An engine operation, as the TUI form would have submitted it.
    Operation(Action, FieldValues),
    RunRom(String),
    EditProject(String),
    Prefs(PrefsCommand),
}

pub fn plan(command: Command) -> Plan {
    match command {
        Command::Decompile { rom, project } => Plan::Operation(
            Action::Decompile,
            FieldValues::from([(keys::EXPORT_ROM, rom), (keys::EXPORT_PROJ, project)]),
        ),
        Command::Compile {
            project,
            base_rom,
            output_rom,
        } => Plan::Operation(
            Action::Compile,
            FieldValues::from([
                (keys::IMPORT_PROJ, project),
                (keys::IMPORT_BASEROM, base_rom),
                (keys::IMPORT_ROM, output_rom),
            ]),
        ),
        Command::Upgrade { base_rom, project } => Plan::Operation(
            Action::Upgrade,
            FieldValues::from([(keys::UPGRADE_ROM, base_rom), (keys::UPGRADE_PROJ, project)]),
        ),
        Command::ExtractDialogue { rom, project } => Plan::Operation(
            Action::ExtractDialogue,
            FieldValues::from([(keys::SCRIPT_ROM, rom), (keys::SCRIPT_PROJ, project)]),
        ),
        Command::Expand { ex, rom } => Plan::Operation(
            if ex { Action::Expand48 } else { Action::Expand32 },
            FieldValues::from([(keys::TOOLS_ROM, rom)]),
        ),
        Command::AddHeader { rom } => Plan::Operation(
            Action::AddHeader,
            FieldValues::from([(keys::TOOLS_ROM, rom)]),
        ),
        Command::StripHeader { rom } => Plan::Operation(
            Action::StripHeader,
            FieldValues::from([(keys::TOOLS_ROM, rom)]),
        ),
        Command::RunRom { rom } => Plan::RunRom(rom),
        Command::EditProject { project } => Plan::EditProject(project),
        Command::Prefs { action } => Plan::Prefs(action.unwrap_or(PrefsCommand::List)),
    }
}

async fn run_command(args: &Cli, mut settings: Settings, command: Command) -> Result<()> {
    match plan(command) {
        Plan::Operation(action, values) => run_operation(args, settings, action, values).await,
        Plan::RunRom(rom) => {
            crate::launch::run_rom(settings.preferences.non_empty(keys::EMULATOR), &rom)?;
            Ok(())
        }
        Plan::EditProject(project) => {
            crate::launch::edit_project(settings.preferences.non_empty(keys::EDITOR), &project)?;
            Ok(())
        }
        Plan::Prefs(cmd) => {
            for line in run_prefs(&mut settings.preferences, cmd)? {
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// Apply a `prefs` subcommand and return the lines to print.
fn run_prefs(prefs: &mut Preferences, cmd: PrefsCommand) -> Result<Vec<String>> {
    let lines = match cmd {
        PrefsCommand::List => prefs.iter().map(|(k, v)| format!("{k}={v}")).collect(),
        PrefsCommand::Get { key } => {
            let value = prefs
                .get(&key)
                .with_context(|| format!("preference {key:?} is not set"))?;
            vec![value.to_string()]
        }
        PrefsCommand::Set { key, value } => {
            prefs.set(&key, value);
            prefs.save()?;
            tracing::info!(path = %prefs.path().display(), %key, "preference saved");
            Vec::new()
        }
    };
    Ok(lines)
}

#[derive(Serialize)]
struct OperationReport<'a> {
    operation: &'a Operation,
    outcome: &'a OperationOutcome,
}

/// Run one operation through the controller and print its console output.
async fn run_operation(
    args: &Cli,
    settings: Settings,
    action: Action,
    values: FieldValues,
) -> Result<()> {
    let toolchain = build_toolchain(&settings);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TaskEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let controller = tokio::spawn(orchestrator::run_controller(
        toolchain.clone(),
        event_tx,
        cmd_rx,
    ));
    let (out_tx, out_handle) = spawn_output_writer();

    let mut ctx = UiContext::new(settings.preferences, toolchain.has_extractor(), cmd_tx.clone());
    ctx.submit(action, &values)
        .with_context(|| format!("{} not started", action.label()))?;

    let mut finished = None;
    while let Some(ev) = event_rx.recv().await {
        let completed = match &ev {
            TaskEvent::Console(line) => {
                if !args.json {
                    let _ = out_tx.send(OutputLine::Stdout(line.clone()));
                }
                None
            }
            TaskEvent::Completed { operation, .. } => Some(operation.clone()),
            _ => None,
        };
        match ctx.apply_event(ev) {
            Applied::Finished(outcome) => {
                finished = completed.map(|op| (op, outcome));
                break;
            }
            Applied::Rejected(reason) => {
                return Err(anyhow::Error::new(reason))
                    .with_context(|| format!("{} not started", action.label()));
            }
            Applied::Updated | Applied::Ignored => {}
        }
    }

    let _ = cmd_tx.send(UiCommand::Quit);
    controller.await.context("controller task failed")??;
    let (operation, outcome) =
        finished.context("controller stopped before the operation finished")?;

    if args.json {
        let report = OperationReport {
            operation: &operation,
            outcome: &outcome,
        };
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&report)?));
    } else if !args.quiet {
        let _ = out_tx.send(OutputLine::Stderr(ctx.status.clone()));
    }
    drop(out_tx);
    let _ = out_handle.await;

    match outcome {
        OperationOutcome::Success { .. } => Ok(()),
        OperationOutcome::Failure { reason } => {
            Err(anyhow::anyhow!("{} failed: {reason}", action.label()))
        }
    }
}
