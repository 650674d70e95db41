//! Command-line front end for the Gaello updater.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use gaello_updater::update::{
    AutoPrompter, BackupManager, ChannelPrompter, CheckOutcome, ConsentStage, PromptMessage,
    PromptRequest, UpdateChecker, UpdateEvent, UpdatePhase, UpdatePrompter,
};
use gaello_updater::{UpdateOrchestrator, UpdateOutcome, UpdaterConfig, VersionDescriptor};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Check for, download and install Gaello updates.
#[derive(Parser)]
#[command(name = "gaello-update", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Answer yes to every prompt.
    #[arg(short, long, global = true)]
    yes: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Report whether a newer release is available.
    Check,
    /// Check, download and install an update.
    Run,
    /// Print where Gaello is installed.
    Locate,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = UpdaterConfig::load_or_default(cli.config.as_deref())?;
    config.validate()?;
    let _log_guard = gaello_updater::logging::init(&config.logging)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Check => run_check(&config).await,
        Command::Locate => run_locate(&config).await,
        Command::Run => run_update(config, cli.yes).await,
    }
}

async fn run_check(config: &UpdaterConfig) -> anyhow::Result<ExitCode> {
    let checker = UpdateChecker::new(
        config.check.clone(),
        config.product.target_resolution.clone(),
        VersionDescriptor::current(),
    );
    match checker.check().await {
        CheckOutcome::UpdateAvailable(release) => {
            println!(
                "Update available: {} {} (running {})",
                release.name(),
                release.version(),
                checker.running().version()
            );
            println!("{release}");
            Ok(ExitCode::SUCCESS)
        }
        CheckOutcome::UpToDate => {
            println!("Gaello {} is up to date", checker.running().version());
            Ok(ExitCode::SUCCESS)
        }
        CheckOutcome::Failed { reason, .. } => {
            eprintln!("Could not check for updates: {reason}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_locate(config: &UpdaterConfig) -> anyhow::Result<ExitCode> {
    let locator = Arc::from(gaello_registry::platform_default(config.manifest_path()));
    let name = &config.product.display_name;
    let backup = BackupManager::new(name.clone(), locator);
    match backup.locate_installation(name).await {
        Some(path) => {
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("{name} is not installed");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_update(config: UpdaterConfig, assume_yes: bool) -> anyhow::Result<ExitCode> {
    println!("Gaello updater v{}", env!("CARGO_PKG_VERSION"));

    let prompter: Arc<dyn UpdatePrompter> = if assume_yes {
        Arc::new(AutoPrompter)
    } else {
        let (prompter, rx) = ChannelPrompter::new(4);
        tokio::spawn(serve_console_prompts(rx));
        Arc::new(prompter)
    };

    let bar = ProgressBar::hidden();
    if let Ok(style) =
        ProgressStyle::with_template("  Downloading [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}")
    {
        bar.set_style(style);
    }
    let progress = bar.clone();

    let shutdown = CancellationToken::new();
    let restart_pending = Arc::new(AtomicBool::new(false));
    let restart_flag = Arc::clone(&restart_pending);
    let startup_delay = Duration::from_millis(config.check.startup_delay_ms);
    let orchestrator = UpdateOrchestrator::from_config(config, prompter)
        .with_shutdown(shutdown.clone())
        .with_events(Box::new(move |event| match event {
            UpdateEvent::Progress(p) => {
                if progress.is_hidden() {
                    progress.set_draw_target(ProgressDrawTarget::stderr());
                    progress.set_length(p.total);
                }
                progress.set_position(p.downloaded);
                if p.is_complete() {
                    progress.finish();
                }
            }
            UpdateEvent::PhaseChanged(phase) => {
                restart_flag.store(phase == UpdatePhase::Relaunching, Ordering::SeqCst);
            }
        }));

    // Ctrl+C during the restart notice still launches the update script;
    // anywhere else it quits immediately.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if restart_pending.load(Ordering::SeqCst) {
                info!("received Ctrl+C during restart notice, relaunching now");
                shutdown.cancel();
            } else {
                info!("received Ctrl+C, shutting down...");
                std::process::exit(130);
            }
        }
    });

    let outcome = orchestrator
        .run_when_ready(tokio::time::sleep(startup_delay))
        .await?;
    bar.finish_and_clear();

    println!("{outcome}");
    Ok(match outcome {
        UpdateOutcome::Failed { .. } => ExitCode::FAILURE,
        UpdateOutcome::UpToDate
        | UpdateOutcome::Installed { .. }
        | UpdateOutcome::Declined { .. } => ExitCode::SUCCESS,
    })
}

/// Answer prompts from stdin and print notices.
async fn serve_console_prompts(mut rx: tokio::sync::mpsc::Receiver<PromptMessage>) {
    while let Some(message) = rx.recv().await {
        match message {
            PromptMessage::Request(request) => {
                let answered = tokio::task::spawn_blocking(move || ask_on_console(request)).await;
                if let Err(e) = answered {
                    tracing::warn!(error = %e, "console prompt task failed");
                }
            }
            PromptMessage::Notice(notice) => println!("\n{notice}"),
        }
    }
}

fn ask_on_console(request: PromptRequest) {
    let question = match request.stage {
        ConsentStage::Download => format!(
            "{} {} is available. Download it now?",
            request.release.name(),
            request.release.version()
        ),
        ConsentStage::Install => format!(
            "{} {} is downloaded. Install it now? The application will restart.",
            request.release.name(),
            request.release.version()
        ),
    };
    print!("\n{question} [y/N] ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    let accept = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map(|_| matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
        .unwrap_or(false);
    request.respond(accept);
}
