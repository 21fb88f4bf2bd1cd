mod config;
mod error;
mod filesystem;
mod logging;
mod naming;
mod relocate;
mod scanner;

use clap::{Parser, Subcommand};
use config::{Overrides, Settings};
use error::AppError;
use relocate::{ExternalRenamer, Relocator, Strategy};
use scanner::{Scanner, Shutdown};
use std::path::PathBuf;
use std::process::{self, ExitCode};
use std::time::Duration;
use tracing::{error, info};

/// File downloaded movies into a library of "Title (Year)" folders
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Config file (default: <config dir>/reshelve/config.toml, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory to scan for downloaded videos
    #[arg(short, long, global = true)]
    source: Option<PathBuf>,

    /// Library directory that receives one folder per title
    #[arg(short, long, global = true)]
    destination: Option<PathBuf>,

    /// Append log lines to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Never call the external renamer, even if one is configured
    #[arg(long, global = true)]
    no_collaborator: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Scan the source directory once and exit
    Scan,

    /// Scan repeatedly until interrupted
    Watch {
        /// Seconds to wait between scans
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Print the resolved configuration and exit
    Config,
}

/// Main entry point for the reshelve daemon.
///
/// Exits with status 1 when configuration fails or a single scan cannot
/// run at all. Per-file failures are logged and do not change the status.
fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let config_file = config::load_config_file(cli.config.as_deref())?;

    let interval = match cli.mode {
        Mode::Watch { interval } => interval,
        Mode::Scan | Mode::Config => None,
    };
    let overrides = Overrides {
        source_dir: cli.source,
        destination_dir: cli.destination,
        scan_interval_secs: interval,
        log_file: cli.log_file,
        no_collaborator: cli.no_collaborator,
    };
    let settings = config::resolve_settings(config_file.as_ref(), &overrides)?;

    if matches!(cli.mode, Mode::Config) {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    // Keep the guard alive so buffered log lines are flushed on exit
    let _guard = logging::init_logger(settings.log_file.as_deref())?;
    log_settings(&settings);

    let scanner = build_scanner(&settings)?;
    let shutdown = install_shutdown_handler()?;

    if matches!(cli.mode, Mode::Watch { .. }) {
        scanner.watch(Duration::from_secs(settings.scan_interval_secs), &shutdown);
    } else {
        scanner
            .scan_once(&shutdown)
            .inspect_err(|e| error!("Scan failed: {e}"))?;
    }

    Ok(())
}

/// Wires the scanner and relocation engine from the resolved settings.
fn build_scanner(settings: &Settings) -> Result<Scanner, AppError> {
    let strategy = match &settings.collaborator {
        Some(collaborator) => Strategy::Delegated(Box::new(ExternalRenamer::new(
            collaborator.clone(),
        ))),
        None => Strategy::Direct,
    };

    let relocator = Relocator::new(
        settings.destination_dir.clone(),
        settings.extensions.clone(),
        settings.parser()?,
        strategy,
    );

    Ok(Scanner::new(
        settings.source_dir.clone(),
        settings.extensions.clone(),
        relocator,
    ))
}

/// First Ctrl+C finishes the current file and stops; a second one exits immediately.
fn install_shutdown_handler() -> Result<Shutdown, AppError> {
    let shutdown = Shutdown::new();
    let handler = shutdown.clone();
    ctrlc::set_handler(move || {
        if handler.is_triggered() {
            process::exit(130);
        }
        handler.trigger();
    })?;
    Ok(shutdown)
}

fn log_settings(settings: &Settings) {
    info!("Source: {}", settings.source_dir.display());
    info!("Destination: {}", settings.destination_dir.display());
    info!("Extensions: {}", settings.extensions.join(", "));
    match &settings.collaborator {
        Some(collaborator) => info!("Renamer: {}", collaborator.program),
        None => info!("Renamer: none, parsing filenames"),
    }
}
