use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

// Define modules used by main
mod display;
mod grid;
mod shutdown;
mod simulation;
mod worker;

use colorsim_common::{RawParameters, SimulationConfig};
use display::{spawn_stdin_reader, HeadlessDisplay};
use simulation::{SimulationController, SimulationError};

const DEFAULT_CONFIG: &str = "config.toml";

/// Concurrent color grid: one thread per cell, each repeatedly picking a
/// random color or the average of its four neighbors.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file (defaults to ./config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of rows (n)
    #[arg(short = 'n', long, allow_hyphen_values = true)]
    rows: Option<String>,

    /// Number of columns (m)
    #[arg(short = 'm', long, allow_hyphen_values = true)]
    cols: Option<String>,

    /// Speed (k): mean delay between updates of one cell, in milliseconds
    #[arg(short = 'k', long, allow_hyphen_values = true)]
    speed: Option<String>,

    /// Probability (p) that an update picks a random color instead of the neighbor average
    #[arg(short = 'p', long, allow_hyphen_values = true)]
    probability: Option<String>,

    /// Stop automatically after this many seconds
    #[arg(long)]
    run_for: Option<u64>,

    /// Do not read commands from stdin
    #[arg(long)]
    no_stdin: bool,
}

fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    match path {
        Some(path) => SimulationConfig::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => SimulationConfig::load(DEFAULT_CONFIG),
        None => {
            warn!("No {} found, using built-in defaults.", DEFAULT_CONFIG);
            Ok(SimulationConfig::default())
        }
    }
}

/// Command-line values win over the config file.
fn raw_parameters(args: &Args, config: &SimulationConfig) -> RawParameters {
    let base = config.raw_parameters();
    RawParameters {
        rows: args.rows.clone().unwrap_or(base.rows),
        cols: args.cols.clone().unwrap_or(base.cols),
        speed_ms: args.speed.clone().unwrap_or(base.speed_ms),
        probability: args.probability.clone().unwrap_or(base.probability),
    }
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("Starting Color Grid Simulation...");

    // --- Load Configuration ---
    let mut config = load_config(args.config.as_deref())?;
    if args.run_for.is_some() {
        config.display.run_for_secs = args.run_for;
    }
    if args.no_stdin {
        config.display.read_stdin = false;
    }
    debug!("Configuration: {:#?}", config);

    // --- Validate Parameters & Start Workers ---
    let raw = raw_parameters(&args, &config);
    let (update_tx, update_rx) = mpsc::channel();
    let mut controller = SimulationController::new(config.workers.clone());
    match controller.start_from_text(&raw, update_tx) {
        Ok(()) => {}
        Err(SimulationError::Parameters(e)) => {
            // Reported to the user; nothing was spawned
            error!("{}", e);
            anyhow::bail!("Simulation not started: {}", e);
        }
        Err(e) => return Err(e).context("Failed to start simulation"),
    }

    let (event_tx, event_rx) = mpsc::channel();
    if config.display.read_stdin {
        spawn_stdin_reader(event_tx).context("Failed to start stdin reader")?;
        info!("Commands: `t <row> <col>` toggles a cell, `p` prints the grid, `q` quits.");
    } else {
        drop(event_tx);
    }

    // --- Display Loop (main thread) ---
    let initial = controller
        .snapshot()
        .context("Simulation stopped before the display started")?;
    let mut display = HeadlessDisplay::new(initial, update_rx, event_rx, config.display.clone());
    let reason = display.run(&controller);
    info!("Display loop ended: {:?}", reason);

    // --- Shutdown ---
    let report = controller.stop();
    info!("Total updates displayed: {}", display.total_updates());
    if !report.is_clean() {
        warn!(
            "Shutdown was not clean: {} panicked, {} detached.",
            report.panicked, report.detached
        );
    }

    info!("Simulation Complete.");
    Ok(())
}
