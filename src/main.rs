use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::PathBuf;

// Define modules used by main
mod convergence;
mod dump;
mod exchange;
mod field_state;
mod freeze;
mod grid;
mod partition;
mod simulation;
mod strategy;
mod update;

use dump::DumpSink;
use reiter_common::{Backend, SimulationConfig};
use simulation::ReiterSimulation;

/// Command-line arguments for the simulation engine
#[derive(Parser, Debug)]
#[command(author, version, about = "Reiter crystal growth on a hexagonal grid", long_about = None)]
struct Args {
    /// Path to the config.toml file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the concurrency backend (sequential, threaded, distributed)
    #[arg(long)]
    backend: Option<Backend>,

    /// Override the number of workers
    #[arg(long)]
    workers: Option<usize>,

    /// Override the iteration ceiling
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Grid and model parameters: <width> <height> <alpha> <beta> <gamma>
    #[arg(num_args = 5, value_names = ["WIDTH", "HEIGHT", "ALPHA", "BETA", "GAMMA"])]
    model: Option<Vec<String>>,
}

/// Loads the configuration file and applies command-line overrides.
fn resolve_config(args: &Args) -> Result<SimulationConfig> {
    let model = match &args.model {
        Some(values) => Some((
            values[0].parse::<usize>().context("width must be an integer")?,
            values[1].parse::<usize>().context("height must be an integer")?,
            values[2].parse::<f32>().context("alpha must be a number")?,
            values[3].parse::<f32>().context("beta must be a number")?,
            values[4].parse::<f32>().context("gamma must be a number")?,
        )),
        None => None,
    };

    let mut config = match model {
        // Positional parameters are enough to run without a config file.
        Some((width, height, alpha, beta, gamma)) if !args.config.exists() => {
            info!("No config file at '{}', using defaults.", args.config.display());
            SimulationConfig::with_model(width, height, alpha, beta, gamma)
        }
        _ => SimulationConfig::load(&args.config)?,
    };

    if let Some((width, height, alpha, beta, gamma)) = model {
        config.grid.width = width;
        config.grid.height = height;
        config.params.alpha = alpha;
        config.params.beta = beta;
        config.params.gamma = gamma;
    }
    if let Some(backend) = args.backend {
        config.run.backend = backend;
    }
    if let Some(workers) = args.workers {
        config.run.workers = workers;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.run.max_iterations = max_iterations;
    }

    // Overrides bypass the checks done at load time.
    config.validate()?;
    Ok(config)
}

/// A patience of one stops at the first pass that leaves the receptive set
/// unchanged, which on a fresh seed is usually the very first pass.
fn early_stop_warning(config: &SimulationConfig) -> Option<String> {
    (config.run.stability_patience == 1 && config.run.max_iterations > 1).then(|| {
        "stability_patience = 1 stops the run at the first quiet pass, usually with only the seed frozen. \
         Raise it (e.g. 50) to let the crystal grow."
            .to_string()
    })
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Reiter Simulation Engine...");
    let args = Args::parse();

    // --- Load Configuration ---
    let config = resolve_config(&args)?;
    debug!("Simulation Configuration: {:#?}", config);
    if let Some(message) = early_stop_warning(&config) {
        warn!("{}", message);
    }

    // --- Initialize Simulation ---
    let mut sim = ReiterSimulation::new(config.clone())?;
    info!(
        "Initialized {}x{} grid (alpha = {}, beta = {}, gamma = {}).",
        sim.params().width,
        sim.params().height,
        sim.params().alpha,
        sim.params().beta,
        sim.params().gamma
    );

    // --- Run ---
    let mut sink = DumpSink::from_config(&config)?;
    let outcome = sim.run(&mut sink)?;

    info!("Simulation took {} iterations", outcome.iterations);
    match config.run.backend {
        Backend::Sequential => {}
        Backend::Threaded => info!(
            "Ran {} partitions with the {} strategy on {} Rayon threads",
            sim.num_workers(),
            sim.strategy_name(),
            config.run.threads.unwrap_or_else(rayon::current_num_threads)
        ),
        Backend::Distributed => info!("Ran {} workers with the {} strategy", sim.num_workers(), sim.strategy_name()),
    }
    info!("Execution took {:.6} seconds", outcome.elapsed.as_secs_f64());

    // --- Save Recorded Data ---
    let snapshots = sim.get_recorded_snapshots();
    if snapshots.is_empty() {
        info!("Skipping snapshot output as record_interval is 0.");
    } else {
        dump::save_snapshots(sim.config(), snapshots)?;
        let growth = dump::save_growth_curve(sim.config(), snapshots)?;
        info!("Growth curve saved to {}", growth.display());
    }
    let summary = dump::save_summary(sim.config(), &outcome)?;
    info!("Run summary saved to {}", summary.display());

    info!("Simulation Complete.");
    Ok(())
}
