//! PFT: track a vehicle on a line with a Bayesian particle filter.
//!
//! The vehicle starts near the left end of the unit interval and drives right while fixed
//! range sensors report noisy distances to it. Each step the particle filter reports its
//! centroid estimate next to the true position.
//!
//! Parameters come from built-in defaults, optionally replaced by a configuration file
//! (TOML/JSON/YAML) and then overridden by command-line flags.

mod common;

use clap::{Args, Parser, Subcommand};
use common::{ensure_parent_dir, init_logger};
use log::info;
use pft::config::SimulationConfig;
use pft::resample::ParticleResamplingStrategy;
use pft::sim::Simulation;
use std::error::Error;
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "A one-dimensional Bayesian particle filter tracking simulation.")]
struct Cli {
    /// Load run parameters from a configuration file (TOML/JSON/YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Command to execute (defaults to `run` when --config is provided)
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (off, error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "run",
        about = "Run the tracking simulation",
        long_about = "Run the particle filter against a simulated vehicle. Flags override values from --config, which in turn override the built-in defaults."
    )]
    Run(RunArgs),
    #[command(name = "config", about = "Write the effective configuration to a file")]
    CreateConfig(CreateConfigArgs),
}

#[derive(Args, Clone, Debug, Default)]
struct RunArgs {
    /// Per-step CSV output path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Per-particle CSV output path
    #[arg(long)]
    particles_output: Option<PathBuf>,

    /// Number of particles
    #[arg(long)]
    num_particles: Option<usize>,

    /// RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Time step in seconds
    #[arg(long)]
    dt: Option<f64>,

    /// Simulated duration in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Resampling strategy
    #[arg(long, value_enum)]
    strategy: Option<ParticleResamplingStrategy>,
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output file; the format follows the extension (.toml, .json, .yaml, .yml)
    #[arg(short, long, default_value = "pft.toml")]
    output: PathBuf,
}

impl RunArgs {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(n) = self.num_particles {
            config.num_particles = n;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(dt) = self.dt {
            config.dt = dt;
        }
        if let Some(duration) = self.duration {
            config.duration_s = duration;
        }
        if let Some(strategy) = self.strategy {
            config.resampling.strategy = strategy;
        }
        if let Some(ref output) = self.output {
            config.output = Some(output.display().to_string());
        }
        if let Some(ref output) = self.particles_output {
            config.particles_output = Some(output.display().to_string());
        }
    }
}

fn run(mut config: SimulationConfig, args: &RunArgs) -> Result<(), Box<dyn Error>> {
    args.apply(&mut config);
    let output = config.output.as_ref().map(PathBuf::from);
    let particles_output = config.particles_output.as_ref().map(PathBuf::from);

    let result = Simulation::new(config)?.run()?;
    for state in &result.states {
        println!(
            "actual: {:.4}  imputed: {:.4}{}",
            state.vehicle.x,
            state.estimate,
            if state.resampled { "  (resampled)" } else { "" }
        );
    }
    println!(
        "{} steps, {} losses, RMS error {:.4}",
        result.states.len(),
        result.losses,
        result.rms_error()
    );

    if let Some(path) = output {
        ensure_parent_dir(&path)?;
        result.write_csv(&path)?;
        info!("Wrote step records to {}", path.display());
    }
    if let Some(path) = particles_output {
        ensure_parent_dir(&path)?;
        result.write_particles_csv(&path)?;
        info!("Wrote particle records to {}", path.display());
    }
    Ok(())
}

fn create_config_file(
    config: &SimulationConfig,
    args: &CreateConfigArgs,
) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(&args.output)?;
    config.to_file(&args.output)?;
    println!("Configuration written to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };

    // CLI flags take precedence over the config file's logging section
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let config_log_file = config.logging.file.as_ref().map(PathBuf::from);
    let log_file = cli.log_file.as_ref().or(config_log_file.as_ref());
    init_logger(&log_level, log_file)?;

    if let Some(ref path) = cli.config {
        info!("Loaded configuration from {}", path.display());
    }

    match cli.command {
        Some(Command::Run(args)) => run(config, &args),
        Some(Command::CreateConfig(args)) => create_config_file(&config, &args),
        None if cli.config.is_some() => run(config, &RunArgs::default()),
        None => {
            eprintln!("Error: No command provided. Use -h or --help for usage information.");
            std::process::exit(1);
        }
    }
}
