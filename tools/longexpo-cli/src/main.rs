//! Longexpo CLI: compose long-exposure images from frame sequences.
//!
//! Usage:
//!   longexpo compose <DIR>      Blend a frame sequence into one image
//!   longexpo estimate <DIR>     Print per-frame registration offsets
//!   longexpo synth <DIR>        Write a synthetic test sequence
//!   longexpo info <DIR>         Show sequence and sampling information
//!   longexpo config             Show or initialize the configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use longexpo_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "longexpo",
    about = "Long-exposure photography from video frames",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/longexpo/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Blend a directory of frames into one long-exposure image
    Compose(commands::compose::ComposeArgs),

    /// Register every sampled frame against the first and print the offsets
    Estimate(commands::estimate::EstimateArgs),

    /// Write a synthetic frame sequence with camera shake
    Synth(commands::synth::SynthArgs),

    /// Show frame count, size, and the sampling plan of a sequence
    Info {
        /// Directory of frames
        path: PathBuf,

        /// Playback frame rate of the sequence
        #[arg(long, default_value = "30")]
        fps: f64,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => AppConfig::load(),
    };

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    longexpo_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Compose(args) => commands::compose::run(args, config).await,
        Commands::Estimate(args) => commands::estimate::run(args, config),
        Commands::Synth(args) => commands::synth::run(args),
        Commands::Info { path, fps } => commands::info::run(path, fps, config),
        Commands::Config { init, force } => {
            commands::config::run(init, force, cli.config, config)
        }
    }
}
