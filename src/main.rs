use std::fs::create_dir_all;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use log::info;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use road_points::config::load_user_config;
use road_points::errors::Result;
use road_points::etl::run_pipeline;

/// Splits the roads of an OpenStreetMap extract into branch-free segments and
/// resamples them into evenly spaced points.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON user config.
    #[arg(default_value = "config/example.json")]
    config: PathBuf,

    /// Recompute every stage instead of reusing cached outputs.
    #[arg(long)]
    clean: bool,

    /// Overrides the config's log_level.
    #[arg(long)]
    log_level: Option<String>,
}

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let user_config = load_user_config(&args.config)?;
    setup_logging(args.log_level.as_deref().unwrap_or(&user_config.log_level));

    let output_dir = user_config.stage_dir()?;
    create_dir_all(&output_dir)?;
    info!(data_path = user_config.data_path.as_str(), output_dir = output_dir.display().to_string().as_str();
        "Processing road network");

    run_pipeline(&user_config, &output_dir, args.clean)
}
