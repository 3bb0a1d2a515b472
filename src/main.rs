use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use drivebase_runtime::config::{LOG_DIVISOR, LOG_DURATION_MS, RobotConfig};
use drivebase_runtime::hub::Pacing;
use drivebase_runtime::runtime::{self, RunOptions};

/// Drive a simulated two-motor base through four moves and save its logs
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Directory for the saved log files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Log duration in ms
    #[arg(long, default_value_t = LOG_DURATION_MS)]
    duration: u32,

    /// Keep one of every `divisor` log samples
    #[arg(long, default_value_t = LOG_DIVISOR)]
    divisor: u32,

    /// Robot config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pace the control loop in real time instead of simulating as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match &args.config {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };
    let options = RunOptions {
        output_dir: args.output_dir,
        duration_ms: args.duration,
        divisor: args.divisor,
        config,
        pacing: if args.realtime {
            Pacing::Realtime
        } else {
            Pacing::Simulated
        },
    };

    let summary = runtime::run(&options).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
