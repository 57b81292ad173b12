use clap::Parser;
use std::{env, path::PathBuf, process::ExitCode};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use wrangler::{
    collection::{run_sweep, RunError},
    config::SweepConfig,
};

/// Takes in ranges of parameters and produces the job directories and batch
/// scripts that run an executable once per parameter set.
#[derive(Parser, Debug)]
#[command(name = "slurm-wrangler", version, about)]
struct Args {
    /// Input document describing the sweep
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Run all jobs on this machine after generating them
    #[arg(long)]
    local: bool,

    /// Log debug output unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> Result<bool, RunError> {
    let config = SweepConfig::load(&args.input)?;
    let workdir = env::current_dir().map_err(|source| RunError::Resource {
        path: PathBuf::from("."),
        source,
    })?;

    match run_sweep(config, &workdir, args.local)? {
        Some(report) => {
            for path in report.failed.iter() {
                warn!("Failed job: {}", path.display());
            }

            Ok(report.failed.is_empty())
        }
        None => Ok(true),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
