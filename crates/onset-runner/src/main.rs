//! Surge onset detector - Entry Point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use onset_telemetry::Metrics;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;

/// Surge onset detector
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via ONSET_CONFIG env var)
    #[arg(short, long, env = "ONSET_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Dump Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a whole JSON-lines file
    Batch {
        /// Feature rows, one JSON object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Also emit every candidate record
        #[arg(long)]
        diagnostics: bool,
    },
    /// Process rows tick by tick
    Stream {
        /// Feature rows (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    onset_telemetry::init_logging()?;

    info!("Starting onset-runner v{}", env!("CARGO_PKG_VERSION"));

    let config = onset_runner::load_config(args.config.as_deref())?;
    info!(
        refractory = ?config.refractory.mode,
        cpd = config.cpd.enabled,
        "Configuration loaded"
    );

    let stdout = std::io::stdout();
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    match args.command {
        Command::Batch { input, diagnostics } => {
            let file = std::fs::File::open(&input)
                .with_context(|| format!("Failed to open {}", input.display()))?;
            onset_runner::run_batch(config, BufReader::new(file), stdout.lock(), diagnostics)?;
        }
        Command::Stream { input: Some(input) } => {
            let file = tokio::fs::File::open(&input)
                .await
                .with_context(|| format!("Failed to open {}", input.display()))?;
            let reader = tokio::io::BufReader::new(file);
            onset_runner::run_stream(config, reader, stdout.lock(), shutdown).await?;
        }
        Command::Stream { input: None } => {
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            onset_runner::run_stream(config, reader, stdout.lock(), shutdown).await?;
        }
    }

    if args.metrics {
        eprint!("{}", Metrics::render()?);
    }

    Ok(())
}
