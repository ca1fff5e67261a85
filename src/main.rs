use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use spartan::{LineInput, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "spartan")]
#[command(about = "Parse, normalize and reshape log lines into JSON events")]
#[command(version)]
struct Args {
    /// Pipeline configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: PathBuf,

    /// Input file (default: stdin)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(short = 't', long = "test-config")]
    test_config: bool,

    /// Debug mode - log stage failures and lifecycle details to stderr
    #[arg(long)]
    debug: bool,

    /// Override the filter worker pool size
    #[arg(long, value_name = "N")]
    filter_workers: Option<usize>,

    /// Override the output worker pool size
    #[arg(long, value_name = "N")]
    output_workers: Option<usize>,
}

fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = PipelineConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration '{}'", args.config.display()))?;
    if let Some(n) = args.filter_workers {
        config.workers.filters = n;
    }
    if let Some(n) = args.output_workers {
        config.workers.outputs = n;
    }

    if args.test_config {
        let stages = config.validate().context("Invalid configuration")?;
        tracing::debug!(stages, "configuration validated");
        println!("Configuration looks good");
        return Ok(());
    }

    config.validate().context("Invalid configuration")?;
    let mut input = match &args.input {
        Some(path) => LineInput::open(path)?,
        None => LineInput::stdin(),
    };
    let mut pipeline = Pipeline::from_config(&config).context("Failed to build pipeline")?;

    // SIGINT/SIGTERM stop the input; admitted events are still written
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        let _ = shutdown_tx.try_send(());
    })
    .context("Failed to set Ctrl+C handler")?;

    let stats = pipeline
        .run_until(&mut input, &shutdown_rx)
        .context("Pipeline failed")?;
    tracing::debug!(
        received = stats.filters.received,
        dropped = stats.filters.dropped + stats.outputs.dropped,
        written = stats.outputs.delivered,
        "final statistics"
    );
    Ok(())
}
