//! # `process` — the nomad batch data-cleaning engine CLI
//!
//! Streams a CSV or Parquet input through a declarative JSON workflow and
//! writes a cleaned, reshaped Parquet file. See `--help` for flags.
//!
//! ```bash
//! process --path customers.csv --workflow clean.json --output out.parquet
//! RUST_LOG=debug process --path customers.csv --workflow clean.json
//! ```

mod driver;
mod filename;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use nomad_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use driver::RunRequest;

/// Command-line arguments for the `process` engine runner.
#[derive(Parser, Debug)]
#[command(name = "process")]
#[command(about = "Cleans and reshapes a CSV/Parquet file per a JSON workflow")]
struct Args {
    /// Input file to clean (CSV or Parquet, dispatched by extension).
    #[arg(long)]
    path: PathBuf,

    /// JSON workflow document describing the cleaning/reshaping rules.
    #[arg(long)]
    workflow: PathBuf,

    /// Output Parquet path. Defaults to a name built by the filename
    /// builder (C9) from the workflow's country code and the input name.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Streaming row-group width; advisory, bounds peak memory per batch.
    #[arg(long, default_value_t = nomad_core::config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Hard memory-pressure ceiling, as a percentage of total RAM.
    #[arg(long, default_value_t = 90.0)]
    max_memory: f64,

    /// Path to a cached schema-analysis result. Currently accepted for
    /// forward compatibility and validated as a path if present; analysis
    /// is always performed fresh in this engine.
    #[arg(long)]
    analyze_cache: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = validate_analyze_cache(args.analyze_cache.as_deref()) {
        eprintln!("WorkflowInvalid: {e:#}");
        return ExitCode::FAILURE;
    }

    let config = Config::default();

    let request = RunRequest {
        input_path: args.path,
        workflow_path: args.workflow,
        output_path: args.output,
        chunk_size: args.chunk_size,
        max_memory_pct: args.max_memory,
    };

    match driver::run(&config, request) {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                tracing::warn!("{warning}");
            }
            let summary = serde_json::json!({
                "status": "success",
                "rows": outcome.rows,
                "duration_s": outcome.duration.as_secs_f64(),
                "output_path": outcome.output_path.display().to_string(),
            });
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}

/// `--analyze_cache` is accepted for forward compatibility with the
/// upstream UI's cached schema-analysis feature; this engine always
/// analyzes fresh, but a path that doesn't exist is still a usage error.
fn validate_analyze_cache(path: Option<&std::path::Path>) -> anyhow::Result<()> {
    if let Some(path) = path {
        anyhow::ensure!(path.exists(), "analyze_cache path does not exist: {}", path.display());
        std::fs::metadata(path).with_context(|| format!("reading analyze_cache metadata: {}", path.display()))?;
    }
    Ok(())
}
