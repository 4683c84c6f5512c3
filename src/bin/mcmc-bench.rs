//! Compares the classical and kernel backends on the built-in linear regression.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: synthetic data resampled to 100 and 1000 rows, output in ./results
//! mcmc-bench
//!
//! # From a config file, with an ESS/s chart
//! mcmc-bench --config bench.toml --plot ess.png
//! ```

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcmc_bench::alloc::TracingAllocator;
use mcmc_bench::config::BenchConfig;
use mcmc_bench::handler::run_benchmark;
use mcmc_bench::models::{linear_regression_classical, linear_regression_kernel, ModelKind};

#[global_allocator]
static GLOBAL: TracingAllocator = TracingAllocator;

/// MCMC backend benchmark
#[derive(Parser, Debug)]
#[command(name = "mcmc-bench")]
#[command(about = "Compare MCMC backends across dataset sizes")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory, overriding the configuration
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// PNG path for the ESS/s chart, overriding the configuration
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Show progress bars while sampling
    #[arg(long)]
    progress: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    if let Some(dir) = args.output {
        config.output.dir = dir;
    }
    if args.plot.is_some() {
        config.output.plot = args.plot;
    }
    config.sampling.progress |= args.progress;

    let models = vec![
        (
            "classical".to_string(),
            ModelKind::Classical(linear_regression_classical()),
        ),
        (
            "kernel".to_string(),
            ModelKind::Kernel(linear_regression_kernel()),
        ),
    ];

    let report = run_benchmark(&config, &models)?;

    println!("{}", report.dist);
    println!("{}", report.rhat);
    println!(
        "{:<32} {:>10} {:>12} {:>12} {:>12}",
        "run", "time [s]", "peak [KiB]", "ess_mean/s", "ess_tail/s"
    );
    for row in report.results.rows() {
        println!(
            "{:<32} {:>10.3} {:>12} {:>12.1} {:>12.1}",
            row.key,
            row.elapsed_time,
            row.peak_memory / 1024,
            row.ess_mean_per_s.unwrap_or(f64::NAN),
            row.ess_tail_per_s.unwrap_or(f64::NAN),
        );
    }
    tracing::info!(output = %config.output.dir.display(), "results written");

    Ok(())
}
