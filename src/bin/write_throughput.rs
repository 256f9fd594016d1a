//! write-throughput: sweep batch size × indexing × threads and print one
//! throughput line per run.
//!
//! Usage:
//!   write-throughput                                   # classic sweep
//!   write-throughput --batch-sizes 1,10,100 --threads 1,8 --indexing unique,plain
//!   write-throughput --sweep runs.json --json

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use write_throughput::bench::config::{CLASSIC_BATCH_SIZES, CLASSIC_THREAD_COUNTS};
use write_throughput::bench::{
    BenchmarkConfig, BenchmarkRun, HostResources, Indexing, NodePayload, RemainderPolicy, Sweep,
    DEFAULT_INDEX_NAME, DEFAULT_TOTAL_NODES,
};
use write_throughput::DurabilityMode;

const GROUP_SEPARATOR_WIDTH: usize = 63;

/// Oversubscription above which the banner warns that numbers mostly
/// measure scheduler contention.
const OVERSUBSCRIPTION_WARN: f64 = 8.0;

#[derive(Parser, Debug)]
#[command(
    name = "write-throughput",
    version,
    about = "Concurrent batch-write throughput benchmark for an embedded graph store"
)]
struct Cli {
    /// Nodes per transaction (comma separated) [default: 1,10]
    #[arg(long, value_delimiter = ',')]
    batch_sizes: Vec<usize>,

    /// Worker thread counts (comma separated) [default: 1,4,16,32,100]
    #[arg(long, value_delimiter = ',')]
    threads: Vec<usize>,

    /// Indexing policies: unique, plain (comma separated) [default: unique]
    #[arg(long, value_delimiter = ',')]
    indexing: Vec<Indexing>,

    /// Nodes each run aims to write
    #[arg(long, default_value_t = DEFAULT_TOTAL_NODES)]
    total_nodes: usize,

    /// Node properties: minimal (name only) or rich
    #[arg(long, default_value = "rich")]
    payload: NodePayload,

    /// Remainder of total_nodes / batch_size: drop or final-batch
    #[arg(long, default_value = "drop")]
    remainder: RemainderPolicy,

    /// Commit durability: sync or buffered
    #[arg(long, default_value = "sync")]
    durability: DurabilityMode,

    /// Unique index name
    #[arg(long, default_value = DEFAULT_INDEX_NAME)]
    index_name: String,

    /// Keep each run's store directory
    #[arg(long)]
    keep_store: bool,

    /// Directory to create store directories in [default: system temp dir]
    #[arg(long)]
    store_root: Option<PathBuf>,

    /// JSON file with the runs to execute (replaces the sweep flags)
    #[arg(long, conflicts_with_all = ["batch_sizes", "threads", "indexing"])]
    sweep: Option<PathBuf>,

    /// Print each result as a JSON line
    #[arg(long)]
    json: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn template(&self) -> BenchmarkConfig {
        let config = BenchmarkConfig::default()
            .total_nodes(self.total_nodes)
            .payload(self.payload)
            .remainder(self.remainder)
            .durability(self.durability)
            .index_name(self.index_name.clone())
            .keep_store(self.keep_store);
        match &self.store_root {
            Some(root) => config.store_root(root.clone()),
            None => config,
        }
    }

    fn build_sweep(&self) -> Result<Sweep> {
        if let Some(path) = &self.sweep {
            return Sweep::from_json_file(path)
                .with_context(|| format!("loading sweep from {}", path.display()));
        }

        let batch_sizes = or_default(&self.batch_sizes, &CLASSIC_BATCH_SIZES);
        let threads = or_default(&self.threads, &CLASSIC_THREAD_COUNTS);
        let indexing = or_default(&self.indexing, &[Indexing::Unique]);

        let sweep = Sweep::cartesian(&batch_sizes, &indexing, &threads, &self.template());
        sweep.validate().context("invalid sweep parameters")?;
        Ok(sweep)
    }
}

fn or_default<T: Clone>(given: &[T], default: &[T]) -> Vec<T> {
    if given.is_empty() {
        default.to_vec()
    } else {
        given.to_vec()
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute every run; returns how many failed.
fn run_sweep(cli: &Cli, sweep: &Sweep) -> Result<usize> {
    let host = HostResources::detect();
    tracing::info!("write-throughput v{}: {}", env!("CARGO_PKG_VERSION"), host.summary());
    if let Some(max_threads) = sweep.runs().map(|c| c.worker_count).max() {
        let ratio = host.oversubscription(max_threads);
        if ratio > OVERSUBSCRIPTION_WARN {
            tracing::warn!("{} threads on {} cpus ({:.0}x oversubscribed)", max_threads, host.cpu_count, ratio);
        }
    }

    let mut failed = 0;
    for (group_index, group) in sweep.groups().iter().enumerate() {
        if group_index > 0 && !cli.json {
            println!("{}", "=".repeat(GROUP_SEPARATOR_WIDTH));
        }
        for config in group {
            let mut run = BenchmarkRun::new(config.clone());
            match run.execute() {
                Ok(result) if cli.json => {
                    println!("{}", serde_json::to_string(&result).context("encoding result")?);
                }
                Ok(result) => println!("{}", result.report_line()),
                // Already logged by the run; no throughput line for it.
                Err(_) => failed += 1,
            }
        }
    }
    Ok(failed)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = cli.build_sweep().and_then(|sweep| run_sweep(&cli, &sweep));
    match outcome {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            tracing::error!("{} run(s) failed", failed);
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
