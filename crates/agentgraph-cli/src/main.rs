//! agentgraph demo CLI.
//!
//! Provides the `agentgraph` binary with subcommands that exercise the run
//! registry against a bundled graph and a scripted backend.
//!
//! Reads configuration from environment variables:
//! - `AGENTGRAPH_ARCHIVE_CAPACITY`: finished runs kept in history (default: 64)
//! - `AGENTGRAPH_MAX_ITERATIONS`: steps allowed per run (default: 10)
//! - `RUST_LOG`: log filter (default: "info")

mod demo;

use std::process;
use std::sync::Arc;

use agentgraph_runtime::{RunRegistry, RunState, RuntimeConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Typed agent graph runner.
#[derive(Parser)]
#[command(name = "agentgraph", about = "Run typed agent graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Build the demo graph and print its topology.
    Validate,

    /// Run the demo graph concurrently and print each run as JSON.
    Run {
        /// Value of the start node's `x` field.
        #[arg(short, long)]
        x: i64,

        /// Number of concurrent runs.
        #[arg(short, long, default_value_t = 1)]
        runs: usize,

        /// Overrides AGENTGRAPH_ARCHIVE_CAPACITY.
        #[arg(long)]
        archive_capacity: Option<usize>,

        /// Overrides AGENTGRAPH_MAX_ITERATIONS.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Simulated backend latency per call.
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Validate => run_validate(),
        Commands::Run {
            x,
            runs,
            archive_capacity,
            max_iterations,
            latency_ms,
        } => run_demo(x, runs, archive_capacity, max_iterations, latency_ms).await,
    };
    process::exit(exit_code);
}

/// Returns exit code: 0 = valid, 2 = invalid graph.
fn run_validate() -> i32 {
    match demo::graph() {
        Ok(graph) => {
            print!("{}", graph.topology());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

/// Returns exit code: 0 = all runs done, 1 = some run did not finish
/// cleanly, 2 = configuration or graph error.
async fn run_demo(
    x: i64,
    runs: usize,
    archive_capacity: Option<usize>,
    max_iterations: Option<usize>,
    latency_ms: u64,
) -> i32 {
    let mut config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    if let Some(capacity) = archive_capacity.filter(|c| *c > 0) {
        config = config.with_archive_capacity(capacity);
    }
    if let Some(limit) = max_iterations.filter(|m| *m > 0) {
        config = config.with_max_iterations(limit);
    }

    let graph = match demo::graph() {
        Ok(graph) => Arc::new(graph),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    let registry = RunRegistry::new(config);
    let backend = demo::backend(latency_ms);

    let mut handles = Vec::with_capacity(runs);
    for _ in 0..runs {
        match registry.submit_watched(Arc::clone(&graph), demo::start_args(x), backend.clone()) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 2;
            }
        }
    }
    tracing::info!(runs = handles.len(), "all runs submitted");

    let mut all_done = true;
    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.wait().await {
            Some(run) => {
                all_done &= run.state == RunState::Done;
                reports.push(run);
            }
            None => all_done = false,
        }
    }

    match serde_json::to_string_pretty(&reports) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: failed to serialize runs: {}", e);
            return 1;
        }
    }

    if all_done {
        0
    } else {
        1
    }
}
