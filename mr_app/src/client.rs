use clap::Parser;
use dsort::node::NodeHandle;
use dsort::reducer::{self, ReducerServer};
use dsort::worker::{self, WorkerServer};
use dsort::{Config, Coordinator, OutputStore, RunReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs one distributed sort: map over the workers, reduce over the reducers.
#[derive(Parser)]
#[command(name = "dsort-coordinator")]
struct Cli {
    /// Path to the JSON run config
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Host every worker and reducer in this process before running
    #[arg(long)]
    local: bool,

    /// Fail when any node's contribution was dropped
    #[arg(long)]
    require_all: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

async fn host_all(config: &Config) -> anyhow::Result<Vec<NodeHandle>> {
    let mut handles = vec![];
    for spec in &config.topology.workers {
        handles.push(worker::spawn(spec.addr(), WorkerServer::new(spec.id.clone())).await?);
    }
    let store = Arc::new(OutputStore::new(config.output.clone()));
    for spec in &config.topology.reducers {
        let server = ReducerServer::from_spec(spec, Arc::clone(&store));
        handles.push(reducer::spawn(spec.addr(), server).await?);
    }
    info!("hosting {} nodes locally", handles.len());
    Ok(handles)
}

fn print_summary(report: &RunReport) {
    println!(
        "map: {} of {} workers answered",
        report.map.results.len(),
        report.map.results.len() + report.map.dropped.len()
    );
    for result in &report.reduce.results {
        println!("reducer {}: {} values", result.reducer, result.sorted.len());
    }
    for dropped in report.map.dropped.iter().chain(&report.reduce.dropped) {
        println!("dropped {}: {}", dropped.id, dropped.error);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dsort::logging::init(cli.verbose, "coordinator", &cli.config);

    let config = Config::load(&cli.config)?;
    let output = config.output.clone();
    let local_nodes = if cli.local {
        host_all(&config).await?
    } else {
        vec![]
    };

    let coordinator = Coordinator::from_config(config);
    let report = coordinator.run().await?;
    for node in &local_nodes {
        node.abort();
    }

    print_summary(&report);
    if report.is_complete() {
        info!("output written to {}", output.display());
    } else {
        warn!("output in {} is missing dropped nodes' data", output.display());
        if cli.require_all {
            let dropped = report.map.dropped.len() + report.reduce.dropped.len();
            anyhow::bail!("{} node(s) dropped", dropped);
        }
    }
    Ok(())
}
