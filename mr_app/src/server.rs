use clap::{Parser, Subcommand};
use dsort::reducer::{self, ReducerServer};
use dsort::worker::{self, WorkerServer};
use dsort::{Config, OutputStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Hosts worker or reducer nodes described by a run config.
#[derive(Parser)]
#[command(name = "dsort-node")]
struct Cli {
    /// Path to the JSON run config
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Serve the Map RPC
    Worker {
        /// Worker to host; every configured worker when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Serve the Reduce RPC
    Reducer {
        /// Reducer to host; every configured reducer when omitted
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let role = match cli.role {
        Role::Worker { .. } => "worker",
        Role::Reducer { .. } => "reducer",
    };
    dsort::logging::init(cli.verbose, role, &cli.config);

    let config = Config::load(&cli.config)?;
    let mut handles = vec![];

    match cli.role {
        Role::Worker { id } => {
            let specs: Vec<_> = match &id {
                Some(id) => vec![config
                    .topology
                    .worker(id)
                    .ok_or_else(|| anyhow::anyhow!("no worker {id:?} in {}", cli.config.display()))?],
                None => config.topology.workers.iter().collect(),
            };
            for spec in specs {
                handles.push(worker::spawn(spec.addr(), WorkerServer::new(spec.id.clone())).await?);
            }
        }
        Role::Reducer { id } => {
            let specs: Vec<_> = match &id {
                Some(id) => vec![config
                    .topology
                    .reducer(id)
                    .ok_or_else(|| anyhow::anyhow!("no reducer {id:?} in {}", cli.config.display()))?],
                None => config.topology.reducers.iter().collect(),
            };
            // Reducers hosted by this process share one store handle.
            let store = Arc::new(OutputStore::new(config.output.clone()));
            for spec in specs {
                let server = ReducerServer::from_spec(spec, Arc::clone(&store));
                handles.push(reducer::spawn(spec.addr(), server).await?);
            }
        }
    }

    if handles.is_empty() {
        anyhow::bail!("nothing to serve in {}", cli.config.display());
    }
    info!("serving {} node(s), ctrl-c to stop", handles.len());

    let waits = futures::future::join_all(handles.into_iter().map(|h| h.wait()));
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
        results = waits => {
            for result in results {
                if let Err(e) = result {
                    warn!("{}", e);
                }
            }
        }
    }
    Ok(())
}
