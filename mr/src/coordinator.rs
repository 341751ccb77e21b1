use futures::{future, lock::Mutex, prelude::*};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tarpc::{client, context, tokio_serde::formats::Json};
use tracing::{debug, info, warn};

use crate::config::{Config, ReducerSpec, Topology, WorkerSpec};
use crate::error::{Error, Result};
use crate::partition;
use crate::report::{DroppedNode, MapResult, PhaseReport, ReduceResult, RunReport};
use crate::rpc::{MapServiceClient, ReduceServiceClient};

/// Deadline carried by calls when the per-call timeout is disabled.
const UNBOUNDED_CALL: Duration = Duration::from_secs(24 * 60 * 60);

/// Drives one run: map phase over the workers, then reduce phase over the
/// reducers. Owns the dataset and topology for the run's duration.
#[derive(Debug, Clone)]
pub struct Coordinator {
    data: Vec<i32>,
    topology: Topology,
    call_timeout: Option<Duration>,
}

impl Coordinator {
    pub fn new(data: Vec<i32>, topology: Topology) -> Self {
        Coordinator {
            data,
            topology,
            call_timeout: None,
        }
    }

    pub fn from_config(config: Config) -> Self {
        let call_timeout = config.call_timeout();
        Self::new(config.data, config.topology).with_call_timeout(call_timeout)
    }

    /// Bounds each Map/Reduce call. `None` lets a hung node stall its own
    /// dispatch indefinitely.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Sends one chunk to every worker concurrently and waits for all of them.
    /// Workers that fail are logged and reported as dropped.
    pub async fn run_map_phase(&self) -> Result<PhaseReport<MapResult>> {
        let workers = &self.topology.workers;
        let chunks = partition::split(&self.data, workers.len())?;
        info!(
            "map phase: dispatching {} values to {} workers",
            self.data.len(),
            workers.len()
        );

        let collector = Collector::new();
        let tasks: Vec<_> = workers
            .iter()
            .zip(chunks)
            .map(|(worker, chunk)| {
                let worker = worker.clone();
                let chunk = chunk.to_vec();
                let collector = Arc::clone(&collector);
                let timeout = self.call_timeout;
                tokio::spawn(async move {
                    let outcome = call_map(&worker, chunk, timeout)
                        .await
                        .map(|sorted| MapResult {
                            worker: worker.id.clone(),
                            sorted,
                        });
                    collector.record(&worker.id, outcome).await;
                })
            })
            .collect();
        join_barrier(tasks).await;

        let report = collector.finish().await;
        info!(
            "map phase complete: {} results, {} dropped",
            report.results.len(),
            report.dropped.len()
        );
        Ok(report)
    }

    /// Broadcasts the merged map output to every reducer concurrently and
    /// waits for all of them. Each reducer filters and persists its own range.
    pub async fn run_reduce_phase(&self, map_results: &[MapResult]) -> PhaseReport<ReduceResult> {
        let merged = merge(map_results);
        let reducers = &self.topology.reducers;
        if reducers.is_empty() {
            warn!("reduce phase: no reducers configured, nothing will be persisted");
            return PhaseReport::default();
        }
        info!(
            "reduce phase: broadcasting {} values to {} reducers",
            merged.len(),
            reducers.len()
        );

        let collector = Collector::new();
        let tasks: Vec<_> = reducers
            .iter()
            .map(|reducer| {
                let reducer = reducer.clone();
                let values = merged.clone();
                let collector = Arc::clone(&collector);
                let timeout = self.call_timeout;
                tokio::spawn(async move {
                    let outcome = call_reduce(&reducer, values, timeout)
                        .await
                        .map(|sorted| ReduceResult {
                            reducer: reducer.id.clone(),
                            sorted,
                        });
                    collector.record(&reducer.id, outcome).await;
                })
            })
            .collect();
        join_barrier(tasks).await;

        let report = collector.finish().await;
        info!(
            "reduce phase complete: {} sections written, {} dropped",
            report.results.len(),
            report.dropped.len()
        );
        report
    }

    pub async fn run(&self) -> Result<RunReport> {
        let map = self.run_map_phase().await?;
        let reduce = self.run_reduce_phase(&map.results).await;
        Ok(RunReport { map, reduce })
    }
}

/// Concatenates map results in collection order. The output is not sorted.
pub fn merge(results: &[MapResult]) -> Vec<i32> {
    results
        .iter()
        .flat_map(|r| r.sorted.iter().copied())
        .collect()
}

/// Results and failures of one phase, shared by that phase's dispatch tasks.
struct Collector<T> {
    results: Mutex<Vec<T>>,
    dropped: Mutex<Vec<DroppedNode>>,
}

impl<T> Collector<T> {
    fn new() -> Arc<Self> {
        Arc::new(Collector {
            results: Mutex::new(vec![]),
            dropped: Mutex::new(vec![]),
        })
    }

    async fn record(&self, id: &str, outcome: Result<T>) {
        match outcome {
            Ok(result) => {
                debug!("{} answered", id);
                self.results.lock().await.push(result);
            }
            Err(error) => {
                warn!("dropping {} from this phase: {}", id, error);
                self.dropped.lock().await.push(DroppedNode {
                    id: id.to_string(),
                    error,
                });
            }
        }
    }

    async fn finish(&self) -> PhaseReport<T> {
        PhaseReport {
            results: std::mem::take(&mut *self.results.lock().await),
            dropped: std::mem::take(&mut *self.dropped.lock().await),
        }
    }
}

async fn join_barrier(tasks: Vec<tokio::task::JoinHandle<()>>) {
    for joined in future::join_all(tasks).await {
        if let Err(e) = joined {
            warn!("dispatch task did not finish: {}", e);
        }
    }
}

async fn call_map(
    worker: &WorkerSpec,
    chunk: Vec<i32>,
    timeout: Option<Duration>,
) -> Result<Vec<i32>> {
    with_deadline(&worker.id, timeout, async {
        let mut transport = tarpc::serde_transport::tcp::connect(worker.addr(), Json::default);
        transport.config_mut().max_frame_length(usize::MAX);
        let transport = transport.await.map_err(|source| Error::Connection {
            node: worker.id.clone(),
            source,
        })?;

        let client = MapServiceClient::new(client::Config::default(), transport).spawn();
        let reply = client
            .map(call_context(timeout), chunk)
            .await
            .map_err(|e| Error::RemoteCompute {
                node: worker.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(reply.sorted)
    })
    .await
}

async fn call_reduce(
    reducer: &ReducerSpec,
    values: Vec<i32>,
    timeout: Option<Duration>,
) -> Result<Vec<i32>> {
    with_deadline(&reducer.id, timeout, async {
        let mut transport = tarpc::serde_transport::tcp::connect(reducer.addr(), Json::default);
        transport.config_mut().max_frame_length(usize::MAX);
        let transport = transport.await.map_err(|source| Error::Connection {
            node: reducer.id.clone(),
            source,
        })?;

        let client = ReduceServiceClient::new(client::Config::default(), transport).spawn();
        let reply = client
            .reduce(call_context(timeout), values)
            .await
            .map_err(|e| Error::RemoteCompute {
                node: reducer.id.clone(),
                reason: e.to_string(),
            })?
            .map_err(|e| Error::RemoteCompute {
                node: reducer.id.clone(),
                reason: e.0,
            })?;
        Ok(reply.sorted)
    })
    .await
}

fn call_context(timeout: Option<Duration>) -> context::Context {
    let mut ctx = context::current();
    ctx.deadline = Instant::now() + timeout.unwrap_or(UNBOUNDED_CALL);
    ctx
}

async fn with_deadline<T>(
    node: &str,
    timeout: Option<Duration>,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(after) => tokio::time::timeout(after, call)
            .await
            .map_err(|_| Error::Timeout {
                node: node.to_string(),
                after,
            })?,
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_result(worker: &str, sorted: Vec<i32>) -> MapResult {
        MapResult {
            worker: worker.to_string(),
            sorted,
        }
    }

    #[test]
    fn test_merge_concatenates_in_collection_order() {
        let results = vec![
            map_result("w2", vec![-8, 2, 10]),
            map_result("w1", vec![-3, 0, 5, 7]),
        ];
        assert_eq!(merge(&results), vec![-8, 2, 10, -3, 0, 5, 7]);
        assert!(merge(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_map_phase_without_workers() {
        let coordinator = Coordinator::new(vec![1, 2, 3], Topology::default());
        let err = coordinator.run_map_phase().await.unwrap_err();
        assert!(matches!(err, Error::InvalidPartition));
        assert!(matches!(coordinator.run().await, Err(Error::InvalidPartition)));
    }

    #[tokio::test]
    async fn test_reduce_phase_without_reducers() {
        let coordinator = Coordinator::new(vec![], Topology::default());
        let report = coordinator
            .run_reduce_phase(&[map_result("w1", vec![1])])
            .await;
        assert!(report.results.is_empty());
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_with_deadline_expires() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>(())
        };
        let err = with_deadline("w1", Some(Duration::from_millis(20)), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { ref node, .. } if node == "w1"));

        let fast = async { Ok::<_, Error>(7) };
        assert_eq!(with_deadline("w1", None, fast).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_collector_splits_outcomes() {
        let collector = Collector::new();
        collector.record("w1", Ok(1)).await;
        collector.record("w2", Err(Error::InvalidPartition)).await;
        collector.record("w3", Ok(3)).await;

        let report = collector.finish().await;
        assert_eq!(report.results, vec![1, 3]);
        assert_eq!(report.dropped_ids(), vec!["w2"]);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_from_config_carries_timeout() {
        let mut config = Config::new(vec![1], Topology::default());
        config.call_timeout_ms = 250;
        let coordinator = Coordinator::from_config(config.clone());
        assert_eq!(coordinator.call_timeout, Some(Duration::from_millis(250)));

        config.call_timeout_ms = 0;
        assert_eq!(Coordinator::from_config(config).call_timeout, None);
    }
}
