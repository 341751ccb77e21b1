use futures::{future, prelude::*};
use std::net::SocketAddr;
use std::sync::Arc;
use tarpc::{
    context,
    server::{self, Channel},
    tokio_serde::formats::Json,
};
use tracing::{debug, info, warn};

use crate::config::{ReducerSpec, ValueRange};
use crate::error::Result;
use crate::node::{self, NodeHandle, MAX_CHANNELS};
use crate::rpc::{ReduceService, RemoteError, SortedReply};
use crate::store::OutputStore;

/// Values of `values` inside `range`, sorted ascending.
pub fn retain_in_range(values: Vec<i32>, range: ValueRange) -> Vec<i32> {
    let mut kept: Vec<i32> = values.into_iter().filter(|v| range.contains(*v)).collect();
    kept.sort_unstable();
    kept
}

/// Reduce side of the pipeline. Every instance writes through the same
/// injected [`OutputStore`].
#[derive(Debug, Clone)]
pub struct ReducerServer {
    id: String,
    range: ValueRange,
    store: Arc<OutputStore>,
}

impl ReducerServer {
    pub fn new(id: impl Into<String>, range: ValueRange, store: Arc<OutputStore>) -> Self {
        ReducerServer {
            id: id.into(),
            range,
            store,
        }
    }

    pub fn from_spec(spec: &ReducerSpec, store: Arc<OutputStore>) -> Self {
        Self::new(spec.id.clone(), spec.range, store)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Filters, sorts, and persists one section. The returned values are
    /// exactly what was appended.
    pub async fn reduce_values(&self, values: Vec<i32>) -> Result<Vec<i32>> {
        let total = values.len();
        let kept = retain_in_range(values, self.range);
        debug!(
            "reducer {}: kept {} of {} values in [{}, {}]",
            self.id, kept.len(), total, self.range.low, self.range.high
        );
        self.store.append(&self.id, &kept).await?;
        Ok(kept)
    }
}

impl ReduceService for ReducerServer {
    async fn reduce(
        self,
        _: context::Context,
        values: Vec<i32>,
    ) -> std::result::Result<SortedReply, RemoteError> {
        match self.reduce_values(values).await {
            Ok(sorted) => Ok(SortedReply { sorted }),
            Err(e) => {
                warn!("reducer {}: {}", self.id, e);
                Err(RemoteError(e.to_string()))
            }
        }
    }
}

/// Binds `addr` and serves the Reduce RPC in the background.
pub async fn spawn(addr: SocketAddr, reducer: ReducerServer) -> anyhow::Result<NodeHandle> {
    let mut listener = tarpc::serde_transport::tcp::listen(&addr, Json::default).await?;
    listener.config_mut().max_frame_length(usize::MAX);
    let local_addr = listener.local_addr();
    info!(
        "reducer {} listening on {} for [{}, {}]",
        reducer.id, local_addr, reducer.range.low, reducer.range.high
    );

    let id = reducer.id.clone();
    let server_future = listener
        // Ignore accept errors.
        .filter_map(|r| future::ready(r.ok()))
        .map(server::BaseChannel::with_defaults)
        .map(move |channel| {
            channel
                .execute(reducer.clone().serve())
                .for_each(node::spawn)
        })
        .buffer_unordered(MAX_CHANNELS)
        .for_each(|_| async {});

    Ok(NodeHandle::new(id, local_addr, tokio::spawn(server_future)))
}
