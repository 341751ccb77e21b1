use futures::{future, prelude::*};
use std::net::SocketAddr;
use tarpc::{
    context,
    server::{self, Channel},
    tokio_serde::formats::Json,
};
use tracing::{debug, info};

use crate::node::{self, NodeHandle, MAX_CHANNELS};
use crate::rpc::{MapService, SortedReply};

/// Sorts a chunk ascending. An empty chunk stays empty.
pub fn sort_chunk(mut chunk: Vec<i32>) -> Vec<i32> {
    chunk.sort_unstable();
    chunk
}

/// Map side of the pipeline. Holds no state across calls.
#[derive(Debug, Clone)]
pub struct WorkerServer {
    id: String,
}

impl WorkerServer {
    pub fn new(id: impl Into<String>) -> Self {
        WorkerServer { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl MapService for WorkerServer {
    async fn map(self, _: context::Context, chunk: Vec<i32>) -> SortedReply {
        debug!("worker {}: sorting chunk of {} values", self.id, chunk.len());
        SortedReply {
            sorted: sort_chunk(chunk),
        }
    }
}

/// Binds `addr` and serves the Map RPC in the background.
pub async fn spawn(addr: SocketAddr, worker: WorkerServer) -> anyhow::Result<NodeHandle> {
    let mut listener = tarpc::serde_transport::tcp::listen(&addr, Json::default).await?;
    listener.config_mut().max_frame_length(usize::MAX);
    let local_addr = listener.local_addr();
    info!("worker {} listening on {}", worker.id, local_addr);

    let id = worker.id.clone();
    let server_future = listener
        // Ignore accept errors.
        .filter_map(|r| future::ready(r.ok()))
        .map(server::BaseChannel::with_defaults)
        .map(move |channel| {
            channel
                .execute(worker.clone().serve())
                .for_each(node::spawn)
        })
        .buffer_unordered(MAX_CHANNELS)
        .for_each(|_| async {});

    Ok(NodeHandle::new(id, local_addr, tokio::spawn(server_future)))
}
