use futures::prelude::*;
use std::net::SocketAddr;
use tokio::task::JoinHandle;

/// Max concurrent connections one node serves.
pub(crate) const MAX_CHANNELS: usize = 64;

/// A node service running in the background on a bound address.
#[derive(Debug)]
pub struct NodeHandle {
    id: String,
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl NodeHandle {
    pub(crate) fn new(id: String, addr: SocketAddr, task: JoinHandle<()>) -> Self {
        NodeHandle { id, addr, task }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The address the listener actually bound, useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting new connections.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Runs until the listener stops.
    pub async fn wait(self) -> anyhow::Result<()> {
        match self.task.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(anyhow::anyhow!("node {} stopped: {}", self.id, e)),
        }
    }
}

pub(crate) async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}
