use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedReply {
    pub sorted: Vec<i32>,
}

/// Failure reported by a node back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{0}")]
pub struct RemoteError(pub String);

#[tarpc::service]
pub trait MapService {
    /// Sorts one chunk ascending.
    async fn map(chunk: Vec<i32>) -> SortedReply;
}

#[tarpc::service]
pub trait ReduceService {
    /// Keeps the values inside the reducer's range, sorts and persists them.
    async fn reduce(values: Vec<i32>) -> Result<SortedReply, RemoteError>;
}
