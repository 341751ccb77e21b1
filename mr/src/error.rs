//! Error types shared by every role of the pipeline.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Topology or dataset missing, malformed, or inconsistent. Fatal at startup.
    #[error("config error: {0}")]
    ConfigLoad(String),

    /// A remote node could not be reached.
    #[error("cannot connect to {node}: {source}")]
    Connection {
        node: String,
        #[source]
        source: std::io::Error,
    },

    /// The peer answered the call with a failure.
    #[error("{node} failed: {reason}")]
    RemoteCompute { node: String, reason: String },

    /// The per-call deadline expired before the peer answered.
    #[error("{node} did not answer within {after:?}")]
    Timeout { node: String, after: Duration },

    /// Appending a section to the output artifact failed.
    #[error("cannot write output {}: {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read output {}: {source}", path.display())]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot partition data into zero chunks")]
    InvalidPartition,

    #[error("malformed output at line {line}: {content:?}")]
    OutputParse { line: usize, content: String },
}

impl Error {
    pub fn config<E: std::fmt::Display>(err: E) -> Self {
        Self::ConfigLoad(err.to_string())
    }

    /// Whether the coordinator drops the node and keeps going on this error.
    pub fn is_node_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::RemoteCompute { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_failures_are_recoverable() {
        let refused = Error::Connection {
            node: "w1".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(refused.is_node_failure());
        assert!(Error::Timeout {
            node: "r1".into(),
            after: Duration::from_millis(5)
        }
        .is_node_failure());
        assert!(!Error::InvalidPartition.is_node_failure());
        assert!(!Error::config("bad").is_node_failure());
    }

    #[test]
    fn test_display_names_node() {
        let err = Error::RemoteCompute {
            node: "r2".into(),
            reason: "disk full".into(),
        };
        assert_eq!(err.to_string(), "r2 failed: disk full");
    }
}
