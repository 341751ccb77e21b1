pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod node;
pub mod partition;
pub mod reducer;
pub mod report;
pub mod rpc;
pub mod store;
pub mod worker;

pub use config::{Config, ReducerSpec, Topology, ValueRange, WorkerSpec};
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use report::{DroppedNode, MapResult, PhaseReport, ReduceResult, RunReport};
pub use store::{OutputStore, Section};
