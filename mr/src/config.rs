//! Run configuration: the dataset plus the worker/reducer topology.
//!
//! The document is JSON:
//!
//! ```json
//! {
//!   "data": [5, -3, 10, 0, 7, -8, 2],
//!   "workers": [{ "id": "w1", "port": 50001 }, { "id": "w2", "port": 50002 }],
//!   "reducers": [{ "id": "r1", "port": 50101, "range": [0, 10] }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const DEFAULT_OUTPUT: &str = "final_output.txt";
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Inclusive value range owned by one reducer. Written as `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct ValueRange {
    pub low: i32,
    pub high: i32,
}

impl ValueRange {
    pub fn new(low: i32, high: i32) -> Self {
        ValueRange { low, high }
    }

    pub fn contains(&self, value: i32) -> bool {
        self.low <= value && value <= self.high
    }

    pub fn overlaps(&self, other: &ValueRange) -> bool {
        self.low <= other.high && other.low <= self.high
    }
}

impl From<[i32; 2]> for ValueRange {
    fn from([low, high]: [i32; 2]) -> Self {
        ValueRange { low, high }
    }
}

impl From<ValueRange> for [i32; 2] {
    fn from(range: ValueRange) -> Self {
        [range.low, range.high]
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub id: String,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    pub port: u16,
}

impl WorkerSpec {
    pub fn new(id: impl Into<String>, addr: SocketAddr) -> Self {
        WorkerSpec {
            id: id.into(),
            host: addr.ip(),
            port: addr.port(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReducerSpec {
    pub id: String,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    pub port: u16,
    pub range: ValueRange,
}

impl ReducerSpec {
    pub fn new(id: impl Into<String>, addr: SocketAddr, range: ValueRange) -> Self {
        ReducerSpec {
            id: id.into(),
            host: addr.ip(),
            port: addr.port(),
            range,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub workers: Vec<WorkerSpec>,
    #[serde(default)]
    pub reducers: Vec<ReducerSpec>,
}

impl Topology {
    pub fn worker(&self, id: &str) -> Option<&WorkerSpec> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn reducer(&self, id: &str) -> Option<&ReducerSpec> {
        self.reducers.iter().find(|r| r.id == id)
    }

    /// Checks the deployment contract: at least one worker, unique identities
    /// and addresses, well-formed and pairwise disjoint reducer ranges.
    pub fn validate(&self) -> Result<()> {
        if self.workers.is_empty() {
            return Err(Error::config("no workers configured"));
        }

        let mut ids = HashSet::new();
        let mut addrs = HashSet::new();
        let nodes = self
            .workers
            .iter()
            .map(|w| (&w.id, w.addr()))
            .chain(self.reducers.iter().map(|r| (&r.id, r.addr())));
        for (id, addr) in nodes {
            if !ids.insert(id.as_str()) {
                return Err(Error::config(format!("duplicate node id {id:?}")));
            }
            if !addrs.insert(addr) {
                return Err(Error::config(format!("node {id:?} reuses address {addr}")));
            }
        }

        for reducer in &self.reducers {
            // the id becomes the `Reducer <id>:` header line of its output section
            let id = &reducer.id;
            if id.is_empty() || id.contains(['\n', '\r']) || id.ends_with(':') {
                return Err(Error::config(format!("reducer id {id:?} cannot head a section")));
            }
            if reducer.range.low > reducer.range.high {
                return Err(Error::config(format!(
                    "reducer {:?} has empty range [{}, {}]",
                    reducer.id, reducer.range.low, reducer.range.high
                )));
            }
        }
        for (i, a) in self.reducers.iter().enumerate() {
            for b in &self.reducers[i + 1..] {
                if a.range.overlaps(&b.range) {
                    return Err(Error::config(format!(
                        "reducer ranges of {:?} and {:?} overlap",
                        a.id, b.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Values of `data` that no reducer range covers.
    pub fn uncovered<'a>(&self, data: &'a [i32]) -> Vec<&'a i32> {
        data.iter()
            .filter(|v| !self.reducers.iter().any(|r| r.range.contains(**v)))
            .collect()
    }
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: Vec<i32>,
    #[serde(flatten)]
    pub topology: Topology,
    /// Output artifact shared by the reducers.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Deadline for a single Map/Reduce call in milliseconds (0 = no deadline)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Config {
    pub fn new(data: Vec<i32>, topology: Topology) -> Self {
        Config {
            data,
            topology,
            output: default_output(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }

    /// Reads and validates a config document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::parse(&contents)?;
        debug!(
            "loaded {} values, {} workers, {} reducers from {}",
            config.data.len(),
            config.topology.workers.len(),
            config.topology.reducers.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(contents).map_err(Error::config)?;
        config.topology.validate()?;

        let uncovered = config.topology.uncovered(&config.data);
        if !uncovered.is_empty() {
            warn!(
                "{} of {} values fall outside every reducer range and will not be persisted",
                uncovered.len(),
                config.data.len()
            );
        }
        Ok(config)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "data": [5, -3, 10, 0, 7, -8, 2],
        "workers": [{"id": "w1", "port": 50001}, {"id": "w2", "port": 50002}],
        "reducers": [
            {"id": "r1", "port": 50101, "range": [0, 10]},
            {"id": "r2", "port": 50102, "range": [-10, -1]}
        ]
    }"#;

    #[test]
    fn test_parse_sample_document() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.data, vec![5, -3, 10, 0, 7, -8, 2]);
        assert_eq!(config.topology.workers.len(), 2);
        assert_eq!(config.topology.workers[0].addr(), "127.0.0.1:50001".parse().unwrap());
        assert_eq!(config.topology.reducers[1].range, ValueRange::new(-10, -1));
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(30_000)));
    }

    #[test]
    fn test_parse_optional_fields() {
        let config = Config::parse(
            r#"{
                "data": [],
                "workers": [{"id": "w1", "host": "10.0.0.7", "port": 7000}],
                "reducers": [],
                "output": "/tmp/out.txt",
                "call_timeout_ms": 0
            }"#,
        )
        .unwrap();
        assert_eq!(config.topology.workers[0].addr(), "10.0.0.7:7000".parse().unwrap());
        assert_eq!(config.output, PathBuf::from("/tmp/out.txt"));
        assert_eq!(config.call_timeout(), None);
    }

    #[test]
    fn test_range_round_trips_as_pair() {
        let json = serde_json::to_string(&ValueRange::new(-4, 9)).unwrap();
        assert_eq!(json, "[-4,9]");
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let range = ValueRange::new(0, 10);
        assert!(range.contains(0));
        assert!(range.contains(10));
        assert!(!range.contains(-1));
        assert!(!range.contains(11));
    }

    #[test]
    fn test_reject_malformed_document() {
        assert!(matches!(Config::parse("{"), Err(Error::ConfigLoad(_))));
        assert!(matches!(
            Config::parse(r#"{"workers": [{"id": "w1"}]}"#),
            Err(Error::ConfigLoad(_))
        ));
    }

    #[test]
    fn test_reject_missing_workers() {
        let err = Config::parse(r#"{"data": [1], "workers": []}"#).unwrap_err();
        assert!(err.to_string().contains("no workers"));
    }

    #[test]
    fn test_reject_overlapping_ranges() {
        let err = Config::parse(
            r#"{
                "workers": [{"id": "w1", "port": 1}],
                "reducers": [
                    {"id": "r1", "port": 2, "range": [0, 10]},
                    {"id": "r2", "port": 3, "range": [10, 20]}
                ]
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_reject_inverted_range() {
        let err = Config::parse(
            r#"{
                "workers": [{"id": "w1", "port": 1}],
                "reducers": [{"id": "r1", "port": 2, "range": [5, 1]}]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }

    #[test]
    fn test_reject_reducer_ids_without_clean_header() {
        for bad in ["", "r\n1", "r1\r", "r1:"] {
            let topology = Topology {
                workers: vec![WorkerSpec::new("w1", "127.0.0.1:9001".parse().unwrap())],
                reducers: vec![ReducerSpec::new(
                    bad,
                    "127.0.0.1:9002".parse().unwrap(),
                    ValueRange::new(0, 10),
                )],
            };
            let err = topology.validate().unwrap_err();
            assert!(matches!(err, Error::ConfigLoad(_)), "accepted {bad:?}");
        }

        let topology = Topology {
            workers: vec![WorkerSpec::new("w1", "127.0.0.1:9001".parse().unwrap())],
            reducers: vec![ReducerSpec::new(
                "reducer: low",
                "127.0.0.1:9002".parse().unwrap(),
                ValueRange::new(0, 10),
            )],
        };
        assert!(topology.validate().is_ok());
    }

    #[test]
    fn test_reject_duplicate_ids_and_ports() {
        let dup_id = r#"{"workers": [{"id": "n", "port": 1}], "reducers": [{"id": "n", "port": 2, "range": [0, 1]}]}"#;
        assert!(Config::parse(dup_id).unwrap_err().to_string().contains("duplicate"));

        let dup_port = r#"{"workers": [{"id": "w1", "port": 1}, {"id": "w2", "port": 1}]}"#;
        assert!(Config::parse(dup_port).unwrap_err().to_string().contains("reuses"));
    }

    #[test]
    fn test_uncovered_values_are_not_fatal() {
        let config = Config::parse(
            r#"{
                "data": [-8, -3, 0, 2],
                "workers": [{"id": "w1", "port": 1}],
                "reducers": [{"id": "r1", "port": 2, "range": [0, 10]}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.topology.uncovered(&config.data), vec![&-8, &-3]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/dsort.json").unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.topology.reducer("r1").unwrap().port, 50101);
        assert!(config.topology.worker("w3").is_none());
    }
}
