use crate::error::Error;

/// Sorted chunk returned by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapResult {
    pub worker: String,
    pub sorted: Vec<i32>,
}

/// Sorted in-range values returned by one reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceResult {
    pub reducer: String,
    pub sorted: Vec<i32>,
}

/// A node whose contribution was left out of a phase.
#[derive(Debug)]
pub struct DroppedNode {
    pub id: String,
    pub error: Error,
}

/// Outcome of one fan-out/fan-in phase. `results` is in completion order.
#[derive(Debug)]
pub struct PhaseReport<T> {
    pub results: Vec<T>,
    pub dropped: Vec<DroppedNode>,
}

impl<T> Default for PhaseReport<T> {
    fn default() -> Self {
        PhaseReport {
            results: vec![],
            dropped: vec![],
        }
    }
}

impl<T> PhaseReport<T> {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }

    pub fn dropped_ids(&self) -> Vec<&str> {
        self.dropped.iter().map(|d| d.id.as_str()).collect()
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub map: PhaseReport<MapResult>,
    pub reduce: PhaseReport<ReduceResult>,
}

impl RunReport {
    /// True when every worker and every reducer answered.
    pub fn is_complete(&self) -> bool {
        self.map.is_complete() && self.reduce.is_complete()
    }
}
