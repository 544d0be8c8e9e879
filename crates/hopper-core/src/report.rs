//! Run report emitted by the pipeline runner.
//!
//! Records what ran, how long each step took and how many rows it saw. The
//! runner returns it on success and logs it on failure.

use serde::{Deserialize, Serialize};

use crate::hash::Hash256;
use crate::id::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Built,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Load,
    Transform,
    Write,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: String,
    pub kind: StepKind,
    /// Rows seen after the step, when the backend can tell without scanning.
    pub rows: Option<usize>,
    pub millis: u64,
}

/// A line a lenient source set aside instead of loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedLine {
    pub source: String,
    /// 1-based physical line number.
    pub line: usize,
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: RunId,

    /// Stable hash of the pipeline outline: backend kind and step names.
    pub pipeline_hash: Hash256,

    pub version: String,

    pub backend: String,

    pub steps: Vec<StepReport>,

    /// Lines the source set aside during a lenient load, in file order.
    #[serde(default)]
    pub rejects: Vec<RejectedLine>,

    pub state: RunState,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunReport {
    pub fn new(pipeline_hash: Hash256, backend: impl Into<String>, started_ms: u64) -> Self {
        Self {
            id: RunId::random(),
            pipeline_hash,
            version: crate::VERSION.to_string(),
            backend: backend.into(),
            steps: Vec::new(),
            rejects: Vec::new(),
            state: RunState::Running,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn record(&mut self, step: StepReport) {
        self.steps.push(step);
    }

    pub fn record_rejects(&mut self, rejects: impl IntoIterator<Item = RejectedLine>) {
        self.rejects.extend(rejects);
    }

    pub fn finish(mut self, state: RunState, finished_ms: u64) -> Self {
        self.state = state;
        self.finished_ms = finished_ms;
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }
}
