//! Run records kept by the registry.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use agentgraph_core::{FieldMap, NodeInstance};
use agentgraph_exec::{ExecutionError, GraphDefinition};
use serde::{Deserialize, Serialize};

/// Registry-assigned run identifier, monotonically increasing from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_finished(self) -> bool {
        !matches!(self, RunState::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendCall {
    ChooseType,
    Fill,
}

/// One timed backend invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeTiming {
    /// Target type for a fill; the candidate list for a routing choice.
    pub node_type: String,
    pub call: BackendCall,
    /// Milliseconds since the Unix epoch.
    pub started_at: u64,
    pub ended_at: u64,
    pub duration_ms: u64,
}

/// Machine-readable failure descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunErrorInfo {
    pub code: String,
    pub message: String,
}

impl From<&ExecutionError> for RunErrorInfo {
    fn from(error: &ExecutionError) -> Self {
        RunErrorInfo {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// One submitted execution and everything observed about it.
#[derive(Debug, Clone, Serialize)]
pub struct GraphRun {
    pub id: RunId,
    pub state: RunState,
    #[serde(skip)]
    pub graph: Arc<GraphDefinition>,
    pub start_type: String,
    pub args: FieldMap,
    pub trace: Vec<NodeInstance>,
    /// Type of the node whose step is in progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    pub timings: Vec<NodeTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunErrorInfo>,
    pub submitted_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
}

impl GraphRun {
    pub(crate) fn new(id: RunId, graph: Arc<GraphDefinition>, args: FieldMap) -> Self {
        GraphRun {
            id,
            state: RunState::Running,
            start_type: graph.start().to_string(),
            graph,
            args,
            trace: Vec::new(),
            current: None,
            timings: Vec::new(),
            error: None,
            submitted_at: now_millis(),
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Type names of the trace, in visitation order.
    pub fn path(&self) -> Vec<&str> {
        self.trace.iter().map(NodeInstance::type_name).collect()
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
