use agentgraph_core::NodeInstance;
use serde::Serialize;

/// Append-only record of the nodes completed during one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    nodes: Vec<NodeInstance>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, node: NodeInstance) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[NodeInstance] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn last(&self) -> Option<&NodeInstance> {
        self.nodes.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInstance> {
        self.nodes.iter()
    }

    /// Type names in visitation order.
    pub fn type_names(&self) -> Vec<&str> {
        self.nodes.iter().map(NodeInstance::type_name).collect()
    }

    pub fn into_vec(self) -> Vec<NodeInstance> {
        self.nodes
    }
}
