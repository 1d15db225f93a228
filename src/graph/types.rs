//! Executable graph form: node map plus the adjacency the scheduler needs.

use std::collections::{HashMap, HashSet};

use crate::dsl::schema::{EdgeDef, NodeDef};
use crate::error::{WorkflowError, WorkflowResult};

/// A (sub-)graph in executable form. Fork, path, and loop bodies build their
/// own instances; there is no global graph singleton.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: HashMap<String, NodeDef>,
    edges: Vec<EdgeDef>,
    /// Node ids in definition order, for deterministic iteration.
    order: Vec<String>,
    /// Outgoing edge indices per source node.
    outgoing: HashMap<String, Vec<usize>>,
    /// Distinct predecessor ids per target. Parallel success/failure edges
    /// from one predecessor collapse into a single required decision.
    incoming_sources: HashMap<String, HashSet<String>>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&NodeDef> {
        self.nodes.get(id)
    }

    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn edges(&self) -> &[EdgeDef] {
        &self.edges
    }

    pub fn outgoing_edges(&self, id: &str) -> impl Iterator<Item = &EdgeDef> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    pub fn incoming_sources(&self, id: &str) -> HashSet<String> {
        self.incoming_sources.get(id).cloned().unwrap_or_default()
    }
}

/// Build a graph, rejecting duplicate ids, dangling edge endpoints, and
/// self-loops. Cycle detection lives in the validator.
pub fn build_graph(nodes: &[NodeDef], edges: &[EdgeDef]) -> WorkflowResult<Graph> {
    let mut node_map = HashMap::with_capacity(nodes.len());
    let mut order = Vec::with_capacity(nodes.len());

    for node in nodes {
        if node_map.insert(node.id.clone(), node.clone()).is_some() {
            return Err(WorkflowError::GraphBuildError(format!(
                "Duplicate node id: {}",
                node.id
            )));
        }
        order.push(node.id.clone());
    }

    let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
    let mut incoming_sources: HashMap<String, HashSet<String>> = HashMap::new();

    for (idx, edge) in edges.iter().enumerate() {
        if !node_map.contains_key(&edge.from) {
            return Err(WorkflowError::GraphBuildError(format!(
                "Edge references unknown source node: {}",
                edge.from
            )));
        }
        if !node_map.contains_key(&edge.to) {
            return Err(WorkflowError::GraphBuildError(format!(
                "Edge references unknown target node: {}",
                edge.to
            )));
        }
        if edge.from == edge.to {
            return Err(WorkflowError::GraphBuildError(format!(
                "Self-loop on node: {}",
                edge.from
            )));
        }
        outgoing.entry(edge.from.clone()).or_default().push(idx);
        incoming_sources
            .entry(edge.to.clone())
            .or_default()
            .insert(edge.from.clone());
    }

    Ok(Graph {
        nodes: node_map,
        edges: edges.to_vec(),
        order,
        outgoing,
        incoming_sources,
    })
}
