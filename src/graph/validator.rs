//! Pre-execution validation of a workflow definition.
//!
//! Errors abort the run; warnings (timeout-hierarchy violations) are
//! reported and logged but never block execution.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::dsl::schema::{EdgeDef, NodeDef, NodeType, WorkflowDefinition};

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a full workflow definition.
pub fn validate_definition(def: &WorkflowDefinition) -> ValidationReport {
    let mut report = ValidationReport::default();

    validate_graph_shape(&def.nodes, &def.edges, true, "", &mut report);
    validate_timeouts(def, &mut report);

    report
}

/// Validate an embedded sub-graph (fork path, path body, loop body).
pub fn validate_sub_graph(nodes: &[NodeDef], edges: &[EdgeDef], scope: &str) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_graph_shape(nodes, edges, false, scope, &mut report);
    report
}

fn validate_graph_shape(
    nodes: &[NodeDef],
    edges: &[EdgeDef],
    top_level: bool,
    scope: &str,
    report: &mut ValidationReport,
) {
    let prefix = if scope.is_empty() {
        String::new()
    } else {
        format!("{}: ", scope)
    };

    if nodes.is_empty() {
        report
            .errors
            .push(format!("{}workflow must contain at least one node", prefix));
        return;
    }

    let mut ids = HashSet::new();
    for node in nodes {
        if !ids.insert(node.id.as_str()) {
            report
                .errors
                .push(format!("{}duplicate node id: {}", prefix, node.id));
        }
    }

    for (i, edge) in edges.iter().enumerate() {
        if !ids.contains(edge.from.as_str()) {
            report.errors.push(format!(
                "{}edge {} references unknown source node: {}",
                prefix, i, edge.from
            ));
        }
        if !ids.contains(edge.to.as_str()) {
            report.errors.push(format!(
                "{}edge {} references unknown target node: {}",
                prefix, i, edge.to
            ));
        }
        if edge.from == edge.to {
            report
                .errors
                .push(format!("{}edge {} forms a self-loop on {}", prefix, i, edge.from));
        }
    }

    if has_cycle(nodes, edges) {
        report
            .errors
            .push(format!("{}cycle detected in graph", prefix));
    }

    if top_level {
        let start_ids: Vec<&str> = nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Start)
            .map(|n| n.id.as_str())
            .collect();
        match start_ids.len() {
            0 => report
                .errors
                .push("workflow must have exactly one start node, found none".to_string()),
            1 => {
                for edge in edges {
                    if edge.to == start_ids[0] {
                        report.errors.push(format!(
                            "start node '{}' must not have incoming edges",
                            start_ids[0]
                        ));
                    }
                }
                if !end_reachable(nodes, edges, start_ids[0]) {
                    report
                        .errors
                        .push("no end node is reachable from the start node".to_string());
                }
            }
            n => report.errors.push(format!(
                "workflow must have exactly one start node, found {}",
                n
            )),
        }
    }

    // Containment: sub-graphs are self-contained, and validated recursively.
    for node in nodes {
        for (label, sub_nodes, sub_edges) in embedded_sub_graphs(node) {
            let inner_scope = if scope.is_empty() {
                label.clone()
            } else {
                format!("{}/{}", scope, label)
            };
            match (sub_nodes, sub_edges) {
                (Ok(sub_nodes), Ok(sub_edges)) => {
                    if sub_nodes.is_empty() {
                        continue;
                    }
                    let inner = validate_sub_graph(&sub_nodes, &sub_edges, &inner_scope);
                    report.errors.extend(inner.errors);
                    report.warnings.extend(inner.warnings);
                }
                _ => report.errors.push(format!(
                    "{}: malformed sub-graph nodes/edges",
                    inner_scope
                )),
            }
        }
    }
}

type SubGraphParse = (
    String,
    Result<Vec<NodeDef>, serde_json::Error>,
    Result<Vec<EdgeDef>, serde_json::Error>,
);

fn embedded_sub_graphs(node: &NodeDef) -> Vec<SubGraphParse> {
    fn parse_pair(label: String, container: &Value) -> SubGraphParse {
        let nodes = container
            .get("nodes")
            .cloned()
            .map(serde_json::from_value)
            .unwrap_or_else(|| Ok(Vec::new()));
        let edges = container
            .get("edges")
            .cloned()
            .map(serde_json::from_value)
            .unwrap_or_else(|| Ok(Vec::new()));
        (label, nodes, edges)
    }

    match node.node_type {
        NodeType::Loop | NodeType::Path => vec![parse_pair(node.id.clone(), &node.config)],
        NodeType::Fork => node
            .config
            .get("paths")
            .and_then(Value::as_array)
            .map(|paths| {
                paths
                    .iter()
                    .enumerate()
                    .map(|(i, path)| {
                        let label = path
                            .get("id")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("{}.path_{}", node.id, i + 1));
                        parse_pair(label, path)
                    })
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn has_cycle(nodes: &[NodeDef], edges: &[EdgeDef]) -> bool {
    let mut graph: StableDiGraph<&str, ()> = StableDiGraph::new();
    let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
    for node in nodes {
        indices.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
    }
    for edge in edges {
        if let (Some(&from), Some(&to)) =
            (indices.get(edge.from.as_str()), indices.get(edge.to.as_str()))
        {
            graph.add_edge(from, to, ());
        }
    }
    petgraph::algo::is_cyclic_directed(&graph)
}

fn end_reachable(nodes: &[NodeDef], edges: &[EdgeDef], start_id: &str) -> bool {
    let end_ids: HashSet<&str> = nodes
        .iter()
        .filter(|n| n.node_type == NodeType::End)
        .map(|n| n.id.as_str())
        .collect();
    if end_ids.is_empty() {
        return false;
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    let mut visited = HashSet::from([start_id]);
    let mut queue = VecDeque::from([start_id]);
    while let Some(current) = queue.pop_front() {
        if end_ids.contains(current) {
            return true;
        }
        for &next in adjacency.get(current).into_iter().flatten() {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

/// Outer timeouts should bound inner ones; violations are permitted but
/// warned.
fn validate_timeouts(def: &WorkflowDefinition, report: &mut ValidationReport) {
    let level_timeout = def.config.level_timeout;
    for node in &def.nodes {
        if let Some(node_timeout) = node.config.get("timeout").and_then(Value::as_f64) {
            if node_timeout > level_timeout {
                report.warnings.push(format!(
                    "node '{}' timeout {}s exceeds workflow level_timeout {}s",
                    node.id, node_timeout, level_timeout
                ));
            }
        }
        if node.node_type == NodeType::Fork {
            let fork_timeout = node
                .config
                .get("timeout")
                .and_then(Value::as_f64)
                .unwrap_or(600.0);
            if let Some(paths) = node.config.get("paths").and_then(Value::as_array) {
                for (i, path) in paths.iter().enumerate() {
                    let path_timeout = path
                        .get("level_timeout")
                        .and_then(Value::as_f64)
                        .unwrap_or(300.0);
                    if path_timeout > fork_timeout {
                        report.warnings.push(format!(
                            "fork '{}' path {} level_timeout {}s exceeds fork timeout {}s",
                            node.id,
                            i + 1,
                            path_timeout,
                            fork_timeout
                        ));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::schema::parse_definition;
    use serde_json::json;

    fn def(nodes: Value, edges: Value) -> WorkflowDefinition {
        parse_definition(
            &json!({"id": "wf", "nodes": nodes, "edges": edges}).to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_linear_workflow() {
        let def = def(
            json!([
                {"id": "start", "type": "start"},
                {"id": "a", "type": "noop"},
                {"id": "end", "type": "end"}
            ]),
            json!([
                {"from": "start", "to": "a"},
                {"from": "a", "to": "end"}
            ]),
        );
        let report = validate_definition(&def);
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_detects_cycle() {
        let def = def(
            json!([
                {"id": "start", "type": "start"},
                {"id": "a", "type": "noop"},
                {"id": "b", "type": "noop"},
                {"id": "end", "type": "end"}
            ]),
            json!([
                {"from": "start", "to": "a"},
                {"from": "a", "to": "b"},
                {"from": "b", "to": "a"},
                {"from": "a", "to": "end"}
            ]),
        );
        let report = validate_definition(&def);
        assert!(report.errors.iter().any(|e| e.contains("cycle")));
    }

    #[test]
    fn test_requires_exactly_one_start() {
        let none = def(
            json!([{"id": "end", "type": "end"}]),
            json!([]),
        );
        assert!(!validate_definition(&none).is_valid());

        let two = def(
            json!([
                {"id": "s1", "type": "start"},
                {"id": "s2", "type": "start"},
                {"id": "end", "type": "end"}
            ]),
            json!([
                {"from": "s1", "to": "end"},
                {"from": "s2", "to": "end"}
            ]),
        );
        assert!(validate_definition(&two)
            .errors
            .iter()
            .any(|e| e.contains("exactly one start")));
    }

    #[test]
    fn test_requires_reachable_end() {
        let def = def(
            json!([
                {"id": "start", "type": "start"},
                {"id": "a", "type": "noop"},
                {"id": "end", "type": "end"}
            ]),
            json!([
                {"from": "start", "to": "a"}
            ]),
        );
        let report = validate_definition(&def);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("no end node is reachable")));
    }

    #[test]
    fn test_start_with_incoming_edge_rejected() {
        let def = def(
            json!([
                {"id": "start", "type": "start"},
                {"id": "end", "type": "end"}
            ]),
            json!([
                {"from": "start", "to": "end"},
                {"from": "end", "to": "start"}
            ]),
        );
        let report = validate_definition(&def);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("must not have incoming edges")));
    }

    #[test]
    fn test_sub_graph_containment() {
        let def = def(
            json!([
                {"id": "start", "type": "start"},
                {"id": "loop1", "type": "loop", "config": {
                    "items": [1],
                    "nodes": [{"id": "child", "type": "noop"}],
                    "edges": [{"from": "child", "to": "outsider"}]
                }},
                {"id": "end", "type": "end"}
            ]),
            json!([
                {"from": "start", "to": "loop1"},
                {"from": "loop1", "to": "end"}
            ]),
        );
        let report = validate_definition(&def);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("loop1") && e.contains("outsider")));
    }

    #[test]
    fn test_fork_path_sub_graph_cycle_detected() {
        let def = def(
            json!([
                {"id": "start", "type": "start"},
                {"id": "fork1", "type": "fork", "config": {
                    "paths": [{
                        "id": "p1",
                        "nodes": [
                            {"id": "x", "type": "noop"},
                            {"id": "y", "type": "noop"}
                        ],
                        "edges": [
                            {"from": "x", "to": "y"},
                            {"from": "y", "to": "x"}
                        ]
                    }]
                }},
                {"id": "end", "type": "end"}
            ]),
            json!([
                {"from": "start", "to": "fork1"},
                {"from": "fork1", "to": "end"}
            ]),
        );
        let report = validate_definition(&def);
        assert!(report.errors.iter().any(|e| e.contains("p1")));
    }

    #[test]
    fn test_timeout_hierarchy_warning() {
        let def = def(
            json!([
                {"id": "start", "type": "start"},
                {"id": "slow", "type": "http_request",
                 "config": {"url": "https://api/x", "timeout": 900}},
                {"id": "end", "type": "end"}
            ]),
            json!([
                {"from": "start", "to": "slow"},
                {"from": "slow", "to": "end"}
            ]),
        );
        let report = validate_definition(&def);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.contains("slow")));
    }
}
