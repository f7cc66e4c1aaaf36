//! Bulk graph loading from a declarative JSON or YAML definition.

use std::path::Path;

use serde::Deserialize;

use crate::error::{CitypulseError, Result};
use crate::graph::{KnowledgeGraph, NodeKind, Relation};

/// Declarative description of roads, intersections, hospitals and their links.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    /// Accepts `kind` or the older `type` key.
    #[serde(alias = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    /// Defaults to CONNECTED_TO when omitted.
    #[serde(default)]
    pub relation: Relation,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl GraphDefinition {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(s)?)
    }

    /// Read a definition, choosing the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("json") => Self::from_json_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Err(CitypulseError::Parse(format!(
                "unsupported graph definition format: {}",
                path.display()
            ))),
        }
    }

    /// Apply every node, then every edge, to `graph`. Re-applying the same
    /// definition is a no-op.
    pub fn apply(&self, graph: &mut KnowledgeGraph) -> Result<()> {
        for node in &self.nodes {
            graph.add_labeled_node(&node.id, node.kind, node.label.as_deref())?;
        }
        for edge in &self.edges {
            let from = resolve_endpoint(graph, &edge.from)?;
            let to = resolve_endpoint(graph, &edge.to)?;
            graph.add_edge(&from, &to, edge.relation, edge.weight)?;
        }
        Ok(())
    }

    pub fn build(&self) -> Result<KnowledgeGraph> {
        let mut graph = KnowledgeGraph::new();
        self.apply(&mut graph)?;
        Ok(graph)
    }
}

// Edge endpoints may name a node by id or by label
fn resolve_endpoint(graph: &KnowledgeGraph, endpoint: &str) -> Result<String> {
    graph
        .resolve(endpoint)
        .ok_or_else(|| CitypulseError::UnknownNode(endpoint.to_string()))
}

/// Load a knowledge graph from a definition file.
pub fn load_graph(path: &Path) -> Result<KnowledgeGraph> {
    let graph = GraphDefinition::from_path(path)?.build()?;
    log::info!(
        "Loaded knowledge graph from {}: {} nodes, {} edges",
        path.display(),
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const GRAPH_JSON: &str = r#"{
        "nodes": [
            {"id": "RD_1", "type": "road", "label": "Main Street"},
            {"id": "INT_4", "kind": "intersection", "label": "Intersection 4"},
            {"id": "HOSP_1", "type": "hospital", "label": "Central Hospital"}
        ],
        "edges": [
            {"from": "RD_1", "to": "INT_4"},
            {"from": "Intersection 4", "to": "Central Hospital", "relation": "LEADS_TO"}
        ]
    }"#;

    #[test]
    fn test_load_json_definition() {
        let graph = GraphDefinition::from_json_str(GRAPH_JSON).unwrap().build().unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edges()[0].relation, Relation::ConnectedTo);
        assert_eq!(graph.edges()[1].to, "HOSP_1");
        assert_eq!(
            graph.find_path("RD_1", "HOSP_1").unwrap().unwrap(),
            vec!["RD_1", "INT_4", "HOSP_1"]
        );
    }

    #[test]
    fn test_load_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("graph.yaml");
        fs::write(
            &path,
            "nodes:\n  - {id: R1, kind: road}\n  - {id: H1, kind: hospital}\nedges:\n  - {from: R1, to: H1, relation: NEAR, weight: 2.5}\n",
        )
        .unwrap();
        let graph = load_graph(&path).unwrap();
        assert!(graph.is_weighted());
        assert_eq!(graph.nearest_hospital("R1").unwrap().as_deref(), Some("H1"));
    }

    #[test]
    fn test_apply_twice_is_noop() {
        let def = GraphDefinition::from_json_str(GRAPH_JSON).unwrap();
        let mut graph = def.build().unwrap();
        def.apply(&mut graph).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_edge_to_unknown_node_fails() {
        let def = GraphDefinition::from_json_str(
            r#"{"nodes": [{"id": "R1", "kind": "road"}], "edges": [{"from": "R1", "to": "R2"}]}"#,
        )
        .unwrap();
        assert!(matches!(def.build(), Err(CitypulseError::UnknownNode(id)) if id == "R2"));
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("graph.csv");
        fs::write(&path, "R1,H1").unwrap();
        assert!(matches!(load_graph(&path), Err(CitypulseError::Parse(_))));
    }

    #[test]
    fn test_bundled_sample_graph() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data").join("graph.json");
        let graph = load_graph(&path).unwrap();
        assert_eq!(graph.node_count(), 9);
        assert!(graph.is_weighted());
        assert_eq!(graph.resolve("Central Hospital").as_deref(), Some("H1"));
        assert_eq!(
            graph.find_path("R1", "H1").unwrap().unwrap(),
            vec!["R1", "I2", "H1"]
        );
        assert_eq!(graph.nearest_hospital("R3").unwrap().as_deref(), Some("H2"));
        assert_eq!(graph.nearest_hospital("R4").unwrap(), None);
    }
}
