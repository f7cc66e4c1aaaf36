//! Road knowledge graph: locations, labeled relations and spatial queries.
//!
//! The graph is a labeled multigraph of roads, intersections and hospitals.
//! It only grows during a run; queries find routes and the nearest hospital
//! for the traffic-light stage.

mod index;
mod loader;
mod traversal;

pub use index::{KnowledgeGraph, SharedGraph};
pub use loader::{load_graph, EdgeDefinition, GraphDefinition, NodeDefinition};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CitypulseError;

/// Node identifier, e.g. `RD_1`, `INT_4`, `HOSP_1`.
pub type NodeId = String;

/// Kind of location a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Road,
    Intersection,
    Hospital,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Road => "road",
            NodeKind::Intersection => "intersection",
            NodeKind::Hospital => "hospital",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = CitypulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "road" => Ok(NodeKind::Road),
            "intersection" => Ok(NodeKind::Intersection),
            "hospital" => Ok(NodeKind::Hospital),
            other => Err(CitypulseError::InvalidArgument(format!(
                "unknown node kind '{}'",
                other
            ))),
        }
    }
}

/// Relation carried by an edge.
///
/// `CONNECTED_TO` and `NEAR` are symmetric; `LEADS_TO` only goes from → to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    #[default]
    ConnectedTo,
    Near,
    LeadsTo,
}

impl Relation {
    pub fn is_directional(&self) -> bool {
        matches!(self, Relation::LeadsTo)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::ConnectedTo => "CONNECTED_TO",
            Relation::Near => "NEAR",
            Relation::LeadsTo => "LEADS_TO",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = CitypulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONNECTED_TO" => Ok(Relation::ConnectedTo),
            "NEAR" => Ok(Relation::Near),
            "LEADS_TO" => Ok(Relation::LeadsTo),
            other => Err(CitypulseError::InvalidArgument(format!(
                "unknown relation '{}'",
                other
            ))),
        }
    }
}

/// A location in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Human-readable name, e.g. "Central Hospital".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A labeled edge (from --relation--> to).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}
