//! Append-only graph storage with adjacency lists and the shared RW wrapper.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{CitypulseError, Result};
use crate::graph::{GraphEdge, GraphNode, NodeId, NodeKind, Relation};

/// One traversable hop out of a node.
#[derive(Debug, Clone)]
pub(super) struct Hop {
    pub to: NodeId,
    pub weight: Option<f64>,
}

/// Identity of an edge for idempotent inserts; symmetric relations use
/// ordered endpoints so `A-B` and `B-A` are the same edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeKey {
    a: NodeId,
    b: NodeId,
    relation: Relation,
}

impl EdgeKey {
    fn new(from: &str, to: &str, relation: Relation) -> Self {
        let (a, b) = if !relation.is_directional() && to < from {
            (to, from)
        } else {
            (from, to)
        };
        Self {
            a: a.to_string(),
            b: b.to_string(),
            relation,
        }
    }
}

/// Labeled multigraph of city locations. Nodes and edges are never removed.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<NodeId, GraphNode>,
    labels: HashMap<String, NodeId>,
    edges: Vec<GraphEdge>,
    edge_keys: HashMap<EdgeKey, Option<f64>>,
    adjacency: HashMap<NodeId, Vec<Hop>>,
    weighted: bool,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Returns `true` if it was inserted, `false` if an identical
    /// node already existed.
    pub fn add_node(&mut self, id: &str, kind: NodeKind) -> Result<bool> {
        self.add_labeled_node(id, kind, None)
    }

    /// Add a node with an optional human-readable label.
    pub fn add_labeled_node(&mut self, id: &str, kind: NodeKind, label: Option<&str>) -> Result<bool> {
        let id = id.trim();
        if id.is_empty() {
            return Err(CitypulseError::InvalidArgument(
                "node id must not be empty".to_string(),
            ));
        }

        if let Some((existing_kind, has_label)) =
            self.nodes.get(id).map(|n| (n.kind, n.label.is_some()))
        {
            if existing_kind != kind {
                return Err(CitypulseError::InvalidArgument(format!(
                    "node {} already exists as {}, cannot re-add as {}",
                    id, existing_kind, kind
                )));
            }
            // A re-add may attach a label the first insert lacked
            match label {
                Some(label) if !has_label => {
                    self.register_label(id, label)?;
                    if let Some(node) = self.nodes.get_mut(id) {
                        node.label = Some(label.to_string());
                    }
                    return Ok(true);
                }
                _ => return Ok(false),
            }
        }

        if let Some(label) = label {
            self.register_label(id, label)?;
        }
        self.nodes.insert(
            id.to_string(),
            GraphNode {
                id: id.to_string(),
                kind,
                label: label.map(str::to_string),
            },
        );
        log::debug!("graph: added {} node {}", kind, id);
        Ok(true)
    }

    fn register_label(&mut self, id: &str, label: &str) -> Result<()> {
        match self.labels.get(label) {
            Some(owner) if owner != id => Err(CitypulseError::InvalidArgument(format!(
                "label '{}' already names node {}",
                label, owner
            ))),
            _ => {
                self.labels.insert(label.to_string(), id.to_string());
                Ok(())
            }
        }
    }

    /// Add an edge between two existing nodes. Returns `true` if inserted,
    /// `false` if the same edge was already present.
    pub fn add_edge(
        &mut self,
        from: &str,
        to: &str,
        relation: Relation,
        weight: Option<f64>,
    ) -> Result<bool> {
        for id in [from, to] {
            if !self.nodes.contains_key(id) {
                return Err(CitypulseError::UnknownNode(id.to_string()));
            }
        }
        if let Some(w) = weight {
            if !w.is_finite() || w < 0.0 {
                return Err(CitypulseError::InvalidArgument(format!(
                    "edge {} -{}-> {} has invalid weight {}",
                    from, relation, to, w
                )));
            }
        }

        let key = EdgeKey::new(from, to, relation);
        if let Some(existing) = self.edge_keys.get(&key) {
            if *existing == weight {
                return Ok(false);
            }
            return Err(CitypulseError::InvalidArgument(format!(
                "edge {} -{}-> {} already exists with weight {:?}",
                from, relation, to, existing
            )));
        }
        self.edge_keys.insert(key, weight);

        self.adjacency.entry(from.to_string()).or_default().push(Hop {
            to: to.to_string(),
            weight,
        });
        if !relation.is_directional() && from != to {
            self.adjacency.entry(to.to_string()).or_default().push(Hop {
                to: from.to_string(),
                weight,
            });
        }
        if weight.is_some() {
            self.weighted = true;
        }
        self.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            relation,
            weight,
        });
        log::debug!("graph: added edge {} -{}-> {}", from, relation, to);
        Ok(true)
    }

    /// All nodes one traversable edge away from `id`.
    pub fn neighbors(&self, id: &str) -> Result<BTreeSet<NodeId>> {
        self.ensure_node(id)?;
        Ok(self
            .hops(id)
            .iter()
            .map(|hop| hop.to.clone())
            .collect())
    }

    pub(super) fn hops(&self, id: &str) -> &[Hop] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(super) fn ensure_node(&self, id: &str) -> Result<&GraphNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| CitypulseError::UnknownNode(id.to_string()))
    }

    /// Whether any edge carries a weight (switches searches to Dijkstra).
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn node_kind(&self, id: &str) -> Option<NodeKind> {
        self.nodes.get(id).map(|n| n.kind)
    }

    /// Ids of all nodes of `kind`, sorted.
    pub fn nodes_by_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.kind == kind)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Resolve a node id or a node label to a node id.
    pub fn resolve(&self, id_or_label: &str) -> Option<NodeId> {
        if self.nodes.contains_key(id_or_label) {
            return Some(id_or_label.to_string());
        }
        self.labels.get(id_or_label).cloned()
    }

    /// Label of a node, falling back to its id.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.nodes
            .get(id)
            .and_then(|n| n.label.as_deref())
            .unwrap_or(id)
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// True if some edge connects `a` and `b` in the traversable direction.
    pub fn has_hop(&self, a: &str, b: &str) -> bool {
        self.hops(a).iter().any(|hop| hop.to == b)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Knowledge graph shared across concurrent ticks: writes are serialized,
/// reads run in parallel.
#[derive(Debug, Default)]
pub struct SharedGraph {
    inner: RwLock<KnowledgeGraph>,
}

impl SharedGraph {
    pub fn new(graph: KnowledgeGraph) -> Self {
        Self {
            inner: RwLock::new(graph),
        }
    }

    // Writers never leave the graph half-updated (every insert validates
    // before mutating), so a poisoned lock still guards a consistent graph.
    fn read_guard(&self) -> RwLockReadGuard<'_, KnowledgeGraph> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, KnowledgeGraph> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a read-only closure against the graph.
    pub fn read<R>(&self, f: impl FnOnce(&KnowledgeGraph) -> R) -> R {
        f(&self.read_guard())
    }

    pub fn add_node(&self, id: &str, kind: NodeKind) -> Result<bool> {
        self.write_guard().add_node(id, kind)
    }

    pub fn add_labeled_node(&self, id: &str, kind: NodeKind, label: Option<&str>) -> Result<bool> {
        self.write_guard().add_labeled_node(id, kind, label)
    }

    pub fn add_edge(
        &self,
        from: &str,
        to: &str,
        relation: Relation,
        weight: Option<f64>,
    ) -> Result<bool> {
        self.write_guard().add_edge(from, to, relation, weight)
    }

    pub fn neighbors(&self, id: &str) -> Result<BTreeSet<NodeId>> {
        self.read_guard().neighbors(id)
    }

    pub fn find_path(&self, source: &str, target: &str) -> Result<Option<Vec<NodeId>>> {
        self.read_guard().find_path(source, target)
    }

    pub fn nearest_hospital(&self, from: &str) -> Result<Option<NodeId>> {
        self.read_guard().nearest_hospital(from)
    }

    pub fn resolve(&self, id_or_label: &str) -> Option<NodeId> {
        self.read_guard().resolve(id_or_label)
    }

    pub fn node_count(&self) -> usize {
        self.read_guard().node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.read_guard().edge_count()
    }
}
