//! Route search over the knowledge graph: BFS when unweighted, Dijkstra otherwise.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::error::Result;
use crate::graph::{KnowledgeGraph, NodeId, NodeKind};

/// Weight used for edges without one when the graph is weighted.
const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

/// Resolution at which summed weights compare equal, so 0.1 + 0.2 ties 0.3.
const DISTANCE_RESOLUTION: f64 = 1e-9;

/// Distance rounded to [`DISTANCE_RESOLUTION`] steps for ordering.
fn distance_key(distance: f64) -> i64 {
    (distance / DISTANCE_RESOLUTION).round() as i64
}

/// Dijkstra frontier entry ordered by (distance, path), smallest first.
#[derive(Debug)]
struct Frontier {
    distance: f64,
    path: Vec<NodeId>,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed so BinaryHeap pops the smallest entry
    fn cmp(&self, other: &Self) -> Ordering {
        distance_key(other.distance)
            .cmp(&distance_key(self.distance))
            .then_with(|| other.path.cmp(&self.path))
    }
}

impl KnowledgeGraph {
    /// Shortest path from `source` to `target` as a node sequence, or `None`
    /// if `target` is unreachable.
    ///
    /// Unweighted graphs minimize edge count; weighted graphs minimize total
    /// weight. Equal-length candidates resolve to the lexicographically
    /// smallest node sequence, whatever their hop counts.
    pub fn find_path(&self, source: &str, target: &str) -> Result<Option<Vec<NodeId>>> {
        self.ensure_node(source)?;
        self.ensure_node(target)?;
        let start = std::time::Instant::now();

        let path = if self.is_weighted() {
            self.dijkstra_path(source, target)
        } else {
            self.bfs_path(source, target)
        };

        log::debug!(
            "find_path {} -> {} took {:?} ({})",
            source,
            target,
            start.elapsed(),
            match &path {
                Some(p) => format!("{} hops", p.len().saturating_sub(1)),
                None => "unreachable".to_string(),
            }
        );
        Ok(path)
    }

    /// Closest hospital to `from`, ties broken by smallest node id.
    pub fn nearest_hospital(&self, from: &str) -> Result<Option<NodeId>> {
        self.nearest_of_kind(from, NodeKind::Hospital)
    }

    /// Closest node of `kind` reachable from `from` (the source itself counts).
    pub fn nearest_of_kind(&self, from: &str, kind: NodeKind) -> Result<Option<NodeId>> {
        let distances = self.distances_from(from)?;
        let nearest = distances
            .into_iter()
            .filter(|(id, _)| self.node_kind(id) == Some(kind))
            .min_by(|(a_id, a_dist), (b_id, b_dist)| {
                distance_key(*a_dist)
                    .cmp(&distance_key(*b_dist))
                    .then_with(|| a_id.cmp(b_id))
            })
            .map(|(id, _)| id);
        Ok(nearest)
    }

    /// Distance from `source` to every reachable node under the active metric.
    pub fn distances_from(&self, source: &str) -> Result<HashMap<NodeId, f64>> {
        self.ensure_node(source)?;
        let mut distances = HashMap::new();

        if self.is_weighted() {
            let mut heap = BinaryHeap::new();
            heap.push(Frontier {
                distance: 0.0,
                path: vec![source.to_string()],
            });
            while let Some(Frontier { distance, path }) = heap.pop() {
                let node = match path.last() {
                    Some(n) => n.clone(),
                    None => continue,
                };
                if distances.contains_key(&node) {
                    continue;
                }
                distances.insert(node.clone(), distance);
                for hop in self.hops(&node) {
                    if !distances.contains_key(&hop.to) {
                        heap.push(Frontier {
                            distance: distance + hop.weight.unwrap_or(DEFAULT_EDGE_WEIGHT),
                            path: vec![hop.to.clone()],
                        });
                    }
                }
            }
        } else {
            let mut queue = VecDeque::new();
            distances.insert(source.to_string(), 0.0);
            queue.push_back(source.to_string());
            while let Some(node) = queue.pop_front() {
                let depth = distances.get(&node).copied().unwrap_or(0.0);
                for hop in self.hops(&node) {
                    if !distances.contains_key(&hop.to) {
                        distances.insert(hop.to.clone(), depth + 1.0);
                        queue.push_back(hop.to.clone());
                    }
                }
            }
        }

        Ok(distances)
    }

    /// Neighbors of `node` in ascending id order, deduplicated.
    fn sorted_successors(&self, node: &str) -> Vec<&NodeId> {
        let mut next: Vec<&NodeId> = self.hops(node).iter().map(|hop| &hop.to).collect();
        next.sort();
        next.dedup();
        next
    }

    // Visiting successors in id order makes the first parent found for each
    // node the one on the lexicographically smallest shortest path.
    fn bfs_path(&self, source: &str, target: &str) -> Option<Vec<NodeId>> {
        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        visited.insert(source);
        queue.push_back(source);

        while let Some(node) = queue.pop_front() {
            if node == target {
                let mut path = vec![target.to_string()];
                let mut cursor = target;
                while let Some(parent) = parents.get(cursor) {
                    path.push(parent.to_string());
                    cursor = *parent;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.sorted_successors(node) {
                if visited.insert(next.as_str()) {
                    parents.insert(next.as_str(), node);
                    queue.push_back(next.as_str());
                }
            }
        }
        None
    }

    fn dijkstra_path(&self, source: &str, target: &str) -> Option<Vec<NodeId>> {
        let mut settled: HashSet<NodeId> = HashSet::new();
        let mut heap = BinaryHeap::new();
        heap.push(Frontier {
            distance: 0.0,
            path: vec![source.to_string()],
        });

        while let Some(Frontier { distance, path }) = heap.pop() {
            let node = path.last()?.clone();
            if node == target {
                return Some(path);
            }
            if !settled.insert(node.clone()) {
                continue;
            }
            for hop in self.hops(&node) {
                if settled.contains(&hop.to) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(hop.to.clone());
                heap.push(Frontier {
                    distance: distance + hop.weight.unwrap_or(DEFAULT_EDGE_WEIGHT),
                    path: next_path,
                });
            }
        }
        None
    }
}
