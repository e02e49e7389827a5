//! Call/import/inheritance graph over `NodeId`s: BFS impact and reverse-caller queries,
//! path finding, and in-degree (SPEC_FULL.md §4.F). Built from the IR's edge list once
//! the cross-file resolver has retargeted external placeholders onto real declarations.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::ir::IrSnapshot;
use crate::types::{EdgeKind, NodeId};

/// Which way `DependencyGraph::bfs_depths` follows edges from the seed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    /// Outgoing edges: what the seed depends on.
    Forward,
    /// Incoming edges: what depends on the seed.
    Reverse,
}

/// Thread-safe wrapper around a `petgraph::DiGraph` keyed by `NodeId`, mirroring the
/// teacher's `DependencyGraph` (`storage/graph.rs`) but over content-addressed ids
/// instead of dense `SymbolId`s.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: RwLock<DiGraph<NodeId, EdgeKind>>,
    node_map: RwLock<HashMap<NodeId, NodeIndex>>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(DiGraph::new()),
            node_map: RwLock::new(HashMap::new()),
        }
    }

    /// Build a graph from every edge in `snapshot` whose kind participates in the call
    /// graph (Calls, Imports, Inherits, Overrides, Reads, Writes); `Contains` edges are
    /// structural, not dependency, and are excluded.
    pub fn from_snapshot(snapshot: &IrSnapshot) -> Self {
        let graph = Self::new();
        for edge in &snapshot.edges {
            if edge.kind == EdgeKind::Contains {
                continue;
            }
            graph.add_relationship(edge.source, edge.target, edge.kind);
        }
        graph
    }

    pub fn add_node(&self, id: NodeId) -> NodeIndex {
        let mut graph = self.graph.write().unwrap();
        let mut node_map = self.node_map.write().unwrap();
        if let Some(&idx) = node_map.get(&id) {
            idx
        } else {
            let idx = graph.add_node(id);
            node_map.insert(id, idx);
            idx
        }
    }

    pub fn add_relationship(&self, from: NodeId, to: NodeId, kind: EdgeKind) {
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        self.graph.write().unwrap().add_edge(from_idx, to_idx, kind);
    }

    pub fn dependencies(&self, id: NodeId, kind: EdgeKind) -> Vec<NodeId> {
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        let Some(&idx) = node_map.get(&id) else { return Vec::new() };
        graph
            .edges(idx)
            .filter(|e| *e.weight() == kind)
            .filter_map(|e| graph.node_weight(e.target()).copied())
            .collect()
    }

    pub fn dependents(&self, id: NodeId, kind: EdgeKind) -> Vec<NodeId> {
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        let Some(&idx) = node_map.get(&id) else { return Vec::new() };
        graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| *e.weight() == kind)
            .filter_map(|e| graph.node_weight(e.source()).copied())
            .collect()
    }

    /// Forward BFS from `id` following outgoing edges, bounded by `max_depth`. Level 0
    /// is `[id]` itself.
    pub fn traverse_bfs(&self, id: NodeId, max_depth: usize) -> Vec<Vec<NodeId>> {
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        let mut levels = Vec::new();
        let Some(&start) = node_map.get(&id) else { return levels };

        let mut current = vec![start];
        let mut visited = HashSet::new();
        visited.insert(start);

        while !current.is_empty() && levels.len() < max_depth {
            let mut level_ids = Vec::new();
            let mut next = Vec::new();
            for idx in current {
                if let Some(&nid) = graph.node_weight(idx) {
                    level_ids.push(nid);
                    for edge in graph.edges(idx) {
                        if visited.insert(edge.target()) {
                            next.push(edge.target());
                        }
                    }
                }
            }
            if !level_ids.is_empty() {
                levels.push(level_ids);
            }
            current = next;
        }
        levels
    }

    /// Reverse BFS from `id`: everything that transitively depends on it, up to
    /// `max_depth` hops, used for "what breaks if I change this" impact queries.
    pub fn impact_radius(&self, id: NodeId, max_depth: usize) -> Vec<NodeId> {
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        let mut impacted = Vec::new();
        let Some(&start) = node_map.get(&id) else { return impacted };

        let mut current = vec![start];
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut depth = 0;

        while !current.is_empty() && depth < max_depth {
            let mut next = Vec::new();
            for idx in current {
                for edge in graph.edges_directed(idx, Direction::Incoming) {
                    if visited.insert(edge.source()) {
                        next.push(edge.source());
                        if let Some(&nid) = graph.node_weight(edge.source()) {
                            impacted.push(nid);
                        }
                    }
                }
            }
            current = next;
            depth += 1;
        }
        impacted
    }

    /// All simple paths from `from` to `to` (cycle-safe DFS).
    pub fn find_paths(&self, from: NodeId, to: NodeId) -> Vec<Vec<NodeId>> {
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        let (Some(&from_idx), Some(&to_idx)) = (node_map.get(&from), node_map.get(&to)) else {
            return Vec::new();
        };

        let mut paths = Vec::new();
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        self.dfs_paths(&graph, from_idx, to_idx, &mut path, &mut visited, &mut paths);
        paths
    }

    #[allow(clippy::only_used_in_recursion)]
    fn dfs_paths(
        &self,
        graph: &DiGraph<NodeId, EdgeKind>,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeId>,
        visited: &mut HashSet<NodeIndex>,
        all_paths: &mut Vec<Vec<NodeId>>,
    ) {
        let Some(&id) = graph.node_weight(current) else { return };
        path.push(id);
        if current == target {
            all_paths.push(path.clone());
            path.pop();
            return;
        }
        visited.insert(current);
        for edge in graph.edges(current) {
            if !visited.contains(&edge.target()) {
                self.dfs_paths(graph, edge.target(), target, path, visited, all_paths);
            }
        }
        visited.remove(&current);
        path.pop();
    }

    /// Hop distance from `id` to every reachable node, up to `max_depth`, following edges
    /// in `direction`. Used by the graph index adapter (SPEC_FULL.md §4.G row 4) to turn a
    /// seed-id traversal into a per-node proximity score.
    pub fn bfs_depths(&self, id: NodeId, direction: TraversalDirection, max_depth: usize) -> HashMap<NodeId, usize> {
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        let mut depths = HashMap::new();
        let Some(&start) = node_map.get(&id) else { return depths };
        depths.insert(id, 0);

        let mut current = vec![start];
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut depth = 0;

        while !current.is_empty() && depth < max_depth {
            depth += 1;
            let mut next = Vec::new();
            for idx in current {
                let neighbors: Vec<NodeIndex> = match direction {
                    TraversalDirection::Forward => graph.edges(idx).map(|e| e.target()).collect(),
                    TraversalDirection::Reverse => graph.edges_directed(idx, Direction::Incoming).map(|e| e.source()).collect(),
                };
                for neighbor in neighbors {
                    if visited.insert(neighbor) {
                        if let Some(&nid) = graph.node_weight(neighbor) {
                            depths.insert(nid, depth);
                        }
                        next.push(neighbor);
                    }
                }
            }
            current = next;
        }
        depths
    }

    /// Raw in-degree across all edge kinds, the basis for `repomap_importance`
    /// (SPEC_FULL.md §9, decision 3).
    pub fn in_degree(&self, id: NodeId) -> usize {
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        node_map
            .get(&id)
            .map(|&idx| graph.edges_directed(idx, Direction::Incoming).count())
            .unwrap_or(0)
    }

    /// Min-max normalized in-degree for every node with at least one inbound edge,
    /// used directly as `repomap_importance` in [0, 1].
    pub fn normalized_in_degrees(&self) -> HashMap<NodeId, f64> {
        let graph = self.graph.read().unwrap();
        let node_map = self.node_map.read().unwrap();
        let degrees: HashMap<NodeId, usize> = node_map
            .iter()
            .map(|(&id, &idx)| (id, graph.edges_directed(idx, Direction::Incoming).count()))
            .collect();
        let max = degrees.values().copied().max().unwrap_or(0);
        if max == 0 {
            return degrees.keys().map(|&id| (id, 0.0)).collect();
        }
        degrees.into_iter().map(|(id, d)| (id, d as f64 / max as f64)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKind;

    fn id(n: u32) -> NodeId {
        NodeId::compute("repo", NodeKind::Function, "a.py", &format!("fn{n}"))
    }

    #[test]
    fn add_node_is_idempotent() {
        let graph = DependencyGraph::new();
        let a = id(1);
        assert_eq!(graph.add_node(a), graph.add_node(a));
    }

    #[test]
    fn dependents_filters_by_edge_kind() {
        let graph = DependencyGraph::new();
        let (a, b, c) = (id(1), id(2), id(3));
        graph.add_relationship(a, c, EdgeKind::Calls);
        graph.add_relationship(b, c, EdgeKind::Calls);
        let callers = graph.dependents(c, EdgeKind::Calls);
        assert_eq!(callers.len(), 2);
        assert!(callers.contains(&a) && callers.contains(&b));
    }

    #[test]
    fn traverse_bfs_respects_depth_bound() {
        let graph = DependencyGraph::new();
        let (a, b, c, d) = (id(1), id(2), id(3), id(4));
        graph.add_relationship(a, b, EdgeKind::Calls);
        graph.add_relationship(b, c, EdgeKind::Calls);
        graph.add_relationship(b, d, EdgeKind::Calls);
        let levels = graph.traverse_bfs(a, 3);
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec![a]);
        assert_eq!(levels[2].len(), 2);
    }

    #[test]
    fn find_paths_returns_every_simple_path() {
        let graph = DependencyGraph::new();
        let (a, b, c, d) = (id(1), id(2), id(3), id(4));
        graph.add_relationship(a, b, EdgeKind::Calls);
        graph.add_relationship(a, c, EdgeKind::Calls);
        graph.add_relationship(b, d, EdgeKind::Calls);
        graph.add_relationship(c, d, EdgeKind::Calls);
        let paths = graph.find_paths(a, d);
        assert_eq!(paths.len(), 2);
        for path in paths {
            assert_eq!(path.first(), Some(&a));
            assert_eq!(path.last(), Some(&d));
        }
    }

    #[test]
    fn impact_radius_follows_incoming_edges_transitively() {
        let graph = DependencyGraph::new();
        let (a, b, c) = (id(1), id(2), id(3));
        graph.add_relationship(a, b, EdgeKind::Calls);
        graph.add_relationship(b, c, EdgeKind::Calls);
        let impact = graph.impact_radius(c, 5);
        assert!(impact.contains(&a) && impact.contains(&b));
    }

    #[test]
    fn bfs_depths_reports_hop_distance_per_direction() {
        let graph = DependencyGraph::new();
        let (a, b, c) = (id(1), id(2), id(3));
        graph.add_relationship(a, b, EdgeKind::Calls);
        graph.add_relationship(b, c, EdgeKind::Calls);

        let forward = graph.bfs_depths(a, TraversalDirection::Forward, 5);
        assert_eq!(forward[&a], 0);
        assert_eq!(forward[&b], 1);
        assert_eq!(forward[&c], 2);

        let reverse = graph.bfs_depths(c, TraversalDirection::Reverse, 5);
        assert_eq!(reverse[&b], 1);
        assert_eq!(reverse[&a], 2);
    }

    #[test]
    fn normalized_in_degree_scales_to_unit_interval() {
        let graph = DependencyGraph::new();
        let (a, b, c) = (id(1), id(2), id(3));
        graph.add_relationship(a, c, EdgeKind::Calls);
        graph.add_relationship(b, c, EdgeKind::Calls);
        let scores = graph.normalized_in_degrees();
        assert_eq!(scores[&c], 1.0);
        assert_eq!(scores[&a], 0.0);
    }
}
