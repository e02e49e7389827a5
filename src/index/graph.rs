//! Runtime-graph index: turns a seed-node traversal into scored chunk hits, grounded on
//! `graph::DependencyGraph::bfs_depths` (SPEC_FULL.md §4.G row 4).

use std::collections::HashMap;

use crate::chunk::{Chunk, ChunkId};
use crate::error::StorageResult;
use crate::graph::{DependencyGraph, TraversalDirection};
use crate::types::NodeId;

use super::{IndexAdapter, SearchHit};

/// One or more seed symbols plus the direction to walk from them: dependencies (what the
/// seeds call/import) or dependents (what calls/imports the seeds).
#[derive(Debug, Clone)]
pub struct GraphQuery {
    pub seeds: Vec<NodeId>,
    pub direction: TraversalDirection,
    pub max_depth: usize,
}

impl GraphQuery {
    pub fn new(seeds: Vec<NodeId>, direction: TraversalDirection, max_depth: usize) -> Self {
        Self { seeds, direction, max_depth }
    }
}

pub struct GraphIndex {
    graph: DependencyGraph,
    chunks_of: HashMap<NodeId, Vec<ChunkId>>,
}

impl GraphIndex {
    pub fn new(graph: DependencyGraph) -> Self {
        Self { graph, chunks_of: HashMap::new() }
    }

    fn link(&mut self, chunk: &Chunk) {
        if let Some(symbol_id) = chunk.symbol_id {
            let ids = self.chunks_of.entry(symbol_id).or_default();
            if !ids.contains(&chunk.id) {
                ids.push(chunk.id);
            }
        }
    }
}

impl IndexAdapter for GraphIndex {
    type Query = GraphQuery;

    fn index(&mut self, chunks: &[Chunk]) -> StorageResult<()> {
        for chunk in chunks {
            self.link(chunk);
        }
        Ok(())
    }

    fn upsert(&mut self, chunks: &[Chunk]) -> StorageResult<()> {
        self.index(chunks)
    }

    fn delete(&mut self, ids: &[ChunkId]) -> StorageResult<()> {
        for bucket in self.chunks_of.values_mut() {
            bucket.retain(|id| !ids.contains(id));
        }
        Ok(())
    }

    /// Proximity score decays as `1 / (1 + hops)`; when a node is reachable from more than
    /// one seed, the closest hop distance wins.
    fn search(&self, query: &GraphQuery, limit: usize) -> StorageResult<Vec<SearchHit>> {
        let mut best_depth: HashMap<NodeId, usize> = HashMap::new();
        for &seed in &query.seeds {
            for (node, depth) in self.graph.bfs_depths(seed, query.direction, query.max_depth) {
                if node == seed {
                    continue;
                }
                best_depth.entry(node).and_modify(|d| *d = (*d).min(depth)).or_insert(depth);
            }
        }

        let mut hits: Vec<SearchHit> = best_depth
            .into_iter()
            .flat_map(|(node, depth)| {
                let score = 1.0 / (1.0 + depth as f64);
                self.chunks_of.get(&node).into_iter().flatten().map(move |chunk_id| SearchHit { chunk_id: *chunk_id, score })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EdgeKind, NodeKind};

    fn id(n: u32) -> NodeId {
        NodeId::compute("repo", NodeKind::Function, "a.py", &format!("fn{n}"))
    }

    fn chunk(symbol_id: NodeId, name: &str) -> Chunk {
        Chunk {
            id: ChunkId::from_node(symbol_id),
            file_path: "a.py".to_string(),
            start_line: 1,
            end_line: 2,
            symbol_id: Some(symbol_id),
            content: format!("def {name}(): ..."),
            name: name.to_string(),
            importance_score: 0.0,
        }
    }

    #[test]
    fn dependents_of_seed_are_found_with_decaying_score() {
        let (a, b, c) = (id(1), id(2), id(3));
        let graph = DependencyGraph::new();
        graph.add_relationship(a, c, EdgeKind::Calls);
        graph.add_relationship(b, a, EdgeKind::Calls);

        let mut index = GraphIndex::new(graph);
        index.index(&[chunk(a, "a"), chunk(b, "b"), chunk(c, "c")]).unwrap();

        let hits = index.search(&GraphQuery::new(vec![c], TraversalDirection::Reverse, 5), 10).unwrap();
        let chunk_ids: Vec<ChunkId> = hits.iter().map(|h| h.chunk_id).collect();
        assert!(chunk_ids.contains(&ChunkId::from_node(a)));
        assert!(chunk_ids.contains(&ChunkId::from_node(b)));
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn seed_itself_is_excluded_from_results() {
        let a = id(1);
        let graph = DependencyGraph::new();
        graph.add_node(a);
        let mut index = GraphIndex::new(graph);
        index.index(&[chunk(a, "a")]).unwrap();

        let hits = index.search(&GraphQuery::new(vec![a], TraversalDirection::Forward, 5), 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn delete_removes_chunk_from_future_hits() {
        let (a, c) = (id(1), id(3));
        let graph = DependencyGraph::new();
        graph.add_relationship(a, c, EdgeKind::Calls);
        let mut index = GraphIndex::new(graph);
        let a_chunk = chunk(a, "a");
        let a_chunk_id = a_chunk.id;
        index.index(&[a_chunk, chunk(c, "c")]).unwrap();
        index.delete(&[a_chunk_id]).unwrap();

        let hits = index.search(&GraphQuery::new(vec![c], TraversalDirection::Reverse, 5), 10).unwrap();
        assert!(hits.is_empty());
    }
}
