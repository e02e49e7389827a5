//! Multi-index fan-out: issues the chosen adapters' searches concurrently and isolates
//! per-adapter failures, grounded on `retriever/multi_index/orchestrator.py`
//! (SPEC_FULL.md §4.J). Adapter calls are synchronous in-process work (tantivy/fastembed/
//! petgraph all run on the calling thread), so "concurrent" here means scheduled on
//! `tokio::join!` rather than spawned onto separate OS threads; wrapping each in
//! `spawn_blocking` would need the adapters behind `Arc`, which is an orchestration-layer
//! concern this core leaves to the caller that owns the index lifetimes.

use std::collections::{HashMap, HashSet};

use crate::chunk::ChunkId;
use crate::error::StorageError;
use crate::index::{GraphIndex, IndexAdapter, LexicalIndex, SearchHit, SymbolIndex, VectorIndex};
use crate::retrieval::intent::Intent;
use crate::retrieval::scope::{ScopeResult, ScopeType};
use crate::types::NodeId;
use crate::index::graph::GraphQuery;
use crate::index::symbol::SymbolQuery;
use crate::graph::TraversalDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Lexical,
    Vector,
    Symbol,
    Graph,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexKind::Lexical => "lexical",
            IndexKind::Vector => "vector",
            IndexKind::Symbol => "symbol",
            IndexKind::Graph => "graph",
        };
        write!(f, "{s}")
    }
}

/// Maps a dominant intent to its default index set (SPEC_FULL.md §4.J step 1).
pub fn default_index_set(intent: Intent) -> HashSet<IndexKind> {
    use IndexKind::*;
    match intent {
        Intent::Code | Intent::Concept => [Lexical, Vector].into_iter().collect(),
        Intent::Symbol => [Symbol, Lexical].into_iter().collect(),
        Intent::Flow => [Graph, Symbol].into_iter().collect(),
        Intent::Balanced => [Lexical, Vector].into_iter().collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiIndexResult {
    pub lexical: Vec<SearchHit>,
    pub vector: Vec<SearchHit>,
    pub symbol: Vec<SearchHit>,
    pub graph: Vec<SearchHit>,
    pub errors: HashMap<String, String>,
}

pub struct MultiIndexOrchestrator<'a> {
    pub lexical: Option<&'a LexicalIndex>,
    pub vector: Option<&'a VectorIndex>,
    pub symbol: Option<&'a SymbolIndex>,
    pub graph: Option<&'a GraphIndex>,
}

impl<'a> MultiIndexOrchestrator<'a> {
    pub fn new() -> Self {
        Self { lexical: None, vector: None, symbol: None, graph: None }
    }

    pub fn with_lexical(mut self, index: &'a LexicalIndex) -> Self {
        self.lexical = Some(index);
        self
    }

    pub fn with_vector(mut self, index: &'a VectorIndex) -> Self {
        self.vector = Some(index);
        self
    }

    pub fn with_symbol(mut self, index: &'a SymbolIndex) -> Self {
        self.symbol = Some(index);
        self
    }

    pub fn with_graph(mut self, index: &'a GraphIndex) -> Self {
        self.graph = Some(index);
        self
    }

    /// Runs the chosen indexes (explicit set, or the intent's default) and returns a
    /// result whose four lists are independently populated or empty-with-error.
    pub async fn search(
        &self,
        query: &str,
        intent: Intent,
        graph_seeds: &[NodeId],
        scope: Option<&ScopeResult>,
        explicit: Option<&HashSet<IndexKind>>,
        limit: usize,
    ) -> MultiIndexResult {
        let chosen = explicit.cloned().unwrap_or_else(|| default_index_set(intent));
        let fetch_limit = limit * 2;

        let (lexical, vector, symbol, graph) = tokio::join!(
            self.search_lexical(&chosen, query, fetch_limit),
            self.search_vector(&chosen, query, fetch_limit),
            self.search_symbol(&chosen, query, fetch_limit),
            self.search_graph(&chosen, graph_seeds, fetch_limit),
        );

        let mut errors = HashMap::new();
        let mut result = MultiIndexResult::default();

        apply(&mut result.lexical, &mut errors, "lexical", lexical);
        apply(&mut result.vector, &mut errors, "vector", vector);
        apply(&mut result.symbol, &mut errors, "symbol", symbol);
        apply(&mut result.graph, &mut errors, "graph", graph);
        result.errors = errors;

        if let Some(scope) = scope {
            if scope.scope_type == ScopeType::Focused {
                let allowed: HashSet<ChunkId> = scope.chunk_ids.iter().copied().collect();
                for hits in [&mut result.lexical, &mut result.vector, &mut result.symbol, &mut result.graph] {
                    hits.retain(|h| allowed.is_empty() || allowed.contains(&h.chunk_id));
                }
            }
        }

        for hits in [&mut result.lexical, &mut result.vector, &mut result.symbol, &mut result.graph] {
            hits.truncate(limit);
        }

        result
    }

    async fn search_lexical(&self, chosen: &HashSet<IndexKind>, query: &str, limit: usize) -> Option<Result<Vec<SearchHit>, StorageError>> {
        if !chosen.contains(&IndexKind::Lexical) {
            return None;
        }
        self.lexical.map(|index| index.search(query, limit))
    }

    async fn search_vector(&self, chosen: &HashSet<IndexKind>, query: &str, limit: usize) -> Option<Result<Vec<SearchHit>, StorageError>> {
        if !chosen.contains(&IndexKind::Vector) {
            return None;
        }
        self.vector.map(|index| index.search(query, limit))
    }

    async fn search_symbol(&self, chosen: &HashSet<IndexKind>, query: &str, limit: usize) -> Option<Result<Vec<SearchHit>, StorageError>> {
        if !chosen.contains(&IndexKind::Symbol) {
            return None;
        }
        self.symbol.map(|index| index.search(&SymbolQuery::new(query), limit))
    }

    async fn search_graph(&self, chosen: &HashSet<IndexKind>, seeds: &[NodeId], limit: usize) -> Option<Result<Vec<SearchHit>, StorageError>> {
        if !chosen.contains(&IndexKind::Graph) || seeds.is_empty() {
            return None;
        }
        self.graph.map(|index| index.search(&GraphQuery::new(seeds.to_vec(), TraversalDirection::Reverse, 3), limit))
    }
}

impl Default for MultiIndexOrchestrator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(target: &mut Vec<SearchHit>, errors: &mut HashMap<String, String>, name: &str, outcome: Option<Result<Vec<SearchHit>, StorageError>>) {
    match outcome {
        Some(Ok(hits)) => *target = hits,
        Some(Err(e)) => {
            errors.insert(name.to_string(), e.to_string());
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolStore;
    use crate::graph::DependencyGraph;

    #[test]
    fn default_index_set_maps_symbol_intent() {
        let set = default_index_set(Intent::Symbol);
        assert!(set.contains(&IndexKind::Symbol));
        assert!(set.contains(&IndexKind::Lexical));
    }

    #[test]
    fn default_index_set_maps_flow_intent() {
        let set = default_index_set(Intent::Flow);
        assert!(set.contains(&IndexKind::Graph));
        assert!(set.contains(&IndexKind::Symbol));
    }

    #[tokio::test]
    async fn missing_adapter_is_silently_skipped() {
        let orchestrator = MultiIndexOrchestrator::new();
        let result = orchestrator.search("foo", Intent::Code, &[], None, None, 10).await;
        assert!(result.lexical.is_empty());
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn graph_search_is_skipped_without_seeds() {
        let graph_index = GraphIndex::new(DependencyGraph::new());
        let orchestrator = MultiIndexOrchestrator::new().with_graph(&graph_index);
        let result = orchestrator.search("who calls foo", Intent::Flow, &[], None, None, 10).await;
        assert!(result.graph.is_empty());
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn symbol_search_runs_when_explicitly_requested() {
        let store = SymbolStore::new();
        let symbol_index = SymbolIndex::new(store);
        let orchestrator = MultiIndexOrchestrator::new().with_symbol(&symbol_index);
        let explicit: HashSet<IndexKind> = [IndexKind::Symbol].into_iter().collect();
        let result = orchestrator.search("foo", Intent::Balanced, &[], None, Some(&explicit), 10).await;
        assert!(result.lexical.is_empty());
        assert!(result.symbol.is_empty());
    }
}
