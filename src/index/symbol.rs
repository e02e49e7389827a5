//! Symbol-lookup index: identifier/FQN/kind filtering over the repository's declared
//! symbols, grounded on `symbol/mod.rs`'s `SymbolStore` (SPEC_FULL.md §4.G row 3).

use std::collections::HashMap;
use crate::chunk::{Chunk, ChunkId};
use crate::error::StorageResult;
use crate::symbol::SymbolStore;
use crate::types::{NodeId, NodeKind};

use super::{IndexAdapter, SearchHit};

/// An identifier, FQN, or bare name to look up, optionally narrowed to one `NodeKind`.
#[derive(Debug, Clone)]
pub struct SymbolQuery {
    pub text: String,
    pub kind: Option<NodeKind>,
}

impl SymbolQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: None }
    }

    pub fn of_kind(mut self, kind: NodeKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

pub struct SymbolIndex {
    store: SymbolStore,
    chunks_of: HashMap<NodeId, Vec<ChunkId>>,
}

impl SymbolIndex {
    pub fn new(store: SymbolStore) -> Self {
        Self { store, chunks_of: HashMap::new() }
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

impl IndexAdapter for SymbolIndex {
    type Query = SymbolQuery;

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

    fn search(&self, query: &SymbolQuery, limit: usize) -> StorageResult<Vec<SearchHit>> {
        let mut scored: Vec<(NodeId, f64)> = Vec::new();

        if let Some(symbol) = self.store.resolve_fqn(&query.text) {
            if query.kind.is_none_or(|k| k == symbol.kind) {
                scored.push((symbol.id, 1.0));
            }
        }

        for symbol in self.store.find_by_name(&query.text) {
            if query.kind.is_none_or(|k| k == symbol.kind) && !scored.iter().any(|(id, _)| *id == symbol.id) {
                scored.push((symbol.id, 1.0));
            }
        }

        if scored.is_empty() {
            let needle = query.text.to_lowercase();
            for symbol in self.store.iter() {
                if query.kind.is_some_and(|k| k != symbol.kind) {
                    continue;
                }
                if symbol.fqn.to_lowercase().contains(&needle) || symbol.name.to_lowercase().contains(&needle) {
                    scored.push((symbol.id, 0.6));
                }
            }
        }

        let mut hits: Vec<SearchHit> = scored
            .into_iter()
            .flat_map(|(symbol_id, score)| {
                self.chunks_of.get(&symbol_id).into_iter().flatten().map(move |chunk_id| SearchHit { chunk_id: *chunk_id, score })
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
    use crate::symbol::Symbol;
    use crate::types::{compact_string, FileId, Span};

    fn seeded() -> (SymbolIndex, ChunkId, NodeId) {
        let id = NodeId::compute("repo", NodeKind::Function, "a.py", "pkg.mod.parse");
        let symbol = Symbol::new(id, compact_string("parse"), compact_string("pkg.mod.parse"), NodeKind::Function, FileId::new(1).unwrap(), Span::default());
        let mut store = SymbolStore::new();
        store.insert(symbol);

        let mut index = SymbolIndex::new(store);
        let chunk = Chunk {
            id: ChunkId::from_node(id),
            file_path: "a.py".to_string(),
            start_line: 1,
            end_line: 2,
            symbol_id: Some(id),
            content: "def parse(): ...".to_string(),
            name: "parse".to_string(),
            importance_score: 0.0,
        };
        let chunk_id = chunk.id;
        index.index(&[chunk]).unwrap();
        (index, chunk_id, id)
    }

    #[test]
    fn exact_fqn_match_scores_one() {
        let (index, chunk_id, _) = seeded();
        let hits = index.search(&SymbolQuery::new("pkg.mod.parse"), 10).unwrap();
        assert_eq!(hits, vec![SearchHit { chunk_id, score: 1.0 }]);
    }

    #[test]
    fn bare_name_match_scores_one() {
        let (index, chunk_id, _) = seeded();
        let hits = index.search(&SymbolQuery::new("parse"), 10).unwrap();
        assert_eq!(hits[0].chunk_id, chunk_id);
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn fuzzy_substring_match_scores_below_exact() {
        let (index, chunk_id, _) = seeded();
        let hits = index.search(&SymbolQuery::new("pars"), 10).unwrap();
        assert_eq!(hits[0].chunk_id, chunk_id);
        assert!(hits[0].score < 1.0);
    }

    #[test]
    fn kind_filter_excludes_mismatched_symbols() {
        let (index, _, _) = seeded();
        let hits = index.search(&SymbolQuery::new("parse").of_kind(NodeKind::Class), 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn delete_removes_chunk_from_future_hits() {
        let (mut index, chunk_id, _) = seeded();
        index.delete(&[chunk_id]).unwrap();
        let hits = index.search(&SymbolQuery::new("parse"), 10).unwrap();
        assert!(hits.is_empty());
    }
}
