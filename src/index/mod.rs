//! Index adapters (SPEC_FULL.md §4.G): four ports behind one shape — `index`/`upsert`/
//! `delete`/`search` — so the retrieval core never touches a physical store directly.

pub mod graph;
pub mod lexical;
pub mod symbol;
pub mod vector;

pub use graph::GraphIndex;
pub use lexical::LexicalIndex;
pub use symbol::{SymbolIndex, SymbolQuery};
pub use vector::VectorIndex;

use crate::chunk::{Chunk, ChunkId};
use crate::error::StorageResult;

/// One scored hit from any index, normalized enough for the fusion engine (§4.K) to
/// compare across strategies by rank rather than raw score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub score: f64,
}

/// The common shape every index adapter implements. `Query` varies per index (token
/// string, natural-language text, identifier/FQN, or seed-id graph traversal) per the
/// table in SPEC_FULL.md §4.G.
pub trait IndexAdapter {
    type Query: ?Sized;

    fn index(&mut self, chunks: &[Chunk]) -> StorageResult<()>;
    fn upsert(&mut self, chunks: &[Chunk]) -> StorageResult<()>;
    fn delete(&mut self, ids: &[ChunkId]) -> StorageResult<()>;
    fn search(&self, query: &Self::Query, limit: usize) -> StorageResult<Vec<SearchHit>>;
}
