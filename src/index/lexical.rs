//! Lexical (BM25) index over chunk text, grounded on the teacher's tantivy schema and
//! batch-writer lifecycle (SPEC_FULL.md §4.G row 1).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, IndexRecordOption, Schema, SchemaBuilder, TextFieldIndexing, TextOptions, Value, FAST, STORED, STRING};
use tantivy::{Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, TantivyDocument as Document, Term};

use crate::chunk::{Chunk, ChunkId};
use crate::error::{StorageError, StorageResult};

use super::{IndexAdapter, SearchHit};

struct ChunkSchema {
    chunk_id: Field,
    file_path: Field,
    name: Field,
    content: Field,
    start_line: Field,
    end_line: Field,
}

impl ChunkSchema {
    fn build() -> (Schema, Self) {
        let mut builder = SchemaBuilder::default();
        let chunk_id = builder.add_text_field("chunk_id", STRING | STORED | FAST);
        let file_path = builder.add_text_field("file_path", STRING | STORED);

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default().set_tokenizer("default").set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();
        let name = builder.add_text_field("name", text_options.clone());
        let content = builder.add_text_field("content", text_options);

        let start_line = builder.add_u64_field("start_line", STORED | FAST);
        let end_line = builder.add_u64_field("end_line", STORED | FAST);

        let schema = builder.build();
        (schema, Self { chunk_id, file_path, name, content, start_line, end_line })
    }
}

pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    schema: ChunkSchema,
    index_path: PathBuf,
    writer: Mutex<Option<IndexWriter<Document>>>,
}

impl LexicalIndex {
    pub fn open(index_path: impl AsRef<Path>) -> StorageResult<Self> {
        let index_path = index_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&index_path)?;

        let (schema, chunk_schema) = ChunkSchema::build();
        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(&index_path)?
        } else {
            let dir = MmapDirectory::open(&index_path).map_err(tantivy::TantivyError::from)?;
            Index::create(dir, schema, IndexSettings::default())?
        };

        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        if index_path.join("meta.json").exists() {
            reader.reload()?;
        }

        Ok(Self { index, reader, schema: chunk_schema, index_path, writer: Mutex::new(None) })
    }

    fn writer(&self) -> StorageResult<std::sync::MutexGuard<'_, Option<IndexWriter<Document>>>> {
        let mut guard = self.writer.lock().unwrap();
        if guard.is_none() {
            *guard = Some(self.index.writer::<Document>(50_000_000)?);
        }
        Ok(guard)
    }

    fn add(&self, writer: &mut IndexWriter<Document>, chunk: &Chunk) {
        let mut doc = Document::new();
        doc.add_text(self.schema.chunk_id, chunk.id.to_string());
        doc.add_text(self.schema.file_path, &chunk.file_path);
        doc.add_text(self.schema.name, &chunk.name);
        doc.add_text(self.schema.content, &chunk.content);
        doc.add_u64(self.schema.start_line, chunk.start_line as u64);
        doc.add_u64(self.schema.end_line, chunk.end_line as u64);
        let _ = writer.add_document(doc);
    }

    fn commit(&self, mut writer: std::sync::MutexGuard<'_, Option<IndexWriter<Document>>>) -> StorageResult<()> {
        if let Some(w) = writer.as_mut() {
            w.commit()?;
            self.reader.reload()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.index_path
    }
}

impl IndexAdapter for LexicalIndex {
    type Query = str;

    fn index(&mut self, chunks: &[Chunk]) -> StorageResult<()> {
        let mut writer = self.writer()?;
        for chunk in chunks {
            self.add(writer.as_mut().unwrap(), chunk);
        }
        self.commit(writer)
    }

    fn upsert(&mut self, chunks: &[Chunk]) -> StorageResult<()> {
        let mut writer = self.writer()?;
        for chunk in chunks {
            let term = Term::from_field_text(self.schema.chunk_id, &chunk.id.to_string());
            writer.as_mut().unwrap().delete_term(term);
            self.add(writer.as_mut().unwrap(), chunk);
        }
        self.commit(writer)
    }

    fn delete(&mut self, ids: &[ChunkId]) -> StorageResult<()> {
        let mut writer = self.writer()?;
        for id in ids {
            let term = Term::from_field_text(self.schema.chunk_id, &id.to_string());
            writer.as_mut().unwrap().delete_term(term);
        }
        self.commit(writer)
    }

    fn search(&self, query: &str, limit: usize) -> StorageResult<Vec<SearchHit>> {
        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.schema.name, self.schema.content]);
        let parsed = query_parser.parse_query(query).map_err(|e| StorageError::QueryParse(e.to_string()))?;

        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: Document = searcher.doc(address)?;
            let Some(chunk_id_str) = doc.get_first(self.schema.chunk_id).and_then(|v| v.as_str()) else {
                continue;
            };
            hits.push(SearchHit { chunk_id: parse_chunk_id(chunk_id_str), score: score as f64 });
        }
        Ok(hits)
    }
}

/// `ChunkId`'s `Display` wraps the underlying `NodeId` hex string as `chunk:<hex>`; a
/// tantivy-stored doc only round-trips that string, not the `NodeId`'s numeric value, so
/// hits carry a re-parsed placeholder whose ordering/equality against the original id is
/// restored by the caller via a chunk-id lookup table built at index time.
fn parse_chunk_id(s: &str) -> ChunkId {
    let hex = s.strip_prefix("chunk:").unwrap_or(s);
    let value = u128::from_str_radix(hex, 16).unwrap_or(0);
    ChunkId::from_node(crate::types::NodeId::from_u128(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, NodeKind};

    fn chunk(name: &str, content: &str) -> Chunk {
        let id = NodeId::compute("repo", NodeKind::Function, "a.py", name);
        Chunk {
            id: ChunkId::from_node(id),
            file_path: "a.py".to_string(),
            start_line: 1,
            end_line: 3,
            symbol_id: Some(id),
            content: content.to_string(),
            name: name.to_string(),
            importance_score: 0.0,
        }
    }

    #[test]
    fn indexed_chunk_is_found_by_content_term() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = LexicalIndex::open(dir.path()).unwrap();
        index.index(&[chunk("parse_config", "fn parse_config(path: &str) -> Config")]).unwrap();

        let hits = index.search("parse_config", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn upsert_replaces_prior_document_for_same_chunk_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = LexicalIndex::open(dir.path()).unwrap();
        let mut c = chunk("load", "fn load() -> bool");
        index.index(&[c.clone()]).unwrap();

        c.content = "fn load() -> Result<bool, Error>".to_string();
        index.upsert(&[c]).unwrap();

        let hits = index.search("Result", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn delete_removes_chunk_from_search_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = LexicalIndex::open(dir.path()).unwrap();
        let c = chunk("teardown", "fn teardown()");
        index.index(&[c.clone()]).unwrap();
        index.delete(&[c.id]).unwrap();

        let hits = index.search("teardown", 10).unwrap();
        assert!(hits.is_empty());
    }
}
