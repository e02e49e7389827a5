//! Semantic (embedding) index over chunk text, grounded on the teacher's
//! `SimpleSemanticSearch` (SPEC_FULL.md §4.G row 2).

use std::collections::HashMap;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::chunk::{Chunk, ChunkId};
use crate::error::StorageError;

use super::{IndexAdapter, SearchHit};

pub struct VectorIndex {
    embeddings: HashMap<ChunkId, Vec<f32>>,
    model: Mutex<TextEmbedding>,
    dimensions: usize,
}

impl VectorIndex {
    pub fn new() -> Result<Self, StorageError> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2)
    }

    pub fn with_model(model: EmbeddingModel) -> Result<Self, StorageError> {
        let mut text_model = TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
            .map_err(|e| StorageError::Embedding(e.to_string()))?;

        let probe = text_model
            .embed(vec!["probe"], None)
            .map_err(|e| StorageError::Embedding(e.to_string()))?;
        let dimensions = probe.into_iter().next().unwrap_or_default().len();

        Ok(Self { embeddings: HashMap::new(), model: Mutex::new(text_model), dimensions })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        let mut embeddings = self
            .model
            .lock()
            .unwrap()
            .embed(vec![text], None)
            .map_err(|e| StorageError::Embedding(e.to_string()))?;
        let embedding = embeddings.pop().ok_or_else(|| StorageError::Embedding("model returned no vector".into()))?;
        if embedding.len() != self.dimensions {
            return Err(StorageError::Embedding(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    pub fn embedding_count(&self) -> usize {
        self.embeddings.len()
    }
}

impl IndexAdapter for VectorIndex {
    type Query = str;

    fn index(&mut self, chunks: &[Chunk]) -> Result<(), StorageError> {
        for chunk in chunks {
            let text = format!("{}\n{}", chunk.name, chunk.content);
            let embedding = self.embed_one(&text)?;
            self.embeddings.insert(chunk.id, embedding);
        }
        Ok(())
    }

    fn upsert(&mut self, chunks: &[Chunk]) -> Result<(), StorageError> {
        self.index(chunks)
    }

    fn delete(&mut self, ids: &[ChunkId]) -> Result<(), StorageError> {
        for id in ids {
            self.embeddings.remove(id);
        }
        Ok(())
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StorageError> {
        if self.embeddings.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self.embed_one(query)?;

        let mut hits: Vec<SearchHit> = self
            .embeddings
            .iter()
            .map(|(id, embedding)| SearchHit { chunk_id: *id, score: cosine_similarity(&query_embedding, embedding) as f64 })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }
    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_zero_vector_is_zero_not_nan() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    // `VectorIndex::new` downloads real ONNX model weights on first use, matching the
    // teacher's `SimpleSemanticSearch::new`; exercising `index`/`search` end to end needs
    // that network access and is left to the integration suite rather than unit tests.
}
