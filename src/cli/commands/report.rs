//! Serializable views over the retrieval core's result types, matching the record
//! schema the CLI's `--json` flag and the MCP server's tool output both promise:
//! `{intent, scope, hits, context, metadata}`. The core types themselves stay
//! `Serialize`-free since they're an internal ranking representation, not a wire format.

use serde::Serialize;

use crate::chunk::{Chunk, ChunkId};
use crate::engine::{QueryMetadata, QueryResult, ScopeSummary};
use crate::retrieval::{ContextResult, FusedHit, IntentProbability};

#[derive(Debug, Serialize)]
pub struct QueryReport {
    pub intent: IntentReport,
    pub scope: ScopeSummary,
    pub hits: Vec<HitReport>,
    pub context: ContextReport,
    pub metadata: QueryMetadata,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub errors: std::collections::HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct IntentReport {
    pub dominant: String,
    pub dominant_probability: f64,
    pub symbol: f64,
    pub flow: f64,
    pub concept: f64,
    pub code: f64,
    pub balanced: f64,
}

impl From<&IntentProbability> for IntentReport {
    fn from(p: &IntentProbability) -> Self {
        let dominant = p.dominant();
        Self {
            dominant: dominant.to_string(),
            dominant_probability: p.of(dominant),
            symbol: p.symbol,
            flow: p.flow,
            concept: p.concept,
            code: p.code,
            balanced: p.balanced,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HitReport {
    pub chunk_id: ChunkId,
    pub file_path: String,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    pub final_score: f64,
    pub consensus_factor: f64,
}

impl HitReport {
    fn from_hit(hit: &FusedHit, chunk: Option<&Chunk>) -> Self {
        Self {
            chunk_id: hit.chunk_id,
            file_path: chunk.map(|c| c.file_path.clone()).unwrap_or_default(),
            name: chunk.map(|c| c.name.clone()).unwrap_or_default(),
            start_line: chunk.map(|c| c.start_line).unwrap_or(0),
            end_line: chunk.map(|c| c.end_line).unwrap_or(0),
            final_score: hit.final_score,
            consensus_factor: hit.features.consensus_factor,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContextReport {
    pub chunks: Vec<PackedChunkReport>,
    pub total_tokens: usize,
    pub token_budget: usize,
    pub utilization: f64,
}

#[derive(Debug, Serialize)]
pub struct PackedChunkReport {
    pub chunk_id: ChunkId,
    pub text: String,
    pub final_tokens: usize,
    pub is_trimmed: bool,
}

impl From<&ContextResult> for ContextReport {
    fn from(context: &ContextResult) -> Self {
        Self {
            chunks: context
                .chunks
                .iter()
                .map(|c| PackedChunkReport {
                    chunk_id: c.chunk_id,
                    text: c.text.clone(),
                    final_tokens: c.final_tokens,
                    is_trimmed: c.is_trimmed,
                })
                .collect(),
            total_tokens: context.total_tokens,
            token_budget: context.token_budget,
            utilization: context.utilization,
        }
    }
}

/// `chunk_of` resolves each hit's `ChunkId` back to its source chunk (file path, name,
/// line range) via [`crate::engine::RetrievalEngine::chunk`].
pub fn build_query_report<'a>(result: &QueryResult, chunk_of: impl Fn(ChunkId) -> Option<&'a Chunk>) -> QueryReport {
    QueryReport {
        intent: IntentReport::from(&result.intent),
        scope: result.scope.clone(),
        hits: result.hits.iter().map(|h| HitReport::from_hit(h, chunk_of(h.chunk_id))).collect(),
        context: ContextReport::from(&result.context),
        metadata: result.metadata.clone(),
        errors: result.errors.clone(),
    }
}
