//! Reciprocal-rank fusion across index strategies, intent-weighted and consensus-boosted,
//! grounded on `retriever/v3/rrf_normalizer.py`, `retriever/v3/config.py` (the k/β/q₀/
//! max_factor constants) and `retriever/fusion/engine.py` (priority_score) (SPEC_FULL.md
//! §4.K).

use std::collections::HashMap;

use crate::chunk::{Chunk, ChunkId};
use crate::retrieval::intent::Intent;
use crate::retrieval::orchestrator::MultiIndexResult;

/// Fixed strategy order used everywhere a per-strategy array is emitted: vector, lexical,
/// symbol, graph, matching the weight table in SPEC_FULL.md §4.K.
const STRATEGY_COUNT: usize = 4;
const RANK_SENTINEL: f64 = 999_999.0;
const CONSENSUS_BETA: f64 = 0.3;
const CONSENSUS_Q0: f64 = 10.0;
const CONSENSUS_MAX_FACTOR: f64 = 1.5;

fn strategy_k(index: usize) -> f64 {
    match index {
        0 | 1 => 70.0, // vector, lexical
        _ => 50.0,     // symbol, graph
    }
}

fn weight_profile(intent: Intent) -> [f64; STRATEGY_COUNT] {
    // [vector, lexical, symbol, graph]
    let raw = match intent {
        Intent::Symbol => [0.2, 0.2, 0.5, 0.1],
        Intent::Flow => [0.2, 0.1, 0.2, 0.5],
        Intent::Concept => [0.7, 0.2, 0.05, 0.05],
        Intent::Code => [0.5, 0.3, 0.1, 0.1],
        Intent::Balanced => [0.4, 0.3, 0.2, 0.1],
    };
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 {
        return raw;
    }
    raw.map(|w| w / sum)
}

fn cutoff_for(intent: Intent) -> usize {
    match intent {
        Intent::Symbol => 20,
        Intent::Flow => 15,
        Intent::Concept => 60,
        Intent::Code => 40,
        Intent::Balanced => 40,
    }
}

/// 18 floats in a fixed field order: rank per strategy (4), RRF per strategy (4), weight
/// per strategy (4), `n`, best rank, avg rank, consensus factor, chunk size, file depth.
/// This is the stable schema a future learning-to-rank model trains against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub rank: [f64; STRATEGY_COUNT],
    pub rrf: [f64; STRATEGY_COUNT],
    pub weight: [f64; STRATEGY_COUNT],
    pub n: f64,
    pub best_rank: f64,
    pub avg_rank: f64,
    pub consensus_factor: f64,
    pub chunk_size: f64,
    pub file_depth: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; 18] {
        let mut out = [0.0; 18];
        out[0..4].copy_from_slice(&self.rank);
        out[4..8].copy_from_slice(&self.rrf);
        out[8..12].copy_from_slice(&self.weight);
        out[12] = self.n;
        out[13] = self.best_rank;
        out[14] = self.avg_rank;
        out[15] = self.consensus_factor;
        out[16] = self.chunk_size;
        out[17] = self.file_depth;
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub chunk_id: ChunkId,
    pub final_score: f64,
    pub priority: f64,
    pub features: FeatureVector,
}

struct PerChunk {
    rank: [Option<usize>; STRATEGY_COUNT],
    raw_score: [Option<f64>; STRATEGY_COUNT],
}

impl PerChunk {
    fn empty() -> Self {
        Self { rank: [None; STRATEGY_COUNT], raw_score: [None; STRATEGY_COUNT] }
    }

    fn n(&self) -> usize {
        self.rank.iter().filter(|r| r.is_some()).count()
    }

    fn best_rank(&self) -> usize {
        self.rank.iter().filter_map(|r| *r).min().unwrap_or(0)
    }

    fn avg_rank(&self) -> f64 {
        let ranks: Vec<usize> = self.rank.iter().filter_map(|r| *r).collect();
        if ranks.is_empty() {
            return 0.0;
        }
        ranks.iter().sum::<usize>() as f64 / ranks.len() as f64
    }
}

/// Fuses the four per-strategy hit lists into one ranked, intent-weighted, consensus-boosted
/// list, truncated to the intent's cutoff. `importance_of`/`chunk_lookup` feed the priority
/// score and feature vector's chunk-size/file-depth fields.
pub fn fuse(
    results: &MultiIndexResult,
    intent: Intent,
    chunk_lookup: &HashMap<ChunkId, &Chunk>,
    importance_of: impl Fn(ChunkId) -> f64,
) -> Vec<FusedHit> {
    let weights = weight_profile(intent);
    let mut by_chunk: HashMap<ChunkId, PerChunk> = HashMap::new();

    let strategy_lists = [&results.vector, &results.lexical, &results.symbol, &results.graph];
    for (strategy_idx, hits) in strategy_lists.iter().enumerate() {
        for (rank, hit) in hits.iter().enumerate() {
            let entry = by_chunk.entry(hit.chunk_id).or_insert_with(PerChunk::empty);
            entry.rank[strategy_idx] = Some(rank);
            entry.raw_score[strategy_idx] = Some(hit.score);
        }
    }

    let mut fused: Vec<FusedHit> = by_chunk
        .into_iter()
        .map(|(chunk_id, per_chunk)| {
            let mut rrf = [0.0; STRATEGY_COUNT];
            let mut rank_feature = [RANK_SENTINEL; STRATEGY_COUNT];
            let mut weighted_sum = 0.0;

            for strategy_idx in 0..STRATEGY_COUNT {
                if let Some(rank) = per_chunk.rank[strategy_idx] {
                    let r = 1.0 / (strategy_k(strategy_idx) + rank as f64);
                    rrf[strategy_idx] = r;
                    rank_feature[strategy_idx] = rank as f64;
                    weighted_sum += weights[strategy_idx] * r;
                }
            }

            let n = per_chunk.n();
            let best_rank = per_chunk.best_rank();
            let avg_rank = per_chunk.avg_rank();

            let consensus_raw = 1.0 + CONSENSUS_BETA * ((n as f64).sqrt() - 1.0);
            let quality = 1.0 / (1.0 + avg_rank / CONSENSUS_Q0);
            let consensus_factor = (consensus_raw * (0.5 + 0.5 * quality)).min(CONSENSUS_MAX_FACTOR);

            let final_score = weighted_sum * consensus_factor;

            let symbol_confidence = per_chunk.raw_score[2].unwrap_or(0.0);
            let repomap_importance = importance_of(chunk_id);
            let priority = 0.55 * final_score + 0.30 * repomap_importance + 0.15 * symbol_confidence;

            let chunk = chunk_lookup.get(&chunk_id);
            let chunk_size = chunk.map(|c| c.content.len() as f64).unwrap_or(0.0);
            let file_depth = chunk.map(|c| c.file_path.split('/').count() as f64).unwrap_or(0.0);

            let features = FeatureVector {
                rank: rank_feature,
                rrf,
                weight: weights,
                n: n as f64,
                best_rank: best_rank as f64,
                avg_rank,
                consensus_factor,
                chunk_size,
                file_depth,
            };

            FusedHit { chunk_id, final_score, priority, features }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.features.n.partial_cmp(&a.features.n).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.features.best_rank.partial_cmp(&b.features.best_rank).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    fused.truncate(cutoff_for(intent));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchHit;
    use crate::types::{NodeId, NodeKind};

    fn chunk_id(n: u32) -> ChunkId {
        ChunkId::from_node(NodeId::compute("repo", NodeKind::Function, "a.py", &format!("fn{n}")))
    }

    #[test]
    fn chunk_found_by_every_strategy_outranks_one_found_by_one() {
        let consensus_chunk = chunk_id(1);
        let lone_chunk = chunk_id(2);

        let mut results = MultiIndexResult::default();
        results.vector = vec![SearchHit { chunk_id: consensus_chunk, score: 0.9 }];
        results.lexical = vec![SearchHit { chunk_id: consensus_chunk, score: 5.0 }];
        results.symbol = vec![SearchHit { chunk_id: consensus_chunk, score: 1.0 }];
        results.graph = vec![SearchHit { chunk_id: lone_chunk, score: 0.5 }];

        let lookup = HashMap::new();
        let fused = fuse(&results, Intent::Balanced, &lookup, |_| 0.0);

        let consensus_pos = fused.iter().position(|f| f.chunk_id == consensus_chunk).unwrap();
        let lone_pos = fused.iter().position(|f| f.chunk_id == lone_chunk).unwrap();
        assert!(consensus_pos < lone_pos);
    }

    #[test]
    fn cutoff_truncates_to_intent_specific_top_k() {
        let mut results = MultiIndexResult::default();
        results.lexical = (0..30).map(|i| SearchHit { chunk_id: chunk_id(i), score: 30.0 - i as f64 }).collect();

        let lookup = HashMap::new();
        let fused = fuse(&results, Intent::Symbol, &lookup, |_| 0.0);
        assert_eq!(fused.len(), 20);
    }

    #[test]
    fn feature_vector_flattens_to_eighteen_floats() {
        let mut results = MultiIndexResult::default();
        results.vector = vec![SearchHit { chunk_id: chunk_id(1), score: 0.8 }];

        let lookup = HashMap::new();
        let fused = fuse(&results, Intent::Concept, &lookup, |_| 0.0);
        assert_eq!(fused[0].features.to_array().len(), 18);
    }

    #[test]
    fn absent_strategy_rank_uses_sentinel() {
        let mut results = MultiIndexResult::default();
        results.symbol = vec![SearchHit { chunk_id: chunk_id(1), score: 1.0 }];

        let lookup = HashMap::new();
        let fused = fuse(&results, Intent::Symbol, &lookup, |_| 0.0);
        let array = fused[0].features.to_array();
        assert_eq!(array[0], RANK_SENTINEL); // vector slot, unused
        assert_eq!(array[2], 0.0); // symbol slot, rank 0
    }
}
