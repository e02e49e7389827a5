//! Packs a fused, ranked chunk list into a token-budgeted context: dedup overlapping
//! chunks, batch-fetch text, pack greedily with a last-resort trim, grounded on
//! `retriever/context_builder/{dedup,trimming,builder}.py` (SPEC_FULL.md §4.L).

use std::collections::HashMap;

use crate::chunk::{Chunk, ChunkId};
use crate::retrieval::fusion::FusedHit;

const OVERLAP_THRESHOLD: f64 = 0.5;
const OVERLAP_PENALTY: f64 = 0.5;
const DROP_ON_FULL_OVERLAP: bool = true;
const STOP_AT_FRACTION: f64 = 0.95;
const MAX_TRIMMED_BODY_LINES: usize = 5;

/// Counts tokens for a chunk of text; the default `len(text)/4` approximation can be
/// swapped for a real tokenizer-backed implementation.
pub trait TokenCounter {
    fn count(&self, text: &str) -> usize;
}

pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackedChunk {
    pub chunk_id: ChunkId,
    pub text: String,
    pub original_tokens: usize,
    pub final_tokens: usize,
    pub is_trimmed: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextResult {
    pub chunks: Vec<PackedChunk>,
    pub total_tokens: usize,
    pub token_budget: usize,
    pub utilization: f64,
}

pub struct ContextBuilder<'a> {
    counter: Box<dyn TokenCounter + 'a>,
}

impl Default for ContextBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ContextBuilder<'a> {
    pub fn new() -> Self {
        Self { counter: Box::new(ApproxTokenCounter) }
    }

    pub fn with_counter(counter: impl TokenCounter + 'a) -> Self {
        Self { counter: Box::new(counter) }
    }

    pub fn build(&self, hits: &[FusedHit], chunk_lookup: &HashMap<ChunkId, &Chunk>, token_budget: usize) -> ContextResult {
        let deduped = dedup_overlaps(hits, chunk_lookup);
        let packed = self.pack(deduped, chunk_lookup, token_budget);
        let total_tokens: usize = packed.iter().map(|c| c.final_tokens).sum();
        let utilization = if token_budget == 0 { 0.0 } else { total_tokens as f64 / token_budget as f64 };
        ContextResult { chunks: packed, total_tokens, token_budget, utilization }
    }

    fn pack(&self, ordered: Vec<(ChunkId, f64)>, chunk_lookup: &HashMap<ChunkId, &Chunk>, token_budget: usize) -> Vec<PackedChunk> {
        let mut packed = Vec::new();
        let mut used = 0usize;
        let stop_at = (token_budget as f64 * STOP_AT_FRACTION) as usize;

        for (chunk_id, _priority) in ordered {
            if used >= stop_at {
                break;
            }
            let Some(chunk) = chunk_lookup.get(&chunk_id) else {
                continue;
            };
            let original_tokens = self.counter.count(&chunk.content);
            let remaining = token_budget.saturating_sub(used);

            if original_tokens <= remaining {
                used += original_tokens;
                packed.push(PackedChunk {
                    chunk_id,
                    text: chunk.content.clone(),
                    original_tokens,
                    final_tokens: original_tokens,
                    is_trimmed: false,
                    reason: "no_trim".to_string(),
                });
                continue;
            }

            if let Some((trimmed, reason)) = trim_chunk(&chunk.content, &chunk.file_path) {
                let trimmed_tokens = self.counter.count(&trimmed);
                if trimmed_tokens <= remaining {
                    used += trimmed_tokens;
                    packed.push(PackedChunk {
                        chunk_id,
                        text: trimmed,
                        original_tokens,
                        final_tokens: trimmed_tokens,
                        is_trimmed: true,
                        reason: reason.to_string(),
                    });
                }
            }
        }

        packed
    }
}

fn signature_pattern(file_path: &str) -> &'static [&'static str] {
    if file_path.ends_with(".py") {
        &["def ", "async def ", "class "]
    } else if file_path.ends_with(".rs") {
        &["fn ", "struct ", "impl ", "trait ", "enum "]
    } else if file_path.ends_with(".ts") || file_path.ends_with(".js") || file_path.ends_with(".tsx") || file_path.ends_with(".jsx") {
        &["function ", "class ", "const ", "export "]
    } else {
        &[]
    }
}

fn is_signature_start(line: &str, keywords: &[&str]) -> bool {
    let trimmed = line.trim_start();
    keywords.iter().any(|kw| trimmed.starts_with(kw))
}

fn signature_continues(line: &str) -> bool {
    let trimmed = line.trim_end();
    !(trimmed.ends_with(':') || trimmed.ends_with(") {") || trimmed.ends_with('{') || trimmed.ends_with(';'))
}

fn is_docstring_start(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("\"\"\"") || trimmed.starts_with("'''") || trimmed.starts_with("///") || trimmed.starts_with("/**")
}

/// Keeps the declaration signature, an immediately-following docstring block, and up to
/// `MAX_TRIMMED_BODY_LINES` body lines, ending in a marker comment.
fn trim_chunk(content: &str, file_path: &str) -> Option<(String, &'static str)> {
    let keywords = signature_pattern(file_path);
    if keywords.is_empty() {
        return None;
    }

    let lines: Vec<&str> = content.lines().collect();
    let sig_start = lines.iter().position(|l| is_signature_start(l, keywords))?;

    let mut cursor = sig_start;
    let mut kept: Vec<&str> = vec![lines[cursor]];
    while signature_continues(lines[cursor]) && cursor + 1 < lines.len() {
        cursor += 1;
        kept.push(lines[cursor]);
    }

    let mut has_docstring = false;
    if cursor + 1 < lines.len() && is_docstring_start(lines[cursor + 1]) {
        has_docstring = true;
        cursor += 1;
        let opener = lines[cursor].trim_start();
        let triple = opener.starts_with("\"\"\"") || opener.starts_with("'''");
        kept.push(lines[cursor]);
        if triple && opener.matches("\"\"\"").count() < 2 && opener.matches("'''").count() < 2 {
            while cursor + 1 < lines.len() {
                cursor += 1;
                kept.push(lines[cursor]);
                if lines[cursor].contains("\"\"\"") || lines[cursor].contains("'''") {
                    break;
                }
            }
        } else if !triple {
            while cursor + 1 < lines.len() && !lines[cursor].contains("*/") {
                cursor += 1;
                kept.push(lines[cursor]);
            }
        }
    }

    let body_start = cursor + 1;
    let body_end = (body_start + MAX_TRIMMED_BODY_LINES).min(lines.len());
    kept.extend(&lines[body_start..body_end]);
    kept.push("// ... trimmed for context budget");

    let reason = if has_docstring && body_end > body_start {
        "trimmed:signature+docstring+partial_body"
    } else {
        "trimmed:signature+docstring"
    };
    Some((kept.join("\n"), reason))
}

/// Groups hits by file, walks in priority order, drops fully-overlapping chunks, and
/// halves the priority of chunks with substantial (but not full) overlap.
fn dedup_overlaps(hits: &[FusedHit], chunk_lookup: &HashMap<ChunkId, &Chunk>) -> Vec<(ChunkId, f64)> {
    let mut accepted_ranges: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
    let mut candidates: Vec<(ChunkId, f64)> = Vec::new();

    let mut by_priority: Vec<&FusedHit> = hits.iter().collect();
    by_priority.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(std::cmp::Ordering::Equal));

    for hit in by_priority {
        let Some(chunk) = chunk_lookup.get(&hit.chunk_id) else {
            continue;
        };
        let ranges = accepted_ranges.entry(chunk.file_path.clone()).or_default();
        let overlap = max_overlap_fraction(chunk, ranges);

        if overlap >= 1.0 && DROP_ON_FULL_OVERLAP {
            continue;
        }

        let mut priority = hit.priority;
        if overlap >= OVERLAP_THRESHOLD {
            priority *= OVERLAP_PENALTY;
        }

        ranges.push((chunk.start_line, chunk.end_line));
        candidates.push((hit.chunk_id, priority));
    }

    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

fn max_overlap_fraction(chunk: &Chunk, accepted: &[(u32, u32)]) -> f64 {
    let own_len = (chunk.end_line.saturating_sub(chunk.start_line) + 1) as f64;
    if own_len <= 0.0 {
        return 0.0;
    }
    accepted
        .iter()
        .map(|&(start, end)| {
            let overlap_start = chunk.start_line.max(start);
            let overlap_end = chunk.end_line.min(end);
            if overlap_end < overlap_start {
                0.0
            } else {
                (overlap_end - overlap_start + 1) as f64 / own_len
            }
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::fusion::FeatureVector;
    use crate::types::{NodeId, NodeKind};

    fn feature_vector() -> FeatureVector {
        FeatureVector {
            rank: [0.0; 4],
            rrf: [0.0; 4],
            weight: [0.0; 4],
            n: 1.0,
            best_rank: 0.0,
            avg_rank: 0.0,
            consensus_factor: 1.0,
            chunk_size: 0.0,
            file_depth: 0.0,
        }
    }

    fn hit(chunk_id: ChunkId, priority: f64) -> FusedHit {
        FusedHit { chunk_id, final_score: priority, priority, features: feature_vector() }
    }

    fn chunk(id_seed: &str, file_path: &str, start: u32, end: u32, content: &str) -> Chunk {
        let id = NodeId::compute("repo", NodeKind::Function, file_path, id_seed);
        Chunk {
            id: ChunkId::from_node(id),
            file_path: file_path.to_string(),
            start_line: start,
            end_line: end,
            symbol_id: Some(id),
            content: content.to_string(),
            name: id_seed.to_string(),
            importance_score: 0.0,
        }
    }

    #[test]
    fn fully_overlapping_chunk_is_dropped() {
        let a = chunk("a", "f.py", 1, 20, "def a(): pass");
        let b = chunk("b", "f.py", 5, 10, "def b(): pass");
        let hits = vec![hit(a.id, 1.0), hit(b.id, 0.9)];
        let lookup: HashMap<ChunkId, &Chunk> = [(a.id, &a), (b.id, &b)].into_iter().collect();

        let result = ContextBuilder::new().build(&hits, &lookup, 10_000);
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].chunk_id, a.id);
    }

    #[test]
    fn partial_overlap_halves_priority_but_keeps_both() {
        let a = chunk("a", "f.py", 1, 10, "def a(): pass");
        let b = chunk("b", "f.py", 6, 16, "def b(): pass");
        let hits = vec![hit(a.id, 1.0), hit(b.id, 0.9)];
        let lookup: HashMap<ChunkId, &Chunk> = [(a.id, &a), (b.id, &b)].into_iter().collect();

        let result = ContextBuilder::new().build(&hits, &lookup, 10_000);
        assert_eq!(result.chunks.len(), 2);
    }

    #[test]
    fn oversized_python_chunk_is_trimmed_to_signature_and_body() {
        let body: String = (0..50).map(|i| format!("    x{i} = {i}\n")).collect();
        let content = format!("def big():\n    \"\"\"docstring\"\"\"\n{body}");
        let c = chunk("big", "f.py", 1, 52, &content);
        let hits = vec![hit(c.id, 1.0)];
        let lookup: HashMap<ChunkId, &Chunk> = [(c.id, &c)].into_iter().collect();

        let result = ContextBuilder::new().build(&hits, &lookup, 30);
        assert_eq!(result.chunks.len(), 1);
        assert!(result.chunks[0].is_trimmed);
        assert!(result.chunks[0].text.contains("def big"));
        assert!(result.chunks[0].text.contains("trimmed for context budget"));
    }

    #[test]
    fn stop_condition_respects_ninety_five_percent_budget() {
        let a = chunk("a", "f.py", 1, 2, &"x".repeat(400));
        let b = chunk("b", "g.py", 1, 2, &"y".repeat(400));
        let hits = vec![hit(a.id, 1.0), hit(b.id, 0.9)];
        let lookup: HashMap<ChunkId, &Chunk> = [(a.id, &a), (b.id, &b)].into_iter().collect();

        let result = ContextBuilder::new().build(&hits, &lookup, 50);
        assert_eq!(result.chunks.len(), 0);
    }
}
