//! Chunking: derives retrievable units from the structural IR for the four index
//! adapters to consume (SPEC_FULL.md §4.G). One chunk per top-level declaration, plus
//! auxiliary chunks when a function's body is too long to search as a single unit.

use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;
use crate::ir::IrSnapshot;
use crate::types::{NodeId, NodeKind, Span};

/// Chunks are split on a line-count threshold rather than true statement boundaries;
/// tree-sitter gives us each declaration's span but not a lightweight way to bisect a
/// function body at statement granularity without re-walking its subtree, so this is a
/// deliberate simplification over SPEC_FULL.md §4.G's "split on statement boundaries".
const MAX_CHUNK_LINES: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(NodeId);

impl ChunkId {
    pub fn from_node(id: NodeId) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chunk:{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub symbol_id: Option<NodeId>,
    pub content: String,
    pub name: String,
    pub importance_score: f64,
}

pub struct ChunkBuilder;

impl ChunkBuilder {
    /// Build one chunk per top-level class/function declaration in `snapshot`, splitting
    /// overlong function bodies into fixed-size auxiliary chunks, and score each chunk's
    /// `importance_score` from call-graph in-degree (SPEC_FULL.md §9, decision 3).
    ///
    /// `source_by_file` supplies each file's text so chunk content can be sliced out of
    /// a node's byte span; files without source (deleted since parse) are skipped.
    pub fn build(
        snapshot: &IrSnapshot,
        source_by_file: &std::collections::HashMap<String, String>,
        graph: &DependencyGraph,
    ) -> Vec<Chunk> {
        let importance = graph.normalized_in_degrees();
        let mut chunks = Vec::new();

        for node in snapshot.nodes.values() {
            if node.is_external() {
                continue;
            }
            if !matches!(node.kind, NodeKind::Class | NodeKind::Function | NodeKind::Interface | NodeKind::Enum) {
                continue;
            }
            let Some(source) = source_by_file.get(node.file_path.as_ref()) else {
                continue;
            };
            let score = importance.get(&node.id).copied().unwrap_or(0.0);
            chunks.extend(split_into_chunks(node.id, node.file_path.as_ref(), &node.name, node.span, source, score));
        }

        chunks
    }
}

fn split_into_chunks(symbol_id: NodeId, file_path: &str, name: &str, span: Span, source: &str, score: f64) -> Vec<Chunk> {
    let start = span.start_byte as usize;
    let end = (span.end_byte as usize).min(source.len());
    if start >= end {
        return Vec::new();
    }
    let content = &source[start..end];
    let total_lines = span.end_line.saturating_sub(span.start_line) + 1;

    if total_lines <= MAX_CHUNK_LINES {
        return vec![Chunk {
            id: ChunkId::from_node(symbol_id),
            file_path: file_path.to_string(),
            start_line: span.start_line,
            end_line: span.end_line,
            symbol_id: Some(symbol_id),
            content: content.to_string(),
            name: name.to_string(),
            importance_score: score,
        }];
    }

    let lines: Vec<&str> = content.lines().collect();
    let mut chunks = Vec::new();
    for (part, group) in lines.chunks(MAX_CHUNK_LINES as usize).enumerate() {
        let chunk_start = span.start_line + (part as u32 * MAX_CHUNK_LINES);
        let chunk_end = chunk_start + group.len() as u32 - 1;
        let aux_id = NodeId::compute("chunk", NodeKind::Function, file_path, &format!("{name}#part{part}"));
        chunks.push(Chunk {
            id: ChunkId::from_node(aux_id),
            file_path: file_path.to_string(),
            start_line: chunk_start,
            end_line: chunk_end,
            symbol_id: Some(symbol_id),
            content: group.join("\n"),
            name: format!("{name}#part{part}"),
            importance_score: score,
        });
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Node;
    use std::collections::HashMap;

    #[test]
    fn short_declaration_produces_one_chunk() {
        let mut snapshot = IrSnapshot::new();
        let source = "def foo():\n    return 1\n";
        let span = Span::new(0, 0, 1, 12, 0, source.len() as u32);
        let node = Node::new("repo", NodeKind::Function, "a.py", "a.foo", "foo", span);
        let id = node.id;
        snapshot.insert_node(node);

        let mut files = HashMap::new();
        files.insert("a.py".to_string(), source.to_string());

        let graph = DependencyGraph::new();
        let chunks = ChunkBuilder::build(&snapshot, &files, &graph);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol_id, Some(id));
        assert!(chunks[0].content.contains("return 1"));
    }

    #[test]
    fn overlong_function_splits_into_multiple_chunks() {
        let mut snapshot = IrSnapshot::new();
        let body: String = (0..300).map(|i| format!("    x{i} = {i}\n")).collect();
        let source = format!("def foo():\n{body}");
        let span = Span::new(0, 0, 301, 0, 0, source.len() as u32);
        let node = Node::new("repo", NodeKind::Function, "a.py", "a.foo", "foo", span);
        snapshot.insert_node(node);

        let mut files = HashMap::new();
        files.insert("a.py".to_string(), source);

        let graph = DependencyGraph::new();
        let chunks = ChunkBuilder::build(&snapshot, &files, &graph);

        assert!(chunks.len() > 1);
    }

    #[test]
    fn importance_score_reflects_call_graph_in_degree() {
        let mut snapshot = IrSnapshot::new();
        let source = "def foo():\n    pass\n";
        let span = Span::new(0, 0, 1, 8, 0, source.len() as u32);
        let node = Node::new("repo", NodeKind::Function, "a.py", "a.foo", "foo", span);
        let id = node.id;
        snapshot.insert_node(node);

        let mut files = HashMap::new();
        files.insert("a.py".to_string(), source.to_string());

        let graph = DependencyGraph::new();
        let caller = NodeId::compute("repo", NodeKind::Function, "b.py", "b.bar");
        graph.add_relationship(caller, id, crate::types::EdgeKind::Calls);

        let chunks = ChunkBuilder::build(&snapshot, &files, &graph);
        assert_eq!(chunks[0].importance_score, 1.0);
    }
}
