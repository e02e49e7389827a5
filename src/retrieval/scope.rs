//! Scope selection: narrows a query to a subset of the repository using intent hints and
//! call-graph importance, grounded on `retriever/scope/selector.py`'s `ScopeSelector`
//! (SPEC_FULL.md §4.I). The RepoMap port the original reads freshness/importance from is
//! this crate's own `IrSnapshot` + `graph::DependencyGraph`, so no external validator is
//! needed; freshness is passed in by the caller, which owns the snapshot's age.

use std::collections::HashSet;

use crate::chunk::{Chunk, ChunkId};
use crate::graph::DependencyGraph;
use crate::ir::IrSnapshot;
use crate::retrieval::intent::{Intent, IntentHints};
use crate::types::{NodeId, NodeKind};

pub const DEFAULT_TOP_K: usize = 20;
pub const EXPANDED_NODE_CAP: usize = 100;
pub const MAX_CHUNK_IDS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeType {
    FullRepo,
    Focused,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeResult {
    pub scope_type: ScopeType,
    pub focus_nodes: Vec<NodeId>,
    pub chunk_ids: Vec<ChunkId>,
    pub reason: String,
}

impl ScopeResult {
    fn full_repo(reason: impl Into<String>) -> Self {
        Self { scope_type: ScopeType::FullRepo, focus_nodes: Vec::new(), chunk_ids: Vec::new(), reason: reason.into() }
    }
}

pub struct ScopeSelector {
    default_top_k: usize,
    expanded_node_cap: usize,
    max_chunk_ids: usize,
}

impl Default for ScopeSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeSelector {
    pub fn new() -> Self {
        Self { default_top_k: DEFAULT_TOP_K, expanded_node_cap: EXPANDED_NODE_CAP, max_chunk_ids: MAX_CHUNK_IDS }
    }

    pub fn select(
        &self,
        snapshot: &IrSnapshot,
        chunks: &[Chunk],
        graph: &DependencyGraph,
        intent: Intent,
        hints: &IntentHints,
        snapshot_is_fresh: bool,
    ) -> ScopeResult {
        if !snapshot_is_fresh {
            return ScopeResult::full_repo("repomap_stale");
        }

        let importance = graph.normalized_in_degrees();
        let focus = self.select_focus_nodes(snapshot, &importance, intent, hints);
        if focus.is_empty() {
            return ScopeResult::full_repo("no_focus_nodes");
        }

        let chunk_ids = self.chunk_scope(chunks, &focus, &importance);
        ScopeResult { scope_type: ScopeType::Focused, focus_nodes: focus, chunk_ids, reason: format!("intent_{intent}") }
    }

    fn select_focus_nodes(
        &self,
        snapshot: &IrSnapshot,
        importance: &std::collections::HashMap<NodeId, f64>,
        intent: Intent,
        hints: &IntentHints,
    ) -> Vec<NodeId> {
        let mut focus: Vec<NodeId> = Vec::new();

        if !hints.symbol_names.is_empty() {
            for symbol_name in &hints.symbol_names {
                for node in snapshot.nodes.values() {
                    if node.is_external() {
                        continue;
                    }
                    if node.name.as_ref() == symbol_name || node.fqn.contains(symbol_name.as_str()) {
                        focus.push(node.id);
                    }
                }
            }
        } else if !hints.file_paths.is_empty() {
            for path in &hints.file_paths {
                for node in snapshot.nodes.values() {
                    if !node.is_external() && node.file_path.ends_with(path.as_str()) {
                        focus.push(node.id);
                    }
                }
            }
        } else if !hints.module_paths.is_empty() {
            for module_path in &hints.module_paths {
                for node in snapshot.nodes.values() {
                    if node.is_external() || node.kind != NodeKind::Module {
                        continue;
                    }
                    if node.file_path.contains(module_path.as_str()) || node.fqn.contains(module_path.as_str()) {
                        focus.push(node.id);
                    }
                }
            }
        }

        if focus.is_empty() {
            focus = self.top_k_by_importance(snapshot, importance, intent);
        }

        let expanded = self.expand_with_subtrees(snapshot, &focus);
        self.cap_by_importance(expanded, importance, self.expanded_node_cap)
    }

    fn top_k_by_importance(&self, snapshot: &IrSnapshot, importance: &std::collections::HashMap<NodeId, f64>, _intent: Intent) -> Vec<NodeId> {
        let mut candidates: Vec<NodeId> = snapshot.nodes.values().filter(|n| !n.is_external()).map(|n| n.id).collect();
        candidates.sort_by(|a, b| {
            let score_a = importance.get(a).copied().unwrap_or(0.0);
            let score_b = importance.get(b).copied().unwrap_or(0.0);
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.default_top_k);
        candidates
    }

    fn expand_with_subtrees(&self, snapshot: &IrSnapshot, focus: &[NodeId]) -> Vec<NodeId> {
        let mut expanded: HashSet<NodeId> = HashSet::new();
        for &id in focus {
            let mut stack = vec![id];
            while let Some(current) = stack.pop() {
                if expanded.insert(current) {
                    stack.extend(snapshot.children_of(current).iter().copied());
                }
            }
        }
        expanded.into_iter().collect()
    }

    fn cap_by_importance(&self, mut nodes: Vec<NodeId>, importance: &std::collections::HashMap<NodeId, f64>, cap: usize) -> Vec<NodeId> {
        if nodes.len() <= cap {
            return nodes;
        }
        nodes.sort_by(|a, b| {
            let score_a = importance.get(a).copied().unwrap_or(0.0);
            let score_b = importance.get(b).copied().unwrap_or(0.0);
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        nodes.truncate(cap);
        nodes
    }

    fn chunk_scope(&self, chunks: &[Chunk], focus: &[NodeId], importance: &std::collections::HashMap<NodeId, f64>) -> Vec<ChunkId> {
        let focus_set: HashSet<NodeId> = focus.iter().copied().collect();
        let mut in_scope: Vec<&Chunk> = chunks.iter().filter(|c| c.symbol_id.is_some_and(|id| focus_set.contains(&id))).collect();

        if in_scope.len() > self.max_chunk_ids {
            in_scope.sort_by(|a, b| {
                let score_a = a.symbol_id.and_then(|id| importance.get(&id)).copied().unwrap_or(0.0);
                let score_b = b.symbol_id.and_then(|id| importance.get(&id)).copied().unwrap_or(0.0);
                score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
            });
            in_scope.truncate(self.max_chunk_ids);
        }

        in_scope.into_iter().map(|c| c.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Node;
    use crate::types::{EdgeKind, Span};

    fn chunk_for(symbol_id: NodeId, name: &str) -> Chunk {
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
    fn stale_snapshot_forces_full_repo_scope() {
        let snapshot = IrSnapshot::new();
        let graph = DependencyGraph::new();
        let hints = IntentHints::default();
        let result = ScopeSelector::new().select(&snapshot, &[], &graph, Intent::Balanced, &hints, false);
        assert_eq!(result.scope_type, ScopeType::FullRepo);
        assert_eq!(result.reason, "repomap_stale");
    }

    #[test]
    fn symbol_hint_focuses_on_matching_node_and_its_subtree() {
        let mut snapshot = IrSnapshot::new();
        let class_node = Node::new("repo", NodeKind::Class, "a.py", "a.LoginHandler", "LoginHandler", Span::default());
        let class_id = snapshot.insert_node(class_node);
        let method_node = Node::new("repo", NodeKind::Method, "a.py", "a.LoginHandler.handle", "handle", Span::default()).with_parent(class_id);
        let method_id = snapshot.insert_node(method_node);

        let graph = DependencyGraph::new();
        let chunks = vec![chunk_for(class_id, "LoginHandler"), chunk_for(method_id, "handle")];
        let hints = IntentHints { symbol_names: vec!["LoginHandler".to_string()], ..Default::default() };

        let result = ScopeSelector::new().select(&snapshot, &chunks, &graph, Intent::Symbol, &hints, true);
        assert_eq!(result.scope_type, ScopeType::Focused);
        assert!(result.focus_nodes.contains(&class_id));
        assert!(result.focus_nodes.contains(&method_id));
        assert_eq!(result.chunk_ids.len(), 2);
    }

    #[test]
    fn no_hints_falls_back_to_top_k_by_importance() {
        let mut snapshot = IrSnapshot::new();
        let a = snapshot.insert_node(Node::new("repo", NodeKind::Function, "a.py", "a.foo", "foo", Span::default()));
        let b = snapshot.insert_node(Node::new("repo", NodeKind::Function, "a.py", "a.bar", "bar", Span::default()));

        let graph = DependencyGraph::new();
        graph.add_relationship(b, a, EdgeKind::Calls);
        let chunks = vec![chunk_for(a, "foo"), chunk_for(b, "bar")];
        let hints = IntentHints::default();

        let result = ScopeSelector::new().select(&snapshot, &chunks, &graph, Intent::Code, &hints, true);
        assert_eq!(result.scope_type, ScopeType::Focused);
        assert!(result.focus_nodes.contains(&a));
    }

    #[test]
    fn empty_snapshot_yields_full_repo_via_no_focus_nodes() {
        let snapshot = IrSnapshot::new();
        let graph = DependencyGraph::new();
        let hints = IntentHints::default();
        let result = ScopeSelector::new().select(&snapshot, &[], &graph, Intent::Balanced, &hints, true);
        assert_eq!(result.scope_type, ScopeType::FullRepo);
        assert_eq!(result.reason, "no_focus_nodes");
    }
}
