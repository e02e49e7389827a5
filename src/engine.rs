//! End-to-end wiring of the retrieval pipeline (SPEC_FULL.md §2's control flow): builds
//! one repository snapshot, then answers queries by running intent classification →
//! scope selection → multi-index fan-out → fusion → context packing. This is the seam
//! the CLI and MCP server both call through, so neither surface re-derives pipeline
//! order or index construction on its own.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use crate::analysis::NarrowingAnalyzer;
use crate::chunk::{Chunk, ChunkBuilder, ChunkId};
use crate::config::Settings;
use crate::error::{RetrievalError, RetrievalResult};
use crate::graph::{DependencyGraph, TraversalDirection};
use crate::index::{GraphIndex, IndexAdapter, LexicalIndex, SearchHit, SymbolIndex, SymbolQuery, VectorIndex};
use crate::ir::{Edge, IrBuilder, IrSnapshot};
use crate::resolver;
use crate::retrieval::{
    fuse, ContextBuilder, ContextResult, FusedHit, IntentClassifier, IntentProbability,
    MultiIndexOrchestrator, RuleBasedClassifier, ScopeResult, ScopeSelector, ScopeType,
};
use crate::symbol::{Symbol, SymbolStore};
use crate::types::{EdgeKind, FileId, Language, NodeId, NodeKind};

/// Summary of a query's scope decision, trimmed down to what callers outside the core
/// need (the full focus-node/chunk-id lists stay internal to the pipeline).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScopeSummary {
    pub scope_type: &'static str,
    pub node_count: usize,
    pub chunk_count: usize,
    pub reason: String,
}

impl From<&ScopeResult> for ScopeSummary {
    fn from(scope: &ScopeResult) -> Self {
        Self {
            scope_type: match scope.scope_type {
                ScopeType::FullRepo => "full_repo",
                ScopeType::Focused => "focused",
            },
            node_count: scope.focus_nodes.len(),
            chunk_count: scope.chunk_ids.len(),
            reason: scope.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueryMetadata {
    pub latency_ms: u64,
}

/// The record schema SPEC_FULL.md §6 promises retrieval callers: `{intent, scope, hits,
/// context, metadata}`, plus the per-adapter `errors` map carried through from the
/// orchestrator so a degraded-but-successful call is still distinguishable from a clean
/// one (§7's "every recovered error is retrievable from the result metadata").
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub intent: IntentProbability,
    pub scope: ScopeSummary,
    pub hits: Vec<FusedHit>,
    pub context: ContextResult,
    pub metadata: QueryMetadata,
    pub errors: HashMap<String, String>,
}

/// A built repository snapshot plus the four live index adapters over it. Constructed
/// once per indexing run; queried many times.
pub struct RetrievalEngine {
    repo_id: String,
    snapshot: IrSnapshot,
    graph: DependencyGraph,
    chunks: Vec<Chunk>,
    lexical: LexicalIndex,
    vector: Option<VectorIndex>,
    symbol: SymbolIndex,
    graph_index: GraphIndex,
    classifier: RuleBasedClassifier,
}

impl RetrievalEngine {
    /// Walks `root`, builds the structural IR, resolves cross-file references, builds
    /// the call graph and chunks, then pushes everything into the four index adapters
    /// (SPEC_FULL.md §2 indexing control flow: A → B → C → D → E → F → G).
    pub fn build(repo_id: impl Into<String>, settings: &Settings, root: &Path) -> RetrievalResult<Self> {
        let repo_id = repo_id.into();

        let ir_builder = IrBuilder::new(&repo_id, &settings.indexing);
        let (mut snapshot, parse_errors) = ir_builder.build(root)?;
        for (path, error) in &parse_errors {
            tracing::warn!(file = %path.display(), %error, "skipping file that failed to parse");
        }

        let (resolve_stats, unresolved) = resolver::resolve(&mut snapshot);
        tracing::info!(
            resolved = resolve_stats.resolved,
            unresolved = resolve_stats.unresolved,
            "cross-file resolution complete"
        );
        for reason in &unresolved {
            tracing::debug!(%reason, "import left unresolved");
        }

        emit_overrides_edges(&mut snapshot);

        let graph = DependencyGraph::from_snapshot(&snapshot);
        let source_by_file = read_sources(root, &snapshot);
        narrow_python_occurrences(&mut snapshot, &source_by_file);
        let chunks = ChunkBuilder::build(&snapshot, &source_by_file, &graph);

        let lexical_path = settings.index_path.join("lexical");
        let mut lexical = LexicalIndex::open(&lexical_path)?;
        lexical.index(&chunks)?;

        let vector = match VectorIndex::new() {
            Ok(mut index) => {
                index.index(&chunks)?;
                Some(index)
            }
            Err(error) => {
                tracing::warn!(%error, "semantic index unavailable, queries fall back to lexical+symbol+graph");
                None
            }
        };

        let mut symbol = SymbolIndex::new(build_symbol_store(&snapshot));
        symbol.index(&chunks)?;

        let mut graph_index = GraphIndex::new(DependencyGraph::from_snapshot(&snapshot));
        graph_index.index(&chunks)?;

        Ok(Self {
            repo_id,
            snapshot,
            graph,
            chunks,
            lexical,
            vector,
            symbol,
            graph_index,
            classifier: RuleBasedClassifier::new(),
        })
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn snapshot(&self) -> &IrSnapshot {
        &self.snapshot
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    /// Runs the full retrieval control flow for one query: classify → select scope →
    /// fan out across indexes → fuse → pack to `token_budget`.
    pub async fn query(&self, query: &str, token_budget: usize) -> RetrievalResult<QueryResult> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        let started = Instant::now();

        let (probabilities, hints) = self.classifier.classify(query);
        let dominant = probabilities.dominant();

        let scope_selector = ScopeSelector::new();
        let scope = scope_selector.select(&self.snapshot, &self.chunks, &self.graph, dominant, &hints, true);

        let graph_seeds: Vec<NodeId> = hints
            .symbol_names
            .iter()
            .flat_map(|name| {
                self.snapshot
                    .nodes
                    .values()
                    .filter(move |node| !node.is_external() && (node.name.as_ref() == name || node.fqn.contains(name.as_str())))
                    .map(|node| node.id)
            })
            .collect();

        let mut orchestrator = MultiIndexOrchestrator::new()
            .with_lexical(&self.lexical)
            .with_symbol(&self.symbol)
            .with_graph(&self.graph_index);
        if let Some(vector) = self.vector.as_ref() {
            orchestrator = orchestrator.with_vector(vector);
        }

        let scope_for_filter = (scope.scope_type == ScopeType::Focused).then_some(&scope);
        let multi_result = orchestrator.search(query, dominant, &graph_seeds, scope_for_filter, None, 40).await;

        let chunk_lookup: HashMap<ChunkId, &Chunk> = self.chunks.iter().map(|c| (c.id, c)).collect();
        let hits = fuse(&multi_result, dominant, &chunk_lookup, |chunk_id| {
            chunk_lookup.get(&chunk_id).map(|c| c.importance_score).unwrap_or(0.0)
        });

        let context_builder = ContextBuilder::new();
        let context = context_builder.build(&hits, &chunk_lookup, token_budget);

        Ok(QueryResult {
            intent: probabilities,
            scope: ScopeSummary::from(&scope),
            hits,
            context,
            metadata: QueryMetadata { latency_ms: started.elapsed().as_millis() as u64 },
            errors: multi_result.errors,
        })
    }

    /// Direct symbol lookup, bypassing fusion: used by the `retrieve symbol`/`callers`/
    /// `calls` CLI and MCP surfaces, which want a literal hit, not a ranked blend.
    pub fn find_symbol(&self, name: &str) -> Vec<SearchHit> {
        self.symbol.search(&SymbolQuery::new(name), 10).unwrap_or_default()
    }

    pub fn callers_of(&self, name: &str) -> Vec<NodeId> {
        self.seed_nodes(name)
            .into_iter()
            .flat_map(|seed| self.graph.bfs_depths(seed, TraversalDirection::Reverse, usize::MAX).into_keys())
            .collect()
    }

    pub fn calls_of(&self, name: &str) -> Vec<NodeId> {
        self.seed_nodes(name)
            .into_iter()
            .flat_map(|seed| self.graph.bfs_depths(seed, TraversalDirection::Forward, 1).into_keys())
            .collect()
    }

    /// The impact radius of changing `name`: every node reachable within `max_depth`
    /// reverse hops (callers, and callers of callers), paired with its hop distance.
    pub fn impact_of(&self, name: &str, max_depth: usize) -> Vec<(NodeId, usize)> {
        self.seed_nodes(name)
            .into_iter()
            .flat_map(|seed| self.graph.bfs_depths(seed, TraversalDirection::Reverse, max_depth).into_iter())
            .collect()
    }

    fn seed_nodes(&self, name: &str) -> Vec<NodeId> {
        self.snapshot
            .nodes
            .values()
            .filter(|node| !node.is_external() && (node.name.as_ref() == name || node.fqn.as_ref() == name))
            .map(|node| node.id)
            .collect()
    }

    pub fn index_summary(&self) -> IndexSummary {
        IndexSummary { files_parsed: self.snapshot.file_paths.len(), chunks_built: self.chunks.len() }
    }
}

/// Re-reads every file the IR builder touched so `ChunkBuilder` can slice chunk text out
/// of its byte span; the IR itself only keeps spans, not source text.
fn read_sources(root: &Path, snapshot: &IrSnapshot) -> HashMap<String, String> {
    let mut sources = HashMap::new();
    for path in snapshot.file_paths.values() {
        if let Ok(content) = std::fs::read_to_string(root.join(path)) {
            sources.insert(path.clone(), content);
        }
    }
    sources
}

/// Post-resolution OVERRIDES pass (SPEC_FULL.md §4.F): for every Method whose enclosing
/// class has a transitive ancestor declaring a Method of the same name, emits an
/// OVERRIDES edge from the subclass method to the ancestor method. Runs after
/// [`resolver::resolve`] so INHERITS edges point at real class nodes, not placeholders.
fn emit_overrides_edges(snapshot: &mut IrSnapshot) {
    let mut methods_by_class: HashMap<NodeId, HashMap<&str, NodeId>> = HashMap::new();
    for node in snapshot.nodes.values() {
        if node.kind != NodeKind::Method {
            continue;
        }
        let Some(parent) = node.parent else { continue };
        methods_by_class.entry(parent).or_default().insert(node.name.as_ref(), node.id);
    }

    let mut new_edges = Vec::new();
    for (&class_id, methods) in &methods_by_class {
        let mut seen = HashSet::new();
        for ancestor_id in transitive_ancestors(snapshot, class_id, &mut seen) {
            let Some(ancestor_methods) = methods_by_class.get(&ancestor_id) else { continue };
            for (&name, &method_id) in methods {
                if let Some(&ancestor_method_id) = ancestor_methods.get(name) {
                    new_edges.push(Edge::new(EdgeKind::Overrides, method_id, ancestor_method_id, 0));
                }
            }
        }
    }
    snapshot.edges.extend(new_edges);
}

/// Direct + transitive ancestors reached by walking non-external INHERITS edges outward
/// from `class_id`, guarding against inheritance cycles via `seen`.
fn transitive_ancestors(snapshot: &IrSnapshot, class_id: NodeId, seen: &mut HashSet<NodeId>) -> Vec<NodeId> {
    let mut ancestors = Vec::new();
    for edge in snapshot.edges_from(class_id) {
        if edge.kind != EdgeKind::Inherits || edge.is_external() {
            continue;
        }
        if !seen.insert(edge.target) {
            continue;
        }
        ancestors.push(edge.target);
        ancestors.extend(transitive_ancestors(snapshot, edge.target, seen));
    }
    ancestors
}

/// Runs the flow-sensitive narrowing analyzer over every Python source file and attaches
/// each narrowed read's type to the matching READ occurrence already in the index
/// (SPEC_FULL.md §4.E). Matched by exact span since both the narrowing analyzer and the
/// structural IR parse the same source with the same tree-sitter grammar.
fn narrow_python_occurrences(snapshot: &mut IrSnapshot, source_by_file: &HashMap<String, String>) {
    let mut analyzer = NarrowingAnalyzer::new_python();
    for (path, source) in source_by_file {
        if Language::from_extension(path.rsplit('.').next().unwrap_or_default()) != Some(Language::Python) {
            continue;
        }
        let reads = analyzer.analyze(source);
        if reads.is_empty() {
            continue;
        }
        for occurrence in snapshot.occurrences.by_file_mut(path) {
            if let Some(read) = reads.iter().find(|r| r.span == occurrence.span && r.variable == occurrence.symbol_id.as_ref()) {
                occurrence.narrowed_type = Some(read.narrowed_type.clone());
            }
        }
    }
}

fn build_symbol_store(snapshot: &IrSnapshot) -> SymbolStore {
    let file_id_by_path: HashMap<&str, FileId> =
        snapshot.file_paths.iter().map(|(id, path)| (path.as_str(), *id)).collect();
    let fallback_file_id = FileId::new(1).expect("1 is a valid FileId");

    let mut store = SymbolStore::new();
    for node in snapshot.nodes.values() {
        if node.is_external() {
            continue;
        }
        let file_id = file_id_by_path.get(node.file_path.as_ref()).copied().unwrap_or(fallback_file_id);
        let symbol = Symbol::new(node.id, node.name.clone(), node.fqn.clone(), node.kind, file_id, node.span);
        store.insert(symbol);
    }
    store
}

/// Counts reported by the CLI's `index` command after a build completes.
#[derive(Debug, Clone, Copy)]
pub struct IndexSummary {
    pub files_parsed: usize,
    pub chunks_built: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Node, Occurrence, OccurrenceRoles, Type};
    use crate::types::Span;

    fn node(kind: NodeKind, file: &str, fqn: &str, name: &str) -> Node {
        Node::new("repo", kind, file, fqn, name, Span::default())
    }

    #[test]
    fn overrides_edge_emitted_for_matching_method_in_ancestor() {
        let mut snapshot = IrSnapshot::new();
        let base = node(NodeKind::Class, "a.py", "a.Base", "Base");
        let base_id = snapshot.insert_node(base.clone());
        let base_method = node(NodeKind::Method, "a.py", "a.Base.run", "run").with_parent(base_id);
        let base_method_id = snapshot.insert_node(base_method);

        let sub = node(NodeKind::Class, "a.py", "a.Sub", "Sub");
        let sub_id = snapshot.insert_node(sub);
        let sub_method = node(NodeKind::Method, "a.py", "a.Sub.run", "run").with_parent(sub_id);
        let sub_method_id = snapshot.insert_node(sub_method);

        snapshot.insert_edge(Edge::new(EdgeKind::Inherits, sub_id, base_id, 0));

        emit_overrides_edges(&mut snapshot);

        assert!(snapshot
            .edges
            .iter()
            .any(|e| e.kind == EdgeKind::Overrides && e.source == sub_method_id && e.target == base_method_id));
    }

    #[test]
    fn overrides_pass_is_a_noop_when_no_method_names_match() {
        let mut snapshot = IrSnapshot::new();
        let base = node(NodeKind::Class, "a.py", "a.Base", "Base");
        let base_id = snapshot.insert_node(base);
        let base_method = node(NodeKind::Method, "a.py", "a.Base.run", "run").with_parent(base_id);
        snapshot.insert_node(base_method);

        let sub = node(NodeKind::Class, "a.py", "a.Sub", "Sub");
        let sub_id = snapshot.insert_node(sub);
        let sub_method = node(NodeKind::Method, "a.py", "a.Sub.other", "other").with_parent(sub_id);
        snapshot.insert_node(sub_method);

        snapshot.insert_edge(Edge::new(EdgeKind::Inherits, sub_id, base_id, 0));

        emit_overrides_edges(&mut snapshot);

        assert!(!snapshot.edges.iter().any(|e| e.kind == EdgeKind::Overrides));
    }

    #[test]
    fn narrowing_pass_sets_narrowed_type_on_matching_read_occurrence() {
        let mut snapshot = IrSnapshot::new();
        let source = "def f(x):\n    if isinstance(x, Foo):\n        x\n";
        let mut analyzer = NarrowingAnalyzer::new_python();
        let reads = analyzer.analyze(source);
        let read = reads.iter().find(|r| r.variable == "x").expect("narrowing analyzer finds the read");

        snapshot.occurrences.insert(Occurrence::new(
            "x",
            "a.py",
            read.span,
            OccurrenceRoles::READ | OccurrenceRoles::REFERENCE,
        ));

        let mut sources = HashMap::new();
        sources.insert("a.py".to_string(), source.to_string());
        narrow_python_occurrences(&mut snapshot, &sources);

        let occ = snapshot.occurrences.by_file("a.py").next().unwrap();
        assert_eq!(occ.narrowed_type, Some(Type::name("Foo")));
    }

    #[test]
    fn narrowing_pass_skips_non_python_files() {
        let mut snapshot = IrSnapshot::new();
        snapshot.occurrences.insert(Occurrence::new(
            "x",
            "a.rs",
            Span::default(),
            OccurrenceRoles::READ | OccurrenceRoles::REFERENCE,
        ));
        let mut sources = HashMap::new();
        sources.insert("a.rs".to_string(), "fn f(x: i32) { x; }".to_string());

        narrow_python_occurrences(&mut snapshot, &sources);

        let occ = snapshot.occurrences.by_file("a.rs").next().unwrap();
        assert_eq!(occ.narrowed_type, None);
    }
}
