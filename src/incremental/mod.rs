//! Incremental rebuilds and an uncommitted-overlay file view (SPEC_FULL.md §4.M).
//! Change tracking follows the atomic-rebuild shape of `indexing/transaction.rs`'s
//! `FileTransaction` (track what changed, rebuild just that plus dependents) and the
//! interned-path bookkeeping of `watcher/path_registry.rs`, generalized from a live
//! filesystem watch to a pull-based hash/mtime diff.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::graph::{DependencyGraph, TraversalDirection};
use crate::types::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub content_hash: String,
    pub mtime: u64,
}

impl FileFingerprint {
    pub fn compute(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let content_hash = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>();
        let mtime = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        Self { content_hash, mtime }
    }
}

/// Per-file content-hash cache keyed by repo-relative path. A build request diffs the
/// on-disk hash against what's stored here; unchanged files are skipped entirely.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    fingerprints: HashMap<String, FileFingerprint>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and records the new fingerprint if `content` differs from what was
    /// last recorded for `path` (or `path` is new).
    pub fn note(&mut self, path: &str, content: &str) -> bool {
        let fingerprint = FileFingerprint::compute(content);
        let changed = self.fingerprints.get(path) != Some(&fingerprint);
        self.fingerprints.insert(path.to_string(), fingerprint);
        changed
    }

    /// Diffs a full file-content map against the tracker's state without mutating it;
    /// returns every path that is new or whose hash no longer matches.
    pub fn changed_paths(&self, current: &HashMap<String, String>) -> Vec<String> {
        current
            .iter()
            .filter(|(path, content)| {
                let fingerprint = FileFingerprint::compute(content);
                self.fingerprints.get(path.as_str()) != Some(&fingerprint)
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn forget(&mut self, path: &str) {
        self.fingerprints.remove(path);
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.fingerprints.contains_key(path)
    }
}

/// Expands a set of directly-changed symbols to include their transitive reverse
/// dependencies (callers/importers), since an upstream rename can invalidate FQN
/// resolution downstream even when the downstream file's own text is untouched.
pub fn impacted_symbols(graph: &DependencyGraph, changed: &[NodeId]) -> HashSet<NodeId> {
    let mut impacted: HashSet<NodeId> = changed.iter().copied().collect();
    for &seed in changed {
        for (node, _depth) in graph.bfs_depths(seed, TraversalDirection::Reverse, usize::MAX) {
            impacted.insert(node);
        }
    }
    impacted
}

/// Virtual file view that superimposes uncommitted working-tree content on a committed
/// snapshot: `get_file_content` prefers the overlay, falling back to the committed text.
#[derive(Debug, Default)]
pub struct LocalOverlay {
    committed: HashMap<String, String>,
    overlay: HashMap<String, String>,
}

impl LocalOverlay {
    pub fn new(committed: HashMap<String, String>) -> Self {
        Self { committed, overlay: HashMap::new() }
    }

    pub fn set_uncommitted(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.overlay.insert(path.into(), content.into());
    }

    pub fn clear_uncommitted(&mut self, path: &str) {
        self.overlay.remove(path);
    }

    pub fn get_file_content(&self, path: &str) -> Option<&str> {
        self.overlay.get(path).or_else(|| self.committed.get(path)).map(String::as_str)
    }

    pub fn overlaid_paths(&self) -> impl Iterator<Item = &str> {
        self.overlay.keys().map(String::as_str)
    }

    /// The view a rebuild should actually read from: overlay content where present,
    /// committed content otherwise, restricted to the union of both path sets.
    pub fn effective_contents(&self) -> HashMap<String, String> {
        let mut merged = self.committed.clone();
        for (path, content) in &self.overlay {
            merged.insert(path.clone(), content.clone());
        }
        merged
    }
}

/// Tag carried on a snapshot built from a `LocalOverlay`, distinguishing it from a
/// committed-only build for callers that must not cache overlay results as canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    Committed,
    Local,
}

/// Builds the set of repo-relative paths an incremental rebuild must reparse: the
/// changed/overlaid files themselves, plus any file owning a symbol in
/// `impacted_symbols`'s closure.
pub struct OverlayIrBuilder;

impl OverlayIrBuilder {
    /// `file_of` maps a symbol id to the repo-relative path that declares it (typically
    /// `IrSnapshot.nodes[id].file_path`), used to turn the impacted symbol set back into
    /// a rebuild file list.
    pub fn rebuild_scope(
        overlay: &LocalOverlay,
        graph: &DependencyGraph,
        changed_symbols: &[NodeId],
        file_of: impl Fn(NodeId) -> Option<String>,
    ) -> (HashSet<String>, SnapshotOrigin) {
        let mut scope: HashSet<String> = overlay.overlaid_paths().map(String::from).collect();
        for symbol in impacted_symbols(graph, changed_symbols) {
            if let Some(path) = file_of(symbol) {
                scope.insert(path);
            }
        }
        let origin = if overlay.overlaid_paths().next().is_some() { SnapshotOrigin::Local } else { SnapshotOrigin::Committed };
        (scope, origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKind;

    #[test]
    fn note_reports_change_on_first_sight_and_on_content_diff() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.note("a.py", "def foo(): pass"));
        assert!(!tracker.note("a.py", "def foo(): pass"));
        assert!(tracker.note("a.py", "def foo(): return 1"));
    }

    #[test]
    fn changed_paths_finds_new_and_modified_files_without_mutating_state() {
        let mut tracker = ChangeTracker::new();
        tracker.note("a.py", "one");

        let mut current = HashMap::new();
        current.insert("a.py".to_string(), "one".to_string());
        current.insert("b.py".to_string(), "two".to_string());
        let changed = tracker.changed_paths(&current);

        assert_eq!(changed, vec!["b.py".to_string()]);
        assert!(tracker.is_tracked("a.py"));
        assert!(!tracker.is_tracked("b.py"));
    }

    #[test]
    fn impacted_symbols_includes_transitive_callers() {
        let id = |n: &str| NodeId::compute("repo", NodeKind::Function, "a.py", n);
        let (renamed, caller, indirect) = (id("renamed"), id("caller"), id("indirect"));

        let graph = DependencyGraph::new();
        graph.add_relationship(caller, renamed, crate::types::EdgeKind::Calls);
        graph.add_relationship(indirect, caller, crate::types::EdgeKind::Calls);

        let impacted = impacted_symbols(&graph, &[renamed]);
        assert!(impacted.contains(&renamed));
        assert!(impacted.contains(&caller));
        assert!(impacted.contains(&indirect));
    }

    #[test]
    fn overlay_prefers_uncommitted_content_over_committed() {
        let mut committed = HashMap::new();
        committed.insert("a.py".to_string(), "old".to_string());
        let mut overlay = LocalOverlay::new(committed);

        assert_eq!(overlay.get_file_content("a.py"), Some("old"));
        overlay.set_uncommitted("a.py", "new");
        assert_eq!(overlay.get_file_content("a.py"), Some("new"));
    }

    #[test]
    fn rebuild_scope_includes_overlaid_paths_and_impacted_symbol_files() {
        let committed = HashMap::new();
        let mut overlay = LocalOverlay::new(committed);
        overlay.set_uncommitted("a.py", "def renamed(): pass");

        let id = |n: &str| NodeId::compute("repo", NodeKind::Function, "b.py", n);
        let caller = id("caller");
        let renamed = NodeId::compute("repo", NodeKind::Function, "a.py", "renamed");
        let graph = DependencyGraph::new();
        graph.add_relationship(caller, renamed, crate::types::EdgeKind::Calls);

        let (scope, origin) = OverlayIrBuilder::rebuild_scope(&overlay, &graph, &[renamed], |id| {
            if id == caller { Some("b.py".to_string()) } else if id == renamed { Some("a.py".to_string()) } else { None }
        });

        assert!(scope.contains("a.py"));
        assert!(scope.contains("b.py"));
        assert_eq!(origin, SnapshotOrigin::Local);
    }
}
