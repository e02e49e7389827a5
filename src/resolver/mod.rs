//! Cross-file reference resolution: retargets the `EXTERNAL_FILE_MARKER` placeholder
//! edges each parser emits onto real in-repo declarations, and derives a file-level
//! dependency order from the resolved imports (SPEC_FULL.md §4.D).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ir::IrSnapshot;
use crate::types::{EdgeKind, NodeId, NodeKind};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolveStats {
    pub total_external: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

/// FQN and bare-name lookup over every non-external node in a snapshot, built once and
/// consulted for every external edge.
struct SymbolTable {
    by_fqn: HashMap<String, (NodeId, NodeKind)>,
    by_name: HashMap<String, Vec<(NodeId, NodeKind)>>,
    by_file: HashMap<String, (NodeId, NodeKind)>,
}

impl SymbolTable {
    fn build(snapshot: &IrSnapshot) -> Self {
        let mut by_fqn = HashMap::new();
        let mut by_name: HashMap<String, Vec<(NodeId, NodeKind)>> = HashMap::new();
        let mut by_file = HashMap::new();
        for node in snapshot.nodes.values() {
            if node.is_external() {
                continue;
            }
            by_fqn.insert(node.fqn.to_string(), (node.id, node.kind));
            by_name.entry(node.name.to_string()).or_default().push((node.id, node.kind));
            if matches!(node.kind, NodeKind::Module | NodeKind::File) {
                by_file.insert(node.file_path.to_string(), (node.id, node.kind));
            }
        }
        Self { by_fqn, by_name, by_file }
    }

    fn resolve_fqn(&self, fqn: &str, allowed: &[NodeKind]) -> Option<NodeId> {
        let (id, kind) = self.by_fqn.get(fqn)?;
        (allowed.is_empty() || allowed.contains(kind)).then_some(*id)
    }

    /// Progressively strip trailing path segments: `a::b::C` -> `a::b` -> `a` (or the
    /// `.`-separated equivalent), the same fallback the original resolver used for
    /// `module.submodule.Class`-style imports.
    fn resolve_partial(&self, fqn: &str, allowed: &[NodeKind]) -> Option<(NodeId, String)> {
        let sep = if fqn.contains("::") { "::" } else { "." };
        let parts: Vec<&str> = fqn.split(sep).collect();
        for i in (1..parts.len()).rev() {
            let candidate = parts[..i].join(sep);
            if let Some(id) = self.resolve_fqn(&candidate, allowed) {
                return Some((id, candidate));
            }
        }
        None
    }

    fn resolve_name(&self, name: &str, allowed: &[NodeKind]) -> Option<NodeId> {
        self.by_name.get(name)?.iter().find(|(_, kind)| allowed.is_empty() || allowed.contains(kind)).map(|(id, _)| *id)
    }

    /// Common module-file conventions for a dotted/namespaced import path: `pkg.sub`
    /// resolves against `pkg/sub.py` or `pkg/sub/__init__.py`, tried both under the repo
    /// root and under a `src/` prefix.
    fn resolve_module_file(&self, fqn: &str, allowed: &[NodeKind]) -> Option<NodeId> {
        if !(allowed.is_empty() || allowed.contains(&NodeKind::Module) || allowed.contains(&NodeKind::File)) {
            return None;
        }
        let sep = if fqn.contains("::") { "::" } else { "." };
        let path = fqn.replace(sep, "/");

        for candidate in [
            format!("{path}.py"),
            format!("{path}/__init__.py"),
            format!("src/{path}.py"),
            format!("src/{path}/__init__.py"),
        ] {
            if let Some((id, _)) = self.by_file.get(&candidate) {
                return Some(*id);
            }
        }
        None
    }
}

fn allowed_kinds(edge_kind: EdgeKind) -> &'static [NodeKind] {
    match edge_kind {
        EdgeKind::Calls => &[NodeKind::Function, NodeKind::Method],
        EdgeKind::Inherits | EdgeKind::Overrides => &[NodeKind::Class, NodeKind::Interface, NodeKind::Enum],
        EdgeKind::Imports => &[],
        _ => &[],
    }
}

/// Resolve every externally-marked edge in `snapshot` in place and return resolution
/// stats plus the file-level topological order (base modules last, per the original
/// resolver's Kahn's-algorithm ordering).
pub fn resolve(snapshot: &mut IrSnapshot) -> (ResolveStats, Vec<String>) {
    let table = SymbolTable::build(snapshot);
    let mut stats = ResolveStats::default();
    let mut file_deps: HashMap<String, HashSet<String>> = HashMap::new();

    for edge in &mut snapshot.edges {
        if !edge.is_external() {
            continue;
        }
        stats.total_external += 1;

        let Some(target_node) = snapshot.nodes.get(&edge.target) else {
            stats.unresolved += 1;
            continue;
        };
        let placeholder_fqn = target_node.fqn.to_string();
        let allowed = allowed_kinds(edge.kind);

        let resolved = table
            .resolve_fqn(&placeholder_fqn, allowed)
            .map(|id| (id, placeholder_fqn.clone()))
            .or_else(|| table.resolve_partial(&placeholder_fqn, allowed))
            .or_else(|| table.resolve_module_file(&placeholder_fqn, allowed).map(|id| (id, placeholder_fqn.clone())))
            .or_else(|| table.resolve_name(&placeholder_fqn, allowed).map(|id| (id, placeholder_fqn.clone())));

        match resolved {
            Some((resolved_id, _)) => {
                edge.target = resolved_id;
                edge.attrs.insert("resolved".to_string(), serde_json::Value::Bool(true));
                stats.resolved += 1;

                if edge.kind == EdgeKind::Imports {
                    if let (Some(source_node), Some(target_node)) =
                        (snapshot.nodes.get(&edge.source), snapshot.nodes.get(&resolved_id))
                    {
                        let from = source_node.file_path.to_string();
                        let to = target_node.file_path.to_string();
                        if from != to {
                            file_deps.entry(from).or_default().insert(to);
                        }
                    }
                }
            }
            None => stats.unresolved += 1,
        }
    }

    let order = topological_file_order(&file_deps);
    (stats, order)
}

/// Kahn's algorithm over the file dependency graph (edges point from a dependent file
/// to the file it imports). In-degree counts how many files depend on a given file, so
/// files with no dependents surface first and widely-depended-on utility modules last.
fn topological_file_order(file_deps: &HashMap<String, HashSet<String>>) -> Vec<String> {
    let mut all_files: HashSet<String> = HashSet::new();
    for (from, deps) in file_deps {
        all_files.insert(from.clone());
        all_files.extend(deps.iter().cloned());
    }

    let mut in_degree: HashMap<String, usize> = all_files.iter().map(|f| (f.clone(), 0)).collect();
    for deps in file_deps.values() {
        for dep in deps {
            *in_degree.entry(dep.clone()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(f, _)| f.clone())
        .collect();
    let mut queue_sorted: Vec<String> = queue.drain(..).collect();
    queue_sorted.sort();
    let mut queue: VecDeque<String> = queue_sorted.into();

    let mut order = Vec::new();
    while let Some(file) = queue.pop_front() {
        order.push(file.clone());
        if let Some(deps) = file_deps.get(&file) {
            let mut ready: Vec<String> = Vec::new();
            for dep in deps {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(dep.clone());
                    }
                }
            }
            ready.sort();
            queue.extend(ready);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, Node};
    use crate::types::Span;

    fn node(repo: &str, kind: NodeKind, file: &str, fqn: &str, name: &str) -> Node {
        Node::new(repo, kind, file, fqn, name, Span::default())
    }

    #[test]
    fn resolves_import_edge_to_real_module_node() {
        let mut snapshot = IrSnapshot::new();
        let real_module = node("repo", NodeKind::Module, "helpers.py", "helpers", "helpers");
        let importer = node("repo", NodeKind::Import, "main.py", "main.import:helpers", "helpers");
        let placeholder = node("repo", NodeKind::Module, crate::ir::EXTERNAL_FILE_MARKER, "helpers", "helpers");

        let mut edge = Edge::new(EdgeKind::Imports, importer.id, placeholder.id, 0);
        edge.mark_external();

        snapshot.insert_node(real_module.clone());
        snapshot.insert_node(importer.clone());
        snapshot.insert_node(placeholder);
        snapshot.insert_edge(edge);

        let (stats, order) = resolve(&mut snapshot);

        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.unresolved, 0);
        let resolved_edge = snapshot.edges.iter().find(|e| e.kind == EdgeKind::Imports).unwrap();
        assert_eq!(resolved_edge.target, real_module.id);
        assert_eq!(order, vec!["main.py".to_string()]);
    }

    #[test]
    fn unresolvable_edge_is_counted_and_left_external() {
        let mut snapshot = IrSnapshot::new();
        let caller = node("repo", NodeKind::Function, "a.py", "a.foo", "foo");
        let placeholder = node("repo", NodeKind::Function, crate::ir::EXTERNAL_FILE_MARKER, "nonexistent", "nonexistent");
        let mut edge = Edge::new(EdgeKind::Calls, caller.id, placeholder.id, 0);
        edge.mark_external();

        snapshot.insert_node(caller);
        snapshot.insert_node(placeholder);
        snapshot.insert_edge(edge);

        let (stats, _) = resolve(&mut snapshot);
        assert_eq!(stats.unresolved, 1);
        assert_eq!(stats.resolved, 0);
    }

    #[test]
    fn partial_import_resolves_to_parent_module() {
        let mut snapshot = IrSnapshot::new();
        let pkg = node("repo", NodeKind::Module, "pkg/__init__.py", "pkg", "pkg");
        let importer = node("repo", NodeKind::Import, "main.py", "main.import:pkg.sub.Thing", "Thing");
        let placeholder = node("repo", NodeKind::Module, crate::ir::EXTERNAL_FILE_MARKER, "pkg.sub.Thing", "Thing");

        let mut edge = Edge::new(EdgeKind::Imports, importer.id, placeholder.id, 0);
        edge.mark_external();

        snapshot.insert_node(pkg.clone());
        snapshot.insert_node(importer);
        snapshot.insert_node(placeholder);
        snapshot.insert_edge(edge);

        let (stats, _) = resolve(&mut snapshot);
        assert_eq!(stats.resolved, 1);
        let resolved_edge = snapshot.edges.iter().find(|e| e.kind == EdgeKind::Imports).unwrap();
        assert_eq!(resolved_edge.target, pkg.id);
    }

    #[test]
    fn import_resolves_via_init_py_module_file_convention() {
        let mut snapshot = IrSnapshot::new();
        let pkg_init = node("repo", NodeKind::Module, "pkg/sub/__init__.py", "pkg/sub/__init__", "sub");
        let importer = node("repo", NodeKind::Import, "main.py", "main.import:pkg.sub", "sub");
        let placeholder = node("repo", NodeKind::Module, crate::ir::EXTERNAL_FILE_MARKER, "pkg.sub", "sub");

        let mut edge = Edge::new(EdgeKind::Imports, importer.id, placeholder.id, 0);
        edge.mark_external();

        snapshot.insert_node(pkg_init.clone());
        snapshot.insert_node(importer);
        snapshot.insert_node(placeholder);
        snapshot.insert_edge(edge);

        let (stats, _) = resolve(&mut snapshot);
        assert_eq!(stats.resolved, 1);
        let resolved_edge = snapshot.edges.iter().find(|e| e.kind == EdgeKind::Imports).unwrap();
        assert_eq!(resolved_edge.target, pkg_init.id);
    }

    #[test]
    fn topological_order_places_undepended_files_first() {
        let mut deps = HashMap::new();
        deps.insert("main.py".to_string(), HashSet::from(["helpers.py".to_string()]));
        let order = topological_file_order(&deps);
        assert_eq!(order, vec!["main.py".to_string(), "helpers.py".to_string()]);
    }
}
