//! Repository-wide IR build: walks the working tree, parses every supported file in
//! parallel, and merges the per-file results into one [`IrSnapshot`] (SPEC_FULL.md §4.B,
//! §5 concurrency model).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ignore::WalkBuilder;
use rayon::prelude::*;

use crate::config::IndexingConfig;
use crate::error::{IrError, IrResult};
use crate::parsing;
use crate::types::{FileId, Language};

use super::{IrSnapshot, Node};
use crate::types::{NodeKind, Span};

pub struct IrBuilder<'a> {
    repo_id: &'a str,
    config: &'a IndexingConfig,
}

impl<'a> IrBuilder<'a> {
    pub fn new(repo_id: &'a str, config: &'a IndexingConfig) -> Self {
        Self { repo_id, config }
    }

    /// Discover every file under `root` whose extension maps to a supported language,
    /// honoring `.gitignore` and the configured extra ignore patterns.
    pub fn discover_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false);

        let mut overrides = ignore::overrides::OverrideBuilder::new(root);
        for pattern in &self.config.ignore_patterns {
            let _ = overrides.add(&format!("!{pattern}"));
        }
        if let Ok(overrides) = overrides.build() {
            builder.overrides(overrides);
        }

        builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                Language::from_extension(ext).is_some()
            })
            .filter(|path| self.config.include_tests || !looks_like_test_file(path))
            .collect()
    }

    /// Parse every discovered file and merge the results into a fresh snapshot.
    /// Parsing fans out across `rayon`'s global pool (SPEC_FULL.md §5); merging happens
    /// single-threaded afterward since `NodeId`/`EdgeId` computation has no shared state.
    pub fn build(&self, root: &Path) -> IrResult<(IrSnapshot, Vec<(PathBuf, IrError)>)> {
        let files = self.discover_files(root);
        let errors = Mutex::new(Vec::new());

        let units: Vec<(PathBuf, String, parsing::ParseUnit)> = files
            .par_iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
                let source = match std::fs::read_to_string(path) {
                    Ok(s) => s,
                    Err(e) => {
                        errors.lock().unwrap().push((
                            path.clone(),
                            IrError::FileRead { path: path.clone(), source: e },
                        ));
                        return None;
                    }
                };
                match parsing::parse_file(self.repo_id, &relative, &source) {
                    Ok(unit) => Some((path.clone(), relative, unit)),
                    Err(e) => {
                        errors.lock().unwrap().push((path.clone(), e));
                        None
                    }
                }
            })
            .collect();

        let mut snapshot = IrSnapshot::new();
        let mut next_file_id = 1u32;

        for (_path, relative, unit) in units {
            let file_id = FileId::new(next_file_id).expect("counter starts at 1 and only increments");
            next_file_id += 1;
            snapshot.file_paths.insert(file_id, relative.clone());

            for node in unit.nodes {
                snapshot.insert_node(node);
            }
            for edge in unit.edges {
                snapshot.insert_edge(edge);
            }
            snapshot.occurrences.extend(unit.occurrences);
        }

        Ok((snapshot, errors.into_inner().unwrap()))
    }
}

fn looks_like_test_file(path: &Path) -> bool {
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    name.starts_with("test_")
        || name.ends_with("_test")
        || name.ends_with(".test")
        || name.ends_with(".spec")
        || path.components().any(|c| matches!(c.as_os_str().to_str(), Some("tests") | Some("__tests__")))
}

/// Used by `StructuralAnalyzer`-style callers that need a synthetic root `File` node for
/// a repository before any files are merged in (SPEC_FULL.md §3's `File` kind).
pub fn repo_root_node(repo_id: &str, root_name: &str) -> Node {
    Node::new(repo_id, NodeKind::File, root_name, root_name, root_name, Span::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn discover_files_filters_by_extension_and_ignore_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def f(): pass").unwrap();
        std::fs::write(dir.path().join("README.md"), "not code").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules").join("x.js"), "").unwrap();

        let mut config = IndexingConfig::default();
        config.ignore_patterns.push("node_modules/**".to_string());
        let builder = IrBuilder::new("repo", &config);
        let files = builder.discover_files(dir.path());

        assert!(files.iter().any(|p| p.ends_with("a.py")));
        assert!(!files.iter().any(|p| p.ends_with("README.md")));
        assert!(!files.iter().any(|p| p.to_string_lossy().contains("node_modules")));
    }

    #[test]
    fn build_merges_units_from_multiple_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut f1 = std::fs::File::create(dir.path().join("a.py")).unwrap();
        writeln!(f1, "def foo():\n    pass\n").unwrap();
        let mut f2 = std::fs::File::create(dir.path().join("b.py")).unwrap();
        writeln!(f2, "def bar():\n    pass\n").unwrap();

        let config = IndexingConfig::default();
        let builder = IrBuilder::new("repo", &config);
        let (snapshot, errors) = builder.build(dir.path()).unwrap();

        assert!(errors.is_empty());
        assert_eq!(snapshot.file_paths.len(), 2);
        assert!(snapshot.nodes.values().any(|n| n.name.as_ref() == "foo"));
        assert!(snapshot.nodes.values().any(|n| n.name.as_ref() == "bar"));
    }
}
