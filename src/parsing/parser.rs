//! The common interface every language front end implements.

use crate::error::IrResult;
use crate::ir::{Edge, Node, Occurrence};
use crate::types::Language;

/// Everything a single file contributes to the IR: its declarations, the structural and
/// call/import edges rooted at them, and the textual occurrences of each symbol.
///
/// Edges whose target isn't declared in this file point at a synthetic external node
/// (`crate::ir::EXTERNAL_FILE_MARKER`); the cross-file resolver (§4.D) retargets them
/// to the real declaration once the whole repository has been parsed.
#[derive(Debug, Default)]
pub struct ParseUnit {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub occurrences: Vec<Occurrence>,
}

impl ParseUnit {
    pub fn merge(&mut self, other: ParseUnit) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.occurrences.extend(other.occurrences);
    }
}

/// Common interface for all language front ends (SPEC_FULL.md §4.A).
pub trait LanguageParser: Send + Sync {
    /// Parse `source`, a file at `file_path` within repository `repo_id`, into a
    /// [`ParseUnit`]. Implementations must not touch the filesystem or network; `source`
    /// is the complete, already-read file content.
    fn parse(&mut self, repo_id: &str, file_path: &str, source: &str) -> IrResult<ParseUnit>;

    fn language(&self) -> Language;
}

/// Maximum recursion depth for AST traversal; guards against stack overflow on
/// pathologically deep nesting (generated code, minified bundles).
pub const MAX_AST_DEPTH: usize = 500;

/// Truncate `s` to at most `max_bytes`, backing off to the nearest UTF-8 character
/// boundary so multi-byte characters are never split.
pub fn safe_truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    &s[..boundary]
}
