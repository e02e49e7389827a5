//! Core identifier and span types shared across the IR, indexes, and retrieval layers.
//!
//! `NodeId`/`EdgeId` are content-addressable: two builds of the same repository at the
//! same content produce byte-identical ids (see `SPEC_FULL.md` §6, invariant 1 in §8).
//! `FileId` is a per-snapshot dense index, not content-addressed, because file identity
//! is a build-local concern (occurrence/edge lookups key off it for speed).

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A dense, per-snapshot file identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(NonZeroU32);

impl FileId {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(FileId)
    }

    pub fn value(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file:{}", self.0)
    }
}

/// A stable, content-addressable node identifier.
///
/// Computed as `sha256(repo_id, kind, file_path, fqn)` truncated to 128 bits. Two builds
/// of the same repository at the same content produce identical `NodeId`s (SPEC_FULL.md
/// §8 invariant 1), which is what makes incremental rebuilds and cache keys correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u128);

impl NodeId {
    pub fn compute(repo_id: &str, kind: NodeKind, file_path: &str, fqn: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(repo_id.as_bytes());
        hasher.update([0u8]);
        hasher.update([kind as u8]);
        hasher.update([0u8]);
        hasher.update(file_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(fqn.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[0..16]);
        NodeId(u128::from_be_bytes(bytes))
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    /// Reconstructs a `NodeId` from its raw value, for round-tripping through storage
    /// layers that only persist the `Display` hex form (tantivy doc fields, JSON).
    pub fn from_u128(value: u128) -> Self {
        NodeId(value)
    }

    pub fn to_hex(&self) -> String {
        format!("{:032x}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A stable edge identifier: source, target, kind, and an occurrence ordinal so
/// repeated call sites between the same (caller, callee) pair stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(u128);

impl EdgeId {
    pub fn compute(source: NodeId, target: NodeId, kind: EdgeKind, ordinal: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_u128().to_be_bytes());
        hasher.update(target.as_u128().to_be_bytes());
        hasher.update([kind as u8]);
        hasher.update(ordinal.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[0..16]);
        EdgeId(u128::from_be_bytes(bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("{:032x}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Node kinds from SPEC_FULL.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeKind {
    File = 0,
    Module = 1,
    Class = 2,
    Interface = 3,
    Function = 4,
    Method = 5,
    Field = 6,
    Variable = 7,
    Parameter = 8,
    Import = 9,
    Enum = 10,
}

impl NodeKind {
    pub fn is_callable(&self) -> bool {
        matches!(self, NodeKind::Function | NodeKind::Method)
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::File | NodeKind::Module | NodeKind::Class | NodeKind::Interface
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::File => "file",
            NodeKind::Module => "module",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Field => "field",
            NodeKind::Variable => "variable",
            NodeKind::Parameter => "parameter",
            NodeKind::Import => "import",
            NodeKind::Enum => "enum",
        };
        write!(f, "{s}")
    }
}

/// Edge kinds from SPEC_FULL.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EdgeKind {
    Contains = 0,
    Calls = 1,
    Imports = 2,
    Inherits = 3,
    Overrides = 4,
    Reads = 5,
    Writes = 6,
    References = 7,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::Calls => "CALLS",
            EdgeKind::Imports => "IMPORTS",
            EdgeKind::Inherits => "INHERITS",
            EdgeKind::Overrides => "OVERRIDES",
            EdgeKind::Reads => "READS",
            EdgeKind::Writes => "WRITES",
            EdgeKind::References => "REFERENCES",
        };
        write!(f, "{s}")
    }
}

/// A byte-accurate, line/column-accurate source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub start_byte: u32,
    pub end_byte: u32,
}

impl Span {
    pub fn new(
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
        start_byte: u32,
        end_byte: u32,
    ) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
            start_byte,
            end_byte,
        }
    }

    /// Whether `other` lies entirely within `self` (inclusive), used by dedup overlap math.
    pub fn contains(&self, other: &Span) -> bool {
        self.start_line <= other.start_line && self.end_line >= other.end_line
    }

    /// Line-count overlap ratio of `other` against `self`, used by §4.L dedup.
    pub fn line_overlap_ratio(&self, other: &Span) -> f64 {
        let overlap_start = self.start_line.max(other.start_line);
        let overlap_end = self.end_line.min(other.end_line);
        if overlap_start > overlap_end {
            return 0.0;
        }
        let overlap = (overlap_end - overlap_start + 1) as f64;
        let other_size = (other.end_line - other.start_line + 1) as f64;
        if other_size <= 0.0 {
            0.0
        } else {
            overlap / other_size
        }
    }
}

/// A language tag, shared by the parser port and the package/index layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    JavaScript,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "rs" => Some(Language::Rust),
            "py" | "pyi" => Some(Language::Python),
            "ts" | "tsx" => Some(Language::TypeScript),
            "js" | "jsx" | "mjs" => Some(Language::JavaScript),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A compact boxed string, matching the teacher's `CompactString` convention for
/// symbol/table interning (a `Box<str>` avoids `String`'s spare capacity).
pub type CompactString = Box<str>;

pub fn compact_string(s: impl Into<String>) -> CompactString {
    s.into().into_boxed_str()
}
