//! IR entities: Node, Edge, Occurrence, Signature, Type, UnifiedSymbol (SPEC_FULL.md §3).

use std::collections::HashMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::types::{CompactString, EdgeId, EdgeKind, NodeId, NodeKind, Span};

/// A declaration or structural unit. Immutable after construction within a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub fqn: CompactString,
    pub name: CompactString,
    pub file_path: CompactString,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub declared_type: Option<Type>,
    pub docstring: Option<CompactString>,
    pub attrs: HashMap<String, serde_json::Value>,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo_id: &str,
        kind: NodeKind,
        file_path: impl Into<CompactString>,
        fqn: impl Into<CompactString>,
        name: impl Into<CompactString>,
        span: Span,
    ) -> Self {
        let file_path = file_path.into();
        let fqn = fqn.into();
        let id = NodeId::compute(repo_id, kind, &file_path, &fqn);
        Self {
            id,
            kind,
            fqn,
            name: name.into(),
            file_path,
            span,
            parent: None,
            declared_type: None,
            docstring: None,
            attrs: HashMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_docstring(mut self, doc: impl Into<CompactString>) -> Self {
        self.docstring = Some(doc.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn is_external(&self) -> bool {
        self.file_path.as_ref() == EXTERNAL_FILE_MARKER
    }
}

/// A marker file path for symbols whose definition is outside the indexed repository.
pub const EXTERNAL_FILE_MARKER: &str = "<external>";

/// A directed relation between two nodes. Multiset-valued: repeated call sites produce
/// distinct edges disambiguated by `ordinal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub kind: EdgeKind,
    pub source: NodeId,
    pub target: NodeId,
    pub span: Option<Span>,
    pub ordinal: u32,
    pub attrs: HashMap<String, serde_json::Value>,
}

impl Edge {
    pub fn new(kind: EdgeKind, source: NodeId, target: NodeId, ordinal: u32) -> Self {
        let id = EdgeId::compute(source, target, kind, ordinal);
        Self {
            id,
            kind,
            source,
            target,
            span: None,
            ordinal,
            attrs: HashMap::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn is_external(&self) -> bool {
        self.attrs
            .get("external")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn mark_external(&mut self) {
        self.attrs.insert("external".to_string(), serde_json::Value::Bool(true));
    }
}

bitflags! {
    /// Roles a textual occurrence of a symbol can play (SPEC_FULL.md §3/§4.C).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct OccurrenceRoles: u8 {
        const DEFINITION = 0b0000_0001;
        const REFERENCE  = 0b0000_0010;
        const IMPORT     = 0b0000_0100;
        const READ       = 0b0000_1000;
        const WRITE      = 0b0001_0000;
        const CALL       = 0b0010_0000;
    }
}

/// A textual mention of a symbol in source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occurrence {
    pub symbol_id: CompactString,
    pub file_path: CompactString,
    pub span: Span,
    pub roles: OccurrenceRoles,
    /// Filled in by the narrowing analyzer (§4.E) when a Read occurrence's type is
    /// narrower at this point than at the variable's declaration.
    pub narrowed_type: Option<Type>,
}

impl Occurrence {
    pub fn new(
        symbol_id: impl Into<CompactString>,
        file_path: impl Into<CompactString>,
        span: Span,
        roles: OccurrenceRoles,
    ) -> Self {
        Self {
            symbol_id: symbol_id.into(),
            file_path: file_path.into(),
            span,
            roles,
            narrowed_type: None,
        }
    }

    pub fn is_external(&self) -> bool {
        self.file_path.as_ref() == EXTERNAL_FILE_MARKER
    }
}

/// Structural type representation (SPEC_FULL.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Name(String),
    Union(Vec<Type>),
    Generic { base: String, args: Vec<Type> },
    Callable { params: Vec<Type>, ret: Box<Type> },
    Unknown,
}

impl Type {
    pub fn name(s: impl Into<String>) -> Self {
        Type::Name(s.into())
    }

    /// Removes `excluded` from a union (or from `self` treated as a singleton union),
    /// used by the narrowing analyzer's else-branch facts.
    pub fn without(&self, excluded: &Type) -> Type {
        match self {
            Type::Union(members) => {
                let remaining: Vec<Type> = members.iter().filter(|m| *m != excluded).cloned().collect();
                match remaining.len() {
                    0 => Type::Unknown,
                    1 => remaining.into_iter().next().unwrap(),
                    _ => Type::Union(remaining),
                }
            }
            t if t == excluded => Type::Unknown,
            t => t.clone(),
        }
    }

    pub fn to_canonical_string(&self) -> String {
        match self {
            Type::Name(n) => n.clone(),
            Type::Union(members) => {
                let parts: Vec<String> = members.iter().map(|m| m.to_canonical_string()).collect();
                format!("Union[{}]", parts.join(", "))
            }
            Type::Generic { base, args } => {
                let parts: Vec<String> = args.iter().map(|a| a.to_canonical_string()).collect();
                format!("{}[{}]", base, parts.join(", "))
            }
            Type::Callable { params, ret } => {
                let parts: Vec<String> = params.iter().map(|p| p.to_canonical_string()).collect();
                format!("Callable[[{}], {}]", parts.join(", "), ret.to_canonical_string())
            }
            Type::Unknown => "Unknown".to_string(),
        }
    }
}

/// Resolution confidence for a `Type` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionLevel {
    Raw,
    BuiltIn,
    Local,
    External,
}

/// Kind of callable a `Signature` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallableKind {
    FreeFunction,
    Method,
    Constructor,
    Static,
}

/// For callable nodes: parameter/return types and canonical string form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<(String, Type)>,
    pub return_type: Type,
    pub kind: CallableKind,
    pub resolution: ResolutionLevel,
}

impl Signature {
    pub fn canonical_string(&self, name: &str) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(n, t)| format!("{}: {}", n, t.to_canonical_string()))
            .collect();
        format!("{}({}) -> {}", name, params.join(", "), self.return_type.to_canonical_string())
    }
}

/// An SCIP-style language-independent reference, enabling cross-language joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedSymbol {
    pub scheme: String,
    pub manager: String,
    pub package: String,
    pub version: String,
    pub descriptor: String,
    pub local_kind: NodeKind,
    pub fqn: String,
}

impl UnifiedSymbol {
    pub fn descriptor_for(kind: NodeKind, path: &str) -> String {
        match kind {
            NodeKind::Module | NodeKind::File => format!("{path}."),
            NodeKind::Class | NodeKind::Interface | NodeKind::Enum => format!("{path}#"),
            NodeKind::Function | NodeKind::Method => format!("{path}()."),
            _ => path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_stable_for_identical_content() {
        let a = Node::new("repo", NodeKind::Class, "a.py", "a.Foo", "Foo", Span::default());
        let b = Node::new("repo", NodeKind::Class, "a.py", "a.Foo", "Foo", Span::default());
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn edge_ordinal_disambiguates_repeated_call_sites() {
        let a = Node::new("repo", NodeKind::Function, "a.py", "a.foo", "foo", Span::default());
        let b = Node::new("repo", NodeKind::Function, "a.py", "a.bar", "bar", Span::default());
        let e0 = Edge::new(EdgeKind::Calls, a.id, b.id, 0);
        let e1 = Edge::new(EdgeKind::Calls, a.id, b.id, 1);
        assert_ne!(e0.id, e1.id);
    }

    #[test]
    fn type_without_removes_member_from_union() {
        let union = Type::Union(vec![Type::name("int"), Type::name("None")]);
        let narrowed = union.without(&Type::name("None"));
        assert_eq!(narrowed, Type::name("int"));
    }

    #[test]
    fn type_without_singleton_becomes_unknown() {
        let t = Type::name("None");
        assert_eq!(t.without(&Type::name("None")), Type::Unknown);
    }

    #[test]
    fn occurrence_roles_combine() {
        let roles = OccurrenceRoles::READ | OccurrenceRoles::REFERENCE;
        assert!(roles.contains(OccurrenceRoles::READ));
        assert!(roles.contains(OccurrenceRoles::REFERENCE));
        assert!(!roles.contains(OccurrenceRoles::WRITE));
    }

    #[test]
    fn external_occurrence_detected_by_marker_path() {
        let occ = Occurrence::new("pkg.Foo", EXTERNAL_FILE_MARKER, Span::default(), OccurrenceRoles::REFERENCE);
        assert!(occ.is_external());
    }

    #[test]
    fn signature_canonical_string() {
        let sig = Signature {
            params: vec![("x".to_string(), Type::name("int"))],
            return_type: Type::name("bool"),
            kind: CallableKind::FreeFunction,
            resolution: ResolutionLevel::Local,
        };
        assert_eq!(sig.canonical_string("check"), "check(x: int) -> bool");
    }

    #[test]
    fn unified_symbol_descriptor_suffix_by_kind() {
        assert_eq!(UnifiedSymbol::descriptor_for(NodeKind::Class, "pkg/Foo"), "pkg/Foo#");
        assert_eq!(UnifiedSymbol::descriptor_for(NodeKind::Function, "pkg/foo"), "pkg/foo().");
        assert_eq!(UnifiedSymbol::descriptor_for(NodeKind::Module, "pkg"), "pkg.");
    }
}
