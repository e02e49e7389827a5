//! Interned symbol storage: a packed, cache-friendly record per declaration plus a
//! `StringTable` for names, adapted from the teacher's `CompactSymbol` layout to this
//! crate's content-addressed `NodeId`s.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{CompactString, FileId, NodeId, NodeKind, Span};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: NodeId,
    pub name: CompactString,
    pub fqn: CompactString,
    pub kind: NodeKind,
    pub file_id: FileId,
    pub span: Span,
    pub signature: Option<Box<str>>,
}

impl Symbol {
    pub fn new(
        id: NodeId,
        name: impl Into<CompactString>,
        fqn: impl Into<CompactString>,
        kind: NodeKind,
        file_id: FileId,
        span: Span,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            fqn: fqn.into(),
            kind,
            file_id,
            span,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<Box<str>>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn to_compact(&self, string_table: &mut StringTable) -> CompactSymbol {
        let name_offset = string_table.intern(&self.name);
        CompactSymbol {
            name_offset,
            kind: self.kind as u8,
            flags: 0,
            file_id: self.file_id.value(),
            start_line: self.span.start_line,
            start_col: self.span.start_column as u16,
            end_line: self.span.end_line,
            end_col: self.span.end_column as u16,
            _padding: [0; 6],
        }
    }
}

/// A 32-byte packed symbol record, built only when a large snapshot needs to be held
/// in memory densely (the cold-path full `Symbol` carries the FQN and signature text).
#[repr(C, align(32))]
#[derive(Debug, Clone, Copy)]
pub struct CompactSymbol {
    pub name_offset: u32,
    pub kind: u8,
    pub flags: u8,
    pub file_id: u32,
    pub start_line: u32,
    pub start_col: u16,
    pub end_line: u32,
    pub end_col: u16,
    _padding: [u8; 6],
}

pub struct StringTable {
    data: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    pub fn new() -> Self {
        Self { data: vec![0], offsets: HashMap::new() }
    }

    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        self.offsets.insert(s.to_string(), offset);
        offset
    }

    pub fn get(&self, offset: u32) -> Option<&str> {
        let start = offset as usize;
        if start >= self.data.len() {
            return None;
        }
        let end = self.data[start..].iter().position(|&b| b == 0).map(|pos| start + pos)?;
        std::str::from_utf8(&self.data[start..end]).ok()
    }
}

/// Repository-wide symbol lookup by id and by fully-qualified name, the primary port
/// consumed by the symbol index adapter (SPEC_FULL.md §4.G) and the resolver (§4.D).
#[derive(Debug, Default)]
pub struct SymbolStore {
    by_id: HashMap<NodeId, Symbol>,
    by_fqn: HashMap<String, NodeId>,
    by_name: HashMap<String, Vec<NodeId>>,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol) {
        self.by_fqn.insert(symbol.fqn.to_string(), symbol.id);
        self.by_name.entry(symbol.name.to_string()).or_default().push(symbol.id);
        self.by_id.insert(symbol.id, symbol);
    }

    pub fn get(&self, id: NodeId) -> Option<&Symbol> {
        self.by_id.get(&id)
    }

    pub fn resolve_fqn(&self, fqn: &str) -> Option<&Symbol> {
        self.by_fqn.get(fqn).and_then(|id| self.by_id.get(id))
    }

    pub fn find_by_name(&self, name: &str) -> impl Iterator<Item = &Symbol> {
        self.by_name.get(name).into_iter().flatten().map(move |id| &self.by_id[id])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::compact_string;

    fn symbol(fqn: &str, name: &str) -> Symbol {
        let id = NodeId::compute("repo", NodeKind::Function, "a.py", fqn);
        Symbol::new(id, compact_string(name), compact_string(fqn), NodeKind::Function, FileId::new(1).unwrap(), Span::default())
    }

    #[test]
    fn string_table_interns_once_per_distinct_string() {
        let mut table = StringTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        let c = table.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.get(a), Some("foo"));
    }

    #[test]
    fn store_resolves_by_fqn_and_by_name() {
        let mut store = SymbolStore::new();
        store.insert(symbol("pkg.mod.foo", "foo"));
        store.insert(symbol("pkg.other.foo", "foo"));

        assert!(store.resolve_fqn("pkg.mod.foo").is_some());
        assert_eq!(store.find_by_name("foo").count(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn compact_symbol_roundtrips_name_via_string_table() {
        let mut table = StringTable::new();
        let sym = symbol("pkg.foo", "foo");
        let compact = sym.to_compact(&mut table);
        assert_eq!(table.get(compact.name_offset), Some("foo"));
    }
}
