//! Structural intermediate representation: nodes, edges, occurrences, signatures.
//!
//! Built per-file by a [`crate::parsing::LanguageParser`] front end and assembled into a
//! per-repository snapshot by [`builder::IrBuilder`] (SPEC_FULL.md §4.B).

mod builder;
mod node;
mod occurrences;

pub use builder::IrBuilder;
pub use node::{
    CallableKind, Edge, Node, Occurrence, OccurrenceRoles, ResolutionLevel, Signature, Type,
    UnifiedSymbol, EXTERNAL_FILE_MARKER,
};
pub use occurrences::OccurrenceIndex;

use crate::types::{FileId, NodeId};
use std::collections::HashMap;

/// The structural IR for one repository snapshot: every node/edge/occurrence produced
/// across all indexed files, plus the file-path table the builder assigned `FileId`s from.
#[derive(Debug, Default)]
pub struct IrSnapshot {
    pub nodes: HashMap<NodeId, Node>,
    pub edges: Vec<Edge>,
    pub occurrences: OccurrenceIndex,
    pub file_paths: HashMap<FileId, String>,
    pub children: HashMap<NodeId, Vec<NodeId>>,
}

impl IrSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        if let Some(parent) = node.parent {
            self.children.entry(parent).or_default().push(id);
        }
        self.nodes.insert(id, node);
        id
    }

    pub fn insert_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn children_of(&self, parent: NodeId) -> &[NodeId] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edges_from(&self, source: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.source == source)
    }

    pub fn edges_to(&self, target: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.target == target)
    }
}
