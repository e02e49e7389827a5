//! Flow-sensitive type narrowing at Python branch points (SPEC_FULL.md §4.E). Extracts
//! `isinstance`/`is None`/truthy facts from `if` conditions and propagates branch-local
//! `TypeState`s forward, merging by set-union at the join point after the branch.

use std::collections::HashMap;

use tree_sitter::{Node as TsNode, Parser};

use crate::ir::Type;
use crate::types::Span;

/// Variable -> possible-types mapping at one point in the control flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeState {
    types: HashMap<String, Type>,
}

impl TypeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn narrow(&mut self, variable: &str, ty: Type) {
        self.types.insert(variable.to_string(), ty);
    }

    pub fn get(&self, variable: &str) -> Option<&Type> {
        self.types.get(variable)
    }

    /// Join two states reached from different branches: a variable's type at the merge
    /// point is the union of what it could be coming from either side.
    pub fn merge(&self, other: &TypeState) -> TypeState {
        let mut merged = self.clone();
        for (var, other_ty) in &other.types {
            match merged.types.remove(var) {
                Some(existing) if existing == *other_ty => {
                    merged.types.insert(var.clone(), existing);
                }
                Some(existing) => {
                    merged.types.insert(var.clone(), union_of(existing, other_ty.clone()));
                }
                None => {
                    merged.types.insert(var.clone(), other_ty.clone());
                }
            }
        }
        merged
    }
}

fn union_of(a: Type, b: Type) -> Type {
    let mut members = match a {
        Type::Union(members) => members,
        other => vec![other],
    };
    match b {
        Type::Union(others) => {
            for m in others {
                if !members.contains(&m) {
                    members.push(m);
                }
            }
        }
        other => {
            if !members.contains(&other) {
                members.push(other);
            }
        }
    }
    if members.len() == 1 {
        members.into_iter().next().unwrap()
    } else {
        Type::Union(members)
    }
}

/// A narrowed type attached to one read of a variable within a branch, reported back so
/// the occurrence index can record a narrower type than the variable's declared one.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrowedRead {
    pub variable: String,
    pub span: Span,
    pub narrowed_type: Type,
}

pub struct NarrowingAnalyzer {
    parser: Parser,
}

impl NarrowingAnalyzer {
    pub fn new_python() -> Self {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .expect("tree_sitter_python grammar is ABI-compatible with the linked tree-sitter");
        Self { parser }
    }

    pub fn analyze(&mut self, source: &str) -> Vec<NarrowedRead> {
        let Some(tree) = self.parser.parse(source, None) else {
            return Vec::new();
        };
        let mut reads = Vec::new();
        let state = TypeState::new();
        walk_block(tree.root_node(), source, &state, &mut reads);
        reads
    }
}

impl Default for NarrowingAnalyzer {
    fn default() -> Self {
        Self::new_python()
    }
}

/// Thread `state` forward through a sequence of statements (module/function/branch body),
/// recording narrowed reads as they're found and re-merging after each `if`.
fn walk_block(node: TsNode, source: &str, state: &TypeState, reads: &mut Vec<NarrowedRead>) {
    let mut current = state.clone();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "if_statement" => {
                current = walk_if(child, source, &current, reads);
            }
            _ => collect_identifier_reads(child, source, &current, reads),
        }
    }
}

fn text<'a>(node: TsNode, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

fn span(node: TsNode) -> Span {
    Span::new(
        node.start_position().row as u32,
        node.start_position().column as u32,
        node.end_position().row as u32,
        node.end_position().column as u32,
        node.start_byte() as u32,
        node.end_byte() as u32,
    )
}

/// Extract the then/else facts from an `if_statement`'s condition, walk each branch body
/// with its narrowed state, and return the merged state for the statements that follow.
fn walk_if(node: TsNode, source: &str, state: &TypeState, reads: &mut Vec<NarrowedRead>) -> TypeState {
    let Some(condition) = node.child_by_field_name("condition") else {
        return state.clone();
    };
    let fact = extract_fact(condition, source, state);

    let mut then_state = state.clone();
    if let Some(fact) = &fact {
        then_state.narrow(&fact.variable, fact.then_type.clone());
    }
    if let Some(consequence) = node.child_by_field_name("consequence") {
        walk_block(consequence, source, &then_state, reads);
    }

    let mut else_state = state.clone();
    if let Some(fact) = &fact {
        else_state.narrow(&fact.variable, fact.else_type.clone());
    }
    let mut else_reached = false;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "elif_clause" => {
                if let Some(body) = child.child_by_field_name("consequence") {
                    walk_block(body, source, &else_state, reads);
                }
                else_reached = true;
            }
            "else_clause" => {
                if let Some(body) = child.child_by_field_name("body") {
                    walk_block(body, source, &else_state, reads);
                }
                else_reached = true;
            }
            _ => {}
        }
    }
    let _ = else_reached;

    then_state.merge(&else_state)
}

struct NarrowingFact {
    variable: String,
    then_type: Type,
    else_type: Type,
}

/// Recognize `isinstance(x, T)`, `x is None`, `x is not None`, and bare-identifier
/// truthy conditions (SPEC_FULL.md §4.E's table); anything else yields no fact.
fn extract_fact(condition: TsNode, source: &str, state: &TypeState) -> Option<NarrowingFact> {
    match condition.kind() {
        "call" => extract_isinstance(condition, source),
        "comparison_operator" => extract_is_none(condition, source, state),
        "identifier" => {
            let variable = text(condition, source).to_string();
            let current = state.get(&variable).cloned().unwrap_or(Type::Unknown);
            let none_ty = Type::name("None");
            Some(NarrowingFact {
                then_type: current.without(&none_ty),
                else_type: none_ty,
                variable,
            })
        }
        "not_operator" => {
            let argument = condition.child_by_field_name("argument")?;
            let inner = extract_fact(argument, source, state)?;
            Some(NarrowingFact {
                variable: inner.variable,
                then_type: inner.else_type,
                else_type: inner.then_type,
            })
        }
        _ => None,
    }
}

fn extract_isinstance(call: TsNode, source: &str) -> Option<NarrowingFact> {
    let function = call.child_by_field_name("function")?;
    if function.kind() != "identifier" || text(function, source) != "isinstance" {
        return None;
    }
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    let positional: Vec<TsNode> = args
        .children(&mut cursor)
        .filter(|n| !matches!(n.kind(), "(" | ")" | ","))
        .collect();
    let (var_node, type_node) = (positional.first()?, positional.get(1)?);
    let variable = text(*var_node, source).to_string();
    let narrowed = Type::name(text(*type_node, source));
    // Without full union tracking at the declaration site, the else-branch fact
    // (`Union{...} \ T`) degrades to Unknown rather than a precise complement.
    Some(NarrowingFact { then_type: narrowed, else_type: Type::Unknown, variable })
}

fn extract_is_none(comparison: TsNode, source: &str, state: &TypeState) -> Option<NarrowingFact> {
    // `comparison_operator` has no `left`/`right` fields, only a repeated `operators`
    // field over the operator tokens; operands are the surrounding positional children.
    let left = comparison.child(0)?;
    let right = comparison.child(2)?;
    let operator = comparison.child_by_field_name("operators")?;
    let op_text = text(operator, source);
    if left.kind() != "identifier" || text(right, source) != "None" || (op_text != "is" && op_text != "is not") {
        return None;
    }
    let is_negated = op_text == "is not";
    let variable = text(left, source).to_string();
    let current = state.get(&variable).cloned().unwrap_or(Type::Unknown);
    let none_ty = Type::name("None");
    if is_negated {
        Some(NarrowingFact { then_type: current.without(&none_ty), else_type: none_ty, variable })
    } else {
        Some(NarrowingFact { then_type: none_ty.clone(), else_type: current.without(&none_ty), variable })
    }
}

/// Scan a subtree for bare reads of any variable the current state has narrowed,
/// recording the narrowing if it's non-trivial relative to an unqualified reference.
fn collect_identifier_reads(node: TsNode, source: &str, state: &TypeState, reads: &mut Vec<NarrowedRead>) {
    if node.kind() == "identifier" {
        let name = text(node, source);
        if let Some(ty) = state.get(name) {
            reads.push(NarrowedRead { variable: name.to_string(), span: span(node), narrowed_type: ty.clone() });
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "if_statement" {
            // Nested `if`s are handled by `walk_block`'s own dispatch when this subtree
            // is itself a block; skip here to avoid double-counting their bodies.
            continue;
        }
        collect_identifier_reads(child, source, state, reads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isinstance_narrows_then_branch_to_named_type() {
        let source = "def f(x):\n    if isinstance(x, Foo):\n        x\n";
        let mut analyzer = NarrowingAnalyzer::new_python();
        let reads = analyzer.analyze(source);
        assert!(reads.iter().any(|r| r.variable == "x" && r.narrowed_type == Type::name("Foo")));
    }

    #[test]
    fn is_none_narrows_then_branch_to_none() {
        let source = "def f(x):\n    if x is None:\n        x\n";
        let mut analyzer = NarrowingAnalyzer::new_python();
        let reads = analyzer.analyze(source);
        assert!(reads.iter().any(|r| r.variable == "x" && r.narrowed_type == Type::name("None")));
    }

    #[test]
    fn is_not_none_narrows_else_branch_to_none() {
        let source = "def f(x):\n    if x is not None:\n        pass\n    else:\n        x\n";
        let mut analyzer = NarrowingAnalyzer::new_python();
        let reads = analyzer.analyze(source);
        assert!(reads.iter().any(|r| r.variable == "x" && r.narrowed_type == Type::name("None")));
    }

    #[test]
    fn truthy_condition_narrows_then_branch_away_from_none() {
        let source = "def f(x):\n    if x:\n        x\n";
        let mut analyzer = NarrowingAnalyzer::new_python();
        let reads = analyzer.analyze(source);
        assert!(reads.iter().any(|r| r.variable == "x" && r.narrowed_type != Type::name("None")));
    }

    #[test]
    fn merge_of_matching_branch_types_is_stable() {
        let mut a = TypeState::new();
        a.narrow("x", Type::name("Foo"));
        let mut b = TypeState::new();
        b.narrow("x", Type::name("Foo"));
        let merged = a.merge(&b);
        assert_eq!(merged.get("x"), Some(&Type::name("Foo")));
    }

    #[test]
    fn merge_of_differing_branch_types_produces_union() {
        let mut a = TypeState::new();
        a.narrow("x", Type::name("Foo"));
        let mut b = TypeState::new();
        b.narrow("x", Type::name("None"));
        let merged = a.merge(&b);
        assert_eq!(merged.get("x"), Some(&Type::Union(vec![Type::name("Foo"), Type::name("None")])));
    }
}
