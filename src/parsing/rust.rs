//! Rust front end: `tree_sitter_rust` walked into nodes/edges/occurrences.

use std::collections::HashMap;

use tree_sitter::{Node as TsNode, Parser};

use crate::error::{IrError, IrResult};
use crate::ir::{
    CallableKind, Edge, Node, Occurrence, OccurrenceRoles, ResolutionLevel, Signature, Type,
    EXTERNAL_FILE_MARKER,
};
use crate::types::{EdgeKind, Language, NodeId, NodeKind, Span};

use super::{LanguageParser, ParseUnit, MAX_AST_DEPTH};

pub struct RustParser {
    parser: Parser,
}

impl RustParser {
    pub fn new() -> Self {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .expect("tree_sitter_rust grammar is ABI-compatible with the linked tree-sitter");
        Self { parser }
    }
}

impl Default for RustParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct RustControlFlowState {
    branch_count: u32,
    bool_ops: u32,
    has_loop: bool,
    has_try: bool,
}

/// Scope-stack walker: tracks the enclosing node and module path while recursing so
/// children can compute fully-qualified names without re-walking ancestors.
struct Walker<'a> {
    repo_id: &'a str,
    file_path: &'a str,
    code: &'a str,
    unit: ParseUnit,
    /// FQN of every node currently in scope, outermost first.
    scope_fqn: Vec<String>,
    scope_id: Vec<NodeId>,
    call_ordinals: HashMap<(NodeId, NodeId), u32>,
    /// Parameter/let-binding names in scope for the function currently being walked.
    locals: Vec<HashMap<String, NodeId>>,
}

impl<'a> Walker<'a> {
    fn span(&self, node: TsNode) -> Span {
        Span::new(
            node.start_position().row as u32,
            node.start_position().column as u32,
            node.end_position().row as u32,
            node.end_position().column as u32,
            node.start_byte() as u32,
            node.end_byte() as u32,
        )
    }

    fn text(&self, node: TsNode) -> &'a str {
        &self.code[node.byte_range()]
    }

    fn current_fqn(&self, name: &str) -> String {
        if self.scope_fqn.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", self.scope_fqn.join("::"), name)
        }
    }

    fn current_parent(&self) -> Option<NodeId> {
        self.scope_id.last().copied()
    }

    fn push_node(&mut self, kind: NodeKind, name: &str, span: Span) -> NodeId {
        let fqn = self.current_fqn(name);
        let mut node = Node::new(self.repo_id, kind, self.file_path, fqn, name, span);
        if let Some(parent) = self.current_parent() {
            node = node.with_parent(parent);
            let edge = Edge::new(EdgeKind::Contains, parent, node.id, 0).with_span(span);
            self.unit.edges.push(edge);
        }
        let id = node.id;
        self.unit.nodes.push(node);
        id
    }

    fn next_call_ordinal(&mut self, source: NodeId, target: NodeId) -> u32 {
        let counter = self.call_ordinals.entry((source, target)).or_insert(0);
        let ordinal = *counter;
        *counter += 1;
        ordinal
    }

    fn walk(&mut self, node: TsNode, depth: usize) {
        if depth > MAX_AST_DEPTH {
            return;
        }
        match node.kind() {
            "function_item" => self.handle_function(node, depth),
            "struct_item" => self.handle_container(node, NodeKind::Class, depth),
            "enum_item" => self.handle_container(node, NodeKind::Enum, depth),
            "trait_item" => self.handle_container(node, NodeKind::Interface, depth),
            "impl_item" => self.handle_impl(node, depth),
            "use_declaration" => self.handle_use(node),
            "call_expression" => {
                self.handle_call(node);
                self.recurse_children(node, depth);
            }
            "let_declaration" => self.handle_let(node, depth),
            "assignment_expression" => self.handle_assignment(node, depth),
            "identifier" => self.handle_identifier_read(node),
            _ => self.recurse_children(node, depth),
        }
    }

    fn recurse_children(&mut self, node: TsNode, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child, depth + 1);
        }
    }

    fn handle_function(&mut self, node: TsNode, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.recurse_children(node, depth);
        };
        let name = self.text(name_node);
        let in_impl = self.scope_fqn.last().is_some() && self.current_parent_is_impl();
        let kind = if in_impl { NodeKind::Method } else { NodeKind::Function };
        let span = self.span(node);
        let node_id = self.push_node(kind, name, span);

        let callable_kind = if in_impl { CallableKind::Method } else { CallableKind::FreeFunction };
        let signature = Signature {
            params: self.extract_params(node),
            return_type: self.extract_return_type(node),
            kind: callable_kind,
            resolution: ResolutionLevel::Local,
        };
        let control_flow = self.control_flow_summary(node);
        if let Some(last) = self.unit.nodes.last_mut() {
            last.attrs.insert(
                "signature".to_string(),
                serde_json::to_value(&signature.canonical_string(name)).unwrap_or_default(),
            );
            last.attrs.insert("control_flow".to_string(), control_flow);
        }

        self.unit.occurrences.push(Occurrence::new(
            name,
            self.file_path,
            self.span(name_node),
            OccurrenceRoles::DEFINITION,
        ));

        self.scope_fqn.push(name.to_string());
        self.scope_id.push(node_id);

        let mut locals = HashMap::new();
        self.emit_parameter_nodes(node, &mut locals);
        self.locals.push(locals);

        if let Some(body) = node.child_by_field_name("body") {
            self.recurse_children(body, depth + 1);
        }

        self.locals.pop();
        self.scope_fqn.pop();
        self.scope_id.pop();
    }

    /// Emits a Parameter node (tagged `var_kind=parameter`) for every declared
    /// parameter except `self`, registering it so reads/writes in the body bind to it.
    fn emit_parameter_nodes(&mut self, node: TsNode, locals: &mut HashMap<String, NodeId>) {
        let Some(params) = node.child_by_field_name("parameters") else {
            return;
        };
        let mut cursor = params.walk();
        for child in params.children(&mut cursor) {
            if child.kind() != "parameter" {
                continue;
            }
            let Some(pattern) = child.child_by_field_name("pattern") else {
                continue;
            };
            if pattern.kind() != "identifier" {
                continue;
            }
            let name = self.text(pattern).to_string();
            let span = self.span(pattern);
            let param_id = self.push_node(NodeKind::Parameter, &name, span);
            if let Some(last) = self.unit.nodes.last_mut() {
                last.attrs.insert("var_kind".to_string(), serde_json::Value::String("parameter".to_string()));
            }
            locals.insert(name, param_id);
        }
    }

    /// `let name = value;`: emits a Variable node (tagged `var_kind=local`) and a
    /// WRITES edge from the enclosing function to it.
    fn handle_let(&mut self, node: TsNode, depth: usize) {
        let Some(pattern) = node.child_by_field_name("pattern") else {
            return self.recurse_children(node, depth);
        };
        if pattern.kind() == "identifier" {
            self.handle_variable_write(pattern);
        } else {
            self.walk(pattern, depth + 1);
        }
        if let Some(value) = node.child_by_field_name("value") {
            self.walk(value, depth + 1);
        }
    }

    /// `name = value;`: rebinds an existing local/parameter, emitting a WRITES edge.
    fn handle_assignment(&mut self, node: TsNode, depth: usize) {
        let Some(left) = node.child_by_field_name("left") else {
            return self.recurse_children(node, depth);
        };
        if left.kind() == "identifier" {
            self.handle_variable_write(left);
        } else {
            self.walk(left, depth + 1);
        }
        if let Some(right) = node.child_by_field_name("right") {
            self.walk(right, depth + 1);
        }
    }

    fn handle_variable_write(&mut self, name_node: TsNode) {
        let name = self.text(name_node).to_string();
        let Some(&scope_id) = self.scope_id.last() else {
            return;
        };
        let span = self.span(name_node);
        let existing = self.locals.last().and_then(|locals| locals.get(&name)).copied();
        let var_id = match existing {
            Some(id) => id,
            None => {
                let id = self.push_node(NodeKind::Variable, &name, span);
                if let Some(last) = self.unit.nodes.last_mut() {
                    last.attrs.insert("var_kind".to_string(), serde_json::Value::String("local".to_string()));
                }
                if let Some(locals) = self.locals.last_mut() {
                    locals.insert(name.clone(), id);
                }
                id
            }
        };
        let ordinal = self.next_call_ordinal(scope_id, var_id);
        self.unit.edges.push(Edge::new(EdgeKind::Writes, scope_id, var_id, ordinal).with_span(span));
        self.unit
            .occurrences
            .push(Occurrence::new(name, self.file_path, span, OccurrenceRoles::WRITE | OccurrenceRoles::REFERENCE));
    }

    fn handle_identifier_read(&mut self, node: TsNode) {
        let name = self.text(node);
        let Some(&var_id) = self.locals.last().and_then(|locals| locals.get(name)) else {
            return;
        };
        let Some(&scope_id) = self.scope_id.last() else {
            return;
        };
        let name = name.to_string();
        let span = self.span(node);
        let ordinal = self.next_call_ordinal(scope_id, var_id);
        self.unit.edges.push(Edge::new(EdgeKind::Reads, scope_id, var_id, ordinal).with_span(span));
        self.unit
            .occurrences
            .push(Occurrence::new(name, self.file_path, span, OccurrenceRoles::READ | OccurrenceRoles::REFERENCE));
    }

    /// Cyclomatic complexity, loop/try presence and branch count over a function body,
    /// mirroring the Python front end's control-flow summary (match arms stand in for
    /// `except` clauses; `?` isn't counted as a branch since it doesn't fork control
    /// flow the way `match`/`if`/loops do).
    fn control_flow_summary(&self, node: TsNode) -> serde_json::Value {
        let mut state = RustControlFlowState::default();
        if let Some(body) = node.child_by_field_name("body") {
            self.scan_control_flow(body, &mut state);
        }
        serde_json::json!({
            "cyclomatic_complexity": state.branch_count + state.bool_ops + 1,
            "has_loop": state.has_loop,
            "has_try": state.has_try,
            "branch_count": state.branch_count,
        })
    }

    fn scan_control_flow(&self, node: TsNode, state: &mut RustControlFlowState) {
        match node.kind() {
            "function_item" | "closure_expression" => return,
            "if_expression" | "if_let_expression" => state.branch_count += 1,
            "match_arm" => state.branch_count += 1,
            "loop_expression" | "while_expression" | "while_let_expression" | "for_expression" => {
                state.branch_count += 1;
                state.has_loop = true;
            }
            "try_expression" => state.has_try = true,
            "binary_expression" => {
                if matches!(self.text(node.child_by_field_name("operator").unwrap_or(node)), "&&" | "||") {
                    state.bool_ops += 1;
                }
            }
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.scan_control_flow(child, state);
        }
    }

    fn current_parent_is_impl(&self) -> bool {
        // Tracked indirectly: handle_impl pushes the type's fqn as scope before recursing
        // into its function_items, so any function whose immediate scope came from an
        // impl block is a method. We approximate via an attrs marker set by handle_impl.
        self.scope_id
            .last()
            .map(|id| {
                self.unit
                    .nodes
                    .iter()
                    .find(|n| n.id == *id)
                    .map(|n| n.attrs.contains_key("is_impl_scope"))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    fn handle_container(&mut self, node: TsNode, kind: NodeKind, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.recurse_children(node, depth);
        };
        let name = self.text(name_node);
        let span = self.span(node);
        let node_id = self.push_node(kind, name, span);
        self.unit.occurrences.push(Occurrence::new(
            name,
            self.file_path,
            self.span(name_node),
            OccurrenceRoles::DEFINITION,
        ));

        if kind == NodeKind::Interface {
            self.record_supertraits(node, node_id);
        }

        self.scope_fqn.push(name.to_string());
        self.scope_id.push(node_id);
        self.recurse_children(node, depth + 1);
        self.scope_fqn.pop();
        self.scope_id.pop();
    }

    fn record_supertraits(&mut self, node: TsNode, trait_id: NodeId) {
        if let Some(bounds) = node.child_by_field_name("bounds") {
            let text = self.text(bounds);
            for name in text.split('+').map(str::trim).filter(|s| !s.is_empty()) {
                let target = Node::new(
                    self.repo_id,
                    NodeKind::Interface,
                    EXTERNAL_FILE_MARKER,
                    name,
                    name,
                    Span::default(),
                );
                let mut edge = Edge::new(EdgeKind::Inherits, trait_id, target.id, 0);
                edge.mark_external();
                self.unit.edges.push(edge);
            }
        }
    }

    fn handle_impl(&mut self, node: TsNode, depth: usize) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return self.recurse_children(node, depth);
        };
        let type_name = self.text(type_node).to_string();
        let trait_name = node.child_by_field_name("trait").map(|t| self.text(t).to_string());

        // Find (or synthesize a forward reference to) the struct/enum this impl extends;
        // resolution happens at cross-file resolve time since the type may be declared
        // later in the same file or in another file entirely.
        let type_fqn = self.current_fqn(&type_name);
        let marker_node = Node::new(
            self.repo_id,
            NodeKind::Class,
            self.file_path,
            &type_fqn,
            &type_name,
            Span::default(),
        );

        if let Some(trait_name) = &trait_name {
            let trait_marker = Node::new(
                self.repo_id,
                NodeKind::Interface,
                EXTERNAL_FILE_MARKER,
                trait_name,
                trait_name,
                Span::default(),
            );
            let mut edge = Edge::new(EdgeKind::Inherits, marker_node.id, trait_marker.id, 0);
            edge.mark_external();
            self.unit.edges.push(edge);
        }

        // Methods declared in this impl belong to the type's scope but are marked so
        // `handle_function` classifies them as Method rather than Function.
        self.scope_fqn.push(type_name);
        let mut scope_marker = marker_node.clone();
        scope_marker.attrs.insert("is_impl_scope".to_string(), serde_json::Value::Bool(true));
        self.scope_id.push(scope_marker.id);
        self.unit.nodes.push(scope_marker);
        self.recurse_children(node, depth + 1);
        self.scope_fqn.pop();
        self.scope_id.pop();
    }

    fn handle_use(&mut self, node: TsNode) {
        if let Some(tree) = node.children(&mut node.walk()).find(|n| n.kind() == "use_tree") {
            self.collect_use_tree(tree, String::new());
        }
    }

    fn collect_use_tree(&mut self, node: TsNode, prefix: String) {
        let mut path = prefix.clone();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "identifier" | "scoped_identifier" => {
                    let segment = self.text(child);
                    if !path.is_empty() {
                        path.push_str("::");
                    }
                    path.push_str(segment);
                }
                "use_wildcard" => {
                    self.emit_import(&path, node);
                    return;
                }
                "use_list" => {
                    let mut inner = child.walk();
                    for item in child.children(&mut inner) {
                        if item.kind() == "use_tree" {
                            self.collect_use_tree(item, path.clone());
                        }
                    }
                    return;
                }
                _ => {}
            }
        }
        if !path.is_empty() && path != prefix {
            self.emit_import(&path, node);
        }
    }

    fn emit_import(&mut self, path: &str, node: TsNode) {
        let span = self.span(node);
        let name = path.rsplit("::").next().unwrap_or(path);
        let fqn = self.current_fqn(&format!("use:{path}"));
        let import_node = self.push_node(NodeKind::Import, name, span);
        let _ = fqn;
        let target = Node::new(
            self.repo_id,
            NodeKind::Module,
            EXTERNAL_FILE_MARKER,
            path,
            name,
            Span::default(),
        );
        let mut edge = Edge::new(EdgeKind::Imports, import_node, target.id, 0);
        edge.mark_external();
        self.unit.edges.push(edge);
        self.unit.occurrences.push(Occurrence::new(path, self.file_path, span, OccurrenceRoles::IMPORT));
    }

    fn handle_call(&mut self, node: TsNode) {
        let Some(function_node) = node.child_by_field_name("function") else {
            return;
        };
        let callee_name = match function_node.kind() {
            "identifier" => self.text(function_node),
            "field_expression" => {
                let Some(field) = function_node.child_by_field_name("field") else {
                    return;
                };
                self.text(field)
            }
            _ => return,
        };
        let Some(&caller_id) = self.scope_id.last() else {
            return;
        };
        let span = self.span(node);
        let target = Node::new(
            self.repo_id,
            NodeKind::Function,
            EXTERNAL_FILE_MARKER,
            callee_name,
            callee_name,
            Span::default(),
        );
        let ordinal = self.next_call_ordinal(caller_id, target.id);
        let mut edge = Edge::new(EdgeKind::Calls, caller_id, target.id, ordinal).with_span(span);
        edge.mark_external();
        self.unit.edges.push(edge);
        self.unit
            .occurrences
            .push(Occurrence::new(callee_name, self.file_path, span, OccurrenceRoles::CALL | OccurrenceRoles::REFERENCE));
    }

    fn extract_params(&self, node: TsNode) -> Vec<(String, Type)> {
        let Some(params) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut cursor = params.walk();
        for child in params.children(&mut cursor) {
            if child.kind() != "parameter" {
                continue;
            }
            let name = child
                .child_by_field_name("pattern")
                .map(|p| self.text(p).to_string())
                .unwrap_or_default();
            let ty = child
                .child_by_field_name("type")
                .map(|t| Type::name(self.text(t)))
                .unwrap_or(Type::Unknown);
            result.push((name, ty));
        }
        result
    }

    fn extract_return_type(&self, node: TsNode) -> Type {
        node.child_by_field_name("return_type")
            .map(|t| Type::name(self.text(t)))
            .unwrap_or_else(|| Type::name("()"))
    }
}

impl LanguageParser for RustParser {
    fn parse(&mut self, repo_id: &str, file_path: &str, source: &str) -> IrResult<ParseUnit> {
        let tree = self.parser.parse(source, None).ok_or_else(|| IrError::BuildFailed {
            path: file_path.into(),
            reason: "tree-sitter failed to produce a parse tree".to_string(),
        })?;

        let file_name = std::path::Path::new(file_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_path)
            .to_string();

        let mut walker = Walker {
            repo_id,
            file_path,
            code: source,
            unit: ParseUnit::default(),
            scope_fqn: vec![file_name.clone()],
            scope_id: Vec::new(),
            call_ordinals: HashMap::new(),
            locals: Vec::new(),
        };

        let file_node = Node::new(
            repo_id,
            NodeKind::File,
            file_path,
            &file_name,
            &file_name,
            Span::default(),
        );
        walker.scope_id.push(file_node.id);
        walker.unit.nodes.push(file_node);

        walker.walk(tree.root_node(), 0);

        Ok(walker.unit)
    }

    fn language(&self) -> Language {
        Language::Rust
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ParseUnit {
        RustParser::new().parse("repo", "a.rs", src).unwrap()
    }

    #[test]
    fn free_function_is_emitted() {
        let unit = parse("fn greet() {}\n");
        assert!(unit.nodes.iter().any(|n| n.kind == NodeKind::Function && n.name.as_ref() == "greet"));
    }

    #[test]
    fn struct_and_impl_method_is_classified_as_method() {
        let src = "struct Foo;\nimpl Foo {\n    fn bar(&self) {}\n}\n";
        let unit = parse(src);
        assert!(unit.nodes.iter().any(|n| n.kind == NodeKind::Class && n.name.as_ref() == "Foo"));
        assert!(unit.nodes.iter().any(|n| n.kind == NodeKind::Method && n.name.as_ref() == "bar"));
    }

    #[test]
    fn call_inside_function_produces_external_calls_edge() {
        let src = "fn caller() {\n    callee();\n}\n";
        let unit = parse(src);
        assert!(unit.edges.iter().any(|e| e.kind == EdgeKind::Calls && e.is_external()));
    }

    #[test]
    fn use_declaration_produces_import_node_and_edge() {
        let src = "use std::collections::HashMap;\n";
        let unit = parse(src);
        assert!(unit.nodes.iter().any(|n| n.kind == NodeKind::Import));
        assert!(unit.edges.iter().any(|e| e.kind == EdgeKind::Imports));
    }

    #[test]
    fn trait_bound_produces_external_inherits_edge() {
        let src = "trait Sub: Base {}\n";
        let unit = parse(src);
        assert!(unit.edges.iter().any(|e| e.kind == EdgeKind::Inherits && e.is_external()));
    }

    #[test]
    fn function_signature_attr_is_canonical_string() {
        let src = "fn add(x: i32, y: i32) -> i32 { x + y }\n";
        let unit = parse(src);
        let func = unit.nodes.iter().find(|n| n.name.as_ref() == "add").unwrap();
        let sig = func.attrs.get("signature").unwrap().as_str().unwrap();
        assert!(sig.contains("i32"));
    }

    #[test]
    fn parameter_is_emitted_and_tagged() {
        let src = "fn add(x: i32, y: i32) -> i32 { x + y }\n";
        let unit = parse(src);
        let param = unit.nodes.iter().find(|n| n.kind == NodeKind::Parameter && n.name.as_ref() == "x").unwrap();
        assert_eq!(param.attrs.get("var_kind").unwrap().as_str().unwrap(), "parameter");
    }

    #[test]
    fn self_receiver_is_not_emitted_as_a_parameter() {
        let src = "struct Foo;\nimpl Foo {\n    fn bar(&self) {}\n}\n";
        let unit = parse(src);
        assert!(!unit.nodes.iter().any(|n| n.kind == NodeKind::Parameter));
    }

    #[test]
    fn local_let_binding_emits_variable_and_writes_edge() {
        let src = "fn run() {\n    let total = 0;\n}\n";
        let unit = parse(src);
        let var = unit.nodes.iter().find(|n| n.kind == NodeKind::Variable && n.name.as_ref() == "total").unwrap();
        assert_eq!(var.attrs.get("var_kind").unwrap().as_str().unwrap(), "local");
        assert!(unit.edges.iter().any(|e| e.kind == EdgeKind::Writes && e.target == var.id));
    }

    #[test]
    fn reading_a_parameter_emits_reads_edge() {
        let src = "fn add(x: i32, y: i32) -> i32 { x + y }\n";
        let unit = parse(src);
        let param = unit.nodes.iter().find(|n| n.kind == NodeKind::Parameter && n.name.as_ref() == "x").unwrap();
        assert!(unit.edges.iter().any(|e| e.kind == EdgeKind::Reads && e.target == param.id));
    }

    #[test]
    fn reassigning_a_local_reuses_the_existing_variable_node() {
        let src = "fn run() {\n    let mut total = 0;\n    total = 1;\n}\n";
        let unit = parse(src);
        let vars: Vec<_> = unit.nodes.iter().filter(|n| n.kind == NodeKind::Variable && n.name.as_ref() == "total").collect();
        assert_eq!(vars.len(), 1);
        assert_eq!(unit.edges.iter().filter(|e| e.kind == EdgeKind::Writes && e.target == vars[0].id).count(), 2);
    }

    #[test]
    fn function_control_flow_summary_reports_branches_and_loop() {
        let src = "fn run(x: i32) {\n    if x > 0 {\n        for i in 0..x {\n            println!(\"{i}\");\n        }\n    }\n}\n";
        let unit = parse(src);
        let func = unit.nodes.iter().find(|n| n.name.as_ref() == "run").unwrap();
        let cf = func.attrs.get("control_flow").unwrap();
        assert!(cf["has_loop"].as_bool().unwrap());
        assert!(cf["branch_count"].as_u64().unwrap() >= 2);
    }
}
