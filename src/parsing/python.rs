//! Python front end: `tree_sitter_python` walked into nodes/edges/occurrences.

use std::collections::HashMap;

use tree_sitter::{Node as TsNode, Parser};

use crate::error::{IrError, IrResult};
use crate::ir::{
    CallableKind, Edge, Node, Occurrence, OccurrenceRoles, ResolutionLevel, Signature, Type,
    EXTERNAL_FILE_MARKER,
};
use crate::types::{EdgeKind, Language, NodeId, NodeKind, Span};

use super::{LanguageParser, ParseUnit, MAX_AST_DEPTH};

pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Self {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .expect("tree_sitter_python grammar is ABI-compatible with the linked tree-sitter");
        Self { parser }
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Branch/loop/exception tally collected by `Walker::scan_control_flow` over one
/// function body; folded into a JSON attr rather than a typed `Node` field since only
/// callable nodes carry it.
#[derive(Default)]
struct ControlFlowState {
    branch_count: u32,
    bool_ops: u32,
    has_loop: bool,
    has_try: bool,
    except_types: Vec<String>,
    has_finally: bool,
}

struct Walker<'a> {
    repo_id: &'a str,
    file_path: &'a str,
    module_path: String,
    code: &'a str,
    unit: ParseUnit,
    scope_fqn: Vec<String>,
    scope_id: Vec<NodeId>,
    scope_kind: Vec<NodeKind>,
    call_ordinals: HashMap<(NodeId, NodeId), u32>,
    /// Enclosing class (node id, fqn), pushed by `handle_class`; used to parent Field
    /// nodes and to bind bare `self.field` writes outside `__init__`.
    class_stack: Vec<(NodeId, String)>,
    /// Fields already materialized per class, so a `self.field = …` outside `__init__`
    /// binds to the same Field node the constructor declared.
    class_fields: HashMap<NodeId, HashMap<String, NodeId>>,
    /// Parameter/local variable bindings for the function currently being walked,
    /// pushed in `handle_function` and popped when its body is done.
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
        format!("{}.{}", self.scope_fqn.join("."), name)
    }

    fn push_node(&mut self, kind: NodeKind, name: &str, span: Span) -> NodeId {
        let fqn = self.current_fqn(name);
        let parent = self.scope_id.last().copied();
        let mut node = Node::new(self.repo_id, kind, self.file_path, fqn, name, span);
        if let Some(parent) = parent {
            node = node.with_parent(parent);
            self.unit.edges.push(Edge::new(EdgeKind::Contains, parent, node.id, 0).with_span(span));
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
            "function_definition" => self.handle_function(node, depth),
            "class_definition" => self.handle_class(node, depth),
            "import_statement" => self.handle_import(node),
            "import_from_statement" => self.handle_import_from(node),
            "call" => {
                self.handle_call(node);
                self.recurse_children(node, depth);
            }
            "assignment" | "augmented_assignment" => self.handle_assignment(node, depth),
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
        let in_class = matches!(self.scope_kind.last(), Some(NodeKind::Class));
        let kind = if in_class { NodeKind::Method } else { NodeKind::Function };
        let span = self.span(node);
        let node_id = self.push_node(kind, name, span);

        let signature = Signature {
            params: self.extract_params(node),
            return_type: self.extract_return_type(node),
            kind: if in_class { CallableKind::Method } else { CallableKind::FreeFunction },
            resolution: ResolutionLevel::Local,
        };
        let control_flow = self.control_flow_summary(node);
        if let Some(last) = self.unit.nodes.last_mut() {
            last.attrs.insert(
                "signature".to_string(),
                serde_json::to_value(signature.canonical_string(name)).unwrap_or_default(),
            );
            last.attrs.insert("control_flow".to_string(), control_flow);
            if let Some(doc) = self.extract_docstring(node) {
                last.docstring = Some(doc.into());
            }
        }

        self.unit.occurrences.push(Occurrence::new(
            name,
            self.file_path,
            self.span(name_node),
            OccurrenceRoles::DEFINITION,
        ));

        let is_init = name == "__init__" && in_class;
        if is_init {
            self.emit_init_fields(node);
        }

        self.scope_fqn.push(name.to_string());
        self.scope_id.push(node_id);
        self.scope_kind.push(kind);

        let mut locals = HashMap::new();
        self.emit_parameter_nodes(node, &mut locals);
        self.locals.push(locals);

        if let Some(body) = node.child_by_field_name("body") {
            self.recurse_children(body, depth + 1);
        }

        self.locals.pop();
        self.scope_fqn.pop();
        self.scope_id.pop();
        self.scope_kind.pop();
    }

    /// Emits a Parameter node (tagged `var_kind=parameter`) for every declared
    /// parameter except `self`/`cls`, and registers it so reads/writes inside the body
    /// bind to it.
    fn emit_parameter_nodes(&mut self, node: TsNode, locals: &mut HashMap<String, NodeId>) {
        let Some(params) = node.child_by_field_name("parameters") else {
            return;
        };
        let mut cursor = params.walk();
        for child in params.children(&mut cursor) {
            let name_node = match child.kind() {
                "identifier" => Some(child),
                "typed_parameter" => child.named_child(0),
                "default_parameter" | "typed_default_parameter" => child.child_by_field_name("name"),
                _ => None,
            };
            let Some(name_node) = name_node else {
                continue;
            };
            let name = self.text(name_node);
            if name == "self" || name == "cls" {
                continue;
            }
            let name = name.to_string();
            let span = self.span(name_node);
            let param_id = self.push_node(NodeKind::Parameter, &name, span);
            if let Some(last) = self.unit.nodes.last_mut() {
                last.attrs.insert("var_kind".to_string(), serde_json::Value::String("parameter".to_string()));
            }
            locals.insert(name, param_id);
        }
    }

    /// Walks `self.field = …` assignments directly in an `__init__` body (not into
    /// nested `def`s) and materializes a Field node parented to the enclosing class for
    /// each one found.
    fn emit_init_fields(&mut self, node: TsNode) {
        let Some((class_id, class_fqn)) = self.class_stack.last().cloned() else {
            return;
        };
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        self.collect_self_fields(body, class_id, &class_fqn);
    }

    fn collect_self_fields(&mut self, node: TsNode, class_id: NodeId, class_fqn: &str) {
        if node.kind() == "function_definition" {
            return;
        }
        if node.kind() == "assignment" {
            if let Some(left) = node.child_by_field_name("left") {
                if let Some((_, attr)) = self.self_attribute(left) {
                    let name = self.text(attr).to_string();
                    let span = self.span(attr);
                    self.field_for(class_id, class_fqn, &name, span);
                    self.unit.occurrences.push(Occurrence::new(name, self.file_path, span, OccurrenceRoles::DEFINITION));
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect_self_fields(child, class_id, class_fqn);
        }
    }

    /// Looks up (or lazily creates) the Field node for `class_id.name`, so writes from
    /// outside `__init__` bind to the same node the constructor declared.
    fn field_for(&mut self, class_id: NodeId, class_fqn: &str, name: &str, span: Span) -> NodeId {
        if let Some(&id) = self.class_fields.get(&class_id).and_then(|fields| fields.get(name)) {
            return id;
        }
        let fqn = format!("{class_fqn}.{name}");
        let node = Node::new(self.repo_id, NodeKind::Field, self.file_path, fqn, name, span).with_parent(class_id);
        let id = node.id;
        self.unit.edges.push(Edge::new(EdgeKind::Contains, class_id, id, 0).with_span(span));
        self.unit.nodes.push(node);
        self.class_fields.entry(class_id).or_default().insert(name.to_string(), id);
        id
    }

    /// If `node` is `self.<attr>` (or `cls.<attr>`), returns the object and attribute
    /// sub-nodes.
    fn self_attribute<'b>(&self, node: TsNode<'b>) -> Option<(TsNode<'b>, TsNode<'b>)> {
        if node.kind() != "attribute" {
            return None;
        }
        let object = node.child_by_field_name("object")?;
        let attribute = node.child_by_field_name("attribute")?;
        if object.kind() != "identifier" || !matches!(self.text(object), "self" | "cls") {
            return None;
        }
        Some((object, attribute))
    }

    fn handle_assignment(&mut self, node: TsNode, depth: usize) {
        let Some(left) = node.child_by_field_name("left") else {
            return self.recurse_children(node, depth);
        };
        if self.locals.is_empty() {
            self.walk(left, depth + 1);
        } else {
            match left.kind() {
                "identifier" => self.handle_variable_write(left),
                "attribute" => self.handle_attribute_write(left),
                _ => self.walk(left, depth + 1),
            }
        }
        if let Some(right) = node.child_by_field_name("right") {
            self.walk(right, depth + 1);
        }
        if let Some(type_node) = node.child_by_field_name("type") {
            self.walk(type_node, depth + 1);
        }
    }

    /// Emits a WRITES edge from the current function to the local/parameter `name`
    /// binds to, creating a Variable node (tagged `var_kind=local`) the first time a
    /// name is assigned.
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

    /// Handles `self.field = …` on an assignment's LHS: inside `__init__` the field was
    /// already declared by `emit_init_fields`, so this is a no-op there; elsewhere it
    /// emits a WRITES edge to the class's Field node.
    fn handle_attribute_write(&mut self, attr_node: TsNode) {
        let Some((_, attribute)) = self.self_attribute(attr_node) else {
            return;
        };
        let in_init = self.scope_fqn.last().map(String::as_str) == Some("__init__");
        if in_init {
            return;
        }
        let Some((class_id, class_fqn)) = self.class_stack.last().cloned() else {
            return;
        };
        let Some(&scope_id) = self.scope_id.last() else {
            return;
        };
        let name = self.text(attribute).to_string();
        let span = self.span(attribute);
        let field_id = self.field_for(class_id, &class_fqn, &name, span);
        let ordinal = self.next_call_ordinal(scope_id, field_id);
        self.unit.edges.push(Edge::new(EdgeKind::Writes, scope_id, field_id, ordinal).with_span(span));
        self.unit
            .occurrences
            .push(Occurrence::new(name, self.file_path, span, OccurrenceRoles::WRITE | OccurrenceRoles::REFERENCE));
    }

    /// Emits a READS edge when a bare identifier binds to a parameter or local in the
    /// current function scope; identifiers that aren't local bindings (globals, callee
    /// names, class/module names) are left alone.
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

    /// Cyclomatic complexity (McCabe, extended to count boolean operators), loop/try
    /// presence, branch count, and exception shape over a function's body.
    fn control_flow_summary(&self, node: TsNode) -> serde_json::Value {
        let mut state = ControlFlowState::default();
        if let Some(body) = node.child_by_field_name("body") {
            self.scan_control_flow(body, &mut state);
        }
        serde_json::json!({
            "cyclomatic_complexity": state.branch_count + state.bool_ops + 1,
            "has_loop": state.has_loop,
            "has_try": state.has_try,
            "branch_count": state.branch_count,
            "has_finally": state.has_finally,
            "except_types": state.except_types,
        })
    }

    fn scan_control_flow(&self, node: TsNode, state: &mut ControlFlowState) {
        match node.kind() {
            "function_definition" | "lambda" => return,
            "if_statement" | "elif_clause" | "conditional_expression" => state.branch_count += 1,
            "for_statement" | "while_statement" => {
                state.branch_count += 1;
                state.has_loop = true;
            }
            "try_statement" => state.has_try = true,
            "except_clause" => {
                state.branch_count += 1;
                if let Some(ty) = node.child_by_field_name("type") {
                    state.except_types.push(self.text(ty).to_string());
                }
            }
            "finally_clause" => state.has_finally = true,
            "boolean_operator" => state.bool_ops += 1,
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.scan_control_flow(child, state);
        }
    }

    fn handle_class(&mut self, node: TsNode, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.recurse_children(node, depth);
        };
        let name = self.text(name_node);
        let span = self.span(node);
        let node_id = self.push_node(NodeKind::Class, name, span);
        if let Some(doc) = self.extract_docstring(node) {
            if let Some(last) = self.unit.nodes.last_mut() {
                last.docstring = Some(doc.into());
            }
        }
        self.unit.occurrences.push(Occurrence::new(
            name,
            self.file_path,
            self.span(name_node),
            OccurrenceRoles::DEFINITION,
        ));

        if let Some(bases) = node.child_by_field_name("superclasses") {
            let mut cursor = bases.walk();
            for arg in bases.children(&mut cursor) {
                if arg.kind() == "identifier" {
                    let base_name = self.text(arg);
                    let target = Node::new(
                        self.repo_id,
                        NodeKind::Class,
                        EXTERNAL_FILE_MARKER,
                        base_name,
                        base_name,
                        Span::default(),
                    );
                    let mut edge = Edge::new(EdgeKind::Inherits, node_id, target.id, 0);
                    edge.mark_external();
                    self.unit.edges.push(edge);
                }
            }
        }

        let class_fqn = self.current_fqn(name);
        self.scope_fqn.push(name.to_string());
        self.scope_id.push(node_id);
        self.scope_kind.push(NodeKind::Class);
        self.class_stack.push((node_id, class_fqn));
        self.recurse_children(node, depth + 1);
        self.class_stack.pop();
        self.scope_fqn.pop();
        self.scope_id.pop();
        self.scope_kind.pop();
    }

    /// First statement of the body, if it's a bare string expression (Python docstring
    /// convention), with surrounding quotes stripped.
    fn extract_docstring(&self, node: TsNode) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let mut cursor = body.walk();
        let first = body.children(&mut cursor).find(|n| n.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string_node = first.named_child(0)?;
        if string_node.kind() != "string" {
            return None;
        }
        let text = self.text(string_node);
        Some(text.trim_matches(['"', '\'', '\n', ' ']).to_string())
    }

    fn handle_import(&mut self, node: TsNode) {
        let span = self.span(node);
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if matches!(child.kind(), "dotted_name" | "aliased_import") {
                let (path, alias_name) = self.split_aliased(child);
                self.emit_import(&path, alias_name.as_deref(), span);
            }
        }
    }

    fn handle_import_from(&mut self, node: TsNode) {
        let span = self.span(node);
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let module_path = self.text(module_node);
        let resolved_module = if module_path.starts_with('.') {
            self.resolve_relative(module_path)
        } else {
            module_path.to_string()
        };

        let mut cursor = node.walk();
        let mut saw_name = false;
        for child in node.children(&mut cursor) {
            if matches!(child.kind(), "dotted_name" | "aliased_import")
                && child.byte_range() != module_node.byte_range()
            {
                saw_name = true;
                let (name, alias_name) = self.split_aliased(child);
                let full = format!("{resolved_module}.{name}");
                self.emit_import(&full, alias_name.as_deref(), span);
            } else if child.kind() == "wildcard_import" {
                saw_name = true;
                self.emit_import(&format!("{resolved_module}.*"), None, span);
            }
        }
        if !saw_name {
            self.emit_import(&resolved_module, None, span);
        }
    }

    fn resolve_relative(&self, import_path: &str) -> String {
        let dots = import_path.chars().take_while(|&c| c == '.').count();
        let remaining = import_path[dots..].trim_start_matches('.');
        let mut parts: Vec<&str> = self.module_path.split('.').collect();
        for _ in 0..dots {
            parts.pop();
        }
        if !remaining.is_empty() {
            parts.push(remaining);
        }
        parts.join(".")
    }

    fn split_aliased(&self, node: TsNode) -> (String, Option<String>) {
        if node.kind() == "aliased_import" {
            let name = node
                .child_by_field_name("name")
                .map(|n| self.text(n).to_string())
                .unwrap_or_default();
            let alias = node.child_by_field_name("alias").map(|n| self.text(n).to_string());
            (name, alias)
        } else {
            (self.text(node).to_string(), None)
        }
    }

    fn emit_import(&mut self, path: &str, alias: Option<&str>, span: Span) {
        let name = alias.unwrap_or_else(|| path.rsplit('.').next().unwrap_or(path));
        let import_node = self.push_node(NodeKind::Import, name, span);
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
        self.unit
            .occurrences
            .push(Occurrence::new(path, self.file_path, span, OccurrenceRoles::IMPORT));
    }

    fn handle_call(&mut self, node: TsNode) {
        let Some(function_node) = node.child_by_field_name("function") else {
            return;
        };
        let callee_name = match function_node.kind() {
            "identifier" => self.text(function_node),
            "attribute" => {
                let Some(attr) = function_node.child_by_field_name("attribute") else {
                    return;
                };
                self.text(attr)
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
        self.unit.occurrences.push(Occurrence::new(
            callee_name,
            self.file_path,
            span,
            OccurrenceRoles::CALL | OccurrenceRoles::REFERENCE,
        ));
    }

    fn extract_params(&self, node: TsNode) -> Vec<(String, Type)> {
        let Some(params) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut cursor = params.walk();
        for child in params.children(&mut cursor) {
            match child.kind() {
                "identifier" => result.push((self.text(child).to_string(), Type::Unknown)),
                "typed_parameter" => {
                    let name = child.named_child(0).map(|n| self.text(n).to_string()).unwrap_or_default();
                    let ty = child
                        .child_by_field_name("type")
                        .map(|t| Type::name(self.text(t)))
                        .unwrap_or(Type::Unknown);
                    result.push((name, ty));
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let ty = child
                        .child_by_field_name("type")
                        .map(|t| Type::name(self.text(t)))
                        .unwrap_or(Type::Unknown);
                    result.push((name, ty));
                }
                _ => {}
            }
        }
        result
    }

    fn extract_return_type(&self, node: TsNode) -> Type {
        node.child_by_field_name("return_type")
            .map(|t| Type::name(self.text(t)))
            .unwrap_or(Type::Unknown)
    }
}

impl LanguageParser for PythonParser {
    fn parse(&mut self, repo_id: &str, file_path: &str, source: &str) -> IrResult<ParseUnit> {
        let tree = self.parser.parse(source, None).ok_or_else(|| IrError::BuildFailed {
            path: file_path.into(),
            reason: "tree-sitter failed to produce a parse tree".to_string(),
        })?;

        let module_path = file_path
            .trim_end_matches(".py")
            .trim_end_matches(".pyi")
            .replace(['/', '\\'], ".");

        let mut walker = Walker {
            repo_id,
            file_path,
            module_path: module_path.clone(),
            code: source,
            unit: ParseUnit::default(),
            scope_fqn: vec![module_path.clone()],
            scope_id: Vec::new(),
            scope_kind: vec![NodeKind::Module],
            call_ordinals: HashMap::new(),
            class_stack: Vec::new(),
            class_fields: HashMap::new(),
            locals: Vec::new(),
        };

        let file_node = Node::new(
            repo_id,
            NodeKind::Module,
            file_path,
            &module_path,
            module_path.rsplit('.').next().unwrap_or(&module_path),
            Span::default(),
        );
        walker.scope_id.push(file_node.id);
        walker.unit.nodes.push(file_node);

        walker.walk(tree.root_node(), 0);

        Ok(walker.unit)
    }

    fn language(&self) -> Language {
        Language::Python
    }
}
