//! TypeScript/JavaScript front end: one extraction pass parameterized by the grammar,
//! since the two differ only in type-annotation nodes that this IR doesn't keep typed.

use std::collections::HashMap;

use tree_sitter::{Node as TsNode, Parser};

use crate::error::{IrError, IrResult};
use crate::ir::{
    CallableKind, Edge, Node, Occurrence, OccurrenceRoles, ResolutionLevel, Signature, Type,
    EXTERNAL_FILE_MARKER,
};
use crate::types::{EdgeKind, Language, NodeId, NodeKind, Span};

use super::{LanguageParser, ParseUnit, MAX_AST_DEPTH};

pub struct EcmaScriptParser {
    parser: Parser,
    language: Language,
}

impl EcmaScriptParser {
    pub fn typescript() -> Self {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .expect("tree_sitter_typescript grammar is ABI-compatible with the linked tree-sitter");
        Self { parser, language: Language::TypeScript }
    }

    pub fn javascript() -> Self {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .expect("tree_sitter_javascript grammar is ABI-compatible with the linked tree-sitter");
        Self { parser, language: Language::JavaScript }
    }
}

struct Walker<'a> {
    repo_id: &'a str,
    file_path: &'a str,
    code: &'a str,
    unit: ParseUnit,
    scope_fqn: Vec<String>,
    scope_id: Vec<NodeId>,
    scope_kind: Vec<NodeKind>,
    call_ordinals: HashMap<(NodeId, NodeId), u32>,
    /// Parameter/local-binding names in scope for the function currently being walked.
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
            "function_declaration" | "generator_function_declaration" => {
                self.handle_function(node, depth, NodeKind::Function)
            }
            "class_declaration" => self.handle_class(node, depth),
            "method_definition" => self.handle_function(node, depth, NodeKind::Method),
            "import_statement" => self.handle_import(node),
            "export_statement" => self.recurse_children(node, depth),
            "call_expression" => {
                self.handle_call(node);
                self.recurse_children(node, depth);
            }
            "variable_declarator" => {
                self.handle_variable_declarator(node, depth);
            }
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

    fn handle_function(&mut self, node: TsNode, depth: usize, kind: NodeKind) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.recurse_children(node, depth);
        };
        let name = self.text(name_node);
        let span = self.span(node);
        let node_id = self.push_node(kind, name, span);

        let signature = Signature {
            params: self.extract_params(node),
            return_type: self.extract_return_type(node),
            kind: if kind == NodeKind::Method { CallableKind::Method } else { CallableKind::FreeFunction },
            resolution: ResolutionLevel::Local,
        };
        if let Some(last) = self.unit.nodes.last_mut() {
            last.attrs.insert(
                "signature".to_string(),
                serde_json::to_value(signature.canonical_string(name)).unwrap_or_default(),
            );
        }

        self.unit.occurrences.push(Occurrence::new(
            name,
            self.file_path,
            self.span(name_node),
            OccurrenceRoles::DEFINITION,
        ));

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

    /// Emits a Parameter node (tagged `var_kind=parameter`) for each declared parameter
    /// so reads/writes of it in the body bind to a real node instead of going external.
    fn emit_parameter_nodes(&mut self, node: TsNode, locals: &mut HashMap<String, NodeId>) {
        let Some(params) = node.child_by_field_name("parameters") else {
            return;
        };
        let mut cursor = params.walk();
        for child in params.children(&mut cursor) {
            let name_node = match child.kind() {
                "identifier" => child,
                "required_parameter" | "optional_parameter" => {
                    match child.child_by_field_name("pattern") {
                        Some(p) if p.kind() == "identifier" => p,
                        _ => continue,
                    }
                }
                _ => continue,
            };
            let name = self.text(name_node).to_string();
            let span = self.span(name_node);
            let param_id = self.push_node(NodeKind::Parameter, &name, span);
            if let Some(last) = self.unit.nodes.last_mut() {
                last.attrs.insert("var_kind".to_string(), serde_json::Value::String("parameter".to_string()));
            }
            locals.insert(name, param_id);
        }
    }

    /// `const f = (x) => x`: an arrow function bound to a top-level `const` is a free
    /// function for retrieval purposes, matching the common module-exports pattern.
    /// Any other declarator (`const total = 0`) inside a function body is a local
    /// variable: emits a Variable node and a WRITES edge.
    fn handle_variable_declarator(&mut self, node: TsNode, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.recurse_children(node, depth);
        };
        let Some(value_node) = node.child_by_field_name("value") else {
            return self.recurse_children(node, depth);
        };
        if !matches!(value_node.kind(), "arrow_function" | "function_expression") {
            if name_node.kind() == "identifier" && !self.locals.is_empty() {
                self.handle_variable_write(name_node);
            }
            self.walk(value_node, depth + 1);
            return;
        }
        if name_node.kind() != "identifier" {
            return self.recurse_children(node, depth);
        }
        let name = self.text(name_node);
        let span = self.span(node);
        let node_id = self.push_node(NodeKind::Function, name, span);
        self.unit.occurrences.push(Occurrence::new(
            name,
            self.file_path,
            self.span(name_node),
            OccurrenceRoles::DEFINITION,
        ));
        self.scope_fqn.push(name.to_string());
        self.scope_id.push(node_id);
        self.scope_kind.push(NodeKind::Function);

        let mut locals = HashMap::new();
        self.emit_parameter_nodes(value_node, &mut locals);
        self.locals.push(locals);

        if let Some(body) = value_node.child_by_field_name("body") {
            self.recurse_children(body, depth + 1);
        }

        self.locals.pop();
        self.scope_fqn.pop();
        self.scope_id.pop();
        self.scope_kind.pop();
    }

    /// `name = value;`: rebinds an existing local/parameter, emitting a WRITES edge.
    fn handle_assignment(&mut self, node: TsNode, depth: usize) {
        let Some(left) = node.child_by_field_name("left") else {
            return self.recurse_children(node, depth);
        };
        if left.kind() == "identifier" && !self.locals.is_empty() {
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

    fn handle_class(&mut self, node: TsNode, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.recurse_children(node, depth);
        };
        let name = self.text(name_node);
        let span = self.span(node);
        let node_id = self.push_node(NodeKind::Class, name, span);
        self.unit.occurrences.push(Occurrence::new(
            name,
            self.file_path,
            self.span(name_node),
            OccurrenceRoles::DEFINITION,
        ));

        if let Some(heritage) = node.children(&mut node.walk()).find(|n| n.kind() == "class_heritage") {
            let mut cursor = heritage.walk();
            for child in heritage.children(&mut cursor) {
                if matches!(child.kind(), "identifier" | "member_expression") {
                    let base_name = self.text(child);
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

        self.scope_fqn.push(name.to_string());
        self.scope_id.push(node_id);
        self.scope_kind.push(NodeKind::Class);
        self.recurse_children(node, depth + 1);
        self.scope_fqn.pop();
        self.scope_id.pop();
        self.scope_kind.pop();
    }

    fn handle_import(&mut self, node: TsNode) {
        let span = self.span(node);
        let Some(source_node) = node
            .children(&mut node.walk())
            .find(|n| n.kind() == "string")
        else {
            return;
        };
        let module_path = self.text(source_node).trim_matches(['"', '\'']);

        let Some(clause) = node.children(&mut node.walk()).find(|n| n.kind() == "import_clause") else {
            self.emit_import(module_path, module_path, span);
            return;
        };
        let mut emitted = false;
        let mut cursor = clause.walk();
        for child in clause.children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    emitted = true;
                    self.emit_import(module_path, self.text(child), span);
                }
                "named_imports" => {
                    let mut inner = child.walk();
                    for spec in child.children(&mut inner) {
                        if spec.kind() == "import_specifier" {
                            if let Some(ident) = spec.children(&mut spec.walk()).find(|n| n.kind() == "identifier") {
                                emitted = true;
                                self.emit_import(module_path, self.text(ident), span);
                            }
                        }
                    }
                }
                "namespace_import" => {
                    if let Some(ident) = child
                        .children(&mut child.walk())
                        .collect::<Vec<_>>()
                        .into_iter()
                        .rev()
                        .find(|n| n.kind() == "identifier")
                    {
                        emitted = true;
                        self.emit_import(module_path, self.text(ident), span);
                    }
                }
                _ => {}
            }
        }
        if !emitted {
            self.emit_import(module_path, module_path, span);
        }
    }

    fn emit_import(&mut self, module_path: &str, name: &str, span: Span) {
        let import_node = self.push_node(NodeKind::Import, name, span);
        let target = Node::new(
            self.repo_id,
            NodeKind::Module,
            EXTERNAL_FILE_MARKER,
            module_path,
            name,
            Span::default(),
        );
        let mut edge = Edge::new(EdgeKind::Imports, import_node, target.id, 0);
        edge.mark_external();
        self.unit.edges.push(edge);
        self.unit
            .occurrences
            .push(Occurrence::new(module_path, self.file_path, span, OccurrenceRoles::IMPORT));
    }

    fn handle_call(&mut self, node: TsNode) {
        let Some(function_node) = node.child_by_field_name("function") else {
            return;
        };
        let callee_name = match function_node.kind() {
            "identifier" => self.text(function_node),
            "member_expression" => {
                let Some(prop) = function_node.child_by_field_name("property") else {
                    return;
                };
                self.text(prop)
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
                "identifier" | "required_parameter" | "optional_parameter" => {
                    let name_node = child.child_by_field_name("pattern").unwrap_or(child);
                    let name = self.text(name_node).to_string();
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

impl LanguageParser for EcmaScriptParser {
    fn parse(&mut self, repo_id: &str, file_path: &str, source: &str) -> IrResult<ParseUnit> {
        let tree = self.parser.parse(source, None).ok_or_else(|| IrError::BuildFailed {
            path: file_path.into(),
            reason: "tree-sitter failed to produce a parse tree".to_string(),
        })?;

        let module_name = std::path::Path::new(file_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_path)
            .to_string();

        let mut walker = Walker {
            repo_id,
            file_path,
            code: source,
            unit: ParseUnit::default(),
            scope_fqn: vec![module_name.clone()],
            scope_id: Vec::new(),
            scope_kind: vec![NodeKind::Module],
            call_ordinals: HashMap::new(),
            locals: Vec::new(),
        };

        let file_node = Node::new(repo_id, NodeKind::Module, file_path, &*module_name, &*module_name, Span::default());
        walker.scope_id.push(file_node.id);
        walker.unit.nodes.push(file_node);

        walker.walk(tree.root_node(), 0);

        Ok(walker.unit)
    }

    fn language(&self) -> Language {
        self.language
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ts(src: &str) -> ParseUnit {
        EcmaScriptParser::typescript().parse("repo", "mod.ts", src).unwrap()
    }

    fn parse_js(src: &str) -> ParseUnit {
        EcmaScriptParser::javascript().parse("repo", "mod.js", src).unwrap()
    }

    #[test]
    fn function_declaration_is_emitted() {
        let unit = parse_ts("function greet(): void {}\n");
        assert!(unit.nodes.iter().any(|n| n.kind == NodeKind::Function && n.name.as_ref() == "greet"));
    }

    #[test]
    fn class_method_is_classified_as_method() {
        let src = "class Foo {\n  bar() {}\n}\n";
        let unit = parse_js(src);
        assert!(unit.nodes.iter().any(|n| n.kind == NodeKind::Class && n.name.as_ref() == "Foo"));
        assert!(unit.nodes.iter().any(|n| n.kind == NodeKind::Method && n.name.as_ref() == "bar"));
    }

    #[test]
    fn const_arrow_function_is_emitted_as_function() {
        let unit = parse_js("const add = (a, b) => a + b;\n");
        assert!(unit.nodes.iter().any(|n| n.kind == NodeKind::Function && n.name.as_ref() == "add"));
    }

    #[test]
    fn named_import_emits_import_node_per_specifier() {
        let unit = parse_ts("import { foo, bar } from './util';\n");
        let imports: Vec<_> = unit.nodes.iter().filter(|n| n.kind == NodeKind::Import).collect();
        assert_eq!(imports.len(), 2);
    }

    #[test]
    fn class_extends_produces_external_inherits_edge() {
        let unit = parse_js("class Sub extends Base {}\n");
        assert!(unit.edges.iter().any(|e| e.kind == EdgeKind::Inherits && e.is_external()));
    }

    #[test]
    fn call_inside_function_produces_external_calls_edge() {
        let unit = parse_js("function caller() {\n  callee();\n}\n");
        assert!(unit.edges.iter().any(|e| e.kind == EdgeKind::Calls && e.is_external()));
    }

    #[test]
    fn parameter_is_emitted_and_tagged() {
        let unit = parse_ts("function add(x, y) { return x + y; }\n");
        let param = unit.nodes.iter().find(|n| n.kind == NodeKind::Parameter && n.name.as_ref() == "x").unwrap();
        assert_eq!(param.attrs.get("var_kind").unwrap().as_str().unwrap(), "parameter");
    }

    #[test]
    fn reading_a_parameter_emits_reads_edge() {
        let unit = parse_js("function add(x, y) { return x + y; }\n");
        let param = unit.nodes.iter().find(|n| n.kind == NodeKind::Parameter && n.name.as_ref() == "x").unwrap();
        assert!(unit.edges.iter().any(|e| e.kind == EdgeKind::Reads && e.target == param.id));
    }

    #[test]
    fn local_const_declaration_emits_variable_and_writes_edge() {
        let unit = parse_js("function run() {\n  const total = 0;\n}\n");
        let var = unit.nodes.iter().find(|n| n.kind == NodeKind::Variable && n.name.as_ref() == "total").unwrap();
        assert_eq!(var.attrs.get("var_kind").unwrap().as_str().unwrap(), "local");
        assert!(unit.edges.iter().any(|e| e.kind == EdgeKind::Writes && e.target == var.id));
    }

    #[test]
    fn top_level_const_outside_a_function_is_not_treated_as_a_local() {
        let unit = parse_js("const total = 0;\n");
        assert!(!unit.nodes.iter().any(|n| n.kind == NodeKind::Variable));
    }

    #[test]
    fn reassigning_a_local_reuses_the_existing_variable_node() {
        let unit = parse_js("function run() {\n  let total = 0;\n  total = 1;\n}\n");
        let vars: Vec<_> = unit.nodes.iter().filter(|n| n.kind == NodeKind::Variable && n.name.as_ref() == "total").collect();
        assert_eq!(vars.len(), 1);
        assert_eq!(unit.edges.iter().filter(|e| e.kind == EdgeKind::Writes && e.target == vars[0].id).count(), 2);
    }
}
