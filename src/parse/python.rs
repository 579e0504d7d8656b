//! Python support backed by tree-sitter.

use std::collections::BTreeSet;

use tree_sitter::{Node, Parser};

use super::{LanguageParser, PartialModel, Unit, UnitId, UnitKind};

/// Extracts functions, classes, imports and references from Python source.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn parse(&self, path: &str, source: &str) -> PartialModel {
        let mut model = PartialModel::default();
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
            model.warnings.push(format!("python grammar unavailable: {e}"));
            return model;
        }
        let Some(tree) = parser.parse(source, None) else {
            model.warnings.push("parser produced no tree".to_string());
            return model;
        };

        let root = tree.root_node();
        if root.has_error() {
            model.warnings.push("syntax errors; definitions may be incomplete".to_string());
        }

        let mut walker = Walker { path, src: source.as_bytes(), model: &mut model };
        walker.visit(root, &[]);
        model
    }
}

struct Walker<'a> {
    path: &'a str,
    src: &'a [u8],
    model: &'a mut PartialModel,
}

impl Walker<'_> {
    fn text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.src).unwrap_or_default()
    }

    fn visit(&mut self, node: Node<'_>, scope: &[String]) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "function_definition" | "class_definition" => self.define(child, child, scope),
                "decorated_definition" => {
                    if let Some(def) = child.child_by_field_name("definition") {
                        self.define(def, child, scope);
                    }
                }
                "import_statement" => self.import(child),
                "import_from_statement" => self.import_from(child),
                _ => self.visit(child, scope),
            }
        }
    }

    fn define(&mut self, def: Node<'_>, outer: Node<'_>, scope: &[String]) {
        let Some(name_node) = def.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        if name.is_empty() {
            return;
        }
        let kind =
            if def.kind() == "class_definition" { UnitKind::Class } else { UnitKind::Function };
        let mut path = scope.to_vec();
        path.push(name.clone());
        let qualified_name = path.join(".");

        let body = def.child_by_field_name("body");
        let header_end = body.map_or(def.end_byte(), |b| b.start_byte());
        let header = String::from_utf8_lossy(&self.src[def.start_byte()..header_end]);
        let signature = collapse_whitespace(header.trim_end().trim_end_matches(':'));

        let mut references = BTreeSet::new();
        if let Some(supers) = def.child_by_field_name("superclasses") {
            collect_identifiers(supers, self.src, &mut references);
        }
        if let Some(body) = body {
            collect_identifiers(body, self.src, &mut references);
        }

        self.model.push(Unit {
            id: UnitId::new(self.path, &qualified_name),
            kind,
            name,
            qualified_name,
            signature,
            doc: body.and_then(|b| docstring(b, self.src)),
            start_line: outer.start_position().row + 1,
            end_line: def.end_position().row + 1,
            references,
        });

        if let Some(body) = body {
            self.visit(body, &path);
        }
    }

    fn import(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let module = match child.kind() {
                "dotted_name" => Some(child),
                "aliased_import" => child.child_by_field_name("name"),
                _ => None,
            };
            if let Some(module) = module {
                let module = self.text(module).to_string();
                self.model.imports.push(module);
            }
        }
    }

    fn import_from(&mut self, node: Node<'_>) {
        let Some(module) = node.child_by_field_name("module_name") else {
            return;
        };
        let module_text = self.text(module).to_string();
        if !module_text.chars().all(|c| c == '.') {
            self.model.imports.push(module_text);
            return;
        }
        // `from . import a, b` names sibling modules.
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.id() == module.id() {
                continue;
            }
            let name = match child.kind() {
                "dotted_name" => Some(child),
                "aliased_import" => child.child_by_field_name("name"),
                _ => None,
            };
            if let Some(name) = name {
                let import = format!("{module_text}{}", self.text(name));
                self.model.imports.push(import);
            }
        }
    }
}

/// Collects identifiers under `node`, skipping nested definitions.
fn collect_identifiers(node: Node<'_>, src: &[u8], out: &mut BTreeSet<String>) {
    match node.kind() {
        "function_definition" | "class_definition" | "decorated_definition" => return,
        "identifier" => {
            if let Ok(text) = node.utf8_text(src) {
                if text != "self" && text != "cls" {
                    out.insert(text.to_string());
                }
            }
            return;
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_identifiers(child, src, out);
    }
}

/// The leading string literal of a block, cleaned up.
fn docstring(body: Node<'_>, src: &[u8]) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    let cleaned = clean_string_literal(literal.utf8_text(src).ok()?);
    (!cleaned.is_empty()).then_some(cleaned)
}

fn clean_string_literal(raw: &str) -> String {
    let unprefixed = raw.trim_start_matches(|c: char| "rRuUbBfF".contains(c));
    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| unprefixed.strip_prefix(q).and_then(|s| s.strip_suffix(q)))
        .unwrap_or(unprefixed);
    inner.lines().map(str::trim).collect::<Vec<_>>().join("\n").trim().to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
import os
import numpy as np
from .models import User
from . import helpers, store as st

def greet(name: str) -> str:
    """Say hello.

    Returns the greeting.
    """
    return format_name(name)

def format_name(name):
    return name.title()

@dataclass
class Greeter(Base):
    '''Greets people.'''

    def hello(self, who):
        def inner():
            return secret()
        return greet(who)
"#;

    fn parsed() -> PartialModel {
        PythonParser.parse("app/greet.py", SAMPLE)
    }

    #[test]
    fn extracts_units_in_source_order() {
        let model = parsed();
        let names: Vec<&str> = model.units.iter().map(|u| u.qualified_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["greet", "format_name", "Greeter", "Greeter.hello", "Greeter.hello.inner"]
        );
        assert!(model.warnings.is_empty());
        assert_eq!(model.units[2].kind, UnitKind::Class);
        assert_eq!(model.units[3].id.as_str(), "app/greet.py::Greeter.hello");
    }

    #[test]
    fn signatures_docstrings_and_lines() {
        let model = parsed();
        let greet = &model.units[0];
        assert_eq!(greet.signature, "def greet(name: str) -> str");
        assert_eq!(greet.doc.as_deref(), Some("Say hello.\n\nReturns the greeting."));
        assert_eq!(greet.start_line, 7);
        assert_eq!(greet.end_line, 12);

        let class = &model.units[2];
        assert_eq!(class.signature, "class Greeter(Base)");
        assert_eq!(class.doc.as_deref(), Some("Greets people."));
        // Decorators belong to the definition's span.
        assert_eq!(class.start_line, 17);
        assert!(model.units[1].doc.is_none());
    }

    #[test]
    fn references_skip_nested_definitions_and_self() {
        let model = parsed();
        let hello = &model.units[3];
        assert!(hello.references.contains("greet"));
        assert!(hello.references.contains("who"));
        assert!(!hello.references.contains("secret"));
        assert!(!hello.references.contains("self"));

        assert!(model.units[2].references.contains("Base"));
        assert!(model.units[0].references.contains("format_name"));
    }

    #[test]
    fn collects_imports() {
        let model = parsed();
        assert_eq!(model.imports, vec!["os", "numpy", ".models", ".helpers", ".store"]);
    }

    #[test]
    fn syntax_errors_yield_partial_model() {
        let model = PythonParser.parse("bad.py", "def ok():\n    pass\n\ndef broken(:\n");
        assert!(!model.warnings.is_empty());
        assert!(model.units.iter().any(|u| u.name == "ok"));
    }

    #[test]
    fn empty_file_is_fine() {
        let model = PythonParser.parse("empty.py", "");
        assert!(model.units.is_empty());
        assert!(model.warnings.is_empty());
    }
}
