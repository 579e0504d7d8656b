//! Jac support.
//!
//! There is no maintained tree-sitter grammar for Jac, so this is a line
//! scanner: comments and strings are blanked out first (keeping byte
//! offsets), then declarations are recognized per line and block extents
//! are tracked by brace depth.

use std::collections::{BTreeSet, HashMap};

use super::{LanguageParser, PartialModel, Unit, UnitId, UnitKind};

const CLASS_KEYWORDS: &[&str] = &["obj", "node", "edge", "walker", "class", "enum"];
const FUNCTION_KEYWORDS: &[&str] = &["def", "can", "impl"];
const MODIFIERS: &[&str] = &["static", "async", "override", "abs", "priv", "pub", "protect"];

const RESERVED: &[&str] = &[
    "abs", "and", "as", "assert", "async", "await", "break", "by", "can", "class", "continue",
    "def", "del", "disengage", "edge", "elif", "else", "entry", "enum", "except", "exit", "False",
    "finally", "for", "from", "glob", "has", "here", "if", "ignore", "impl", "import", "in",
    "include", "lambda", "node", "None", "not", "obj", "or", "pass", "raise", "report", "return",
    "root", "self", "spawn", "static", "to", "True", "try", "visit", "visitor", "walker", "while",
    "with", "yield",
];

/// Extracts archetypes, abilities, functions and imports from Jac source.
#[derive(Debug, Clone, Copy, Default)]
pub struct JacParser;

impl LanguageParser for JacParser {
    fn language(&self) -> &'static str {
        "jac"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["jac"]
    }

    fn parse(&self, path: &str, source: &str) -> PartialModel {
        let cleaned = blank_comments_and_strings(source);
        let mut model = PartialModel::default();
        if cleaned.unterminated {
            model.warnings.push("unterminated string or block comment".to_string());
        }

        let mut units: Vec<Unit> = Vec::new();
        // Each open brace, tagged with the unit it opened (if any).
        let mut stack: Vec<Option<usize>> = Vec::new();
        let mut awaiting_brace: Option<usize> = None;
        let mut pending_doc: Option<String> = None;
        let mut unbalanced = false;
        let mut last_line = 0;

        for (idx, (code, raw)) in cleaned.text.lines().zip(source.lines()).enumerate() {
            let line = idx + 1;
            last_line = line;
            let trimmed = code.trim();

            let imports = import_targets(trimmed);
            let decl = if imports.is_empty() { declaration(code) } else { None };
            if !trimmed.is_empty() && decl.is_none() {
                pending_doc = None;
            }
            if let Some(doc) = cleaned.docs.get(&line) {
                pending_doc = Some(doc.clone());
            }
            model.imports.extend(imports);

            if let Some(decl) = decl {
                let enclosing = stack.iter().rev().find_map(|open| *open);
                let qualified_name = match enclosing {
                    Some(i) => format!("{}.{}", units[i].qualified_name, decl.name),
                    None => decl.name.clone(),
                };
                let header_end = code.find(['{', ';']).unwrap_or(code.len());
                let name = decl.name.rsplit('.').next().unwrap_or(&decl.name).to_string();
                units.push(Unit {
                    id: UnitId::new(path, &qualified_name),
                    kind: decl.kind,
                    name,
                    qualified_name,
                    signature: raw
                        .get(..header_end)
                        .unwrap_or(raw)
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" "),
                    doc: pending_doc.take(),
                    start_line: line,
                    end_line: line,
                    references: decl.bases,
                });
                awaiting_brace = Some(units.len() - 1);
            } else if awaiting_brace.is_none() {
                if let Some(i) = stack.iter().rev().find_map(|open| *open) {
                    units[i].references.extend(identifiers(trimmed));
                }
            }

            for c in code.chars() {
                match c {
                    '{' => stack.push(awaiting_brace.take()),
                    '}' => match stack.pop() {
                        Some(Some(i)) => units[i].end_line = line,
                        Some(None) => {}
                        None => unbalanced = true,
                    },
                    ';' => {
                        // Body-less declaration, e.g. an abstract ability.
                        if let Some(i) = awaiting_brace.take() {
                            units[i].end_line = line;
                        }
                    }
                    _ => {}
                }
            }
        }

        if unbalanced {
            model.warnings.push("unbalanced closing brace".to_string());
        }
        if !stack.is_empty() {
            model.warnings.push(format!("{} unclosed block(s) at end of file", stack.len()));
            for i in stack.into_iter().flatten() {
                units[i].end_line = last_line;
            }
        }

        for unit in units {
            model.push(unit);
        }
        model
    }
}

struct Declaration {
    kind: UnitKind,
    name: String,
    bases: BTreeSet<String>,
}

/// Recognizes `[modifiers] keyword[:access] Name[(Bases)]` at the start of a line.
fn declaration(code: &str) -> Option<Declaration> {
    let mut rest = code.trim_start();
    'modifiers: loop {
        for modifier in MODIFIERS {
            if let Some(after) = rest.strip_prefix(modifier) {
                if after.starts_with(char::is_whitespace) {
                    rest = after.trim_start();
                    continue 'modifiers;
                }
            }
        }
        break;
    }

    let keyword_end = rest.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(rest.len());
    let keyword = &rest[..keyword_end];
    let kind = if CLASS_KEYWORDS.contains(&keyword) {
        UnitKind::Class
    } else if FUNCTION_KEYWORDS.contains(&keyword) {
        UnitKind::Function
    } else {
        return None;
    };

    let mut after = &rest[keyword_end..];
    if !after.starts_with(|c: char| c.is_whitespace() || c == ':') {
        return None;
    }
    after = after.trim_start();
    if let Some(access) = after.strip_prefix(':') {
        after = access.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_').trim_start();
    }

    let name_end = after
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
        .unwrap_or(after.len());
    let name = &after[..name_end];
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let mut bases = BTreeSet::new();
    if kind == UnitKind::Class {
        if let Some(list) = after[name_end..].trim_start().strip_prefix('(') {
            let list = list.split(')').next().unwrap_or_default();
            bases.extend(identifiers(list));
        }
    }

    Some(Declaration { kind, name: name.to_string(), bases })
}

/// Module names named by an `import` or `include` statement.
fn import_targets(line: &str) -> Vec<String> {
    let Some(rest) = line.strip_prefix("import").or_else(|| line.strip_prefix("include")) else {
        return Vec::new();
    };
    if !rest.starts_with(|c: char| c == ':' || c.is_whitespace()) {
        return Vec::new();
    }
    let mut rest = rest.trim_start();
    if let Some(tagged) = rest.strip_prefix(':') {
        rest = tagged.trim_start_matches(|c: char| c.is_alphanumeric());
    }
    let rest = rest.trim().trim_end_matches(';').trim();

    if let Some(from) = rest.strip_prefix("from ") {
        return from
            .split(|c: char| c == ',' || c == '{' || c.is_whitespace())
            .find(|s| !s.is_empty())
            .map(|s| vec![s.to_string()])
            .unwrap_or_default();
    }
    rest.split(',').filter_map(|item| item.split_whitespace().next()).map(String::from).collect()
}

fn identifiers(code: &str) -> impl Iterator<Item = String> + '_ {
    code.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.starts_with(|c: char| c.is_alphabetic() || c == '_'))
        .filter(|w| !RESERVED.contains(w))
        .map(String::from)
}

struct Cleaned {
    /// Source with comments and string literals replaced by spaces.
    text: String,
    /// Statement-position triple-quoted strings, keyed by closing line.
    docs: HashMap<usize, String>,
    unterminated: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Str { quote: char, triple: bool },
}

fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    }
}

fn blank_comments_and_strings(source: &str) -> Cleaned {
    let mut out = String::with_capacity(source.len());
    let mut docs = HashMap::new();
    let mut doc: Option<String> = None;
    let mut state = State::Code;
    let mut line_blank = true;
    let mut chars = source.char_indices();

    while let Some((i, c)) = chars.next() {
        let rest = &source[i..];
        match state {
            State::Code => {
                if rest.starts_with("#*") {
                    state = State::BlockComment;
                    blank(&mut out, c);
                    skip(&mut chars, &mut out, 1, None);
                } else if c == '#' {
                    state = State::LineComment;
                    blank(&mut out, c);
                } else if rest.starts_with("\"\"\"") || rest.starts_with("'''") {
                    if line_blank {
                        doc = Some(String::new());
                    }
                    state = State::Str { quote: c, triple: true };
                    blank(&mut out, c);
                    skip(&mut chars, &mut out, 2, None);
                } else if c == '"' || c == '\'' {
                    state = State::Str { quote: c, triple: false };
                    blank(&mut out, c);
                } else {
                    out.push(c);
                    if c == '\n' {
                        line_blank = true;
                    } else if !c.is_whitespace() {
                        line_blank = false;
                    }
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    line_blank = true;
                }
                blank(&mut out, c);
            }
            State::BlockComment => {
                blank(&mut out, c);
                if rest.starts_with("*#") {
                    state = State::Code;
                    skip(&mut chars, &mut out, 1, None);
                }
            }
            State::Str { quote, triple } => {
                let closing = if quote == '"' { "\"\"\"" } else { "'''" };
                if c == '\\' {
                    blank(&mut out, c);
                    if let Some(d) = doc.as_mut() {
                        d.push(c);
                    }
                    skip(&mut chars, &mut out, 1, doc.as_mut());
                } else if triple && rest.starts_with(closing) {
                    blank(&mut out, c);
                    skip(&mut chars, &mut out, 2, None);
                    state = State::Code;
                    line_blank = false;
                    if let Some(text) = doc.take() {
                        let line = source[..i].matches('\n').count() + 1;
                        let text = tidy_doc(&text);
                        if !text.is_empty() {
                            docs.insert(line, text);
                        }
                    }
                } else if !triple && (c == quote || c == '\n') {
                    blank(&mut out, c);
                    state = State::Code;
                    line_blank = c == '\n';
                } else {
                    blank(&mut out, c);
                    if let Some(d) = doc.as_mut() {
                        d.push(c);
                    }
                }
            }
        }
    }

    let unterminated = matches!(state, State::BlockComment | State::Str { triple: true, .. });
    Cleaned { text: out, docs, unterminated }
}

fn skip(
    chars: &mut std::str::CharIndices<'_>,
    out: &mut String,
    n: usize,
    mut capture: Option<&mut String>,
) {
    for _ in 0..n {
        if let Some((_, c)) = chars.next() {
            blank(out, c);
            if let Some(d) = capture.as_deref_mut() {
                d.push(c);
            }
        }
    }
}

fn tidy_doc(raw: &str) -> String {
    raw.lines().map(str::trim).collect::<Vec<_>>().join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"import:py os;
import:jac utils, helpers as h;
import from graph_tools { walk }
include shared;

"""A person in the graph."""
node Person {
    has name: str;

    """Greets someone."""
    can greet with entry {
        report format_name(here.name);  # call }
    }
}

obj Counter(Base) {
    has count: int = 0;
    def inc() -> int {
        self.count += 1;
        return self.count;
    }
}

#* block
   comment { *#
def format_name(name: str) -> str {
    return f"{name}!";
}

walker :priv Visitor {
    can visit_person with Person entry;
}

with entry {
    root ++> Person(name="x");
}
"#;

    fn find<'a>(model: &'a PartialModel, qualified: &str) -> &'a Unit {
        model.units.iter().find(|u| u.qualified_name == qualified).unwrap()
    }

    #[test]
    fn recognizes_archetypes_and_abilities() {
        let model = JacParser.parse("app/main.jac", SAMPLE);
        let names: Vec<&str> = model.units.iter().map(|u| u.qualified_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Person",
                "Person.greet",
                "Counter",
                "Counter.inc",
                "format_name",
                "Visitor",
                "Visitor.visit_person",
            ]
        );
        assert!(model.warnings.is_empty(), "{:?}", model.warnings);
        assert_eq!(find(&model, "Person").kind, UnitKind::Class);
        assert_eq!(find(&model, "Counter.inc").kind, UnitKind::Function);
    }

    #[test]
    fn tracks_extents_and_signatures() {
        let model = JacParser.parse("main.jac", SAMPLE);
        let person = find(&model, "Person");
        assert_eq!((person.start_line, person.end_line), (7, 14));
        let greet = find(&model, "Person.greet");
        assert_eq!((greet.start_line, greet.end_line), (11, 13));
        let inc = find(&model, "Counter.inc");
        assert_eq!(inc.signature, "def inc() -> int");
        assert_eq!((inc.start_line, inc.end_line), (18, 21));
        let ability = find(&model, "Visitor.visit_person");
        assert_eq!((ability.start_line, ability.end_line), (31, 31));
        assert_eq!(find(&model, "Visitor").signature, "walker :priv Visitor");
    }

    #[test]
    fn docstrings_attach_to_next_declaration() {
        let model = JacParser.parse("main.jac", SAMPLE);
        assert_eq!(find(&model, "Person").doc.as_deref(), Some("A person in the graph."));
        assert_eq!(find(&model, "Person.greet").doc.as_deref(), Some("Greets someone."));
        assert!(find(&model, "Counter").doc.is_none());
    }

    #[test]
    fn references_and_imports() {
        let model = JacParser.parse("main.jac", SAMPLE);
        let greet = find(&model, "Person.greet");
        assert!(greet.references.contains("format_name"));
        assert!(!greet.references.contains("here"));
        assert!(!greet.references.contains("call"));
        assert!(find(&model, "Counter").references.contains("Base"));
        assert_eq!(model.imports, vec!["os", "utils", "helpers", "graph_tools", "shared"]);
    }

    #[test]
    fn unbalanced_braces_produce_warnings() {
        let unclosed = JacParser.parse("a.jac", "obj A {\n    def b() {\n    }\n");
        assert!(!unclosed.warnings.is_empty());
        assert_eq!(unclosed.units[0].end_line, 3);

        let extra = JacParser.parse("b.jac", "def a() {\n}\n}\n");
        assert_eq!(extra.warnings, vec!["unbalanced closing brace".to_string()]);
        assert_eq!(extra.units.len(), 1);
    }

    #[test]
    fn identifiers_that_start_with_keywords_are_not_declarations() {
        assert!(declaration("    def_count = 3;").is_none());
        assert!(declaration("node = here;").is_none());
        assert!(declaration("edge_list.append(e);").is_none());
        assert!(declaration("static can:pub tick {").is_some());
    }
}
