//! Structural parsing: functions, classes, imports and the reference graph
//! ("Code Context Graph") extracted from a workspace.
//!
//! Languages plug in through [`LanguageParser`] and are looked up by file
//! extension in a [`ParserRegistry`]; the pipeline never names a language.

pub mod graph;
pub mod jac;
pub mod python;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::ServiceContext;

pub use graph::ReferenceGraph;

/// Kind of structural unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Function, method or ability.
    Function,
    /// Class or class-like archetype.
    Class,
}

impl UnitKind {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
        }
    }
}

/// Stable unit identifier: `path::Qualified.name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(String);

impl UnitId {
    /// Builds the identifier for `qualified_name` defined in `path`.
    #[must_use]
    pub fn new(path: &str, qualified_name: &str) -> Self {
        Self(format!("{path}::{qualified_name}"))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A function or class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Stable identifier, unique within the model.
    pub id: UnitId,
    /// Definition kind.
    pub kind: UnitKind,
    /// Bare name.
    pub name: String,
    /// Name prefixed by enclosing definitions, dot separated.
    pub qualified_name: String,
    /// Declaration header, whitespace collapsed.
    pub signature: String,
    /// Attached docstring or doc comment.
    pub doc: Option<String>,
    /// First line, 1-based.
    pub start_line: usize,
    /// Last line, 1-based, inclusive.
    pub end_line: usize,
    /// Identifiers named in the body (resolved later into graph edges).
    pub references: BTreeSet<String>,
}

/// What a [`LanguageParser`] returns for a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialModel {
    /// Definitions in source order.
    pub units: Vec<Unit>,
    /// Imported module paths.
    pub imports: Vec<String>,
    /// Problems that left the result incomplete.
    pub warnings: Vec<String>,
}

impl PartialModel {
    /// Appends a unit, suffixing its id if the same id was already used
    /// (e.g. a redefined function).
    pub fn push(&mut self, mut unit: Unit) {
        if self.units.iter().any(|u| u.id == unit.id) {
            let mut n = 2;
            loop {
                let candidate = UnitId(format!("{}#{n}", unit.id));
                if !self.units.iter().any(|u| u.id == candidate) {
                    unit.id = candidate;
                    break;
                }
                n += 1;
            }
        }
        self.units.push(unit);
    }
}

/// Parsing strategy for one language.
pub trait LanguageParser: Send + Sync {
    /// Language label shown in documentation.
    fn language(&self) -> &'static str;

    /// Lowercase file extensions (without the dot) this parser handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Parses one file. Never fails: malformed input yields a partial model
    /// with warnings.
    fn parse(&self, path: &str, source: &str) -> PartialModel;
}

/// Maps file extensions to parsing strategies.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    by_extension: HashMap<String, Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    /// Registry with the shipped Python and Jac parsers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(python::PythonParser));
        registry.register(Arc::new(jac::JacParser));
        registry
    }

    /// Registers `parser` for each of its extensions, replacing earlier entries.
    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) {
        for ext in parser.extensions() {
            self.by_extension.insert((*ext).to_string(), Arc::clone(&parser));
        }
    }

    /// The parser for `path`, if its extension is supported.
    #[must_use]
    pub fn for_path(&self, path: &str) -> Option<&dyn LanguageParser> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(&ext).map(AsRef::as_ref)
    }
}

/// Parsed representation of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileModel {
    /// Path relative to the workspace root.
    pub path: String,
    /// Language label.
    pub language: String,
    /// Definitions in source order.
    pub units: Vec<Unit>,
    /// Imported module paths.
    pub imports: Vec<String>,
    /// `true` when the parser reported problems.
    pub partial: bool,
}

/// A non-fatal problem encountered while parsing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// File the warning applies to.
    pub path: String,
    /// What went wrong.
    pub message: String,
}

/// Functions, classes and references across the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralModel {
    /// Parsed files keyed by relative path.
    pub files: BTreeMap<String, FileModel>,
    /// Directed unit-to-unit references.
    pub graph: ReferenceGraph,
    /// Files parsed fully or partially.
    pub analyzed_files: usize,
    /// Files with no registered parser.
    pub unsupported_files: usize,
    /// Accumulated per-file warnings.
    pub warnings: Vec<ParseWarning>,
}

impl StructuralModel {
    /// All units in deterministic (path, source) order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.files.values().flat_map(|f| f.units.iter())
    }

    /// Looks up a unit by id.
    #[must_use]
    pub fn unit(&self, id: &UnitId) -> Option<&Unit> {
        self.units().find(|u| &u.id == id)
    }

    /// Total number of units.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.files.values().map(|f| f.units.len()).sum()
    }

    /// Parsed file count per language.
    #[must_use]
    pub fn languages(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for file in self.files.values() {
            *counts.entry(file.language.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

enum Outcome {
    Parsed(FileModel, Vec<String>),
    Unreadable(String),
}

/// Parses the supported files in `files` (paths relative to `root`).
///
/// Files are independent: each runs on the worker pool and a bad file only
/// produces warnings. Unsupported files are counted, not parsed.
///
/// # Errors
///
/// Returns an error string only if the worker pool cannot be created.
pub fn parse(
    ctx: &ServiceContext,
    registry: &ParserRegistry,
    root: &Path,
    files: &[String],
    workers: usize,
) -> Result<StructuralModel, String> {
    let mut unsupported_files = 0;
    let mut jobs = Vec::new();
    for path in files {
        match registry.for_path(path) {
            Some(parser) => jobs.push((path.as_str(), parser)),
            None => unsupported_files += 1,
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| format!("failed to start parse workers: {e}"))?;

    let outcomes: Vec<(&str, Outcome)> = pool.install(|| {
        jobs.par_iter()
            .map(|(path, parser)| {
                let outcome = match ctx.fs.read_to_string(&root.join(path)) {
                    Ok(source) => {
                        let partial = parser.parse(path, &source);
                        let file = FileModel {
                            path: (*path).to_string(),
                            language: parser.language().to_string(),
                            units: partial.units,
                            imports: partial.imports,
                            partial: !partial.warnings.is_empty(),
                        };
                        Outcome::Parsed(file, partial.warnings)
                    }
                    Err(e) => Outcome::Unreadable(format!("unreadable: {e}")),
                };
                (*path, outcome)
            })
            .collect()
    });

    let mut model = StructuralModel { unsupported_files, ..StructuralModel::default() };
    for (path, outcome) in outcomes {
        match outcome {
            Outcome::Parsed(file, warnings) => {
                for message in warnings {
                    debug!(path, %message, "parse warning");
                    model.warnings.push(ParseWarning { path: path.to_string(), message });
                }
                model.analyzed_files += 1;
                model.files.insert(path.to_string(), file);
            }
            Outcome::Unreadable(message) => {
                warn!(path, %message, "skipping file");
                model.warnings.push(ParseWarning { path: path.to_string(), message });
            }
        }
    }

    model.graph = graph::build(&model.files);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_with_fs, MemFs};

    fn unit(path: &str, name: &str) -> Unit {
        Unit {
            id: UnitId::new(path, name),
            kind: UnitKind::Function,
            name: name.into(),
            qualified_name: name.into(),
            signature: format!("def {name}()"),
            doc: None,
            start_line: 1,
            end_line: 1,
            references: BTreeSet::new(),
        }
    }

    #[test]
    fn duplicate_ids_are_suffixed() {
        let mut model = PartialModel::default();
        model.push(unit("a.py", "f"));
        model.push(unit("a.py", "f"));
        model.push(unit("a.py", "f"));
        let ids: Vec<&str> = model.units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a.py::f", "a.py::f#2", "a.py::f#3"]);
    }

    #[test]
    fn registry_dispatches_on_extension() {
        let registry = ParserRegistry::with_defaults();
        assert_eq!(registry.for_path("pkg/mod.py").map(|p| p.language()), Some("python"));
        assert_eq!(registry.for_path("app/main.JAC").map(|p| p.language()), Some("jac"));
        assert!(registry.for_path("README.md").is_none());
        assert!(registry.for_path("Makefile").is_none());
    }

    #[test]
    fn parse_counts_files_and_tolerates_bad_input() {
        let fs = MemFs::with_files(&[
            ("/ws/main.py", "from util import helper\n\ndef main():\n    return helper()\n"),
            ("/ws/util.py", "def helper():\n    return 1\n"),
            ("/ws/broken.py", "def broken(:\n    pass\n"),
            ("/ws/README.md", "# readme"),
        ]);
        let ctx = context_with_fs(fs);
        let files: Vec<String> =
            ["README.md", "broken.py", "main.py", "missing.py", "util.py"].map(String::from).into();

        let model =
            parse(&ctx, &ParserRegistry::with_defaults(), Path::new("/ws"), &files, 2).unwrap();

        assert_eq!(model.unsupported_files, 1);
        assert_eq!(model.analyzed_files, 3);
        assert!(model.files["broken.py"].partial);
        assert!(model.warnings.iter().any(|w| w.path == "broken.py"));
        assert!(model.warnings.iter().any(|w| w.path == "missing.py"));

        let main = UnitId::new("main.py", "main");
        let helper = UnitId::new("util.py", "helper");
        assert!(model.graph.targets(&main).any(|t| t == &helper));
    }
}
