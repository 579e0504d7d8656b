//! Document assembly: renders the Markdown document from stage outputs.
//!
//! Pure: no I/O and no clock. Identical inputs produce byte-identical
//! output, and `include_diagrams` only adds or removes the architecture
//! section.

pub mod diagram;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::insight::Insight;
use crate::map::TreeSummary;
use crate::parse::{StructuralModel, Unit, UnitId, UnitKind};

/// Rendering options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Repository name, used as the title.
    pub repo_name: String,
    /// Normalized repository URL.
    pub repo_url: String,
    /// Emit the `## Architecture` section.
    pub include_diagrams: bool,
}

/// Renders the documentation for one repository.
#[must_use]
pub fn assemble(
    tree: &TreeSummary,
    model: &StructuralModel,
    insights: &BTreeMap<UnitId, Insight>,
    options: &AssembleOptions,
) -> String {
    let mut sections = vec![
        overview(tree, model, options),
        file_tree(tree, &options.repo_name),
        modules(model, insights),
    ];
    if options.include_diagrams {
        sections.push(diagram::render(model));
    }
    sections.push(appendix(tree, model, insights));
    sections.join("\n")
}

fn overview(tree: &TreeSummary, model: &StructuralModel, options: &AssembleOptions) -> String {
    let mut out = format!("# {}\n\n## Overview\n\n", options.repo_name);
    let _ = writeln!(out, "Source: <{}>\n", options.repo_url);

    if let Some(readme) = &tree.readme_excerpt {
        for line in readme.lines() {
            if line.is_empty() {
                out.push_str(">\n");
            } else {
                let _ = writeln!(out, "> {line}");
            }
        }
        out.push('\n');
    }

    let classes = model.units().filter(|u| u.kind == UnitKind::Class).count();
    let functions = model.unit_count() - classes;
    let _ = writeln!(out, "- Files: {} ({} analyzed)", tree.file_count, model.analyzed_files);
    let _ = writeln!(out, "- Directories: {}", tree.dir_count);
    let _ = writeln!(out, "- Units: {functions} functions, {classes} classes");
    let languages: Vec<String> =
        model.languages().iter().map(|(lang, n)| format!("{lang} ({n})")).collect();
    if !languages.is_empty() {
        let _ = writeln!(out, "- Languages: {}", languages.join(", "));
    }
    if !tree.top_level_entries.is_empty() {
        let entries: Vec<String> =
            tree.top_level_entries.iter().map(|e| format!("`{e}`")).collect();
        let _ = writeln!(out, "- Top level: {}", entries.join(", "));
    }
    out
}

#[derive(Default)]
struct DirNode<'a> {
    dirs: BTreeMap<&'a str, DirNode<'a>>,
    files: Vec<&'a str>,
}

fn render_dir(node: &DirNode<'_>, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for (name, child) in &node.dirs {
        let _ = writeln!(out, "{indent}{name}/");
        render_dir(child, depth + 1, out);
    }
    let mut files = node.files.clone();
    files.sort_unstable();
    for name in files {
        let _ = writeln!(out, "{indent}{name}");
    }
}

fn file_tree(tree: &TreeSummary, repo_name: &str) -> String {
    let mut root = DirNode::default();
    for path in &tree.files {
        let mut node = &mut root;
        let mut parts = path.split('/').peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                node = node.dirs.entry(part).or_default();
            } else {
                node.files.push(part);
            }
        }
    }

    let mut out = format!("## File Tree\n\n```text\n{repo_name}/\n");
    render_dir(&root, 1, &mut out);
    out.push_str("```\n");
    if tree.skipped_files > 0 {
        let _ = writeln!(
            out,
            "\n{} more file(s) were not enumerated because of the file limit.",
            tree.skipped_files
        );
    }
    out
}

fn unit_list(ids: Vec<&UnitId>) -> String {
    ids.iter().map(|id| format!("`{id}`")).collect::<Vec<_>>().join(", ")
}

fn render_unit(
    out: &mut String,
    model: &StructuralModel,
    language: &str,
    unit: &Unit,
    insight: Option<&Insight>,
) {
    let _ = writeln!(out, "#### `{}` ({})\n", unit.qualified_name, unit.kind.as_str());
    let _ = writeln!(out, "```{language}\n{}\n```\n", unit.signature);
    let _ = writeln!(out, "Lines {}-{}\n", unit.start_line, unit.end_line);
    if let Some(doc) = &unit.doc {
        for line in doc.lines() {
            if line.is_empty() {
                out.push_str(">\n");
            } else {
                let _ = writeln!(out, "> {line}");
            }
        }
        out.push('\n');
    }
    match insight {
        Some(i) if i.placeholder => {
            let _ = writeln!(out, "_{}_\n", i.text);
        }
        Some(i) => {
            let _ = writeln!(out, "{}\n", i.text);
        }
        None => {}
    }
    let targets: Vec<&UnitId> = model.graph.targets(&unit.id).collect();
    if !targets.is_empty() {
        let _ = writeln!(out, "References: {}\n", unit_list(targets));
    }
    let sources: Vec<&UnitId> = model.graph.sources(&unit.id).collect();
    if !sources.is_empty() {
        let _ = writeln!(out, "Referenced by: {}\n", unit_list(sources));
    }
}

fn modules(model: &StructuralModel, insights: &BTreeMap<UnitId, Insight>) -> String {
    let mut out = String::from("## Modules\n\n");
    if model.files.is_empty() {
        out.push_str("_No supported source files were found._\n");
        return out;
    }
    for file in model.files.values() {
        let _ = writeln!(out, "### `{}` ({})\n", file.path, file.language);
        if file.partial {
            out.push_str("_This file was parsed partially; some definitions may be missing._\n\n");
        }
        if !file.imports.is_empty() {
            let imports: Vec<String> = file.imports.iter().map(|i| format!("`{i}`")).collect();
            let _ = writeln!(out, "Imports: {}\n", imports.join(", "));
        }
        if file.units.is_empty() {
            out.push_str("_No functions or classes._\n\n");
        }
        for unit in &file.units {
            render_unit(&mut out, model, &file.language, unit, insights.get(&unit.id));
        }
    }
    out
}

fn appendix(
    tree: &TreeSummary,
    model: &StructuralModel,
    insights: &BTreeMap<UnitId, Insight>,
) -> String {
    let mut out = String::from("## Appendix\n\n");
    let generated = insights.values().filter(|i| !i.placeholder).count();
    let _ = writeln!(out, "- Reference edges: {}", model.graph.edge_count());
    let _ = writeln!(
        out,
        "- Insights: {generated} generated, {} placeholder",
        insights.len() - generated
    );
    let _ = writeln!(out, "- Unsupported files: {}", model.unsupported_files);
    if tree.skipped_files > 0 {
        let _ = writeln!(out, "- Files beyond the limit: {}", tree.skipped_files);
    }

    let warnings: Vec<String> = tree
        .warnings
        .iter()
        .cloned()
        .chain(model.warnings.iter().map(|w| format!("{}: {}", w.path, w.message)))
        .collect();
    if !warnings.is_empty() {
        out.push_str("\n### Warnings\n\n");
        for warning in warnings {
            let _ = writeln!(out, "- {warning}");
        }
    }
    out
}
