//! Architecture section: a mermaid graph of unit references plus a textual
//! file-level dependency listing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::parse::{StructuralModel, UnitId};

/// Mermaid node ids must be plain identifiers, so units are numbered.
fn node_ids(model: &StructuralModel) -> BTreeMap<&UnitId, String> {
    let mut involved: BTreeSet<&UnitId> = BTreeSet::new();
    for (from, to) in model.graph.edges() {
        involved.insert(from);
        involved.insert(to);
    }
    involved.into_iter().enumerate().map(|(i, id)| (id, format!("n{i}"))).collect()
}

fn label(model: &StructuralModel, id: &UnitId) -> String {
    let text = model.unit(id).map_or_else(|| id.to_string(), |u| u.qualified_name.clone());
    text.replace('"', "#quot;")
}

/// File containing `id` (the part before `::`).
fn file_of(id: &UnitId) -> &str {
    id.as_str().split_once("::").map_or(id.as_str(), |(path, _)| path)
}

/// Renders the `## Architecture` section.
pub fn render(model: &StructuralModel) -> String {
    let mut out = String::from("## Architecture\n\n");
    if model.graph.is_empty() {
        out.push_str("_No cross-unit references were detected._\n");
        return out;
    }

    let ids = node_ids(model);
    out.push_str("```mermaid\ngraph TD\n");
    let mut current_file = "";
    let mut open = false;
    for (id, node) in &ids {
        let file = file_of(id);
        if file != current_file {
            if open {
                out.push_str("    end\n");
            }
            let _ = writeln!(out, "    subgraph \"{}\"", file.replace('"', "#quot;"));
            current_file = file;
            open = true;
        }
        let _ = writeln!(out, "        {node}[\"{}\"]", label(model, id));
    }
    if open {
        out.push_str("    end\n");
    }
    for (from, to) in model.graph.edges() {
        if let (Some(a), Some(b)) = (ids.get(from), ids.get(to)) {
            let _ = writeln!(out, "    {a} --> {b}");
        }
    }
    out.push_str("```\n\n### Dependencies\n\n");

    let mut file_edges: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (from, to) in model.graph.edges() {
        let (a, b) = (file_of(from), file_of(to));
        if a != b {
            file_edges.entry(a).or_default().insert(b);
        }
    }
    if file_edges.is_empty() {
        out.push_str("All references stay within their own file.\n");
    } else {
        for (file, deps) in &file_edges {
            let deps: Vec<String> = deps.iter().map(|d| format!("`{d}`")).collect();
            let _ = writeln!(out, "- `{file}` depends on {}", deps.join(", "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_of_splits_on_first_separator() {
        assert_eq!(file_of(&UnitId::new("pkg/a.py", "A.run")), "pkg/a.py");
    }

    #[test]
    fn empty_graph_renders_note() {
        let rendered = render(&StructuralModel::default());
        assert!(rendered.starts_with("## Architecture\n"));
        assert!(!rendered.contains("mermaid"));
    }
}
