//! The Code Context Graph: directed references between units.
//!
//! Stored as an adjacency map keyed by [`UnitId`], so cycles (mutual
//! recursion) need no special handling.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::{FileModel, UnitId};

/// Directed graph: `a -> b` when `a`'s body names `b`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceGraph {
    edges: BTreeMap<UnitId, BTreeSet<UnitId>>,
}

impl ReferenceGraph {
    /// Adds an edge. Self references are ignored.
    pub fn add_edge(&mut self, from: UnitId, to: UnitId) {
        if from != to {
            self.edges.entry(from).or_default().insert(to);
        }
    }

    /// Units referenced by `id`, in id order.
    pub fn targets<'a>(&'a self, id: &UnitId) -> impl Iterator<Item = &'a UnitId> + 'a {
        self.edges.get(id).into_iter().flatten()
    }

    /// Units that reference `id`, in id order.
    pub fn sources<'a>(&'a self, id: &'a UnitId) -> impl Iterator<Item = &'a UnitId> + 'a {
        self.edges.iter().filter(move |(_, to)| to.contains(id)).map(|(from, _)| from)
    }

    /// All edges in (source, target) order.
    pub fn edges(&self) -> impl Iterator<Item = (&UnitId, &UnitId)> {
        self.edges.iter().flat_map(|(from, to)| to.iter().map(move |t| (from, t)))
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// `true` when there are no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// File path without extension, `/`-separated.
fn module_path(path: &str) -> &str {
    path.rsplit_once('.').map_or(path, |(stem, _)| stem)
}

/// `true` if `import` (a dotted module path) plausibly names the file at `path`.
fn import_names_file(import: &str, path: &str) -> bool {
    let module = module_path(path);
    let wanted = import.trim_start_matches('.').replace('.', "/");
    if wanted.is_empty() {
        return false;
    }
    module == wanted
        || module.ends_with(&format!("/{wanted}"))
        || module.rsplit('/').next() == wanted.rsplit('/').next()
}

/// Resolves identifier references into edges.
///
/// For each referenced name, candidates are tried in order: definitions in
/// the same file, definitions in files the referencing file imports, and
/// finally a unique definition anywhere in the workspace. Anything else is
/// dropped.
#[must_use]
pub fn build(files: &BTreeMap<String, FileModel>) -> ReferenceGraph {
    let mut by_name: HashMap<&str, Vec<(&str, &UnitId)>> = HashMap::new();
    for file in files.values() {
        for unit in &file.units {
            by_name.entry(unit.name.as_str()).or_default().push((file.path.as_str(), &unit.id));
        }
    }

    let mut graph = ReferenceGraph::default();
    for file in files.values() {
        for unit in &file.units {
            for name in &unit.references {
                let Some(candidates) = by_name.get(name.as_str()) else {
                    continue;
                };
                let local: Vec<&UnitId> =
                    candidates.iter().filter(|(p, _)| *p == file.path).map(|(_, id)| *id).collect();
                let imported: Vec<&UnitId> = candidates
                    .iter()
                    .filter(|(p, _)| {
                        *p != file.path && file.imports.iter().any(|imp| import_names_file(imp, p))
                    })
                    .map(|(_, id)| *id)
                    .collect();
                let resolved = if !local.is_empty() {
                    local
                } else if !imported.is_empty() {
                    imported
                } else if candidates.len() == 1 {
                    vec![candidates[0].1]
                } else {
                    Vec::new()
                };
                for target in resolved {
                    graph.add_edge(unit.id.clone(), target.clone());
                }
            }
        }
    }
    graph
}
