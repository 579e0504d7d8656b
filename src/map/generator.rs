//! Workspace walk behind [`map_tree`], performed through the `FileSystem` port.

use tracing::warn;

use crate::context::ServiceContext;
use crate::fetch::Workspace;
use crate::map::{TreeSummary, VCS_DIRS};
use crate::ports::filesystem::EntryKind;

/// Knobs for [`map_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOptions {
    /// Exact names, or `*.suffix` patterns, to skip.
    pub ignore_patterns: Vec<String>,
    /// README excerpt length in characters.
    pub readme_excerpt_chars: usize,
}

/// Walks `workspace` and summarizes its layout.
///
/// Directories are visited in sorted order so identical trees always yield
/// identical summaries. Version-control metadata and ignored names are
/// skipped; symlinks are not followed. At most `workspace.max_files` files
/// are enumerated; the remainder are counted in `skipped_files`.
///
/// # Errors
///
/// Returns an error string only when the workspace root itself cannot be
/// listed. Failures below the root become warnings.
pub fn map_tree(
    ctx: &ServiceContext,
    workspace: &Workspace,
    options: &MapOptions,
) -> Result<TreeSummary, String> {
    let root_entries = ctx
        .fs
        .list_dir(&workspace.root)
        .map_err(|e| format!("cannot read workspace {}: {e}", workspace.root.display()))?;

    let mut summary = TreeSummary::default();
    for entry in &root_entries {
        if is_ignored(&entry.name, entry.kind, &options.ignore_patterns) {
            continue;
        }
        match entry.kind {
            EntryKind::Dir => summary.top_level_entries.push(format!("{}/", entry.name)),
            EntryKind::NonUtf8 => {}
            _ => summary.top_level_entries.push(entry.name.clone()),
        }
    }

    summary.readme_excerpt = read_readme(ctx, workspace, &root_entries, options, &mut summary);

    // Depth-first, children pushed in reverse so they pop in sorted order.
    let mut stack: Vec<String> = vec![String::new()];
    while let Some(rel_dir) = stack.pop() {
        let abs = if rel_dir.is_empty() {
            workspace.root.clone()
        } else {
            workspace.root.join(&rel_dir)
        };
        let entries = if rel_dir.is_empty() {
            root_entries.clone()
        } else {
            match ctx.fs.list_dir(&abs) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %rel_dir, error = %e, "skipping unreadable directory");
                    summary.warnings.push(format!("{rel_dir}: {e}"));
                    continue;
                }
            }
        };

        let mut subdirs = Vec::new();
        for entry in entries {
            if is_ignored(&entry.name, entry.kind, &options.ignore_patterns) {
                continue;
            }
            let rel = join_rel(&rel_dir, &entry.name);
            match entry.kind {
                EntryKind::Dir => {
                    summary.dir_count += 1;
                    subdirs.push(rel);
                }
                EntryKind::File => {
                    if summary.files.len() < workspace.max_files {
                        summary.files.push(rel);
                    } else {
                        summary.skipped_files += 1;
                    }
                }
                EntryKind::NonUtf8 => {
                    warn!(path = %rel, "skipping entry with non-UTF-8 name");
                    summary.warnings.push(format!("{rel}: file name is not valid UTF-8"));
                }
                EntryKind::Other => {}
            }
        }
        stack.extend(subdirs.into_iter().rev());
    }

    summary.file_count = summary.files.len();
    Ok(summary)
}

fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Returns `true` if an entry should be excluded from the walk.
fn is_ignored(name: &str, kind: EntryKind, patterns: &[String]) -> bool {
    if kind == EntryKind::Dir && VCS_DIRS.contains(&name) {
        return true;
    }
    patterns.iter().any(|pattern| match pattern.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => name == pattern,
    })
}

fn read_readme(
    ctx: &ServiceContext,
    workspace: &Workspace,
    root_entries: &[crate::ports::filesystem::DirEntry],
    options: &MapOptions,
    summary: &mut TreeSummary,
) -> Option<String> {
    let readme = root_entries
        .iter()
        .find(|e| e.kind == EntryKind::File && e.name.to_ascii_lowercase().starts_with("readme"))?;
    let path = workspace.root.join(&readme.name);
    match ctx.fs.read_to_string(&path) {
        Ok(text) => Some(excerpt(&text, options.readme_excerpt_chars)),
        Err(e) => {
            summary.warnings.push(format!("{}: {e}", readme.name));
            None
        }
    }
}

/// Truncates on a char boundary, trimming surrounding whitespace.
fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => trimmed[..idx].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}
