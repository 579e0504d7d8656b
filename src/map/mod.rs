//! Tree mapping: a deterministic summary of a workspace's file layout.

pub mod generator;

use serde::{Deserialize, Serialize};

pub use generator::{map_tree, MapOptions};

/// Directory names that are never descended into.
pub const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// File-tree summary of a workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeSummary {
    /// Number of files enumerated (capped by the file limit).
    pub file_count: usize,
    /// Number of directories walked, excluding the workspace root.
    pub dir_count: usize,
    /// Leading text of the top-level README, if any.
    pub readme_excerpt: Option<String>,
    /// Sorted top-level names; directories carry a trailing `/`.
    pub top_level_entries: Vec<String>,
    /// Enumerated files as `/`-separated paths relative to the root, in walk order.
    pub files: Vec<String>,
    /// Files found beyond the file limit.
    pub skipped_files: usize,
    /// Entries that could not be read. Mapping is best-effort.
    pub warnings: Vec<String>,
}
