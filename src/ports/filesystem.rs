//! Filesystem port for workspace walks and store persistence.

use std::path::Path;

/// Kind of a directory entry. Symlinks are reported, never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link (or anything else that is neither file nor directory).
    Other,
    /// Entry whose name is not valid UTF-8; the entry's `name` is a lossy
    /// rendering and cannot be opened again.
    NonUtf8,
}

/// A single entry returned by [`FileSystem::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name, without any parent path.
    pub name: String,
    /// What the entry is.
    pub kind: EntryKind,
    /// Size in bytes (zero for directories).
    pub len: u64,
}

/// Provides filesystem access for reading and writing files.
///
/// Abstracting the filesystem lets the registry and the tree mapper be
/// exercised against an in-memory tree.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or is not valid UTF-8.
    fn read_to_string(
        &self,
        path: &Path,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;

    /// Atomically replaces a file's contents, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails (permissions, disk full, etc.).
    fn write(
        &self,
        path: &Path,
        contents: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Creates a file with `contents` only if nothing exists at `path`.
    ///
    /// Returns `false`, leaving the existing file untouched, when the path is
    /// taken. Readers never see the new file without its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created for another reason.
    fn create_new(
        &self,
        path: &Path,
        contents: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    /// Returns `true` if the path exists on the filesystem.
    fn exists(&self, path: &Path) -> bool;

    /// Lists the entries in a directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a directory or cannot be read.
    fn list_dir(
        &self,
        path: &Path,
    ) -> Result<Vec<DirEntry>, Box<dyn std::error::Error + Send + Sync>>;

    /// Removes a file. Removing a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    fn remove_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Recursively removes a directory. Removing a missing directory is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    fn remove_dir_all(&self, path: &Path)
        -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
