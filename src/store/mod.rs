//! Record store: persistence for repository records and documents.
//!
//! All I/O goes through the `FileSystem` port. Layout:
//!
//! ```text
//! <root>/
//!   ├── records/<name>.yaml
//!   └── documents/<name>.yaml
//! ```
//!
//! Records are loaded once at open and served from memory. Every mutation
//! is a read-modify-write under the index lock, persisted before the lock
//! is released, so readers never observe a half-applied update.

pub mod record;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::context::ServiceContext;
use crate::error::StoreError;
use crate::ports::filesystem::EntryKind;

pub use record::{
    Document, RecordStatus, RepositoryRecord, StageName, StageResult, StageStatus,
};

/// Persistence for records and documents.
pub struct RecordStore {
    ctx: Arc<ServiceContext>,
    root: PathBuf,
    records: RwLock<BTreeMap<String, RepositoryRecord>>,
}

impl RecordStore {
    /// Opens the store at `root`, loading every persisted record.
    ///
    /// Unreadable or corrupt record files are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the records directory exists but cannot be listed.
    pub fn open(ctx: Arc<ServiceContext>, root: &Path) -> Result<Self, StoreError> {
        let records_dir = root.join("records");
        let mut records = BTreeMap::new();
        if ctx.fs.exists(&records_dir) {
            let entries = ctx.fs.list_dir(&records_dir).map_err(|e| StoreError::Io {
                key: "records".into(),
                message: e.to_string(),
            })?;
            for entry in entries.into_iter().filter(|e| e.kind == EntryKind::File) {
                let Some(name) = entry.name.strip_suffix(".yaml") else {
                    continue;
                };
                match load_record(&ctx, &records_dir.join(&entry.name), name) {
                    Ok(record) => {
                        records.insert(record.name.clone(), record);
                    }
                    Err(e) => warn!(record = name, error = %e, "skipping unreadable record"),
                }
            }
        }
        Ok(Self { ctx, root: root.to_path_buf(), records: RwLock::new(records) })
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Looks up a record by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn get(&self, name: &str) -> Result<Option<RepositoryRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(name).cloned())
    }

    /// All records, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn list(&self) -> Result<Vec<RepositoryRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.values().cloned().collect())
    }

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn upsert(&self, record: RepositoryRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        self.persist(&record)?;
        records.insert(record.name.clone(), record);
        Ok(())
    }

    /// Applies `f` to the named record and persists the result atomically
    /// with respect to other store operations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRecord`] if no such record exists, or an
    /// I/O error if the updated record cannot be persisted (in which case
    /// the in-memory copy is left unchanged).
    pub fn update<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut RepositoryRecord) -> T,
    ) -> Result<(T, RepositoryRecord), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let mut record =
            records.get(name).cloned().ok_or_else(|| StoreError::MissingRecord(name.into()))?;
        let out = f(&mut record);
        self.persist(&record)?;
        records.insert(name.to_string(), record.clone());
        Ok((out, record))
    }

    /// Stores `document` and applies `f` to its record as one operation.
    ///
    /// The document is written first; if the updated record then cannot be
    /// persisted, the document is removed again so no reader finds a
    /// document its record does not account for.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRecord`] if the record does not exist,
    /// or an I/O error if either write fails.
    pub fn publish<T>(
        &self,
        document: &Document,
        f: impl FnOnce(&mut RepositoryRecord) -> T,
    ) -> Result<(T, RepositoryRecord), StoreError> {
        let name = &document.repo_name;
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let mut record =
            records.get(name).cloned().ok_or_else(|| StoreError::MissingRecord(name.clone()))?;
        self.put_document(document)?;
        let out = f(&mut record);
        if let Err(e) = self.persist(&record) {
            if let Err(cleanup) = self.ctx.fs.remove_file(&self.document_path(name)) {
                warn!(repo = %name, error = %cleanup, "failed to withdraw unpublished document");
            }
            return Err(e);
        }
        records.insert(name.clone(), record.clone());
        Ok((out, record))
    }

    /// Stores (or replaces) a document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn put_document(&self, document: &Document) -> Result<(), StoreError> {
        let key = &document.repo_name;
        let yaml = serde_yaml::to_string(document)
            .map_err(|e| StoreError::Corrupt { key: key.clone(), message: e.to_string() })?;
        self.ctx
            .fs
            .write(&self.document_path(key), &yaml)
            .map_err(|e| StoreError::Io { key: key.clone(), message: e.to_string() })
    }

    /// Loads the document for `name`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn get_document(&self, name: &str) -> Result<Option<Document>, StoreError> {
        let path = self.document_path(name);
        if !self.ctx.fs.exists(&path) {
            return Ok(None);
        }
        let contents = self
            .ctx
            .fs
            .read_to_string(&path)
            .map_err(|e| StoreError::Io { key: name.into(), message: e.to_string() })?;
        serde_yaml::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Corrupt { key: name.into(), message: e.to_string() })
    }

    /// Deletes the document for `name`. Deleting a missing document succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete_document(&self, name: &str) -> Result<(), StoreError> {
        self.ctx
            .fs
            .remove_file(&self.document_path(name))
            .map_err(|e| StoreError::Io { key: name.into(), message: e.to_string() })
    }

    /// Verifies that the store root accepts writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe file cannot be written or removed.
    pub fn check_writable(&self) -> Result<(), StoreError> {
        let probe = self.root.join(".health-probe");
        let io = |e: Box<dyn std::error::Error + Send + Sync>| StoreError::Io {
            key: ".health-probe".into(),
            message: e.to_string(),
        };
        self.ctx.fs.write(&probe, "ok").map_err(io)?;
        self.ctx.fs.remove_file(&probe).map_err(io)
    }

    fn persist(&self, record: &RepositoryRecord) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(record)
            .map_err(|e| StoreError::Corrupt { key: record.name.clone(), message: e.to_string() })?;
        self.ctx
            .fs
            .write(&self.record_path(&record.name), &yaml)
            .map_err(|e| StoreError::Io { key: record.name.clone(), message: e.to_string() })
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.root.join("records").join(format!("{name}.yaml"))
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.root.join("documents").join(format!("{name}.yaml"))
    }
}

fn load_record(
    ctx: &ServiceContext,
    path: &Path,
    name: &str,
) -> Result<RepositoryRecord, StoreError> {
    let contents = ctx
        .fs
        .read_to_string(path)
        .map_err(|e| StoreError::Io { key: name.into(), message: e.to_string() })?;
    serde_yaml::from_str(&contents)
        .map_err(|e| StoreError::Corrupt { key: name.into(), message: e.to_string() })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::test_support::{context, context_with_fs, FakeGit, FakeLlm, MemFs, RejectingWrites};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-15T10:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn open(fs: MemFs) -> (Arc<ServiceContext>, RecordStore) {
        let ctx = Arc::new(context_with_fs(fs));
        let store = RecordStore::open(Arc::clone(&ctx), Path::new("/store")).unwrap();
        (ctx, store)
    }

    fn record(name: &str) -> RepositoryRecord {
        RepositoryRecord::new(name, &format!("https://github.com/octo/{name}"), now())
    }

    #[test]
    fn upsert_persists_and_reopen_reloads() {
        let (ctx, store) = open(MemFs::default());
        store.upsert(record("beta")).unwrap();
        store.upsert(record("alpha")).unwrap();

        let reopened = RecordStore::open(ctx, Path::new("/store")).unwrap();
        let names: Vec<String> = reopened.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(reopened.get("alpha").unwrap(), Some(record("alpha")));
    }

    #[test]
    fn update_applies_and_persists() {
        let (ctx, store) = open(MemFs::default());
        store.upsert(record("demo")).unwrap();

        let (moved, updated) =
            store.update("demo", |r| r.transition(RecordStatus::Cloning, now())).unwrap();
        assert!(moved);
        assert_eq!(updated.status, RecordStatus::Cloning);

        let on_disk = ctx.fs.read_to_string(Path::new("/store/records/demo.yaml")).unwrap();
        assert!(on_disk.contains("status: cloning"));
    }

    #[test]
    fn update_of_unknown_record_fails() {
        let (_, store) = open(MemFs::default());
        let err = store.update("ghost", |_| ()).unwrap_err();
        assert!(matches!(err, StoreError::MissingRecord(name) if name == "ghost"));
    }

    #[test]
    fn corrupt_records_are_skipped_on_open() {
        let fs = MemFs::with_files(&[("/store/records/bad.yaml", ": : not yaml [")]);
        let (_, store) = open(fs);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn documents_round_trip_and_delete() {
        let (_, store) = open(MemFs::default());
        assert_eq!(store.get_document("demo").unwrap(), None);

        let doc =
            Document { repo_name: "demo".into(), content: "# demo\n".into(), generated_at: now() };
        store.put_document(&doc).unwrap();
        assert_eq!(store.get_document("demo").unwrap(), Some(doc));

        store.delete_document("demo").unwrap();
        assert_eq!(store.get_document("demo").unwrap(), None);
        store.delete_document("demo").unwrap();
    }

    #[test]
    fn publish_sets_the_record_and_document_together() {
        let (_, store) = open(MemFs::default());
        store.upsert(record("demo")).unwrap();
        let doc =
            Document { repo_name: "demo".into(), content: "# demo\n".into(), generated_at: now() };

        let ((), updated) = store.publish(&doc, |r| r.has_documentation = true).unwrap();

        assert!(updated.has_documentation);
        assert_eq!(store.get("demo").unwrap(), Some(updated));
        assert_eq!(store.get_document("demo").unwrap(), Some(doc));
    }

    #[test]
    fn publish_withdraws_the_document_when_the_record_write_fails() {
        let fs = RejectingWrites::new(Box::<MemFs>::default(), "has_documentation: true");
        let ctx =
            Arc::new(context(Box::new(fs), Box::<FakeGit>::default(), Box::new(FakeLlm::echo())));
        let store = RecordStore::open(ctx, Path::new("/store")).unwrap();
        store.upsert(record("demo")).unwrap();
        let doc =
            Document { repo_name: "demo".into(), content: "# demo\n".into(), generated_at: now() };

        let err = store.publish(&doc, |r| r.has_documentation = true).unwrap_err();

        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(store.get_document("demo").unwrap(), None);
        assert!(!store.get("demo").unwrap().unwrap().has_documentation);
    }

    #[test]
    fn writable_check_leaves_nothing_behind() {
        let (ctx, store) = open(MemFs::default());
        store.check_writable().unwrap();
        assert!(!ctx.fs.exists(Path::new("/store/.health-probe")));
    }
}
