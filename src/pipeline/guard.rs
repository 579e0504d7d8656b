//! Per-name exclusivity for runs, shared by every process using a store.
//!
//! A run holds `<store>/locks/<name>.lock` for its whole lifetime. The lock
//! names the workspace the run owns so that sweeps, from any process, leave
//! it alone. A lock older than the stale limit belongs to a process that
//! died mid-run and may be taken over.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::ServiceContext;
use crate::error::{PipelineError, StoreError};
use crate::ports::filesystem::EntryKind;

const LOCK_SUFFIX: &str = ".lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LockFile {
    token: String,
    pid: u32,
    workspace: PathBuf,
    acquired_at: DateTime<Utc>,
}

/// Run locks under one store root.
pub struct ActiveRuns {
    ctx: Arc<ServiceContext>,
    dir: PathBuf,
    stale_after: Duration,
}

impl ActiveRuns {
    /// Locks live in `dir`; a lock older than `stale_after` is abandoned.
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>, dir: PathBuf, stale_after: Duration) -> Self {
        Self { ctx, dir, stale_after }
    }

    /// Claims `name` for a new run that will own `workspace`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyRunning`] if a live lock holds `name`,
    /// or a store error if the lock cannot be written.
    pub fn claim(&self, name: &str, workspace: &Path) -> Result<RunGuard, PipelineError> {
        let path = self.lock_path(name);
        let now = self.ctx.clock.now();
        let lock = LockFile {
            token: self.ctx.id_gen.generate_id(),
            pid: std::process::id(),
            workspace: workspace.to_path_buf(),
            acquired_at: now,
        };
        let yaml = serde_yaml::to_string(&lock).map_err(|e| corrupt(name, &e))?;
        let io = |e: Box<dyn std::error::Error + Send + Sync>| lock_io(name, &e);

        if !self.ctx.fs.create_new(&path, &yaml).map_err(io)? {
            match self.read(&path) {
                Some(held) if !self.is_stale(&held, now) => {
                    return Err(PipelineError::AlreadyRunning(name.to_string()));
                }
                held => {
                    warn!(
                        repo = name,
                        pid = held.as_ref().map(|h| h.pid),
                        "taking over abandoned run lock"
                    );
                    self.ctx.fs.write(&path, &yaml).map_err(io)?;
                }
            }
        }
        debug!(repo = name, lock = %path.display(), "run lock acquired");
        Ok(RunGuard { ctx: Arc::clone(&self.ctx), path, token: lock.token })
    }

    /// Workspaces owned by live locks.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lock directory cannot be listed.
    pub fn held_workspaces(&self) -> Result<Vec<PathBuf>, StoreError> {
        if !self.ctx.fs.exists(&self.dir) {
            return Ok(Vec::new());
        }
        let entries = self.ctx.fs.list_dir(&self.dir).map_err(|e| StoreError::Io {
            key: "locks".into(),
            message: e.to_string(),
        })?;
        let now = self.ctx.clock.now();
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::File && e.name.ends_with(LOCK_SUFFIX))
            .filter_map(|e| self.read(&self.dir.join(&e.name)))
            .filter(|lock| !self.is_stale(lock, now))
            .map(|lock| lock.workspace)
            .collect())
    }

    fn read(&self, path: &Path) -> Option<LockFile> {
        let contents = self.ctx.fs.read_to_string(path).ok()?;
        serde_yaml::from_str(&contents).ok()
    }

    fn is_stale(&self, lock: &LockFile, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(lock.acquired_at)
            .to_std()
            .is_ok_and(|age| age > self.stale_after)
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{LOCK_SUFFIX}"))
    }
}

/// Releases its lock when dropped, including when the run future is
/// cancelled. A lock taken over by another run is left in place.
pub struct RunGuard {
    ctx: Arc<ServiceContext>,
    path: PathBuf,
    token: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let Ok(contents) = self.ctx.fs.read_to_string(&self.path) else {
            return;
        };
        let held = serde_yaml::from_str::<LockFile>(&contents);
        if !held.is_ok_and(|lock| lock.token == self.token) {
            return;
        }
        if let Err(e) = self.ctx.fs.remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

fn lock_io(key: &str, e: &dyn std::fmt::Display) -> StoreError {
    StoreError::Io { key: format!("{key}{LOCK_SUFFIX}"), message: e.to_string() }
}

fn corrupt(key: &str, e: &dyn std::fmt::Display) -> StoreError {
    StoreError::Corrupt { key: format!("{key}{LOCK_SUFFIX}"), message: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_with_fs, MemFs};

    fn runs(fs: MemFs) -> ActiveRuns {
        let ctx = Arc::new(context_with_fs(fs));
        ActiveRuns::new(ctx, PathBuf::from("/store/locks"), Duration::from_secs(3600))
    }

    #[test]
    fn second_claim_fails_until_guard_drops() {
        let active = runs(MemFs::default());
        let guard = active.claim("demo", Path::new("/ws/repodoc-demo-1")).unwrap();
        assert!(matches!(
            active.claim("demo", Path::new("/ws/repodoc-demo-2")),
            Err(PipelineError::AlreadyRunning(_))
        ));
        assert!(active.claim("other", Path::new("/ws/repodoc-other-1")).is_ok());

        drop(guard);
        assert!(active.claim("demo", Path::new("/ws/repodoc-demo-3")).is_ok());
    }

    #[test]
    fn workspace_ownership_follows_the_guard() {
        let active = runs(MemFs::default());
        let guard = active.claim("demo", Path::new("/ws/repodoc-demo-1")).unwrap();
        assert_eq!(active.held_workspaces().unwrap(), vec![PathBuf::from("/ws/repodoc-demo-1")]);

        drop(guard);
        assert!(active.held_workspaces().unwrap().is_empty());
    }

    #[test]
    fn abandoned_lock_is_taken_over() {
        let old = concat!(
            "token: dead\npid: 1\nworkspace: /ws/repodoc-demo-0\n",
            "acquired_at: 2020-01-01T00:00:00Z\n"
        );
        let active = runs(MemFs::with_files(&[("/store/locks/demo.lock", old)]));
        assert!(active.held_workspaces().unwrap().is_empty());

        let guard = active.claim("demo", Path::new("/ws/repodoc-demo-1")).unwrap();
        assert_eq!(active.held_workspaces().unwrap(), vec![PathBuf::from("/ws/repodoc-demo-1")]);
        drop(guard);
    }

    #[test]
    fn dropping_a_superseded_guard_keeps_the_new_lock() {
        let active = runs(MemFs::default());
        let stale = active.claim("demo", Path::new("/ws/repodoc-demo-1")).unwrap();
        let newer = concat!(
            "token: newer\npid: 2\nworkspace: /ws/repodoc-demo-2\n",
            "acquired_at: 2025-06-15T10:00:00Z\n"
        );
        active.ctx.fs.write(Path::new("/store/locks/demo.lock"), newer).unwrap();

        drop(stale);
        assert_eq!(active.held_workspaces().unwrap(), vec![PathBuf::from("/ws/repodoc-demo-2")]);
    }
}
