//! Port fakes shared by unit and integration tests.
//!
//! Compiled for this crate's own tests and, behind the `test-support`
//! feature, for the integration tests under `tests/`.

#![allow(clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::adapters::live::filesystem::LiveFileSystem;
use crate::context::ServiceContext;
use crate::error::{FetchError, FetchReason};
use crate::ports::filesystem::{DirEntry, EntryKind, FileSystem};
use crate::ports::git::{CloneRequest, GitFuture, GitRemote};
use crate::ports::llm::{CompletionFuture, CompletionRequest, CompletionResponse, LlmClient};
use crate::ports::system::{Clock, IdGenerator};

type BoxError = Box<dyn Error + Send + Sync>;

/// In-memory filesystem. Directories exist implicitly when a file lives
/// below them.
#[derive(Default)]
pub struct MemFs {
    files: Mutex<BTreeMap<PathBuf, String>>,
}

impl MemFs {
    /// A filesystem holding `files` as `(path, contents)` pairs.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let map = files.iter().map(|(p, c)| (PathBuf::from(p), (*c).to_string())).collect();
        Self { files: Mutex::new(map) }
    }
}

impl FileSystem for MemFs {
    fn read_to_string(&self, path: &Path) -> Result<String, BoxError> {
        let files = self.files.lock().unwrap();
        files.get(path).cloned().ok_or_else(|| format!("not found: {}", path.display()).into())
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), BoxError> {
        self.files.lock().unwrap().insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_new(&self, path: &Path, contents: &str) -> Result<bool, BoxError> {
        let mut files = self.files.lock().unwrap();
        if files.contains_key(path) {
            return Ok(false);
        }
        files.insert(path.to_path_buf(), contents.to_string());
        Ok(true)
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.keys().any(|k| k.starts_with(path))
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, BoxError> {
        let files = self.files.lock().unwrap();
        let mut entries: BTreeMap<String, DirEntry> = BTreeMap::new();
        for (key, contents) in files.iter() {
            let Ok(rest) = key.strip_prefix(path) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };
            let name = first.as_os_str().to_string_lossy().into_owned();
            let entry = if components.next().is_some() {
                DirEntry { name: name.clone(), kind: EntryKind::Dir, len: 0 }
            } else {
                DirEntry { name: name.clone(), kind: EntryKind::File, len: contents.len() as u64 }
            };
            entries.insert(name, entry);
        }
        if entries.is_empty() {
            return Err(format!("not a directory: {}", path.display()).into());
        }
        Ok(entries.into_values().collect())
    }

    fn remove_file(&self, path: &Path) -> Result<(), BoxError> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), BoxError> {
        self.files.lock().unwrap().retain(|k, _| !k.starts_with(path));
        Ok(())
    }
}

/// Wraps a filesystem and rejects every write whose contents contain
/// `needle`. Everything else passes through.
pub struct RejectingWrites {
    inner: Box<dyn FileSystem>,
    needle: String,
}

impl RejectingWrites {
    /// Rejects writes of `needle` on top of `inner`.
    pub fn new(inner: Box<dyn FileSystem>, needle: &str) -> Self {
        Self { inner, needle: needle.to_string() }
    }
}

impl FileSystem for RejectingWrites {
    fn read_to_string(&self, path: &Path) -> Result<String, BoxError> {
        self.inner.read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), BoxError> {
        if contents.contains(&self.needle) {
            return Err(format!("disk full writing {}", path.display()).into());
        }
        self.inner.write(path, contents)
    }

    fn create_new(&self, path: &Path, contents: &str) -> Result<bool, BoxError> {
        self.inner.create_new(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, BoxError> {
        self.inner.list_dir(path)
    }

    fn remove_file(&self, path: &Path) -> Result<(), BoxError> {
        self.inner.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), BoxError> {
        self.inner.remove_dir_all(path)
    }
}

#[derive(Default)]
struct RemoteState {
    files: Vec<(String, String)>,
    probe_error: Option<FetchError>,
    clone_error: Option<FetchError>,
    delay: Duration,
}

/// Git remote that "clones" by writing its files into the destination.
///
/// Clones share state, so a test can keep a handle and change the remote
/// between runs.
#[derive(Clone, Default)]
pub struct FakeGit {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeGit {
    /// A remote holding `files` as `(path, contents)` pairs.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let git = Self::default();
        git.set_files(files);
        git
    }

    /// Replaces the remote's contents.
    pub fn set_files(&self, files: &[(&str, &str)]) {
        self.state.lock().unwrap().files =
            files.iter().map(|(p, c)| ((*p).to_string(), (*c).to_string())).collect();
    }

    /// Makes clones fail with `error` once the files are written.
    pub fn fail_clone(&self, error: Option<FetchError>) {
        self.state.lock().unwrap().clone_error = error;
    }

    /// Makes probes fail with `error`.
    pub fn fail_probe(&self, error: Option<FetchError>) {
        self.state.lock().unwrap().probe_error = error;
    }

    /// Holds each clone open for `delay` after creating the destination.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }
}

impl GitRemote for FakeGit {
    fn probe(&self, _url: &str, _timeout: Duration) -> GitFuture<'_, ()> {
        let result = self.state.lock().unwrap().probe_error.clone().map_or(Ok(()), Err);
        Box::pin(async move { result })
    }

    fn clone_shallow(&self, request: &CloneRequest) -> GitFuture<'_, u64> {
        let request = request.clone();
        Box::pin(async move {
            let (files, clone_error, delay) = {
                let state = self.state.lock().unwrap();
                (state.files.clone(), state.clone_error.clone(), state.delay)
            };
            std::fs::create_dir_all(&request.dest).unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut size = 0;
            for (rel, contents) in &files {
                let path = request.dest.join(rel);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(&path, contents).unwrap();
                size += contents.len() as u64;
            }
            if let Some(e) = clone_error {
                return Err(e);
            }
            if size > request.max_bytes {
                return Err(FetchError::new(FetchReason::TooLarge, "size limit exceeded"));
            }
            Ok(size)
        })
    }

    fn version(&self) -> Result<String, BoxError> {
        Ok("git version 2.43.0".into())
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<String, String> + Send + Sync;

/// Scriptable generation service that counts its calls.
pub struct FakeLlm {
    respond: Box<Responder>,
    calls: Arc<AtomicUsize>,
    configured: bool,
}

impl FakeLlm {
    /// Answers each request with `respond`.
    pub fn new(
        respond: impl Fn(&CompletionRequest) -> Result<String, String> + Send + Sync + 'static,
    ) -> Self {
        Self { respond: Box::new(respond), calls: Arc::new(AtomicUsize::new(0)), configured: true }
    }

    /// Answers every unit of every request.
    pub fn echo() -> Self {
        Self::new(|req| Ok(answer_all(&req.prompt)))
    }

    /// Reports missing credentials to the health check.
    #[must_use]
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Counter of `complete` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl LlmClient for FakeLlm {
    fn complete(&self, request: &CompletionRequest) -> CompletionFuture<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = (self.respond)(request);
        Box::pin(async move {
            result
                .map(|text| CompletionResponse { text, prompt_tokens: 10, completion_tokens: 5 })
                .map_err(Into::into)
        })
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

/// Answers every `[n]` unit marker in `prompt`.
pub fn answer_all(prompt: &str) -> String {
    let units: Vec<serde_json::Value> = prompt
        .lines()
        .filter_map(|l| l.strip_prefix('[')?.strip_suffix(']')?.parse::<usize>().ok())
        .map(|i| serde_json::json!({"index": i, "insight": format!("Insight for unit {i}.")}))
        .collect();
    serde_json::json!({ "units": units }).to_string()
}

/// Clock pinned to a single instant.
pub struct FixedClock(
    /// The instant every call returns.
    pub DateTime<Utc>,
);

impl Default for FixedClock {
    fn default() -> Self {
        Self(Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Zero-padded sequential ids.
#[derive(Default)]
pub struct SeqIds(AtomicUsize);

impl SeqIds {
    /// Ids counting up from `first`.
    pub fn starting_at(first: usize) -> Self {
        Self(AtomicUsize::new(first))
    }
}

impl IdGenerator for SeqIds {
    fn generate_id(&self) -> String {
        format!("{:08}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

/// A context over the given ports with a fixed clock and sequential ids.
pub fn context(
    fs: Box<dyn FileSystem>,
    git: Box<dyn GitRemote>,
    llm: Box<dyn LlmClient>,
) -> ServiceContext {
    ServiceContext {
        clock: Box::<FixedClock>::default(),
        fs,
        git,
        id_gen: Box::<SeqIds>::default(),
        llm,
    }
}

/// Real filesystem with a fake git remote.
pub fn context_with(git: FakeGit) -> ServiceContext {
    context(Box::new(LiveFileSystem), Box::new(git), Box::new(FakeLlm::echo()))
}

/// In-memory filesystem.
pub fn context_with_fs(fs: MemFs) -> ServiceContext {
    context(Box::new(fs), Box::<FakeGit>::default(), Box::new(FakeLlm::echo()))
}

/// In-memory filesystem with a scripted generation service.
pub fn context_with_llm(llm: FakeLlm) -> ServiceContext {
    context(Box::<MemFs>::default(), Box::<FakeGit>::default(), Box::new(llm))
}
