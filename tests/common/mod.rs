//! Pipeline harness over a temporary store and workspace root.

#![allow(dead_code)]

use std::sync::Arc;

use repodoc::adapters::live::filesystem::LiveFileSystem;
use repodoc::config::{Config, InsightConfig};
use repodoc::context::ServiceContext;
use repodoc::pipeline::Pipeline;
use repodoc::ports::FileSystem;
use repodoc::test_support::{FakeGit, FakeLlm, FixedClock, SeqIds};
use tempfile::TempDir;

/// A pipeline over a temporary store and workspace root.
pub struct Harness {
    pub dir: TempDir,
    pub pipeline: Pipeline,
    config: Config,
}

impl Harness {
    pub fn new(remote: &FakeGit, llm: FakeLlm) -> Self {
        Self::with_config(remote, llm, |_| {})
    }

    pub fn with_config(remote: &FakeGit, llm: FakeLlm, tweak: impl FnOnce(&mut Config)) -> Self {
        Self::with_fs(remote, llm, Box::new(LiveFileSystem), tweak)
    }

    pub fn with_fs(
        remote: &FakeGit,
        llm: FakeLlm,
        fs: Box<dyn FileSystem>,
        tweak: impl FnOnce(&mut Config),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            store_root: dir.path().join("store"),
            workspace_root: dir.path().join("workspaces"),
            insight: InsightConfig { backoff_ms: 0, ..InsightConfig::default() },
            ..Config::default()
        };
        tweak(&mut config);
        let pipeline = build(remote, llm, fs, SeqIds::default(), config.clone());
        Self { dir, pipeline, config }
    }

    /// Another pipeline over the same store and workspace root, the way a
    /// second CLI process would open it.
    pub fn sibling(&self, remote: &FakeGit, llm: FakeLlm) -> Pipeline {
        let ids = SeqIds::starting_at(1_000);
        build(remote, llm, Box::new(LiveFileSystem), ids, self.config.clone())
    }

    /// Workspace directories currently on disk.
    pub fn workspaces(&self) -> Vec<String> {
        let root = self.dir.path().join("workspaces");
        let Ok(entries) = std::fs::read_dir(root) else {
            return Vec::new();
        };
        let mut names: Vec<String> =
            entries.flatten().map(|e| e.file_name().to_string_lossy().into_owned()).collect();
        names.sort();
        names
    }
}

fn build(
    remote: &FakeGit,
    llm: FakeLlm,
    fs: Box<dyn FileSystem>,
    ids: SeqIds,
    config: Config,
) -> Pipeline {
    let ctx = ServiceContext {
        clock: Box::<FixedClock>::default(),
        fs,
        git: Box::new(remote.clone()),
        id_gen: Box::new(ids),
        llm: Box::new(llm),
    };
    Pipeline::new(Arc::new(ctx), config).unwrap()
}
