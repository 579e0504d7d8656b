//! Pipeline orchestrator: runs the stages for one repository, records
//! every transition in the record store and serves the results.
//!
//! Stages run strictly in sequence. Each stage's outcome is persisted
//! before the next one starts; the first failure halts the run, marks the
//! remaining stages as skipped and leaves earlier results in place.

pub mod guard;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assemble::{assemble, AssembleOptions};
use crate::config::Config;
use crate::context::ServiceContext;
use crate::error::{PipelineError, Result};
use crate::fetch::{self, FetchLimits, RepoUrl};
use crate::insight;
use crate::map::{map_tree, MapOptions};
use crate::parse::{self, ParserRegistry};
use crate::store::{
    Document, RecordStatus, RecordStore, RepositoryRecord, StageName, StageResult, StageStatus,
};

use self::guard::ActiveRuns;

/// Per-run options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Abort the clone beyond this size.
    pub max_size_mb: u64,
    /// Enumerate at most this many files.
    pub max_files: usize,
    /// Render the architecture section.
    pub include_diagrams: bool,
    /// Delete the workspace when the run ends, whatever the outcome.
    pub cleanup_workspace: bool,
    /// Fail the insight stage when no generation batch succeeds.
    pub require_insight: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_size_mb: 500,
            max_files: 100,
            include_diagrams: true,
            cleanup_workspace: true,
            require_insight: true,
        }
    }
}

/// Result of [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Record name.
    pub repo_name: String,
    /// Normalized URL.
    pub repo_url: String,
    /// Final record status: `completed` or `failed`.
    pub status: RecordStatus,
    /// Stage outcomes in execution order.
    pub stages: BTreeMap<StageName, StageResult>,
    /// Workspace path, when it was retained.
    pub workspace: Option<PathBuf>,
}

impl RunReport {
    /// `true` if every stage succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RecordStatus::Completed
    }

    /// Detail of the failed stage, prefixed by its name.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.stages
            .iter()
            .find(|(_, s)| s.status == StageStatus::Failed)
            .map(|(name, s)| format!("{}: {}", name.as_str(), s.detail))
    }
}

/// Overall service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every check passed.
    Healthy,
    /// At least one check failed.
    Degraded,
}

/// One health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Whether the check passed.
    pub ok: bool,
    /// What was observed.
    pub detail: String,
}

/// Result of [`Pipeline::health_check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `healthy` only if every check passed.
    pub status: HealthStatus,
    /// Checks by name.
    pub checks: BTreeMap<String, HealthCheck>,
}

/// Result of [`Pipeline::sweep_workspaces`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Orphaned workspaces that were removed.
    pub removed: Vec<String>,
    /// Workspaces left alone because a run owns them.
    pub in_use: Vec<String>,
    /// Problems encountered while sweeping.
    pub errors: Vec<String>,
}

/// Documentation pipeline and registry.
pub struct Pipeline {
    ctx: Arc<ServiceContext>,
    config: Config,
    store: RecordStore,
    parsers: Arc<ParserRegistry>,
    active: ActiveRuns,
}

impl Pipeline {
    /// Opens the record store and prepares the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store cannot be opened.
    pub fn new(ctx: Arc<ServiceContext>, config: Config) -> Result<Self> {
        let store = RecordStore::open(Arc::clone(&ctx), &config.store_root)?;
        let active = ActiveRuns::new(
            Arc::clone(&ctx),
            config.store_root.join("locks"),
            config.run_lock_stale(),
        );
        Ok(Self {
            ctx,
            config,
            store,
            parsers: Arc::new(ParserRegistry::with_defaults()),
            active,
        })
    }

    /// Checks that `url` names a recognized, reachable repository, without
    /// cloning it. Size and file limits are not checked.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRepository`] or
    /// [`PipelineError::Fetch`].
    pub async fn quick_validate(&self, url: &str) -> Result<RepoUrl> {
        fetch::validate(&self.ctx, &self.config, url).await
    }

    /// Runs every stage for `url`.
    ///
    /// Stage failures do not surface as errors: they are recorded and
    /// reported through [`RunReport`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRepository`] for a malformed URL
    /// (no record is created), [`PipelineError::AlreadyRunning`] if a run
    /// for the same name is in flight in any process sharing the store, and
    /// [`PipelineError::Store`] if the record cannot be persisted.
    pub async fn run(&self, url: &str, options: &RunOptions) -> Result<RunReport> {
        let repo = RepoUrl::parse(url)?;
        let name = repo.name().to_string();
        let dest = fetch::workspace_path(&self.ctx, &self.config.workspace_root, &repo);
        let guard = self.active.claim(&name, &dest)?;
        info!(repo = %name, url = %repo, "starting run");

        self.begin(&repo)?;

        let outcome = self.execute(&repo, dest.clone(), options).await;

        let workspace = if options.cleanup_workspace {
            if let Err(e) = self.ctx.fs.remove_dir_all(&dest) {
                warn!(repo = %name, error = %e, "failed to remove workspace");
            }
            None
        } else {
            self.ctx.fs.exists(&dest).then_some(dest)
        };
        drop(guard);
        outcome?;

        let record = self.store.get(&name)?.ok_or_else(|| PipelineError::NotFound(name.clone()))?;
        info!(repo = %name, status = record.status.as_str(), "run finished");
        Ok(RunReport {
            repo_name: record.name,
            repo_url: record.url,
            status: record.status,
            stages: record.stages,
            workspace,
        })
    }

    /// All records, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub fn list(&self) -> Result<Vec<RepositoryRecord>> {
        Ok(self.store.list()?)
    }

    /// The document generated by the latest successful run for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] when there is no such document,
    /// including when the record does not mark one as published.
    pub fn get_documentation(&self, name: &str) -> Result<Document> {
        let not_found = || PipelineError::NotFound(format!("no documentation for {name}"));
        let published = self.store.get(name)?.is_some_and(|r| r.has_documentation);
        if !published {
            return Err(not_found());
        }
        self.store.get_document(name)?.ok_or_else(not_found)
    }

    /// Reports whether git, the generation service and the store are usable.
    #[must_use]
    pub fn health_check(&self) -> HealthReport {
        let mut checks = BTreeMap::new();
        checks.insert(
            "git".to_string(),
            match self.ctx.git.version() {
                Ok(version) => HealthCheck { ok: true, detail: version },
                Err(e) => HealthCheck { ok: false, detail: format!("git unavailable: {e}") },
            },
        );
        let provider = self.config.insight.provider.as_str();
        let llm = if self.ctx.llm.is_configured() {
            HealthCheck { ok: true, detail: format!("{provider}: {}", self.config.insight.model()) }
        } else {
            HealthCheck { ok: false, detail: format!("{provider} credentials missing") }
        };
        checks.insert("llm".to_string(), llm);
        checks.insert(
            "store".to_string(),
            match self.store.check_writable() {
                Ok(()) => HealthCheck {
                    ok: true,
                    detail: format!("{} writable", self.store.root().display()),
                },
                Err(e) => HealthCheck { ok: false, detail: e.to_string() },
            },
        );

        let status = if checks.values().all(|c| c.ok) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthReport { status, checks }
    }

    /// Removes workspaces left behind by abandoned runs. Workspaces named
    /// by a live run lock, from this process or another, are kept.
    #[must_use]
    pub fn sweep_workspaces(&self) -> SweepReport {
        let root = &self.config.workspace_root;
        let mut report = SweepReport::default();
        if !self.ctx.fs.exists(root) {
            return report;
        }
        let held = match self.active.held_workspaces() {
            Ok(held) => held,
            Err(e) => {
                report.errors.push(e.to_string());
                return report;
            }
        };
        let entries = match self.ctx.fs.list_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                report.errors.push(format!("{}: {e}", root.display()));
                return report;
            }
        };
        for entry in entries {
            if !fetch::is_workspace_dir(&entry.name) {
                continue;
            }
            let path = root.join(&entry.name);
            if held.contains(&path) {
                report.in_use.push(entry.name);
                continue;
            }
            match self.ctx.fs.remove_dir_all(&path) {
                Ok(()) => {
                    info!(workspace = %entry.name, "removed orphaned workspace");
                    report.removed.push(entry.name);
                }
                Err(e) => report.errors.push(format!("{}: {e}", entry.name)),
            }
        }
        report
    }

    /// Creates or resets the record and drops any stale document.
    fn begin(&self, repo: &RepoUrl) -> Result<()> {
        let now = self.ctx.clock.now();
        self.store.delete_document(repo.name())?;
        let record = match self.store.get(repo.name())? {
            Some(mut existing) => {
                if existing.url != repo.as_string() {
                    info!(repo = repo.name(), previous = %existing.url, "record taken over by new url");
                }
                existing.reset(&repo.as_string(), now);
                existing
            }
            None => RepositoryRecord::new(repo.name(), &repo.as_string(), now),
        };
        self.store.upsert(record)?;
        Ok(())
    }

    async fn execute(&self, repo: &RepoUrl, dest: PathBuf, options: &RunOptions) -> Result<()> {
        let name = repo.name();

        // Cloning
        self.advance(name, RecordStatus::Cloning)?;
        let started = Instant::now();
        let limits = FetchLimits { max_size_mb: options.max_size_mb, max_files: options.max_files };
        let workspace = match fetch::fetch(&self.ctx, &self.config, repo, dest, limits).await {
            Ok(ws) => ws,
            Err(e) => return self.fail(name, StageName::Cloning, started, &e.to_string()),
        };
        let detail = format!("cloned {} bytes", workspace.size_bytes);
        self.succeed(name, StageName::Cloning, started, detail, |_| None)?;

        // Mapping
        let started = Instant::now();
        let ctx = Arc::clone(&self.ctx);
        let map_options = MapOptions {
            ignore_patterns: self.config.ignore_patterns.clone(),
            readme_excerpt_chars: self.config.readme_excerpt_chars,
        };
        let ws = workspace.clone();
        let mapped = tokio::task::spawn_blocking(move || map_tree(&ctx, &ws, &map_options))
            .await
            .map_err(|e| format!("mapping worker failed: {e}"))
            .and_then(|r| r);
        let tree = match mapped {
            Ok(tree) => tree,
            Err(e) => return self.fail(name, StageName::Mapping, started, &e),
        };
        let mut detail = format!("{} files in {} directories", tree.file_count, tree.dir_count);
        if tree.skipped_files > 0 {
            detail.push_str(&format!("; {} skipped by file limit", tree.skipped_files));
        }
        if !tree.warnings.is_empty() {
            detail.push_str(&format!("; {} warning(s)", tree.warnings.len()));
        }
        let total_files = tree.file_count;
        self.succeed(name, StageName::Mapping, started, detail, |r| {
            r.total_files = total_files;
            Some(RecordStatus::Mapped)
        })?;

        // Parsing
        let started = Instant::now();
        let ctx = Arc::clone(&self.ctx);
        let parsers = Arc::clone(&self.parsers);
        let root = workspace.root.clone();
        let files = tree.files.clone();
        let workers = self.config.parse_workers;
        let parsed = tokio::task::spawn_blocking(move || {
            parse::parse(&ctx, &parsers, &root, &files, workers)
        })
        .await
        .map_err(|e| format!("parse worker failed: {e}"))
        .and_then(|r| r);
        let model = match parsed {
            Ok(model) => model,
            Err(e) => return self.fail(name, StageName::Parsing, started, &e),
        };
        let mut detail = format!(
            "{} units in {} files ({} unsupported), {} references",
            model.unit_count(),
            model.analyzed_files,
            model.unsupported_files,
            model.graph.edge_count()
        );
        if !model.warnings.is_empty() {
            detail.push_str(&format!("; {} warning(s)", model.warnings.len()));
        }
        let analyzed_files = model.analyzed_files.min(total_files);
        self.succeed(name, StageName::Parsing, started, detail, |r| {
            r.analyzed_files = analyzed_files;
            Some(RecordStatus::Analyzed)
        })?;

        // Insight
        let started = Instant::now();
        let report = insight::generate(&self.ctx, &model, &self.config.insight).await;
        if report.is_total_outage() && options.require_insight {
            let reason = format!("all {} generation batch(es) failed", report.batches);
            return self.fail(name, StageName::Insight, started, &reason);
        }
        let mut detail = format!(
            "{} units described in {} batch(es)",
            report.insights.len(),
            report.batches
        );
        if report.failed_batches > 0 {
            detail.push_str(&format!(
                "; {} warning(s): generation degraded",
                report.failed_batches
            ));
        }
        if report.omitted_units > 0 {
            detail.push_str(&format!("; {} unit(s) over the limit", report.omitted_units));
        }
        detail.push_str(&format!(
            "; {} prompt / {} completion tokens",
            report.prompt_tokens, report.completion_tokens
        ));
        self.succeed(name, StageName::Insight, started, detail, |_| None)?;

        // Assembly
        let started = Instant::now();
        let options = AssembleOptions {
            repo_name: name.to_string(),
            repo_url: repo.as_string(),
            include_diagrams: options.include_diagrams,
        };
        let content = assemble(&tree, &model, &report.insights, &options);
        let document = Document {
            repo_name: name.to_string(),
            content,
            generated_at: self.ctx.clock.now(),
        };
        let detail = format!("{} characters", document.content.chars().count());
        let duration_ms = elapsed_ms(started);
        let now = self.ctx.clock.now();
        // The document and the record flag that exposes it land together.
        let published = self.store.publish(&document, |r| {
            r.record_stage(
                StageName::Assembly,
                StageResult { status: StageStatus::Success, detail: detail.clone(), duration_ms },
            );
            r.has_documentation = true;
            transition(r, RecordStatus::Completed, now);
        });
        match published {
            Ok(_) => {
                info!(repo = name, stage = StageName::Assembly.as_str(), duration_ms, %detail, "stage succeeded");
                Ok(())
            }
            Err(e) => self.fail(name, StageName::Assembly, started, &e.to_string()),
        }
    }

    fn advance(&self, name: &str, next: RecordStatus) -> Result<()> {
        let now = self.ctx.clock.now();
        self.store.update(name, |r| transition(r, next, now))?;
        Ok(())
    }

    /// Records a successful stage; `apply` may adjust counters and returns
    /// the status to move to, if any.
    fn succeed(
        &self,
        name: &str,
        stage: StageName,
        started: Instant,
        detail: String,
        apply: impl FnOnce(&mut RepositoryRecord) -> Option<RecordStatus>,
    ) -> Result<()> {
        let duration_ms = elapsed_ms(started);
        let now = self.ctx.clock.now();
        info!(repo = name, stage = stage.as_str(), duration_ms, %detail, "stage succeeded");
        self.store.update(name, |r| {
            r.record_stage(stage, StageResult { status: StageStatus::Success, detail, duration_ms });
            if let Some(next) = apply(r) {
                transition(r, next, now);
            }
        })?;
        Ok(())
    }

    /// Records a failed stage, skips the rest and marks the record failed.
    fn fail(&self, name: &str, stage: StageName, started: Instant, reason: &str) -> Result<()> {
        let duration_ms = elapsed_ms(started);
        let now = self.ctx.clock.now();
        let detail = format!("{} failed: {reason}", stage.as_str());
        warn!(repo = name, stage = stage.as_str(), duration_ms, %detail, "stage failed");
        self.store.update(name, |r| {
            r.record_stage(stage, StageResult { status: StageStatus::Failed, detail, duration_ms });
            for later in StageName::ALL.into_iter().filter(|s| *s > stage) {
                r.record_stage(later, StageResult::skipped());
            }
            transition(r, RecordStatus::Failed, now);
        })?;
        Ok(())
    }
}

fn transition(record: &mut RepositoryRecord, next: RecordStatus, now: DateTime<Utc>) {
    if !record.transition(next, now) {
        warn!(
            repo = %record.name,
            from = record.status.as_str(),
            to = next.as_str(),
            "ignored illegal status transition"
        );
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
