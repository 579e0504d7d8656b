//! Persisted data model: repository records and generated documents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a repository record.
///
/// Moves forward only: `pending → cloning → mapped → analyzed → completed`,
/// with `failed` reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Created, no stage started yet.
    Pending,
    /// Fetch in progress.
    Cloning,
    /// Workspace fetched and mapped.
    Mapped,
    /// Structure parsed; documentation may be in progress.
    Analyzed,
    /// Every stage succeeded.
    Completed,
    /// A stage failed.
    Failed,
}

impl RecordStatus {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cloning => "cloning",
            Self::Mapped => "mapped",
            Self::Analyzed => "analyzed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `true` for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a record may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next > self
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    /// Fetch the repository into a workspace.
    Cloning,
    /// Summarize the workspace layout.
    Mapping,
    /// Extract units and the reference graph.
    Parsing,
    /// Generate per-unit narratives.
    Insight,
    /// Render and store the document.
    Assembly,
}

impl StageName {
    /// Every stage, in execution order.
    pub const ALL: [Self; 5] =
        [Self::Cloning, Self::Mapping, Self::Parsing, Self::Insight, Self::Assembly];

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cloning => "cloning",
            Self::Mapping => "mapping",
            Self::Parsing => "parsing",
            Self::Insight => "insight",
            Self::Assembly => "assembly",
        }
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Finished; warnings may be noted in the detail.
    Success,
    /// Halted the run.
    Failed,
    /// Not attempted because an earlier stage failed.
    Skipped,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// How the stage ended.
    pub status: StageStatus,
    /// Human-readable summary or failure reason.
    pub detail: String,
    /// Wall time spent in the stage.
    pub duration_ms: u64,
}

impl StageResult {
    /// A stage that was never attempted.
    #[must_use]
    pub fn skipped() -> Self {
        Self { status: StageStatus::Skipped, detail: "not attempted".to_string(), duration_ms: 0 }
    }
}

/// Registry entry for one repository, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Last path segment of the URL.
    pub name: String,
    /// Normalized URL.
    pub url: String,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// Files enumerated by the tree mapper.
    pub total_files: usize,
    /// Files parsed, fully or partially.
    pub analyzed_files: usize,
    /// `true` once a document has been stored for the latest run.
    pub has_documentation: bool,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// Last status transition.
    pub updated_at: DateTime<Utc>,
    /// Stage outcomes of the latest run, in execution order.
    #[serde(default)]
    pub stages: BTreeMap<StageName, StageResult>,
}

impl RepositoryRecord {
    /// A fresh `pending` record.
    #[must_use]
    pub fn new(name: &str, url: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            status: RecordStatus::Pending,
            total_files: 0,
            analyzed_files: 0,
            has_documentation: false,
            created_at: now,
            updated_at: now,
            stages: BTreeMap::new(),
        }
    }

    /// Moves to `next` if allowed, bumping `updated_at`. Returns `false`
    /// (leaving the record untouched) for a backwards or post-terminal move.
    pub fn transition(&mut self, next: RecordStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = now;
        true
    }

    /// Prepares the record for a new run: back to `pending` with stages,
    /// counters and the documentation flag cleared.
    pub fn reset(&mut self, url: &str, now: DateTime<Utc>) {
        url.clone_into(&mut self.url);
        self.status = RecordStatus::Pending;
        self.total_files = 0;
        self.analyzed_files = 0;
        self.has_documentation = false;
        self.stages.clear();
        self.updated_at = now;
    }

    /// Records the outcome of `stage`, replacing any earlier entry.
    pub fn record_stage(&mut self, stage: StageName, result: StageResult) {
        self.stages.insert(stage, result);
    }
}

/// Generated documentation for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Owning record's name.
    pub repo_name: String,
    /// Markdown content.
    pub content: String,
    /// When the document was produced.
    pub generated_at: DateTime<Utc>,
}
