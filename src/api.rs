//! Response payloads for the external operations, serialized as JSON by the
//! CLI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fetch::RepoUrl;
use crate::pipeline::RunReport;
use crate::store::{Document, RecordStatus, RepositoryRecord, StageName, StageResult};

/// Answer to a quick validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// Whether the repository looks usable.
    pub valid: bool,
    /// Normalized URL, when valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    /// Why it is not, when invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<RepoUrl>> for ValidateResponse {
    fn from(result: &Result<RepoUrl>) -> Self {
        match result {
            Ok(repo) => Self { valid: true, repo_url: Some(repo.as_string()), error: None },
            Err(e) => Self { valid: false, repo_url: None, error: Some(e.to_string()) },
        }
    }
}

/// `success` when every stage succeeded, `error` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The run completed.
    Success,
    /// The run failed or could not start.
    Error,
}

/// Per-run data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunData {
    /// Normalized URL.
    pub repo_url: String,
    /// Record name.
    pub repo_name: String,
    /// Stage outcomes in execution order.
    pub stages: BTreeMap<StageName, StageResult>,
    /// Retained workspace, if cleanup was disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// Answer to a full analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    /// Overall outcome.
    pub status: ResponseStatus,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage results; absent when the run never started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RunData>,
}

impl From<&Result<RunReport>> for RunResponse {
    fn from(result: &Result<RunReport>) -> Self {
        match result {
            Ok(report) => Self {
                status: if report.succeeded() { ResponseStatus::Success } else { ResponseStatus::Error },
                error: report.failure(),
                data: Some(RunData {
                    repo_url: report.repo_url.clone(),
                    repo_name: report.repo_name.clone(),
                    stages: report.stages.clone(),
                    workspace: report.workspace.as_ref().map(|p| p.display().to_string()),
                }),
            },
            Err(e) => Self { status: ResponseStatus::Error, error: Some(e.to_string()), data: None },
        }
    }
}

/// One row of the repository listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    /// Record name.
    pub name: String,
    /// Normalized URL.
    pub url: String,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// Files enumerated.
    pub total_files: usize,
    /// Files parsed.
    pub analyzed_files: usize,
    /// Whether documentation can be fetched.
    pub has_documentation: bool,
}

impl From<&RepositoryRecord> for RepositorySummary {
    fn from(record: &RepositoryRecord) -> Self {
        Self {
            name: record.name.clone(),
            url: record.url.clone(),
            status: record.status,
            total_files: record.total_files,
            analyzed_files: record.analyzed_files,
            has_documentation: record.has_documentation,
        }
    }
}

/// Answer to a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Number of repositories.
    pub count: usize,
    /// Repositories sorted by name.
    pub repositories: Vec<RepositorySummary>,
}

impl From<&[RepositoryRecord]> for ListResponse {
    fn from(records: &[RepositoryRecord]) -> Self {
        Self {
            count: records.len(),
            repositories: records.iter().map(RepositorySummary::from).collect(),
        }
    }
}

/// Answer to a documentation lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentationResponse {
    /// Record name.
    pub repo_name: String,
    /// When the document was produced.
    pub generated_at: DateTime<Utc>,
    /// Markdown content.
    pub content: String,
}

impl From<Document> for DocumentationResponse {
    fn from(doc: Document) -> Self {
        Self { repo_name: doc.repo_name, generated_at: doc.generated_at, content: doc.content }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::PipelineError;
    use crate::store::StageStatus;

    #[test]
    fn failed_run_reports_stage_and_reason() {
        let mut stages = BTreeMap::new();
        stages.insert(
            StageName::Cloning,
            StageResult {
                status: StageStatus::Failed,
                detail: "cloning failed: fetch failed (not_found): Repository not found".into(),
                duration_ms: 12,
            },
        );
        stages.insert(StageName::Mapping, StageResult::skipped());
        let report = RunReport {
            repo_name: "nothing".into(),
            repo_url: "https://github.com/nobody/nothing".into(),
            status: RecordStatus::Failed,
            stages,
            workspace: None,
        };

        let value = serde_json::to_value(RunResponse::from(&Ok(report))).unwrap();
        assert_eq!(value["status"], json!("error"));
        assert!(value["error"].as_str().unwrap().starts_with("cloning: cloning failed"));
        assert_eq!(value["data"]["stages"]["mapping"]["status"], json!("skipped"));
        assert_eq!(value["data"]["repo_name"], json!("nothing"));
        assert!(value["data"].get("workspace").is_none());
    }

    #[test]
    fn rejected_run_has_no_data() {
        let result: Result<RunReport> = Err(PipelineError::InvalidRepository("bad".into()));
        let value = serde_json::to_value(RunResponse::from(&result)).unwrap();
        assert_eq!(value, json!({"status": "error", "error": "invalid repository: bad"}));
    }

    #[test]
    fn validate_response_shapes() {
        let ok: Result<RepoUrl> = RepoUrl::parse("https://github.com/octocat/Hello-World");
        assert_eq!(
            serde_json::to_value(ValidateResponse::from(&ok)).unwrap(),
            json!({"valid": true, "repo_url": "https://github.com/octocat/Hello-World"})
        );
        let bad: Result<RepoUrl> = RepoUrl::parse("ftp://example.com/x");
        let value = serde_json::to_value(ValidateResponse::from(&bad)).unwrap();
        assert_eq!(value["valid"], json!(false));
        assert!(value["error"].is_string());
    }
}
