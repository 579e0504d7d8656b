//! Repository fetcher: URL validation, reachability probes and shallow
//! clones into isolated workspaces.

pub mod url;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::context::ServiceContext;
use crate::error::{FetchError, FetchReason, PipelineError};
use crate::ports::git::CloneRequest;

pub use self::url::RepoUrl;

/// Prefix shared by every workspace directory; used to recognize orphans.
pub const WORKSPACE_PREFIX: &str = "repodoc-";

/// Limits applied while fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    /// Abort the clone once the checkout exceeds this many megabytes.
    pub max_size_mb: u64,
    /// Enumerate at most this many files; the rest are recorded as skipped.
    pub max_files: usize,
}

/// An on-disk checkout owned by a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Checkout directory.
    pub root: PathBuf,
    /// Size of the checkout in bytes.
    pub size_bytes: u64,
    /// File enumeration cap handed on to the tree mapper.
    pub max_files: usize,
}

/// Returns `true` if a directory name looks like one of our workspaces.
#[must_use]
pub fn is_workspace_dir(name: &str) -> bool {
    name.starts_with(WORKSPACE_PREFIX)
}

/// Checks that `raw` names a recognized, reachable repository without
/// cloning it.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRepository`] for malformed URLs and for
/// remotes that do not exist or refuse access, and
/// [`PipelineError::Fetch`] for transport failures.
pub async fn validate(
    ctx: &ServiceContext,
    config: &Config,
    raw: &str,
) -> Result<RepoUrl, PipelineError> {
    let repo = RepoUrl::parse(raw)?;
    match ctx.git.probe(&repo.as_string(), config.probe_timeout()).await {
        Ok(()) => Ok(repo),
        Err(e) if matches!(e.reason, FetchReason::NotFound | FetchReason::Permission) => {
            Err(PipelineError::InvalidRepository(format!("{repo}: {}", e.message)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Allocates a collision-free workspace path for `repo`.
#[must_use]
pub fn workspace_path(ctx: &ServiceContext, workspace_root: &Path, repo: &RepoUrl) -> PathBuf {
    workspace_root.join(format!("{WORKSPACE_PREFIX}{}-{}", repo.name(), ctx.id_gen.generate_id()))
}

/// Clones `repo` into `dest` with a depth-limited clone, enforcing the size
/// limit while the clone runs.
///
/// On failure the partial checkout is removed before returning.
///
/// # Errors
///
/// Returns a classified [`FetchError`].
pub async fn fetch(
    ctx: &ServiceContext,
    config: &Config,
    repo: &RepoUrl,
    dest: PathBuf,
    limits: FetchLimits,
) -> Result<Workspace, FetchError> {
    let request = CloneRequest {
        url: repo.as_string(),
        dest: dest.clone(),
        depth: config.clone_depth.max(1),
        max_bytes: limits.max_size_mb.saturating_mul(1024 * 1024),
        timeout: config.clone_timeout(),
    };
    debug!(url = %request.url, dest = %dest.display(), "fetching repository");

    match ctx.git.clone_shallow(&request).await {
        Ok(size_bytes) => {
            info!(repo = repo.name(), size_bytes, "repository cloned");
            Ok(Workspace { root: dest, size_bytes, max_files: limits.max_files })
        }
        Err(e) => {
            let _ = ctx.fs.remove_dir_all(&dest);
            Err(e)
        }
    }
}
