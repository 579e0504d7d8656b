//! Git remote port: reachability probes and shallow clones.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use crate::error::FetchError;

/// Boxed future returned by [`GitRemote`] methods.
pub type GitFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send + 'a>>;

/// Parameters for a shallow clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    /// Normalized remote URL.
    pub url: String,
    /// Directory to clone into. Must not exist yet.
    pub dest: PathBuf,
    /// History depth passed to `--depth`.
    pub depth: u32,
    /// Abort once the checkout grows past this many bytes.
    pub max_bytes: u64,
    /// Abort once the clone has run this long.
    pub timeout: Duration,
}

/// Talks to remote git hosts.
///
/// Errors are typed [`FetchError`]s so the reason (not found, too large,
/// network, permission) survives the boundary.
pub trait GitRemote: Send + Sync {
    /// Confirms the remote exists and is readable without materializing it.
    ///
    /// # Errors
    ///
    /// Returns a classified [`FetchError`] when the remote cannot be reached.
    fn probe(&self, url: &str, timeout: Duration) -> GitFuture<'_, ()>;

    /// Performs a depth-limited clone, enforcing the size limit while it runs.
    /// Returns the size in bytes of the materialized checkout.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::FetchReason::TooLarge`] when `max_bytes` is
    /// exceeded, or another classified [`FetchError`].
    fn clone_shallow(&self, request: &CloneRequest) -> GitFuture<'_, u64>;

    /// Reports the git client version, used by the health check.
    ///
    /// # Errors
    ///
    /// Returns an error when no git client is available.
    fn version(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}
