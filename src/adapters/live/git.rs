//! Live git adapter shelling out to the `git` CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{FetchError, FetchReason};
use crate::ports::git::{CloneRequest, GitFuture, GitRemote};

/// How often the checkout size is sampled while a clone runs.
const SIZE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Live git adapter that shells out to the `git` CLI.
///
/// Prompts are disabled so private or missing repositories fail fast
/// instead of waiting for credentials.
pub struct LiveGitRemote {
    poll_interval: Duration,
}

impl LiveGitRemote {
    /// Creates an adapter with the default size polling interval.
    #[must_use]
    pub fn new() -> Self {
        Self { poll_interval: SIZE_POLL_INTERVAL }
    }
}

impl Default for LiveGitRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn git_command() -> Command {
    let mut cmd = Command::new("git");
    cmd.env("GIT_TERMINAL_PROMPT", "0").stdin(Stdio::null()).kill_on_drop(true);
    cmd
}

fn spawn_error(e: &std::io::Error) -> FetchError {
    FetchError::new(FetchReason::Network, format!("failed to run git: {e}"))
}

/// Total size of regular files below `path`, without following symlinks.
/// Entries that vanish or cannot be read mid-walk are ignored.
fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(t) if t.is_dir() => dir_size(&entry.path()),
            Ok(t) if t.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        })
        .sum()
}

/// [`dir_size`] on the blocking pool, so size polls never stall the runtime.
async fn checkout_size(path: PathBuf) -> u64 {
    tokio::task::spawn_blocking(move || dir_size(&path)).await.unwrap_or(0)
}

fn too_large(max_bytes: u64) -> FetchError {
    FetchError::new(
        FetchReason::TooLarge,
        format!("repository exceeds the {} MB size limit", max_bytes / (1024 * 1024)),
    )
}

impl GitRemote for LiveGitRemote {
    fn probe(&self, url: &str, timeout: Duration) -> GitFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move {
            let mut cmd = git_command();
            cmd.args(["ls-remote", &url, "HEAD"]).stdout(Stdio::null()).stderr(Stdio::piped());
            let output = tokio::time::timeout(timeout, cmd.output())
                .await
                .map_err(|_| {
                    FetchError::new(
                        FetchReason::Network,
                        format!("reachability probe timed out after {}s", timeout.as_secs()),
                    )
                })?
                .map_err(|e| spawn_error(&e))?;
            if output.status.success() {
                Ok(())
            } else {
                Err(FetchError::from_git_stderr(&String::from_utf8_lossy(&output.stderr)))
            }
        })
    }

    fn clone_shallow(&self, request: &CloneRequest) -> GitFuture<'_, u64> {
        let request = request.clone();
        let poll_interval = self.poll_interval;
        Box::pin(async move {
            if let Some(parent) = request.dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    FetchError::new(
                        FetchReason::Permission,
                        format!("cannot create workspace root {}: {e}", parent.display()),
                    )
                })?;
            }

            let mut child = git_command()
                .arg("clone")
                .arg("--depth")
                .arg(request.depth.to_string())
                .args(["--single-branch", "--no-tags", "--quiet"])
                .arg(&request.url)
                .arg(&request.dest)
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| spawn_error(&e))?;
            debug!(url = %request.url, dest = %request.dest.display(), "git clone started");

            // Drain stderr concurrently so a chatty git cannot block on a full pipe.
            let stderr_task = child.stderr.take().map(|mut pipe| {
                tokio::spawn(async move {
                    let mut buf = String::new();
                    let _ = pipe.read_to_string(&mut buf).await;
                    buf
                })
            });

            let deadline = tokio::time::Instant::now() + request.timeout;
            let mut ticker = tokio::time::interval(poll_interval);
            let status = loop {
                tokio::select! {
                    status = child.wait() => {
                        break status.map_err(|e| {
                            FetchError::new(FetchReason::Network, format!("git clone failed: {e}"))
                        })?;
                    }
                    _ = ticker.tick() => {
                        if checkout_size(request.dest.clone()).await > request.max_bytes {
                            let _ = child.kill().await;
                            return Err(too_large(request.max_bytes));
                        }
                    }
                    () = tokio::time::sleep_until(deadline) => {
                        let _ = child.kill().await;
                        return Err(FetchError::new(
                            FetchReason::Network,
                            format!("clone timed out after {}s", request.timeout.as_secs()),
                        ));
                    }
                }
            };

            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };
            if !status.success() {
                return Err(FetchError::from_git_stderr(&stderr));
            }

            let size = checkout_size(request.dest.clone()).await;
            if size > request.max_bytes {
                return Err(too_large(request.max_bytes));
            }
            Ok(size)
        })
    }

    fn version(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let output = std::process::Command::new("git").arg("--version").output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("git --version failed: {stderr}").into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("top.txt"), "12345").unwrap();
        std::fs::write(dir.path().join("a/b/deep.txt"), "123").unwrap();

        assert_eq!(dir_size(dir.path()), 8);
        assert_eq!(dir_size(&dir.path().join("missing")), 0);
    }

    #[tokio::test]
    async fn checkout_size_walks_on_the_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/mod.py"), "x = 1\n").unwrap();

        assert_eq!(checkout_size(dir.path().to_path_buf()).await, 6);
        assert_eq!(checkout_size(dir.path().join("missing")).await, 0);
    }

    #[test]
    fn too_large_reports_limit_in_megabytes() {
        let err = too_large(5 * 1024 * 1024);
        assert_eq!(err.reason, FetchReason::TooLarge);
        assert!(err.message.contains("5 MB"));
    }
}
