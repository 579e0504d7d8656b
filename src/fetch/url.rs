//! Repository URL recognition and normalization.

use std::fmt;

use url::Url;

use crate::error::PipelineError;

/// Hosts whose `owner/repo` URL layout is understood.
const RECOGNIZED_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// A validated repository URL reduced to `https://host/owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    host: String,
    owner: String,
    name: String,
}

impl RepoUrl {
    /// Validates and normalizes a user-supplied repository URL.
    ///
    /// Whitespace, query strings, fragments, a trailing `.git`, trailing
    /// slashes and any path beyond `owner/repo` (e.g. `/tree/main`) are
    /// dropped. A missing scheme is treated as `https`, and `http` is
    /// upgraded to `https`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRepository`] for malformed URLs,
    /// unrecognized hosts, or missing/invalid owner and repository segments.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid(raw, "URL is empty"));
        }
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        let parsed = Url::parse(&with_scheme).map_err(|e| invalid(raw, &e.to_string()))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(raw, "only http(s) URLs are supported"));
        }
        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        if !RECOGNIZED_HOSTS.contains(&host.as_str()) {
            return Err(invalid(raw, &format!("unsupported host '{host}'")));
        }

        let mut segments = parsed.path_segments().into_iter().flatten().filter(|s| !s.is_empty());
        let owner = segments.next().ok_or_else(|| invalid(raw, "missing owner"))?;
        let repo = segments.next().ok_or_else(|| invalid(raw, "missing repository name"))?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        for segment in [owner, repo] {
            if !is_valid_segment(segment) {
                return Err(invalid(raw, &format!("invalid path segment '{segment}'")));
            }
        }

        Ok(Self { host, owner: owner.to_string(), name: repo.to_string() })
    }

    /// Repository name: the record key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized clone URL.
    #[must_use]
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://{}/{}/{}", self.host, self.owner, self.name)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn invalid(raw: &str, why: &str) -> PipelineError {
    PipelineError::InvalidRepository(format!("{}: {why}", raw.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_forms() {
        for raw in [
            "https://github.com/octocat/Hello-World",
            "  https://github.com/octocat/Hello-World/  ",
            "https://github.com/octocat/Hello-World.git",
            "http://www.github.com/octocat/Hello-World?tab=readme#top",
            "https://github.com/octocat/Hello-World/tree/master/docs",
            "github.com/octocat/Hello-World",
        ] {
            let url = RepoUrl::parse(raw).unwrap();
            assert_eq!(url.to_string(), "https://github.com/octocat/Hello-World", "{raw}");
            assert_eq!(url.name(), "Hello-World");
        }
    }

    #[test]
    fn accepts_other_recognized_hosts() {
        let url = RepoUrl::parse("https://gitlab.com/group/project").unwrap();
        assert_eq!(url.as_string(), "https://gitlab.com/group/project");
    }

    #[test]
    fn rejects_unrecognized_or_malformed() {
        for raw in [
            "",
            "ftp://github.com/a/b",
            "https://example.com/a/b",
            "https://github.com/only-owner",
            "https://github.com/a/..",
            "https://github.com/octocat/.git",
            "https://github.com/a/b%20c",
            "not a url at all",
        ] {
            let err = RepoUrl::parse(raw).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidRepository(_)), "{raw}");
        }
    }
}
