//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then an optional YAML file named by
//! `REPODOC_CONFIG`, then individual environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Generation service backing the insight stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic messages API (`ANTHROPIC_API_KEY`).
    Anthropic,
    /// Google Gemini `generateContent` (`GEMINI_API_KEY`).
    Gemini,
}

impl LlmProvider {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    /// Model used when none is configured.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Gemini => "gemini-2.0-flash",
        }
    }
}

/// Settings for the insight stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Which provider the live context wires in.
    pub provider: LlmProvider,
    /// Model identifier; empty means the provider default.
    pub model: String,
    /// Completion token cap per request.
    pub max_tokens: u32,
    /// Upper bound on prompt characters per batch.
    pub max_batch_chars: usize,
    /// Upper bound on units described per run.
    pub max_units: usize,
    /// Attempts per batch before falling back to placeholders.
    pub max_attempts: u32,
    /// Initial backoff between attempts; doubles each retry.
    pub backoff_ms: u64,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Batches in flight at once.
    pub concurrency: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            model: String::new(),
            max_tokens: 4096,
            max_batch_chars: 12_000,
            max_units: 200,
            max_attempts: 3,
            backoff_ms: 500,
            request_timeout_secs: 120,
            concurrency: 4,
        }
    }
}

impl InsightConfig {
    /// The configured model, or the provider default.
    #[must_use]
    pub fn model(&self) -> &str {
        if self.model.is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }

    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding persisted records and documents.
    pub store_root: PathBuf,
    /// Directory under which per-run workspaces are created.
    pub workspace_root: PathBuf,
    /// History depth for clones.
    pub clone_depth: u32,
    /// Upper bound on a single clone.
    pub clone_timeout_secs: u64,
    /// Upper bound on the quick-validate reachability probe.
    pub probe_timeout_secs: u64,
    /// Age after which a run lock is treated as abandoned.
    pub run_lock_stale_secs: u64,
    /// Names (or `*.suffix` patterns) skipped by the tree mapper.
    pub ignore_patterns: Vec<String>,
    /// README excerpt length, in characters.
    pub readme_excerpt_chars: usize,
    /// Size of the per-file parse worker pool.
    pub parse_workers: usize,
    /// Insight stage settings.
    pub insight: InsightConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from(".repodoc"),
            workspace_root: std::env::temp_dir().join("repodoc-workspaces"),
            clone_depth: 1,
            clone_timeout_secs: 300,
            probe_timeout_secs: 30,
            run_lock_stale_secs: 3600,
            ignore_patterns: [
                "node_modules",
                "target",
                "build",
                "dist",
                "__pycache__",
                ".venv",
                "venv",
                ".idea",
                ".vscode",
                "*.pyc",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            readme_excerpt_chars: 1500,
            parse_workers: 4,
            insight: InsightConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `REPODOC_CONFIG` (if set) and environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error string if the config file cannot be read or parsed,
    /// or an override has an invalid value.
    pub fn load() -> Result<Self, String> {
        let mut config = match std::env::var("REPODOC_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Reads a YAML config file; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error string if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))
    }

    /// Applies `REPODOC_*` overrides looked up through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        if let Some(store) = lookup("REPODOC_STORE") {
            self.store_root = PathBuf::from(store);
        }
        if let Some(root) = lookup("REPODOC_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(root);
        }
        if let Some(provider) = lookup("REPODOC_LLM_PROVIDER") {
            self.insight.provider = LlmProvider::parse(&provider)
                .ok_or_else(|| format!("Unknown REPODOC_LLM_PROVIDER: {provider}"))?;
        }
        if let Some(model) = lookup("REPODOC_LLM_MODEL") {
            self.insight.model = model;
        }
        Ok(())
    }

    /// Clone timeout as a [`Duration`].
    #[must_use]
    pub const fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    /// Probe timeout as a [`Duration`].
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Run lock staleness limit as a [`Duration`].
    #[must_use]
    pub const fn run_lock_stale(&self) -> Duration {
        Duration::from_secs(self.run_lock_stale_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn overrides_replace_defaults() {
        let env: HashMap<&str, &str> = [
            ("REPODOC_STORE", "/srv/repodoc"),
            ("REPODOC_LLM_PROVIDER", "Gemini"),
            ("REPODOC_LLM_MODEL", "gemini-1.5-pro"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| (*v).to_string())).unwrap();

        assert_eq!(config.store_root, PathBuf::from("/srv/repodoc"));
        assert_eq!(config.insight.provider, LlmProvider::Gemini);
        assert_eq!(config.insight.model(), "gemini-1.5-pro");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|k| (k == "REPODOC_LLM_PROVIDER").then(|| "bard".to_string()))
            .unwrap_err();
        assert!(err.contains("bard"));
    }

    #[test]
    fn empty_model_falls_back_to_provider_default() {
        let mut insight = InsightConfig::default();
        assert_eq!(insight.model(), "claude-sonnet-4-20250514");
        insight.provider = LlmProvider::Gemini;
        assert_eq!(insight.model(), "gemini-2.0-flash");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repodoc.yaml");
        std::fs::write(&path, "parse_workers: 8\ninsight:\n  max_attempts: 5\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.parse_workers, 8);
        assert_eq!(config.insight.max_attempts, 5);
        assert_eq!(config.insight.backoff_ms, 500);
        assert_eq!(config.clone_depth, 1);
    }
}
