//! CLI argument definitions.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI parser for `repodoc`.
#[derive(Debug, Parser)]
#[command(name = "repodoc", version, about = "Generate documentation for git repositories")]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that a repository URL is recognized and reachable, without cloning.
    Validate {
        /// Repository URL, e.g. `https://github.com/owner/repo`.
        url: String,
    },
    /// Clone, analyze and document a repository.
    Analyze(AnalyzeArgs),
    /// List known repositories.
    List,
    /// Print the documentation generated for a repository.
    Docs {
        /// Repository name (last URL segment).
        name: String,
        /// Print the Markdown content only, instead of the JSON payload.
        #[arg(long)]
        raw: bool,
    },
    /// Report whether git, the generation service and the store are usable.
    Health,
    /// Remove workspaces left behind by interrupted runs.
    Sweep,
}

/// Options for `repodoc analyze`.
#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Repository URL.
    pub url: String,
    /// Abort the clone beyond this many megabytes.
    #[arg(long, default_value_t = 500)]
    pub max_size_mb: u64,
    /// Enumerate at most this many files.
    #[arg(long, default_value_t = 100)]
    pub max_files: usize,
    /// Leave out the architecture diagram.
    #[arg(long)]
    pub no_diagrams: bool,
    /// Keep the cloned workspace after the run.
    #[arg(long)]
    pub keep_workspace: bool,
    /// Complete the run even if no insight could be generated.
    #[arg(long)]
    pub allow_missing_insight: bool,
}
