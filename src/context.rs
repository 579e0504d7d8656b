//! Service context bundling all port trait objects.

use crate::adapters::live::anthropic::AnthropicLlmClient;
use crate::adapters::live::filesystem::LiveFileSystem;
use crate::adapters::live::gemini::GeminiLlmClient;
use crate::adapters::live::git::LiveGitRemote;
use crate::adapters::live::system::{RandomIds, SystemClock};
use crate::config::{Config, LlmProvider};
use crate::ports::filesystem::FileSystem;
use crate::ports::git::GitRemote;
use crate::ports::llm::LlmClient;
use crate::ports::system::{Clock, IdGenerator};

/// Bundles all port trait objects into a single context.
///
/// Each field provides access to one external boundary. Fields are public so
/// tests can assemble a context from in-memory fakes.
pub struct ServiceContext {
    /// Clock for record timestamps.
    pub clock: Box<dyn Clock>,
    /// Filesystem for workspace walks and the record store.
    pub fs: Box<dyn FileSystem>,
    /// Remote git access for probes and clones.
    pub git: Box<dyn GitRemote>,
    /// ID generator for workspace names.
    pub id_gen: Box<dyn IdGenerator>,
    /// Generation service used by the insight stage.
    pub llm: Box<dyn LlmClient>,
}

impl ServiceContext {
    /// Creates a live context with real adapters, choosing the generation
    /// provider from `config`.
    #[must_use]
    pub fn live(config: &Config) -> Self {
        let timeout = config.insight.request_timeout();
        let llm: Box<dyn LlmClient> = match config.insight.provider {
            LlmProvider::Anthropic => Box::new(AnthropicLlmClient::new(timeout)),
            LlmProvider::Gemini => Box::new(GeminiLlmClient::new(timeout)),
        };

        Self {
            clock: Box::new(SystemClock),
            fs: Box::new(LiveFileSystem),
            git: Box::new(LiveGitRemote::new()),
            id_gen: Box::new(RandomIds),
            llm,
        }
    }
}
