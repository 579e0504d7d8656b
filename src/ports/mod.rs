//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the pipeline core and an
//! external system (time, filesystem, git remotes, IDs, generation service).
//! Implementations live in `src/adapters/`.

pub mod filesystem;
pub mod git;
pub mod llm;
pub mod system;

pub use filesystem::{DirEntry, EntryKind, FileSystem};
pub use git::{CloneRequest, GitFuture, GitRemote};
pub use llm::{CompletionFuture, CompletionRequest, CompletionResponse, LlmClient};
pub use system::{Clock, IdGenerator};
