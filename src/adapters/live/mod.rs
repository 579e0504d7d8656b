//! Live adapters for real external interactions.

pub mod anthropic;
pub mod filesystem;
pub mod gemini;
pub mod git;
mod http;
pub mod system;
