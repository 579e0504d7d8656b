//! Command dispatch and handlers.
//!
//! Every handler prints a JSON payload on stdout and returns an error
//! string when the operation did not succeed, so the exit code follows
//! the outcome.

pub mod analyze;
pub mod docs;
pub mod health;
pub mod list;
pub mod sweep;
pub mod validate;

use std::sync::Arc;

use serde::Serialize;

use crate::cli::Command;
use crate::config::Config;
use crate::context::ServiceContext;
use crate::pipeline::Pipeline;

/// Dispatch a parsed command to its handler.
///
/// # Errors
///
/// Returns an error string if configuration cannot be loaded, the runtime
/// cannot start, or the selected command fails.
pub fn dispatch(command: &Command) -> Result<(), String> {
    let config = Config::load()?;
    let ctx = Arc::new(ServiceContext::live(&config));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start async runtime: {e}"))?;
    runtime.block_on(dispatch_with_context(command, ctx, config))
}

/// Dispatch a command against the given service context.
async fn dispatch_with_context(
    command: &Command,
    ctx: Arc<ServiceContext>,
    config: Config,
) -> Result<(), String> {
    let pipeline = Pipeline::new(ctx, config).map_err(|e| e.to_string())?;
    match command {
        Command::Validate { url } => validate::run(&pipeline, url).await,
        Command::Analyze(args) => analyze::run(&pipeline, args).await,
        Command::List => list::run(&pipeline),
        Command::Docs { name, raw } => docs::run(&pipeline, name, *raw),
        Command::Health => health::run(&pipeline),
        Command::Sweep => sweep::run(&pipeline),
    }
}

/// Pretty-prints `value` as JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("failed to encode output: {e}"))?;
    println!("{json}");
    Ok(())
}
