//! `repodoc analyze` command.

use crate::api::RunResponse;
use crate::cli::AnalyzeArgs;
use crate::pipeline::{Pipeline, RunOptions};

use super::print_json;

/// Maps command-line flags onto run options.
fn options(args: &AnalyzeArgs) -> RunOptions {
    RunOptions {
        max_size_mb: args.max_size_mb,
        max_files: args.max_files,
        include_diagrams: !args.no_diagrams,
        cleanup_workspace: !args.keep_workspace,
        require_insight: !args.allow_missing_insight,
    }
}

/// Execute the `analyze` command.
///
/// # Errors
///
/// Returns an error string if the run could not start or a stage failed.
pub async fn run(pipeline: &Pipeline, args: &AnalyzeArgs) -> Result<(), String> {
    let result = pipeline.run(&args.url, &options(args)).await;
    let response = RunResponse::from(&result);
    print_json(&response)?;
    match response.error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
