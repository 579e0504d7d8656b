//! `repodoc sweep` command.

use crate::pipeline::Pipeline;

use super::print_json;

/// Execute the `sweep` command.
///
/// # Errors
///
/// Returns an error string if any orphaned workspace could not be removed.
pub fn run(pipeline: &Pipeline) -> Result<(), String> {
    let report = pipeline.sweep_workspaces();
    print_json(&report)?;
    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(report.errors.join("\n"))
    }
}
