//! `repodoc health` command.

use crate::pipeline::Pipeline;

use super::print_json;

/// Execute the `health` command. A degraded service is reported, not an error.
///
/// # Errors
///
/// Returns an error string only if the report cannot be printed.
pub fn run(pipeline: &Pipeline) -> Result<(), String> {
    print_json(&pipeline.health_check())
}
