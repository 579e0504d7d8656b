//! `repodoc list` command.

use crate::api::ListResponse;
use crate::pipeline::Pipeline;

use super::print_json;

/// Execute the `list` command.
///
/// # Errors
///
/// Returns an error string if the record store is unavailable.
pub fn run(pipeline: &Pipeline) -> Result<(), String> {
    let records = pipeline.list().map_err(|e| e.to_string())?;
    print_json(&ListResponse::from(records.as_slice()))
}
