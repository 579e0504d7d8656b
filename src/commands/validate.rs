//! `repodoc validate` command.

use crate::api::ValidateResponse;
use crate::pipeline::Pipeline;

use super::print_json;

/// Execute the `validate` command.
///
/// # Errors
///
/// Returns an error string if the repository is not valid.
pub async fn run(pipeline: &Pipeline, url: &str) -> Result<(), String> {
    let result = pipeline.quick_validate(url).await;
    print_json(&ValidateResponse::from(&result))?;
    result.map(|_| ()).map_err(|e| e.to_string())
}
