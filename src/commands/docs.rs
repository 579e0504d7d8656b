//! `repodoc docs` command.

use crate::api::DocumentationResponse;
use crate::pipeline::Pipeline;

use super::print_json;

/// Execute the `docs` command. With `raw`, prints the Markdown only.
///
/// # Errors
///
/// Returns an error string if no documentation exists for `name`.
pub fn run(pipeline: &Pipeline, name: &str, raw: bool) -> Result<(), String> {
    let document = pipeline.get_documentation(name).map_err(|e| e.to_string())?;
    if raw {
        print!("{}", document.content);
        return Ok(());
    }
    print_json(&DocumentationResponse::from(document))
}
