//! Core library for the `repodoc` CLI: turns a git repository URL into a
//! stored Markdown document by cloning, mapping, parsing and describing it.

pub mod adapters;
pub mod api;
pub mod assemble;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod insight;
pub mod map;
pub mod parse;
pub mod pipeline;
pub mod ports;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// Help and version requests are printed and count as success.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = match cli::Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            err.print().map_err(|e| e.to_string())?;
            return Ok(());
        }
        Err(err) => return Err(err.to_string()),
    };
    commands::dispatch(&cli.command)
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn run_errors_on_unknown_subcommand() {
        let result = run(["repodoc", "unknown"]);
        assert!(result.is_err());
    }

    #[test]
    fn run_treats_help_as_success() {
        assert!(run(["repodoc", "--help"]).is_ok());
    }
}
