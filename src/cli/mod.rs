//! Command-line interface for search-forge.
//!
//! Provides the `run` command (interactive or scripted search runs) and the
//! `prompts` template check.

mod commands;
mod interactive;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, PromptsArgs, RunArgs};
pub use interactive::{collect_request, RequestInput, MAX_MIN_ITEMS};
