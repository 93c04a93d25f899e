//! CLI domain: clap definitions and a single route table. Output is JSON.

mod parse;
mod route;

pub use parse::{Cli, Commands};
pub use route::RunContext;

use crate::error::EngineError;

/// Map engine errors to a string for CLI output.
pub fn map_error(e: &EngineError) -> String {
    let retry = if e.is_retryable() { " (retryable)" } else { "" };
    format!("{}{}", e, retry)
}
