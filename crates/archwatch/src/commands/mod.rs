//! CLI command handlers.

use std::path::PathBuf;

pub mod check;
pub mod init;
pub mod run;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolved config file path.
    pub config_path: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}
