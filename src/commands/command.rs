//! Command trait definition for CLI commands.
//!
//! Every parbam subcommand implements [`Command`]; `enum_dispatch` forwards
//! `execute` from the `Subcommand` enum in `main.rs` to the variant.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all parbam CLI commands.
///
/// `command_line` holds the full invocation as typed by the user.
#[enum_dispatch]
pub trait Command {
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self, command_line: &str) -> Result<()>;
}
