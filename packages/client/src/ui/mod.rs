//! UI layer: the interactive prompt that drives the client.

pub mod command;
pub mod repl;

pub use command::{Command, CommandParseError, HELP};
pub use repl::spawn_repl;
