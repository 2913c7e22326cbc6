/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `play`: Interactive game loop with autosave
- `saves`: Table of saved games
- `stats`: Token usage and cost trend of a session

The play loop's `/` commands are parsed by `special_commands`.
*/

pub mod play;
pub mod saves;
pub mod special_commands;
pub mod stats;

pub use play::{run_play, CliObserver, PlayArgs};
pub use saves::list_saves;
pub use stats::run_stats;
