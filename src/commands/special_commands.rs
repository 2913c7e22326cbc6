//! Special commands parser for the play loop
//!
//! Input starting with `/` is a command for the game front end rather than
//! a player action:
//! - Save the game under a label
//! - Show token usage
//! - List or condense the story summaries
//! - Export transcripts
//! - Display help
//! - Quit
//!
//! Command names are case-insensitive; save labels keep their case.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },
}

/// Commands handled by the play loop instead of the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Write a manual save, optionally under a label
    Save(Option<String>),

    /// Display token usage and trend
    Stats,

    /// List the current story summaries
    Summary,

    /// Condense the story summaries now, ignoring the cooldown
    Compact,

    /// Export conversation and narrative transcripts
    Export,

    /// Display help information
    Help,

    /// Leave the game
    Quit,

    /// Not a special command; the input is a player action
    None,
}

/// Parse a line of player input into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognised `/` command
/// and `CommandError::UnsupportedArgument` when a command that takes no
/// argument is given one.
///
/// # Examples
///
/// ```
/// use storyloom::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(
///     parse_special_command("/save Before-Boss").unwrap(),
///     SpecialCommand::Save(Some("Before-Boss".to_string()))
/// );
/// assert_eq!(parse_special_command("/QUIT").unwrap(), SpecialCommand::Quit);
/// assert_eq!(
///     parse_special_command("open the door").unwrap(),
///     SpecialCommand::None
/// );
/// assert!(parse_special_command("/dance").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.to_lowercase(), rest.trim()),
        None => (trimmed.to_lowercase(), ""),
    };

    let no_argument = |command: SpecialCommand| {
        if rest.is_empty() {
            Ok(command)
        } else {
            Err(CommandError::UnsupportedArgument {
                command: name.clone(),
                arg: rest.to_string(),
            })
        }
    };

    match name.as_str() {
        "/save" => Ok(SpecialCommand::Save(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "/stats" => no_argument(SpecialCommand::Stats),
        "/summary" | "/summaries" => no_argument(SpecialCommand::Summary),
        "/compact" | "/conclude_summary" => no_argument(SpecialCommand::Compact),
        "/export" => no_argument(SpecialCommand::Export),
        "/help" | "/?" => no_argument(SpecialCommand::Help),
        "/quit" | "/exit" => no_argument(SpecialCommand::Quit),
        _ => Err(CommandError::UnknownCommand(name.clone())),
    }
}

/// Display help text for special commands
pub fn print_help() {
    println!(
        r#"
Commands
========

  /save [label]   - Save the game (label defaults to "quicksave")
  /stats          - Show token usage and the cost trend per turn
  /summary        - List the summaries the narrator remembers
  /compact        - Condense those summaries now
  /export         - Export the conversation and narrative transcripts
  /help           - Show this help
  /quit           - Leave the game (progress is autosaved every turn)

Anything else is sent to the narrator as your next action.
"#
    );
}
