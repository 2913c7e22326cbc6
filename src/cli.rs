//! Command-line interface definition for Storyloom
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to play, list saves and inspect token usage.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Storyloom - interactive fiction driven by a language model
///
/// Play a turn-based text adventure narrated by an OpenAI-compatible
/// model. Every turn is autosaved and can be resumed later.
#[derive(Parser, Debug, Clone)]
#[command(name = "storyloom")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the saves directory
    #[arg(long)]
    pub saves_dir: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Storyloom
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start a new game or resume a saved one
    Play {
        /// Resume the most recent autosave
        #[arg(short, long)]
        resume: bool,

        /// Resume the latest autosave of this session id
        #[arg(short, long, conflicts_with = "resume")]
        session: Option<String>,

        /// Load a specific save file by name
        #[arg(short, long, conflicts_with = "resume")]
        file: Option<String>,

        /// Opening premise for a new game (random when omitted)
        #[arg(long, conflicts_with_all = ["resume", "session", "file"])]
        premise: Option<String>,

        /// Session id for a new game (generated when omitted)
        #[arg(short, long, conflicts_with_all = ["resume", "session", "file"])]
        name: Option<String>,

        /// Override the provider endpoint from config
        #[arg(short, long)]
        provider: Option<String>,

        /// Load saves written by a different version
        #[arg(long)]
        force: bool,
    },

    /// List saved games, newest first
    Saves,

    /// Show token usage statistics of a saved session
    Stats {
        /// Session id (defaults to the most recent autosave)
        #[arg(short, long)]
        session: Option<String>,

        /// Load saves written by a different version
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            saves_dir: None,
            command: Commands::Saves,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(cli.saves_dir.is_none());
        assert!(matches!(cli.command, Commands::Saves));
    }

    #[test]
    fn test_cli_parse_play_new_game() {
        let cli = Cli::try_parse_from(["storyloom", "play", "--premise", "a lighthouse"]).unwrap();
        if let Commands::Play {
            resume,
            session,
            file,
            premise,
            name,
            provider,
            force,
        } = cli.command
        {
            assert!(!resume);
            assert_eq!(session, None);
            assert_eq!(file, None);
            assert_eq!(premise, Some("a lighthouse".to_string()));
            assert_eq!(name, None);
            assert_eq!(provider, None);
            assert!(!force);
        } else {
            panic!("Expected Play command");
        }
    }

    #[test]
    fn test_cli_parse_play_resume() {
        let cli = Cli::try_parse_from(["storyloom", "play", "--resume", "--force"]).unwrap();
        if let Commands::Play { resume, force, .. } = cli.command {
            assert!(resume);
            assert!(force);
        } else {
            panic!("Expected Play command");
        }
    }

    #[test]
    fn test_cli_parse_play_session_and_file() {
        let cli = Cli::try_parse_from([
            "storyloom",
            "play",
            "--session",
            "1a2b3c4d",
            "--file",
            "autosave_20250101_120000",
            "--provider",
            "hunyuan",
        ])
        .unwrap();
        if let Commands::Play {
            session,
            file,
            provider,
            ..
        } = cli.command
        {
            assert_eq!(session, Some("1a2b3c4d".to_string()));
            assert_eq!(file, Some("autosave_20250101_120000".to_string()));
            assert_eq!(provider, Some("hunyuan".to_string()));
        } else {
            panic!("Expected Play command");
        }
    }

    #[test]
    fn test_cli_premise_conflicts_with_resume() {
        let cli = Cli::try_parse_from(["storyloom", "play", "--resume", "--premise", "x"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_parse_play_named() {
        let cli = Cli::try_parse_from(["storyloom", "play", "--name", "harbour-run"]).unwrap();
        if let Commands::Play { name, .. } = cli.command {
            assert_eq!(name, Some("harbour-run".to_string()));
        } else {
            panic!("Expected Play command");
        }
        assert!(Cli::try_parse_from(["storyloom", "play", "-n", "x", "--session", "y"]).is_err());
    }

    #[test]
    fn test_cli_parse_saves_with_dir() {
        let cli = Cli::try_parse_from(["storyloom", "--saves-dir", "/tmp/saves", "saves"]).unwrap();
        assert_eq!(cli.saves_dir, Some(PathBuf::from("/tmp/saves")));
        assert!(matches!(cli.command, Commands::Saves));
    }

    #[test]
    fn test_cli_parse_stats() {
        let cli = Cli::try_parse_from(["storyloom", "stats", "-s", "feedbeef"]).unwrap();
        if let Commands::Stats { session, force } = cli.command {
            assert_eq!(session, Some("feedbeef".to_string()));
            assert!(!force);
        } else {
            panic!("Expected Stats command");
        }
    }

    #[test]
    fn test_cli_parse_with_config_and_verbose() {
        let cli =
            Cli::try_parse_from(["storyloom", "-v", "--config", "custom.yaml", "saves"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some("custom.yaml".to_string()));
    }

    #[test]
    fn test_cli_parse_missing_command() {
        assert!(Cli::try_parse_from(["storyloom"]).is_err());
    }

    #[test]
    fn test_cli_parse_invalid_command() {
        assert!(Cli::try_parse_from(["storyloom", "invalid"]).is_err());
    }
}
