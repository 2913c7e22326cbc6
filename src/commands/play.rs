//! Interactive play loop
//!
//! Restores or creates a session, wires the engine to the configured
//! endpoint and runs a readline loop that sends each line to the narrator
//! as the player's next action. The game is autosaved after every turn.

use super::special_commands::{self, parse_special_command, SpecialCommand};
use super::stats::print_token_report;
use crate::config::Config;
use crate::engine::{
    CompactionOutcome, CompactionStrategy, RetryDecision, Session, TokenCounters, TurnEngine,
    TurnFailure, TurnMode, TurnObserver, TurnPhase,
};
use crate::error::{Result, StoryloomError};
use crate::prompts::PromptTemplates;
use crate::providers::{create_provider, TokenUsage};
use crate::storage::{
    export_transcript, validate_session_id, Snapshot, SnapshotStore, TurnMeta,
};
use chrono::Local;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::sync::Arc;

/// Label used by `/save` when none is given
pub const QUICKSAVE_LABEL: &str = "quicksave";

/// Options of the `play` command
#[derive(Debug, Clone, Default)]
pub struct PlayArgs {
    /// Resume the most recent autosave
    pub resume: bool,
    /// Resume a specific session
    pub session: Option<String>,
    /// Load a specific save file
    pub file: Option<String>,
    /// Opening premise for a new game
    pub premise: Option<String>,
    /// Session id for a new game; generated when absent
    pub name: Option<String>,
    /// Endpoint override
    pub provider: Option<String>,
    /// Accept saves from other versions
    pub force: bool,
}

/// Observer that reports turn progress on the terminal
///
/// With `confirm_retries` set, the operator is asked before every retry.
#[derive(Debug, Clone, Copy)]
pub struct CliObserver {
    confirm_retries: bool,
}

impl CliObserver {
    /// Create an observer
    pub fn new(confirm_retries: bool) -> Self {
        Self { confirm_retries }
    }
}

impl TurnObserver for CliObserver {
    fn on_phase(&self, phase: TurnPhase) {
        match phase {
            TurnPhase::AwaitingModel { mode, attempt: 1 } => {
                let message = match mode {
                    TurnMode::Opening => "The narrator sets the scene...",
                    TurnMode::Continuation => "The narrator considers your action...",
                    TurnMode::Summarize => "The narrator gathers the threads of the story...",
                };
                println!("{}", message.dimmed());
            }
            TurnPhase::AwaitingModel { mode, attempt } => {
                println!("{}", format!("Retrying {} (attempt {})", mode, attempt).yellow());
            }
            TurnPhase::Compacting(strategy) => {
                tracing::debug!("Compaction phase: {}", strategy);
            }
            TurnPhase::Committed(mode) => {
                tracing::debug!("{} turn committed", mode);
            }
        }
    }

    fn on_usage(&self, usage: &TokenUsage, totals: &TokenCounters) {
        tracing::debug!(
            "Call used {} tokens ({} prompt, {} completion), session total {}",
            usage.total_tokens,
            usage.prompt_tokens,
            usage.completion_tokens,
            totals.total
        );
    }

    fn on_failure(&self, failure: &TurnFailure) -> RetryDecision {
        eprintln!(
            "{}",
            format!(
                "Attempt {}/{} failed: {}",
                failure.attempt, failure.max_attempts, failure.message
            )
            .yellow()
        );
        if let Some(raw) = &failure.raw {
            tracing::debug!("Unparseable reply: {}", raw);
        }
        if !self.confirm_retries {
            return RetryDecision::Retry;
        }

        print!("Retry? [Y/n] ");
        if std::io::stdout().flush().is_err() {
            return RetryDecision::Abort;
        }
        let mut answer = String::new();
        match std::io::stdin().read_line(&mut answer) {
            Ok(_) => retry_decision(&answer),
            Err(e) => {
                tracing::warn!("Could not read retry confirmation: {}", e);
                RetryDecision::Abort
            }
        }
    }

    fn on_compaction_failed(&self, message: &str) {
        eprintln!(
            "{}",
            format!("Could not condense the story so far: {}", message).yellow()
        );
    }
}

/// Maps a yes/no answer to a retry decision; empty means yes
pub fn retry_decision(answer: &str) -> RetryDecision {
    match answer.trim().to_lowercase().as_str() {
        "" | "y" | "yes" => RetryDecision::Retry,
        _ => RetryDecision::Abort,
    }
}

/// Restores the snapshot named by the play options, if any
///
/// A file name takes precedence over a session id, which takes precedence
/// over `--resume`.
pub fn load_requested(store: &SnapshotStore, args: &PlayArgs) -> Result<Option<Snapshot>> {
    if let Some(file) = &args.file {
        return store
            .load_file(file, args.session.as_deref(), args.force)
            .map(Some);
    }
    if let Some(id) = &args.session {
        return store.load_session(id, None, args.force).map(Some);
    }
    if args.resume {
        return store.load_latest(args.force).map(Some);
    }
    Ok(None)
}

/// Creates the session for a new game
///
/// # Errors
///
/// Returns `Storage` if `name` is not a valid session id or a game with
/// that id is already saved
pub fn start_session(config: &Config, store: &SnapshotStore, name: Option<&str>) -> Result<Session> {
    let mut session = Session::from_config(config);
    if let Some(name) = name {
        validate_session_id(name)?;
        if store.has_session(name) {
            return Err(StoryloomError::Storage(format!(
                "session '{}' already exists; resume it with --session {}",
                name, name
            ))
            .into());
        }
        tracing::info!("Starting named session {}", name);
        session.id = Some(name.to_string());
    }
    Ok(session)
}

/// Plays the opening turn, asking for a new premise after each failure
///
/// `ask` is called with `None` when no premise was given and with the
/// previous premise after a failed attempt. It returns `None` when the
/// player gives up.
///
/// # Returns
///
/// Whether the story began
pub async fn begin_story<F>(
    engine: &TurnEngine,
    session: &mut Session,
    premise: Option<String>,
    mut ask: F,
) -> Result<bool>
where
    F: FnMut(Option<&str>) -> Result<Option<String>>,
{
    let mut premise = match premise {
        Some(premise) => premise,
        None => match ask(None)? {
            Some(premise) => premise,
            None => return Ok(false),
        },
    };

    loop {
        match engine.open(session, &premise).await {
            Ok(()) => return Ok(true),
            Err(e) => {
                tracing::warn!("Opening turn failed: {:#}", e);
                eprintln!("{}", format!("Error: {}", e).red());
                println!(
                    "The story could not begin. Press Enter to try again, edit the premise, or Ctrl-D to leave.\n"
                );
                match ask(Some(&premise))? {
                    Some(next) => premise = next,
                    None => return Ok(false),
                }
            }
        }
    }
}

/// Runs compaction on request
///
/// # Returns
///
/// `None` when there are fewer than two summaries to merge
pub async fn condense_story(
    engine: &TurnEngine,
    session: &mut Session,
) -> Result<Option<CompactionStrategy>> {
    if session.summaries.len() < 2 {
        return Ok(None);
    }
    engine.compact(session).await.map(Some)
}

/// Numbered listing of the session's summaries
pub fn format_summaries(session: &Session) -> String {
    if session.summaries.is_empty() {
        return "No summaries yet.".to_string();
    }
    session
        .summaries
        .iter()
        .enumerate()
        .map(|(i, summary)| {
            let text = if summary.trim().is_empty() {
                "(blank)"
            } else {
                summary.trim()
            };
            format!("{:>3}. {}", i + 1, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Start interactive play
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `args` - Play options from the command line
///
/// # Errors
///
/// Returns error if the requested save cannot be loaded, the new session
/// name is unusable, or the endpoint is unknown
pub async fn run_play(config: Config, args: PlayArgs) -> Result<()> {
    let store = SnapshotStore::from_config(&config.storage)?;
    let (mut session, mut meta) = match load_requested(&store, &args)? {
        Some(snapshot) => {
            println!(
                "{}",
                format!(
                    "Resuming {} ({} turns, saved {})",
                    snapshot.header.session_id,
                    snapshot.header.total_turns,
                    snapshot.header.timestamp.format("%Y-%m-%d %H:%M")
                )
                .green()
            );
            (snapshot.session, snapshot.meta)
        }
        None => (
            start_session(&config, &store, args.name.as_deref())?,
            TurnMeta::default(),
        ),
    };

    if let Some(provider) = &args.provider {
        session.settings.provider = provider.clone();
    }
    let provider = create_provider(Some(&session.settings.provider), &config.provider)?;
    tracing::info!(
        "Using endpoint {} with model {}",
        session.settings.provider,
        provider.model()
    );

    let templates = PromptTemplates::load(config.prompts.dir.as_deref())?;
    let observer = Arc::new(CliObserver::new(config.engine.retry.require_confirmation));
    let engine = TurnEngine::new(Arc::from(provider), templates, config.engine.clone())
        .with_observer(observer);

    let mut rl = DefaultEditor::new()?;
    print_welcome_banner(&session);

    if !session.has_started() {
        let opened = begin_story(&engine, &mut session, args.premise.clone(), |previous| {
            let line = match previous {
                None => rl.readline("Opening premise (Enter for a random scene): "),
                Some(previous) => rl.readline_with_initial("Opening premise: ", (previous, "")),
            };
            match line {
                Ok(line) => Ok(Some(line)),
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await?;
        if !opened {
            println!("Goodbye!");
            return Ok(());
        }
        meta.turns += 1;
        autosave(&store, &mut session, &meta);
    }

    print_scene(&session.current_description);

    loop {
        match rl.readline(&format!("{} ", ">".bold())) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed)?;
                meta.turns += 1;

                match parse_special_command(trimmed) {
                    Ok(SpecialCommand::Save(label)) => {
                        let label = label.as_deref().unwrap_or(QUICKSAVE_LABEL);
                        match store.save(&mut session, &meta, label, true) {
                            Ok(path) => println!(
                                "{}",
                                format!("Saved to {}", path.display()).green()
                            ),
                            Err(e) => eprintln!("{}", format!("Save failed: {}", e).red()),
                        }
                        continue;
                    }
                    Ok(SpecialCommand::Stats) => {
                        print_token_report(&session);
                        continue;
                    }
                    Ok(SpecialCommand::Summary) => {
                        println!("\n{}\n", format_summaries(&session));
                        continue;
                    }
                    Ok(SpecialCommand::Compact) => {
                        match condense_story(&engine, &mut session).await {
                            Ok(Some(strategy)) => {
                                println!(
                                    "{}",
                                    format!(
                                        "The story so far was condensed ({}), {} summaries remain",
                                        strategy,
                                        session.summaries.len()
                                    )
                                    .green()
                                );
                                autosave(&store, &mut session, &meta);
                            }
                            Ok(None) => println!("Not enough summaries to condense yet."),
                            Err(e) => eprintln!(
                                "{}",
                                format!("Could not condense the story so far: {}", e).red()
                            ),
                        }
                        continue;
                    }
                    Ok(SpecialCommand::Export) => {
                        match export(&config, &mut session) {
                            Ok(dir) => println!(
                                "{}",
                                format!("Transcripts written to {}", dir.display()).green()
                            ),
                            Err(e) => eprintln!("{}", format!("Export failed: {}", e).red()),
                        }
                        continue;
                    }
                    Ok(SpecialCommand::Help) => {
                        special_commands::print_help();
                        continue;
                    }
                    Ok(SpecialCommand::Quit) => break,
                    Ok(SpecialCommand::None) => {}
                    Err(e) => {
                        eprintln!("{}", e.to_string().red());
                        continue;
                    }
                }

                match engine.advance(&mut session, trimmed).await {
                    Ok(outcome) => {
                        if let CompactionOutcome::Completed(strategy) = outcome.compaction {
                            println!(
                                "{}",
                                format!("(The story so far was condensed: {})", strategy)
                                    .dimmed()
                            );
                        }
                        print_scene(&session.current_description);
                        autosave(&store, &mut session, &meta);
                    }
                    Err(e) => {
                        eprintln!("{}", format!("Error: {}", e).red());
                        println!("The story did not advance. Try again or rephrase.\n");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                break;
            }
        }
    }

    if let Some(id) = &session.id {
        println!("Session {} is saved. Resume with: storyloom play --session {}", id, id);
    }
    println!("Goodbye!");
    Ok(())
}

fn autosave(store: &SnapshotStore, session: &mut Session, meta: &TurnMeta) {
    if let Err(e) = store.autosave(session, meta) {
        tracing::error!("Autosave failed: {:#}", e);
        eprintln!("{}", format!("Autosave failed: {}", e).red());
    }
}

fn export(config: &Config, session: &mut Session) -> Result<std::path::PathBuf> {
    let dir = config.storage.resolve_export_dir()?;
    session.ensure_id();
    let files = export_transcript(session, &dir, Local::now())?;
    Ok(files
        .conversation
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or(dir))
}

fn print_scene(description: &str) {
    println!("\n{}\n", description.trim_end());
}

fn print_welcome_banner(session: &Session) {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                   Storyloom - Welcome!                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");
    println!("Player:   {}", session.player.name.cyan());
    if !session.player.background.trim().is_empty() {
        println!("Background: {}", session.player.background);
    }
    println!("Endpoint: {}", session.settings.provider);
    println!("\nType '/help' for commands, '/quit' to leave\n");
}
