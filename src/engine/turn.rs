//! Turn protocol
//!
//! One round of play: compose the prompt, call the model, parse the reply,
//! retry on failure, and commit the result to the session. Nothing is
//! committed to the story history unless the whole round succeeds.

use super::compaction::CompactionStrategy;
use super::observer::{RetryDecision, SilentObserver, TurnFailure, TurnMode, TurnObserver, TurnPhase};
use super::parser::{parse_story, StoryRecord};
use super::session::{ConversationEntry, Session};
use crate::config::EngineConfig;
use crate::error::{Result, StoryloomError};
use crate::prompts::{Overrides, PromptTemplates, Section};
use crate::providers::{GenerationOptions, Provider, TokenUsage};
use std::sync::Arc;

/// Phrase used when the player gives no opening premise
pub const RANDOM_PREMISE: &str = "a completely random scene";

/// What happened to compaction during a continuation turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Compaction was not due
    NotNeeded,
    /// Compaction ran with the given strategy
    Completed(CompactionStrategy),
    /// Compaction failed; the turn went ahead without it
    Failed(String),
}

/// Result of a committed continuation turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Compaction result for this turn
    pub compaction: CompactionOutcome,
}

/// Drives turns against a language model
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use storyloom::config::Config;
/// use storyloom::engine::{Session, TurnEngine};
/// use storyloom::prompts::PromptTemplates;
/// use storyloom::providers::create_provider;
///
/// # async fn example() -> storyloom::error::Result<()> {
/// let config = Config::default();
/// let provider = create_provider(None, &config.provider)?;
/// let engine = TurnEngine::new(Arc::from(provider), PromptTemplates::builtin(), config.engine.clone());
/// let mut session = Session::from_config(&config);
/// engine.open(&mut session, "a lighthouse in a storm").await?;
/// engine.advance(&mut session, "climb the stairs").await?;
/// # Ok(())
/// # }
/// ```
pub struct TurnEngine {
    provider: Arc<dyn Provider>,
    templates: PromptTemplates,
    config: EngineConfig,
    observer: Arc<dyn TurnObserver>,
}

impl TurnEngine {
    /// Creates an engine with a silent observer
    pub fn new(provider: Arc<dyn Provider>, templates: PromptTemplates, config: EngineConfig) -> Self {
        Self {
            provider,
            templates,
            config,
            observer: Arc::new(SilentObserver),
        }
    }

    /// Replaces the observer
    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Prompt templates
    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    pub(crate) fn observer(&self) -> &dyn TurnObserver {
        self.observer.as_ref()
    }

    /// Generation options for a story turn of this session
    pub fn story_options(&self, session: &Session) -> GenerationOptions {
        session
            .settings
            .generation_options(self.provider.supports_penalties())
    }

    /// Plays the opening turn
    ///
    /// # Arguments
    ///
    /// * `session` - A session with no committed turns
    /// * `premise` - Opening premise; blank picks a random scene
    ///
    /// # Errors
    ///
    /// Returns `Prompt` if the session already started, `RetryExhausted` or
    /// `TurnAborted` if no usable reply was obtained
    pub async fn open(&self, session: &mut Session, premise: &str) -> Result<()> {
        if session.has_started() {
            return Err(StoryloomError::Prompt("the game has already started".into()).into());
        }

        let prompt = self.opening_prompt(session, premise);
        let options = self.story_options(session);
        tracing::info!("Starting game for {}", session.player.name);

        let (record, usage) = self
            .call_with_retry(session, TurnMode::Opening, &prompt, &options, parse_story)
            .await?;
        self.commit(session, record, None, &usage);
        self.observer.on_phase(TurnPhase::Committed(TurnMode::Opening));
        Ok(())
    }

    /// Plays one continuation turn for a player action
    ///
    /// Compaction runs first when it is due. A compaction failure is
    /// reported in the outcome and the action is still played.
    ///
    /// # Errors
    ///
    /// Returns `Prompt` for a blank action or an unstarted session,
    /// `RetryExhausted` or `TurnAborted` if no usable reply was obtained
    pub async fn advance(&self, session: &mut Session, action: &str) -> Result<TurnOutcome> {
        let action = action.trim();
        if action.is_empty() {
            return Err(StoryloomError::Prompt("player action is empty".into()).into());
        }
        if !session.has_started() {
            return Err(StoryloomError::Prompt("the game has not started yet".into()).into());
        }

        let compaction = if super::compaction::should_compact(session, &self.config.compaction) {
            match self.compact(session).await {
                Ok(strategy) => CompactionOutcome::Completed(strategy),
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!("Summary compaction failed, continuing turn: {}", message);
                    self.observer.on_compaction_failed(&message);
                    CompactionOutcome::Failed(message)
                }
            }
        } else {
            CompactionOutcome::NotNeeded
        };

        let prompt = self.continuation_prompt(session, action);
        let options = self.story_options(session);
        tracing::debug!("Turn {} action: {}", session.turn_count() + 1, action);

        let (record, usage) = self
            .call_with_retry(session, TurnMode::Continuation, &prompt, &options, parse_story)
            .await?;
        self.commit(session, record, Some(action), &usage);
        self.observer
            .on_phase(TurnPhase::Committed(TurnMode::Continuation));

        Ok(TurnOutcome { compaction })
    }

    /// Opening prompt for a session
    pub fn opening_prompt(&self, session: &Session, premise: &str) -> String {
        let premise = premise.trim();
        let premise = if premise.is_empty() { RANDOM_PREMISE } else { premise };

        let mut overrides = self.story_overrides(session);
        overrides.insert(
            Section::UserInput,
            format!(
                "Begin this immersive text adventure with {} as the opening of the story.",
                premise
            ),
        );
        self.templates.opening.render(&overrides)
    }

    /// Continuation prompt for a session and player action
    pub fn continuation_prompt(&self, session: &Session, action: &str) -> String {
        let overrides = self.story_overrides(session);
        self.templates.continuation.render_with_vars(
            &overrides,
            &[
                ("history_story", session.latest_summary()),
                ("current_scene", session.current_description.as_str()),
                ("player_action", action),
            ],
        )
    }

    fn story_overrides(&self, session: &Session) -> Overrides {
        let custom = &session.settings.custom_prompts;
        let mut pre = session.player_identity();
        pre.push('\n');
        pre.push_str(&session.settings.content.describe());
        if !custom.pre.trim().is_empty() {
            pre.push('\n');
            pre.push_str(&custom.pre);
        }

        let mut overrides = Overrides::new();
        overrides.insert(Section::PrePrompt, pre);
        overrides.insert(Section::Body, custom.body.clone());
        overrides.insert(Section::PostPrompt, custom.post.clone());
        overrides
    }

    fn commit(
        &self,
        session: &mut Session,
        record: StoryRecord,
        action: Option<&str>,
        usage: &TokenUsage,
    ) {
        session.history_descriptions.push(record.description.clone());
        if let Some(action) = action {
            session.history_choices.push(action.to_string());
        }
        session.summaries.push(record.summary);
        session.tokens.consumes.push(usage.total_tokens);
        session.compaction_cooldown -= 1;
        session.current_description = record.description;

        tracing::info!(
            "Committed turn {} ({} summaries, cooldown {})",
            session.turn_count(),
            session.summaries.len(),
            session.compaction_cooldown
        );
    }

    /// Calls the model until the reply parses or attempts run out
    ///
    /// Every successful call updates token totals, the conversation log and
    /// `last_response`, even when its reply is then rejected by `parse`.
    pub(crate) async fn call_with_retry<T, F>(
        &self,
        session: &mut Session,
        mode: TurnMode,
        prompt: &str,
        options: &GenerationOptions,
        parse: F,
    ) -> Result<(T, TokenUsage)>
    where
        F: Fn(&str) -> Result<T>,
    {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.observer
                .on_phase(TurnPhase::AwaitingModel { mode, attempt });

            let error = match self.provider.generate(prompt, options).await {
                Ok(completion) => {
                    let usage = completion.usage.unwrap_or_default();
                    if completion.usage.is_none() {
                        tracing::debug!("Provider reported no token usage");
                    }
                    let text = completion.text().to_string();

                    session.tokens.record(&usage);
                    session.conversation_log.push(ConversationEntry::user(prompt));
                    session
                        .conversation_log
                        .push(ConversationEntry::assistant(text.clone()));
                    session.last_response = text.clone();
                    self.observer.on_usage(&usage, &session.tokens);

                    match parse(&text) {
                        Ok(value) => return Ok((value, usage)),
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            let typed = error.downcast_ref::<StoryloomError>();
            let transport = typed.map(StoryloomError::is_transport).unwrap_or(true);
            let raw = match typed {
                Some(StoryloomError::Parse { raw, .. }) => Some(raw.clone()),
                _ => None,
            };
            let message = error.to_string();

            tracing::warn!(
                "{} attempt {}/{} failed: {}",
                mode,
                attempt,
                max_attempts,
                message
            );

            if attempt >= max_attempts {
                tracing::error!("{} turn gave up after {} attempts", mode, attempt);
                return Err(StoryloomError::RetryExhausted {
                    attempts: attempt,
                    message,
                }
                .into());
            }

            let failure = TurnFailure {
                mode,
                attempt,
                max_attempts,
                message: message.clone(),
                raw,
                transport,
            };
            if self.observer.on_failure(&failure) == RetryDecision::Abort {
                tracing::info!("{} turn aborted by operator", mode);
                return Err(StoryloomError::TurnAborted(message).into());
            }

            tokio::time::sleep(self.config.retry.backoff_for(attempt)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RetryConfig};
    use crate::test_utils::{fast_engine_config, story_reply, ScriptedProvider, ScriptedReply};

    fn engine(provider: ScriptedProvider) -> TurnEngine {
        TurnEngine::new(
            Arc::new(provider),
            PromptTemplates::builtin(),
            fast_engine_config(),
        )
    }

    fn session() -> Session {
        let mut session = Session::from_config(&Config::default());
        session.player.name = "Ana".to_string();
        session
    }

    #[tokio::test]
    async fn test_open_commits_first_turn() {
        let provider = ScriptedProvider::new(vec![story_reply("A hall。", "hall", 10, 5)]);
        let engine = engine(provider.clone());
        let mut session = session();

        engine.open(&mut session, "a haunted manor").await.unwrap();

        assert_eq!(session.history_descriptions, vec!["A hall。\n"]);
        assert!(session.history_choices.is_empty());
        assert_eq!(session.summaries, vec!["hall"]);
        assert_eq!(session.current_description, "A hall。\n");
        assert_eq!(session.tokens.consumes, vec![15]);
        assert_eq!(session.tokens.total, 15);
        assert_eq!(session.compaction_cooldown, 9);
        assert_eq!(session.conversation_log.len(), 2);

        let prompts = provider.prompts();
        assert!(prompts[0].contains("Player name: Ana"));
        assert!(prompts[0].contains("a haunted manor"));
    }

    #[tokio::test]
    async fn test_open_blank_premise_is_random() {
        let provider = ScriptedProvider::new(vec![story_reply("x", "y", 1, 1)]);
        let engine = engine(provider.clone());
        engine.open(&mut session(), "  ").await.unwrap();
        assert!(provider.prompts()[0].contains(RANDOM_PREMISE));
    }

    #[tokio::test]
    async fn test_open_twice_refused() {
        let provider = ScriptedProvider::new(vec![story_reply("x", "y", 1, 1)]);
        let engine = engine(provider);
        let mut session = session();
        engine.open(&mut session, "").await.unwrap();
        assert!(engine.open(&mut session, "").await.is_err());
    }

    #[tokio::test]
    async fn test_advance_substitutes_placeholders() {
        let provider = ScriptedProvider::new(vec![
            story_reply("The door is shut.", "At a door.", 10, 5),
            story_reply("It opens.", "Opened the door.", 20, 5),
        ]);
        let engine = engine(provider.clone());
        let mut session = session();
        engine.open(&mut session, "").await.unwrap();
        let outcome = engine.advance(&mut session, " open the door ").await.unwrap();

        assert_eq!(outcome.compaction, CompactionOutcome::NotNeeded);
        assert_eq!(session.history_choices, vec!["open the door"]);
        let prompt = &provider.prompts()[1];
        assert!(prompt.contains("At a door."));
        assert!(prompt.contains("The door is shut."));
        assert!(prompt.contains("open the door"));
        assert!(!prompt.contains("{player_action}"));
    }

    #[tokio::test]
    async fn test_advance_blank_action_makes_no_call() {
        let provider = ScriptedProvider::new(vec![story_reply("x", "y", 1, 1)]);
        let engine = engine(provider.clone());
        let mut session = session();
        engine.open(&mut session, "").await.unwrap();

        let err = engine.advance(&mut session, "   ").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoryloomError>(),
            Some(StoryloomError::Prompt(_))
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_advance_before_open_refused() {
        let provider = ScriptedProvider::new(vec![]);
        let engine = engine(provider.clone());
        assert!(engine.advance(&mut session(), "look").await.is_err());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_parse_failure_then_success() {
        let provider = ScriptedProvider::new(vec![
            ScriptedReply::text("no json here", 7, 3),
            story_reply("Fine.", "fine", 10, 5),
        ]);
        let engine = engine(provider.clone());
        let mut session = session();
        engine.open(&mut session, "").await.unwrap();

        assert_eq!(provider.call_count(), 2);
        assert_eq!(session.history_descriptions.len(), 1);
        // both calls are accounted, only the committed one is a turn cost
        assert_eq!(session.tokens.total, 25);
        assert_eq!(session.tokens.consumes, vec![15]);
        assert_eq!(session.conversation_log.len(), 4);
    }

    #[tokio::test]
    async fn test_transport_failure_then_success() {
        let provider = ScriptedProvider::new(vec![
            ScriptedReply::Fail("connection reset".to_string()),
            story_reply("Fine.", "fine", 10, 5),
        ]);
        let engine = engine(provider.clone());
        let mut session = session();
        engine.open(&mut session, "").await.unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(session.conversation_log.len(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted_leaves_history_untouched() {
        let provider = ScriptedProvider::new(vec![
            story_reply("Start.", "start", 10, 5),
            ScriptedReply::text("{\"summary\": \"no description\"}", 3, 3),
            ScriptedReply::text("still nothing", 3, 3),
            ScriptedReply::Fail("timeout".to_string()),
        ]);
        let mut config = fast_engine_config();
        config.retry.max_attempts = 3;
        let engine = TurnEngine::new(Arc::new(provider.clone()), PromptTemplates::builtin(), config);

        let mut session = session();
        engine.open(&mut session, "").await.unwrap();
        let before = session.clone();

        let err = engine.advance(&mut session, "wait").await.unwrap_err();
        match err.downcast_ref::<StoryloomError>() {
            Some(StoryloomError::RetryExhausted { attempts, .. }) => assert_eq!(*attempts, 3),
            other => panic!("unexpected error {:?}", other),
        }

        assert_eq!(session.history_descriptions, before.history_descriptions);
        assert_eq!(session.history_choices, before.history_choices);
        assert_eq!(session.summaries, before.summaries);
        assert_eq!(session.tokens.consumes, before.tokens.consumes);
        assert_eq!(session.compaction_cooldown, before.compaction_cooldown);
        // the two answered calls are still accounted
        assert_eq!(session.tokens.total, before.tokens.total + 12);
    }

    #[tokio::test]
    async fn test_observer_abort() {
        use crate::test_utils::RecordingObserver;

        let provider = ScriptedProvider::new(vec![
            ScriptedReply::text("garbage", 1, 1),
            story_reply("never used", "x", 1, 1),
        ]);
        let observer = Arc::new(RecordingObserver::aborting());
        let engine = engine(provider.clone()).with_observer(observer.clone());

        let mut session = session();
        let err = engine.open(&mut session, "").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoryloomError>(),
            Some(StoryloomError::TurnAborted(_))
        ));
        assert_eq!(provider.call_count(), 1);
        assert!(!session.has_started());

        let failures = observer.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].raw.as_deref(), Some("garbage"));
        assert!(!failures[0].transport);
    }

    #[tokio::test]
    async fn test_reasoning_channel_fallback() {
        let provider = ScriptedProvider::new(vec![ScriptedReply::Reply {
            content: String::new(),
            reasoning: Some("{\"description\": \"From reasoning.\", \"summary\": \"r\"}".into()),
            usage: Some(TokenUsage::new(2, 2)),
        }]);
        let engine = engine(provider);
        let mut session = session();
        engine.open(&mut session, "").await.unwrap();
        assert_eq!(session.current_description, "From reasoning.");
    }

    #[tokio::test]
    async fn test_penalties_follow_provider_support() {
        let provider = ScriptedProvider::new(vec![]).without_penalties();
        let engine = engine(provider);
        let options = engine.story_options(&session());
        assert!(options.frequency_penalty.is_none());
        assert!(options.presence_penalty.is_none());
    }

    #[test]
    fn test_custom_prompts_in_overrides() {
        let engine = engine(ScriptedProvider::new(vec![]));
        let mut session = session();
        session.settings.custom_prompts.pre = "Speak like a pirate.".to_string();
        session.settings.custom_prompts.post = "Keep replies short.".to_string();
        let prompt = engine.opening_prompt(&session, "a ship");
        assert!(prompt.contains("Speak like a pirate."));
        assert!(prompt.contains("Keep replies short."));
        assert!(prompt.contains("Content ratings"));
        let post_pos = prompt.find("Keep replies short.").unwrap();
        let json_pos = prompt.find("\"description\"").unwrap();
        assert!(json_pos < post_pos);
    }

    #[test]
    fn test_default_retry_config_used() {
        let engine = TurnEngine::new(
            Arc::new(ScriptedProvider::new(vec![])),
            PromptTemplates::builtin(),
            EngineConfig::default(),
        );
        assert_eq!(engine.config().retry, RetryConfig::default());
    }
}
