//! Session state for a single game
//!
//! A `Session` is created empty when a game starts or rehydrated whole from
//! a snapshot. Only the turn engine and compaction mutate its history.

use crate::config::Config;
use crate::providers::{GenerationOptions, TokenUsage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Player identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Character name
    pub name: String,
    /// Freeform background text
    #[serde(default)]
    pub background: String,
}

/// Content rating sliders passed to the model as guidance (0 to 10)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRatings {
    /// Mature themes
    #[serde(default = "default_rating")]
    pub mature: u8,
    /// Violence
    #[serde(default = "default_rating")]
    pub violence: u8,
    /// Gore
    #[serde(default = "default_rating")]
    pub gore: u8,
    /// Horror
    #[serde(default = "default_rating")]
    pub horror: u8,
}

fn default_rating() -> u8 {
    3
}

impl Default for ContentRatings {
    fn default() -> Self {
        Self {
            mature: default_rating(),
            violence: default_rating(),
            gore: default_rating(),
            horror: default_rating(),
        }
    }
}

impl ContentRatings {
    /// One-line description used in the prompt pre-amble
    pub fn describe(&self) -> String {
        format!(
            "Content ratings (0-10): mature {}, violence {}, gore {}, horror {}",
            self.mature.min(10),
            self.violence.min(10),
            self.gore.min(10),
            self.horror.min(10)
        )
    }
}

/// Player-authored text appended to the pre, body and post sections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPrompts {
    /// Appended to the pre-amble
    #[serde(default)]
    pub pre: String,
    /// Appended to the body
    #[serde(default)]
    pub body: String,
    /// Appended to the post section
    #[serde(default)]
    pub post: String,
}

/// Per-session generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Completion budget for story turns
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Frequency penalty
    pub frequency_penalty: f32,
    /// Presence penalty
    pub presence_penalty: f32,
    /// Provider endpoint name
    pub provider: String,
    /// Content rating sliders
    #[serde(default)]
    pub content: ContentRatings,
    /// Custom prompt fragments
    #[serde(default)]
    pub custom_prompts: CustomPrompts,
}

impl SessionSettings {
    /// Settings for a new game, taken from configuration
    pub fn from_config(config: &Config) -> Self {
        let generation = &config.engine.generation;
        Self {
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            frequency_penalty: generation.frequency_penalty,
            presence_penalty: generation.presence_penalty,
            provider: config.provider.active.clone(),
            content: config.prompts.content.clone(),
            custom_prompts: config.prompts.custom.clone(),
        }
    }

    /// Generation options for a story turn
    ///
    /// # Examples
    ///
    /// ```
    /// use storyloom::config::Config;
    /// use storyloom::engine::SessionSettings;
    ///
    /// let settings = SessionSettings::from_config(&Config::default());
    /// assert!(settings.generation_options(false).frequency_penalty.is_none());
    /// assert!(settings.generation_options(true).frequency_penalty.is_some());
    /// ```
    pub fn generation_options(&self, supports_penalties: bool) -> GenerationOptions {
        GenerationOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            frequency_penalty: supports_penalties.then_some(self.frequency_penalty),
            presence_penalty: supports_penalties.then_some(self.presence_penalty),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One exchange with the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

impl ConversationEntry {
    /// Prompt sent to the model
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Text returned by the model
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Token accounting for a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounters {
    /// Prompt tokens of the last call
    pub last_prompt: usize,
    /// Completion tokens of the last call
    pub last_completion: usize,
    /// Running prompt tokens
    pub total_prompt: usize,
    /// Running completion tokens
    pub total_completion: usize,
    /// Running total tokens
    pub total: usize,
    /// Cost of each committed turn; compaction cost is folded into the
    /// preceding entry
    #[serde(default)]
    pub consumes: Vec<usize>,
}

impl TokenCounters {
    /// Records one successful model call
    pub fn record(&mut self, usage: &TokenUsage) {
        self.last_prompt = usage.prompt_tokens;
        self.last_completion = usage.completion_tokens;
        self.total_prompt += usage.prompt_tokens;
        self.total_completion += usage.completion_tokens;
        self.total += usage.total_tokens;
    }

    /// Tokens used by the last call
    pub fn last_call_total(&self) -> usize {
        self.last_prompt + self.last_completion
    }

    /// Adds extra cost to the most recent turn
    pub fn add_to_last_turn(&mut self, tokens: usize) {
        match self.consumes.last_mut() {
            Some(last) => *last += tokens,
            None => self.consumes.push(tokens),
        }
    }
}

/// The mutable state of one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Short identifier, assigned on first save
    #[serde(default)]
    pub id: Option<String>,
    /// Player identity
    pub player: Player,
    /// Latest narrative text
    #[serde(default)]
    pub current_description: String,
    /// Last raw model text
    #[serde(default)]
    pub last_response: String,
    /// One description per committed turn, opening included
    #[serde(default)]
    pub history_descriptions: Vec<String>,
    /// One action per continuation turn
    #[serde(default)]
    pub history_choices: Vec<String>,
    /// One summary per committed turn until compaction rewrites them
    #[serde(default)]
    pub summaries: Vec<String>,
    /// Every prompt and reply exchanged with the model
    #[serde(default)]
    pub conversation_log: Vec<ConversationEntry>,
    /// Token accounting
    #[serde(default)]
    pub tokens: TokenCounters,
    /// Turns left before compaction may run again
    pub compaction_cooldown: i64,
    /// Generation settings
    pub settings: SessionSettings,
}

impl Session {
    /// Creates an empty session
    ///
    /// # Arguments
    ///
    /// * `player` - Player identity
    /// * `settings` - Generation settings
    /// * `cooldown` - Initial compaction cooldown
    pub fn new(player: Player, settings: SessionSettings, cooldown: i64) -> Self {
        Self {
            id: None,
            player,
            current_description: String::new(),
            last_response: String::new(),
            history_descriptions: Vec::new(),
            history_choices: Vec::new(),
            summaries: Vec::new(),
            conversation_log: Vec::new(),
            tokens: TokenCounters::default(),
            compaction_cooldown: cooldown,
            settings,
        }
    }

    /// Creates a session for a new game from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Player {
                name: config.player.name.clone(),
                background: config.player.background.clone(),
            },
            SessionSettings::from_config(config),
            config.engine.compaction.cooldown_reset,
        )
    }

    /// Returns the session id, assigning one if none exists yet
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(generate_session_id)
    }

    /// Number of committed turns, opening included
    pub fn turn_count(&self) -> usize {
        self.history_descriptions.len()
    }

    /// Whether the opening turn has been committed
    pub fn has_started(&self) -> bool {
        !self.history_descriptions.is_empty()
    }

    /// Most recent summary, or an empty string
    pub fn latest_summary(&self) -> &str {
        self.summaries.last().map(String::as_str).unwrap_or("")
    }

    /// Player identity line used in prompts
    pub fn player_identity(&self) -> String {
        if self.player.background.trim().is_empty() {
            format!("Player name: {}", self.player.name)
        } else {
            format!(
                "Player name: {}, player background: {}",
                self.player.name, self.player.background
            )
        }
    }
}

/// Generates an 8-character session identifier
///
/// # Examples
///
/// ```
/// use storyloom::engine::session::generate_session_id;
///
/// let id = generate_session_id();
/// assert_eq!(id.len(), 8);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
pub fn generate_session_id() -> String {
    let seed = uuid::Uuid::new_v4().to_string();
    let digest = Sha256::digest(seed.as_bytes());
    digest
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect()
}
