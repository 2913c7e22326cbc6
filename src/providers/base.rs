//! Base provider trait and common types for Storyloom
//!
//! This module defines the Provider trait that every language-model client
//! implements, along with the per-call generation options and the
//! completion structure returned to the turn engine.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token usage information from a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Arguments
    ///
    /// * `prompt_tokens` - Number of prompt tokens
    /// * `completion_tokens` - Number of completion tokens
    ///
    /// # Examples
    ///
    /// ```
    /// use storyloom::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.prompt_tokens, 100);
    /// assert_eq!(usage.completion_tokens, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        let total_tokens = prompt_tokens + completion_tokens;
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// Parameters for a single generation call
///
/// Penalties are `None` when the target model does not accept them; the
/// client then omits them from the request entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    /// Maximum completion tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Frequency penalty, if supported
    pub frequency_penalty: Option<f32>,
    /// Presence penalty, if supported
    pub presence_penalty: Option<f32>,
}

impl GenerationOptions {
    /// Returns a copy with a different completion budget
    ///
    /// Used for summarization calls so the session's stored setting is
    /// never touched.
    ///
    /// # Examples
    ///
    /// ```
    /// use storyloom::providers::GenerationOptions;
    ///
    /// let base = GenerationOptions {
    ///     max_tokens: 4096,
    ///     temperature: 0.9,
    ///     frequency_penalty: Some(0.5),
    ///     presence_penalty: None,
    /// };
    /// let summary = base.with_max_tokens(2048);
    /// assert_eq!(summary.max_tokens, 2048);
    /// assert_eq!(base.max_tokens, 4096);
    /// ```
    pub fn with_max_tokens(&self, max_tokens: u32) -> Self {
        Self {
            max_tokens,
            ..self.clone()
        }
    }
}

/// Result of a generation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Main text channel
    pub content: String,
    /// Reasoning channel, when the model exposes one
    pub reasoning_content: Option<String>,
    /// Token usage, when reported
    pub usage: Option<TokenUsage>,
}

impl Completion {
    /// Creates a completion with content only
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning_content: None,
            usage: None,
        }
    }

    /// Creates a completion with token usage information
    ///
    /// # Examples
    ///
    /// ```
    /// use storyloom::providers::{Completion, TokenUsage};
    ///
    /// let completion = Completion::with_usage("{}", TokenUsage::new(10, 5));
    /// assert_eq!(completion.usage.unwrap().total_tokens, 15);
    /// ```
    pub fn with_usage(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            reasoning_content: None,
            usage: Some(usage),
        }
    }

    /// Returns the text to parse: content, or the reasoning channel when
    /// content is blank
    pub fn text(&self) -> &str {
        if self.content.trim().is_empty() {
            if let Some(reasoning) = &self.reasoning_content {
                return reasoning;
            }
        }
        &self.content
    }
}

/// Language model client
///
/// The engine only needs one operation: send a prompt and get text back.
/// Implementations enforce their own request timeout.
///
/// # Examples
///
/// ```
/// use storyloom::providers::{Completion, GenerationOptions, Provider};
/// use storyloom::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<Completion> {
///         Ok(Completion::new(prompt))
///     }
///
///     fn model(&self) -> &str {
///         "echo"
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generates a completion for a single user prompt
    ///
    /// # Errors
    ///
    /// Returns `Timeout`, `Authentication` or `Provider` errors for transport
    /// failures
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Completion>;

    /// Model identifier used by this client
    fn model(&self) -> &str;

    /// Whether frequency/presence penalties may be sent
    fn supports_penalties(&self) -> bool {
        true
    }
}
