//! OpenAI-compatible provider implementation for Storyloom
//!
//! Talks to any endpoint exposing `POST {base_url}/chat/completions`
//! (DeepSeek, Hunyuan, local servers). Each generation is a single
//! user message; the response's content, optional reasoning channel and
//! token usage are handed back to the engine.

use crate::config::EndpointConfig;
use crate::error::{Result, StoryloomError};
use crate::providers::{Completion, GenerationOptions, Provider, TokenUsage};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI-compatible chat completions provider
///
/// # Examples
///
/// ```no_run
/// use storyloom::config::Config;
/// use storyloom::providers::{GenerationOptions, OpenAiProvider, Provider};
///
/// # async fn example() -> storyloom::error::Result<()> {
/// let config = Config::default();
/// let endpoint = config.provider.endpoint("deepseek").unwrap().clone();
/// let provider = OpenAiProvider::new(endpoint)?;
/// let options = GenerationOptions {
///     max_tokens: 1024,
///     temperature: 0.9,
///     frequency_penalty: None,
///     presence_penalty: None,
/// };
/// let completion = provider.generate("Describe a quiet harbor.", &options).await?;
/// println!("{}", completion.content);
/// # Ok(())
/// # }
/// ```
pub struct OpenAiProvider {
    client: Client,
    config: EndpointConfig,
    api_key: Option<String>,
}

/// Request body for `/chat/completions`
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl OpenAiProvider {
    /// Create a new provider for one endpoint
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("storyloom/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                StoryloomError::Provider(format!("Failed to create HTTP client: {}", e))
            })?;

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!(
                "No API key for endpoint '{}' (set {}); sending unauthenticated requests",
                config.name,
                config.api_key_env
            );
        }

        tracing::info!(
            "Initialized provider: endpoint={}, model={}",
            config.name,
            config.model
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Get the endpoint base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Completion> {
        let penalties = self.supports_penalties();
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            frequency_penalty: options.frequency_penalty.filter(|_| penalties),
            presence_penalty: options.presence_penalty.filter(|_| penalties),
            stream: false,
        };

        tracing::debug!(
            "Sending completion request: model={}, prompt_chars={}, max_tokens={}",
            self.config.model,
            prompt.chars().count(),
            options.max_tokens
        );

        let mut builder = self.client.post(self.completions_url()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::error!("Completion request timed out: {}", e);
                StoryloomError::Timeout(format!(
                    "No response from {} within {}s",
                    self.config.name, self.config.timeout_seconds
                ))
            } else {
                tracing::error!("Completion request failed: {}", e);
                StoryloomError::Provider(format!("Request to {} failed: {}", self.config.name, e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Endpoint rejected credentials {}: {}", status, error_text);
            return Err(StoryloomError::Authentication(format!(
                "{} returned {}: {}",
                self.config.name, status, error_text
            ))
            .into());
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Endpoint returned error {}: {}", status, error_text);
            return Err(StoryloomError::Provider(format!(
                "{} returned error {}: {}",
                self.config.name, status, error_text
            ))
            .into());
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to decode completion response: {}", e);
            StoryloomError::Provider(format!("Failed to decode completion response: {}", e))
        })?;

        let message = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| StoryloomError::Provider("Response contained no choices".into()))?
            .message;

        let usage = chat
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

        if let Some(usage) = &usage {
            tracing::debug!(
                "Completion received: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        Ok(Completion {
            content: message.content.unwrap_or_default(),
            reasoning_content: message.reasoning_content,
            usage,
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_penalties(&self) -> bool {
        self.config.penalties_supported()
    }
}
