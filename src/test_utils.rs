//! Test utilities for Storyloom
//!
//! Scripted providers and observers for exercising the turn engine
//! without a network.

use crate::config::EngineConfig;
use crate::engine::{RetryDecision, TurnFailure, TurnObserver, TurnPhase};
use crate::error::{Result, StoryloomError};
use crate::providers::{Completion, GenerationOptions, Provider, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One canned provider response
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// A successful completion
    Reply {
        content: String,
        reasoning: Option<String>,
        usage: Option<TokenUsage>,
    },
    /// A transport failure with the given message
    Fail(String),
}

impl ScriptedReply {
    /// A plain text completion with usage
    pub fn text(content: &str, prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self::Reply {
            content: content.to_string(),
            reasoning: None,
            usage: Some(TokenUsage::new(prompt_tokens, completion_tokens)),
        }
    }
}

/// A story reply carrying `description` and `summary`
pub fn story_reply(
    description: &str,
    summary: &str,
    prompt_tokens: usize,
    completion_tokens: usize,
) -> ScriptedReply {
    let body = serde_json::json!({ "description": description, "summary": summary });
    ScriptedReply::text(&body.to_string(), prompt_tokens, completion_tokens)
}

/// A summary-only reply
pub fn summary_reply(summary: &str, prompt_tokens: usize, completion_tokens: usize) -> ScriptedReply {
    let body = serde_json::json!({ "summary": summary });
    ScriptedReply::text(&body.to_string(), prompt_tokens, completion_tokens)
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: VecDeque<ScriptedReply>,
    prompts: Vec<String>,
    options: Vec<GenerationOptions>,
}

/// Provider that returns replies from a script, in order
///
/// Clones share the script, so a test can keep a handle after moving one
/// into the engine. An exhausted script fails like a transport error.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ScriptState>>,
    penalties: bool,
}

impl ScriptedProvider {
    /// Create a provider with the given replies
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                replies: replies.into(),
                ..Default::default()
            })),
            penalties: true,
        }
    }

    /// Report no penalty support
    pub fn without_penalties(mut self) -> Self {
        self.penalties = false;
        self
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.state.lock().unwrap().prompts.clone()
    }

    /// Generation options received so far
    pub fn options(&self) -> Vec<GenerationOptions> {
        self.state.lock().unwrap().options.clone()
    }

    /// Number of calls made
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().prompts.len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Completion> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.prompts.push(prompt.to_string());
            state.options.push(options.clone());
            state.replies.pop_front()
        };
        match reply {
            Some(ScriptedReply::Reply {
                content,
                reasoning,
                usage,
            }) => {
                let mut completion = Completion::new(content);
                completion.reasoning_content = reasoning;
                completion.usage = usage;
                Ok(completion)
            }
            Some(ScriptedReply::Fail(message)) => Err(StoryloomError::Provider(message).into()),
            None => Err(StoryloomError::Provider("script exhausted".to_string()).into()),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn supports_penalties(&self) -> bool {
        self.penalties
    }
}

/// Engine configuration with near-zero backoff
pub fn fast_engine_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.max_attempts = 5;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    config
}

/// Observer that records what the engine reports
#[derive(Debug, Default)]
pub struct RecordingObserver {
    abort: bool,
    phases: Mutex<Vec<TurnPhase>>,
    failures: Mutex<Vec<TurnFailure>>,
    compaction_failures: Mutex<Vec<String>>,
}

impl RecordingObserver {
    /// Observer that always retries
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer that aborts on the first failure
    pub fn aborting() -> Self {
        Self {
            abort: true,
            ..Default::default()
        }
    }

    /// Phases reported so far
    pub fn phases(&self) -> Vec<TurnPhase> {
        self.phases.lock().unwrap().clone()
    }

    /// Failures reported so far
    pub fn failures(&self) -> Vec<TurnFailure> {
        self.failures.lock().unwrap().clone()
    }

    /// Compaction failure messages reported so far
    pub fn compaction_failures(&self) -> Vec<String> {
        self.compaction_failures.lock().unwrap().clone()
    }
}

impl TurnObserver for RecordingObserver {
    fn on_phase(&self, phase: TurnPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_failure(&self, failure: &TurnFailure) -> RetryDecision {
        self.failures.lock().unwrap().push(failure.clone());
        if self.abort {
            RetryDecision::Abort
        } else {
            RetryDecision::Retry
        }
    }

    fn on_compaction_failed(&self, message: &str) {
        self.compaction_failures
            .lock()
            .unwrap()
            .push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_provider_in_order() {
        let provider = ScriptedProvider::new(vec![
            ScriptedReply::text("one", 1, 1),
            ScriptedReply::Fail("down".to_string()),
        ]);
        let options = GenerationOptions {
            max_tokens: 16,
            temperature: 0.5,
            frequency_penalty: None,
            presence_penalty: None,
        };
        let first = provider.generate("p1", &options).await.unwrap();
        assert_eq!(first.content, "one");
        assert!(provider.generate("p2", &options).await.is_err());
        assert!(provider.generate("p3", &options).await.is_err());
        assert_eq!(provider.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_story_reply_is_json() {
        if let ScriptedReply::Reply { content, .. } = story_reply("d", "s", 1, 1) {
            let value: serde_json::Value = serde_json::from_str(&content).unwrap();
            assert_eq!(value["description"], "d");
            assert_eq!(value["summary"], "s");
        } else {
            panic!("Expected reply");
        }
    }
}
