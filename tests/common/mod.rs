use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use storyloom::config::{Config, EngineConfig};
use storyloom::engine::{Session, TurnEngine};
use storyloom::error::{Result, StoryloomError};
use storyloom::prompts::PromptTemplates;
use storyloom::providers::{Completion, GenerationOptions, Provider, TokenUsage};
use tempfile::TempDir;

/// Provider answering from a fixed list of texts
#[derive(Clone, Default)]
pub struct CannedProvider {
    replies: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl CannedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(Into::into).collect())),
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for CannedProvider {
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<Completion> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(text) => Ok(Completion::with_usage(text, TokenUsage::new(40, 10))),
            None => Err(StoryloomError::Provider("no more replies".to_string()).into()),
        }
    }

    fn model(&self) -> &str {
        "canned"
    }
}

#[allow(dead_code)]
pub fn story(description: &str, summary: &str) -> String {
    serde_json::json!({ "description": description, "summary": summary }).to_string()
}

#[allow(dead_code)]
pub fn summary(text: &str) -> String {
    serde_json::json!({ "summary": text }).to_string()
}

#[allow(dead_code)]
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 1;
    config
}

#[allow(dead_code)]
pub fn engine(provider: &CannedProvider) -> TurnEngine {
    TurnEngine::new(
        Arc::new(provider.clone()),
        PromptTemplates::builtin(),
        fast_config(),
    )
}

#[allow(dead_code)]
pub fn new_session(name: &str) -> Session {
    let mut session = Session::from_config(&Config::default());
    session.player.name = name.to_string();
    session
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
