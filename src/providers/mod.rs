//! Provider module for Storyloom
//!
//! This module contains the language model client abstraction and the
//! OpenAI-compatible chat completions implementation.

pub mod base;
pub mod openai;

pub use base::{Completion, GenerationOptions, Provider, TokenUsage};
pub use openai::OpenAiProvider;

use crate::config::ProviderConfig;
use crate::error::{Result, StoryloomError};

/// Create a provider instance based on configuration
///
/// # Arguments
///
/// * `name` - Endpoint name, or `None` for `provider.active`
/// * `config` - Provider configuration
///
/// # Returns
///
/// Returns a boxed provider instance
///
/// # Errors
///
/// Returns error if the endpoint is unknown or client initialization fails
pub fn create_provider(name: Option<&str>, config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    let name = name.unwrap_or(&config.active);
    let endpoint = config.endpoint(name).ok_or_else(|| {
        StoryloomError::Provider(format!("Unknown provider endpoint: {}", name))
    })?;
    Ok(Box::new(OpenAiProvider::new(endpoint.clone())?))
}
