//! Storyloom - interactive fiction engine library
//!
//! This library provides a turn-based text adventure engine narrated by a
//! language model: prompt composition, a resilient call/parse/retry turn
//! protocol, summary compaction that keeps prompts bounded, and versioned
//! snapshot persistence.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `engine`: Session state, turn protocol, response parsing, compaction
//! - `prompts`: Sectioned prompt composer and the built-in templates
//! - `providers`: Language model client abstraction (OpenAI-compatible)
//! - `storage`: Gzip snapshot store with retention and discovery
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`, `commands`: Command-line front end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use storyloom::{Config, PromptTemplates, Session, SnapshotStore, TurnEngine, TurnMeta};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let provider = storyloom::providers::create_provider(None, &config.provider)?;
//!     let engine = TurnEngine::new(Arc::from(provider), PromptTemplates::builtin(), config.engine.clone());
//!     let store = SnapshotStore::from_config(&config.storage)?;
//!
//!     let mut session = Session::from_config(&config);
//!     engine.open(&mut session, "a night train crossing the steppe").await?;
//!     store.autosave(&mut session, &TurnMeta::default())?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod prompts;
pub mod providers;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use engine::{Session, TurnEngine, TurnObserver};
pub use error::{Result, StoryloomError};
pub use prompts::{PromptComposer, PromptTemplates};
pub use storage::{Snapshot, SnapshotStore, TurnMeta};

#[cfg(test)]
pub mod test_utils;
