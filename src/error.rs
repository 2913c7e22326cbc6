//! Error types for Storyloom
//!
//! This module defines all error types used throughout the engine,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Storyloom operations
///
/// Covers transport failures from the model client, parse failures on
/// model output, retry outcomes, snapshot versioning and storage problems,
/// and prompt composer refusals.
#[derive(Error, Debug)]
pub enum StoryloomError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider-related errors (API calls, unexpected status, bad payload)
    #[error("Provider error: {0}")]
    Provider(String),

    /// The model call did not complete within the client timeout
    #[error("Provider timeout: {0}")]
    Timeout(String),

    /// Authentication errors (e.g., 401 Unauthorized)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Model output could not be turned into a usable record
    #[error("Parse error: {message}")]
    Parse {
        /// What went wrong
        message: String,
        /// The offending raw text, kept for operator display
        raw: String,
    },

    /// Every allowed attempt of a turn failed
    #[error("Retries exhausted after {attempts} attempts: {message}")]
    RetryExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Description of the last failure
        message: String,
    },

    /// The operator declined to retry a failed turn
    #[error("Turn aborted: {0}")]
    TurnAborted(String),

    /// Snapshot was written by a different engine version
    #[error("Snapshot version mismatch: found {found}, expected {expected}")]
    VersionMismatch {
        /// Version recorded in the snapshot
        found: String,
        /// Version of the running engine
        expected: String,
    },

    /// Prompt composer refused an operation
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Attempt to remove or reorder a protected prompt fragment
    #[error("Protected fragment cannot be modified: {0}")]
    ProtectedFragment(String),

    /// Snapshot file or session directory not found
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Snapshot storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StoryloomError {
    /// Returns true for failures raised by the model client itself
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Timeout(_) | Self::Authentication(_) | Self::Http(_)
        )
    }
}

/// Result type alias for Storyloom operations
///
/// Uses `anyhow::Error` so callers can attach context while the typed
/// `StoryloomError` stays reachable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
