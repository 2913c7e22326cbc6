//! Configuration management for Storyloom
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::engine::session::{ContentRatings, CustomPrompts};
use crate::error::{Result, StoryloomError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Storyloom
///
/// Holds everything needed to run a session: which model endpoint to
/// talk to, engine tuning (generation, compaction, retry), where snapshots
/// live, and the default player and prompt customisations for new games.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model endpoint configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Turn engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
    /// Snapshot storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Default player identity for new games
    #[serde(default)]
    pub player: PlayerConfig,
    /// Prompt template location and custom fragments
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Provider configuration
///
/// Lists the OpenAI-compatible endpoints that are available and names the
/// one used by new sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the endpoint used by default
    #[serde(default = "default_active_endpoint")]
    pub active: String,

    /// Known endpoints
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,
}

fn default_active_endpoint() -> String {
    "deepseek".to_string()
}

fn default_endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig {
            name: "deepseek".to_string(),
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: None,
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            timeout_seconds: default_request_timeout(),
            supports_penalties: None,
        },
        EndpointConfig {
            name: "hunyuan".to_string(),
            base_url: "https://api.hunyuan.cloud.tencent.com/v1".to_string(),
            model: "hunyuan-turbos-latest".to_string(),
            api_key: None,
            api_key_env: "HUNYUAN_API_KEY".to_string(),
            timeout_seconds: default_request_timeout(),
            supports_penalties: None,
        },
    ]
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            active: default_active_endpoint(),
            endpoints: default_endpoints(),
        }
    }
}

impl ProviderConfig {
    /// Looks up an endpoint by name
    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}

/// A single OpenAI-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// Endpoint name referenced by `provider.active` and by sessions
    pub name: String,

    /// API base URL, e.g. `https://api.deepseek.com/v1`
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Inline API key (prefer `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,

    /// Whether the model accepts frequency/presence penalties.
    /// When unset this is inferred from the model id.
    #[serde(default)]
    pub supports_penalties: Option<bool>,
}

fn default_api_key_env() -> String {
    "STORYLOOM_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    135
}

impl EndpointConfig {
    /// Resolves the API key, preferring the inline value
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
    }

    /// Returns whether penalty parameters may be sent to this model
    ///
    /// # Examples
    ///
    /// ```
    /// use storyloom::config::EndpointConfig;
    ///
    /// let endpoint = EndpointConfig {
    ///     name: "hy".to_string(),
    ///     base_url: "http://localhost".to_string(),
    ///     model: "hunyuan-lite".to_string(),
    ///     api_key: None,
    ///     api_key_env: "X".to_string(),
    ///     timeout_seconds: 10,
    ///     supports_penalties: None,
    /// };
    /// assert!(!endpoint.penalties_supported());
    /// ```
    pub fn penalties_supported(&self) -> bool {
        self.supports_penalties
            .unwrap_or_else(|| !self.model.to_lowercase().contains("hunyuan"))
    }
}

/// Turn engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default generation parameters for new sessions
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Summary compaction policy
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Retry policy for model calls
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Generation parameters copied into each new session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum completion tokens per turn
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Frequency penalty
    #[serde(default = "default_penalty")]
    pub frequency_penalty: f32,

    /// Presence penalty
    #[serde(default = "default_penalty")]
    pub presence_penalty: f32,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.9
}

fn default_penalty() -> f32 {
    0.5
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            frequency_penalty: default_penalty(),
            presence_penalty: default_penalty(),
        }
    }
}

/// Summary compaction configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompactionConfig {
    /// Compaction may run once the summary count exceeds this value
    #[serde(default = "default_conclude_threshold")]
    pub summary_conclude_threshold: usize,

    /// Cooldown value restored after every completed compaction
    #[serde(default = "default_cooldown_reset")]
    pub cooldown_reset: i64,

    /// Summaries at or above this many characters count as large
    #[serde(default = "default_compact_min_length")]
    pub compact_min_length: usize,

    /// Number of oldest summaries folded together by dilution
    #[serde(default = "default_dilution_window")]
    pub dilution_window: usize,

    /// Completion budget for dilution calls
    #[serde(default = "default_dilution_max_tokens")]
    pub dilution_max_tokens: u32,

    /// Completion budget for compression calls
    #[serde(default = "default_compression_max_tokens")]
    pub compression_max_tokens: u32,
}

fn default_conclude_threshold() -> usize {
    24
}

fn default_cooldown_reset() -> i64 {
    10
}

fn default_compact_min_length() -> usize {
    320
}

fn default_dilution_window() -> usize {
    10
}

fn default_dilution_max_tokens() -> u32 {
    20_480
}

fn default_compression_max_tokens() -> u32 {
    2048
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            summary_conclude_threshold: default_conclude_threshold(),
            cooldown_reset: default_cooldown_reset(),
            compact_min_length: default_compact_min_length(),
            dilution_window: default_dilution_window(),
            dilution_max_tokens: default_dilution_max_tokens(),
            compression_max_tokens: default_compression_max_tokens(),
        }
    }
}

/// Retry policy for model calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per turn, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the delay between attempts (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Ask the operator before each retry
    #[serde(default)]
    pub require_confirmation: bool,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            require_confirmation: false,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based)
    ///
    /// Doubles from `initial_backoff_ms` and saturates at `max_backoff_ms`.
    ///
    /// # Examples
    ///
    /// ```
    /// use storyloom::config::RetryConfig;
    /// use std::time::Duration;
    ///
    /// let retry = RetryConfig::default();
    /// assert_eq!(retry.backoff_for(1), Duration::from_millis(500));
    /// assert_eq!(retry.backoff_for(2), Duration::from_millis(1000));
    /// assert_eq!(retry.backoff_for(30), Duration::from_millis(8000));
    /// ```
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Snapshot storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per session.
    /// Defaults to `<platform data dir>/saves`.
    #[serde(default)]
    pub saves_dir: Option<PathBuf>,

    /// Number of autosaves kept per session
    #[serde(default = "default_autosave_retention")]
    pub autosave_retention: usize,

    /// Label used for automatic saves
    #[serde(default = "default_autosave_label")]
    pub autosave_label: String,

    /// Directory for transcript exports. Defaults to `<saves_dir>/../logs`.
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
}

fn default_autosave_retention() -> usize {
    5
}

fn default_autosave_label() -> String {
    "autosave".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            saves_dir: None,
            autosave_retention: default_autosave_retention(),
            autosave_label: default_autosave_label(),
            export_dir: None,
        }
    }
}

impl StorageConfig {
    /// Resolves the saves directory, falling back to the platform data dir
    pub fn resolve_saves_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.saves_dir {
            return Ok(dir.clone());
        }
        let proj_dirs = ProjectDirs::from("dev", "storyloom", "storyloom")
            .ok_or_else(|| StoryloomError::Storage("Could not determine data directory".into()))?;
        Ok(proj_dirs.data_dir().join("saves"))
    }

    /// Resolves the transcript export directory
    pub fn resolve_export_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.export_dir {
            return Ok(dir.clone());
        }
        let saves = self.resolve_saves_dir()?;
        Ok(saves
            .parent()
            .map(|p| p.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs")))
    }
}

/// Default player identity for new games
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Player character name
    #[serde(default = "default_player_name")]
    pub name: String,

    /// Freeform background text
    #[serde(default)]
    pub background: String,
}

fn default_player_name() -> String {
    "Traveler".to_string()
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: default_player_name(),
            background: String::new(),
        }
    }
}

/// Prompt template location and per-player customisation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory holding `opening_prompt.json`, `continuation_prompt.json`
    /// and `summary_prompt.json`. Built-in templates are used for missing files.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Custom fragments appended to the pre, body and post sections
    #[serde(default)]
    pub custom: CustomPrompts,

    /// Content rating sliders
    #[serde(default)]
    pub content: ContentRatings,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StoryloomError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| StoryloomError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(active) = std::env::var("STORYLOOM_PROVIDER") {
            self.provider.active = active;
        }

        if let Ok(model) = std::env::var("STORYLOOM_MODEL") {
            let active = self.provider.active.clone();
            match self.provider.endpoints.iter_mut().find(|e| e.name == active) {
                Some(endpoint) => endpoint.model = model,
                None => tracing::warn!(
                    "STORYLOOM_MODEL ignored: active endpoint '{}' is not configured",
                    active
                ),
            }
        }

        if let Ok(base_url) = std::env::var("STORYLOOM_BASE_URL") {
            let active = self.provider.active.clone();
            if let Some(endpoint) = self.provider.endpoints.iter_mut().find(|e| e.name == active)
            {
                endpoint.base_url = base_url;
            }
        }

        if let Ok(dir) = std::env::var("STORYLOOM_SAVES_DIR") {
            self.storage.saves_dir = Some(PathBuf::from(dir));
        }

        if let Ok(attempts) = std::env::var("STORYLOOM_MAX_ATTEMPTS") {
            match attempts.parse() {
                Ok(value) => self.engine.retry.max_attempts = value,
                Err(_) => tracing::warn!("Invalid STORYLOOM_MAX_ATTEMPTS: {}", attempts),
            }
        }

        if let Ok(name) = std::env::var("STORYLOOM_PLAYER_NAME") {
            self.player.name = name;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
        if let Some(dir) = &cli.saves_dir {
            tracing::debug!("Using saves dir override from CLI: {}", dir.display());
            self.storage.saves_dir = Some(dir.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `StoryloomError::Config` naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.provider.endpoints.is_empty() {
            return Err(
                StoryloomError::Config("provider.endpoints cannot be empty".to_string()).into(),
            );
        }

        if self.provider.endpoint(&self.provider.active).is_none() {
            return Err(StoryloomError::Config(format!(
                "Active provider '{}' is not listed in provider.endpoints",
                self.provider.active
            ))
            .into());
        }

        for endpoint in &self.provider.endpoints {
            if endpoint.base_url.trim().is_empty() || endpoint.model.trim().is_empty() {
                return Err(StoryloomError::Config(format!(
                    "Endpoint '{}' needs both base_url and model",
                    endpoint.name
                ))
                .into());
            }
        }

        if self.engine.generation.max_tokens == 0 {
            return Err(StoryloomError::Config(
                "engine.generation.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.engine.generation.temperature) {
            return Err(StoryloomError::Config(
                "engine.generation.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.engine.retry.max_attempts == 0 {
            return Err(StoryloomError::Config(
                "engine.retry.max_attempts must be greater than 0".to_string(),
            )
            .into());
        }

        let compaction = &self.engine.compaction;
        if compaction.dilution_window == 0 {
            return Err(StoryloomError::Config(
                "engine.compaction.dilution_window must be greater than 0".to_string(),
            )
            .into());
        }

        if compaction.compact_min_length == 0 {
            return Err(StoryloomError::Config(
                "engine.compaction.compact_min_length must be greater than 0".to_string(),
            )
            .into());
        }

        if self.storage.autosave_retention == 0 {
            return Err(StoryloomError::Config(
                "storage.autosave_retention must be greater than 0".to_string(),
            )
            .into());
        }

        crate::storage::validate_label(&self.storage.autosave_label)?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            engine: EngineConfig::default(),
            storage: StorageConfig::default(),
            player: PlayerConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.active, "deepseek");
        assert_eq!(config.engine.compaction.summary_conclude_threshold, 24);
        assert_eq!(config.engine.compaction.cooldown_reset, 10);
        assert_eq!(config.engine.compaction.compact_min_length, 320);
        assert_eq!(config.storage.autosave_retention, 5);
        assert_eq!(config.storage.autosave_label, "autosave");
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_unknown_active_provider() {
        let mut config = Config::default();
        config.provider.active = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_attempts() {
        let mut config = Config::default();
        config.engine.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_label() {
        let mut config = Config::default();
        config.storage.autosave_label = "auto save".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_penalties_inferred_from_model() {
        let config = Config::default();
        assert!(config
            .provider
            .endpoint("deepseek")
            .unwrap()
            .penalties_supported());
        assert!(!config
            .provider
            .endpoint("hunyuan")
            .unwrap()
            .penalties_supported());
    }

    #[test]
    fn test_penalties_explicit_flag_wins() {
        let mut endpoint = Config::default().provider.endpoints[1].clone();
        endpoint.supports_penalties = Some(true);
        assert!(endpoint.penalties_supported());
    }

    #[test]
    fn test_backoff_saturates() {
        let retry = RetryConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            ..Default::default()
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(350));
        assert_eq!(retry.backoff_for(u32::MAX), Duration::from_millis(350));
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let yaml = r#"
provider:
  active: local
  endpoints:
    - name: local
      base_url: http://localhost:1234/v1
      model: local-model
engine:
  compaction:
    summary_conclude_threshold: 12
storage:
  saves_dir: /tmp/storyloom-saves
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider.active, "local");
        assert_eq!(config.provider.endpoints[0].api_key_env, "STORYLOOM_API_KEY");
        assert_eq!(config.engine.compaction.summary_conclude_threshold, 12);
        assert_eq!(config.engine.compaction.cooldown_reset, 10);
        assert_eq!(config.engine.retry.max_attempts, 5);
        assert_eq!(
            config.storage.saves_dir,
            Some(PathBuf::from("/tmp/storyloom-saves"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("STORYLOOM_MODEL", "deepseek-reasoner");
        std::env::set_var("STORYLOOM_MAX_ATTEMPTS", "9");
        std::env::set_var("STORYLOOM_SAVES_DIR", "/tmp/env-saves");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("STORYLOOM_MODEL");
        std::env::remove_var("STORYLOOM_MAX_ATTEMPTS");
        std::env::remove_var("STORYLOOM_SAVES_DIR");

        assert_eq!(
            config.provider.endpoint("deepseek").unwrap().model,
            "deepseek-reasoner"
        );
        assert_eq!(config.engine.retry.max_attempts, 9);
        assert_eq!(config.storage.saves_dir, Some(PathBuf::from("/tmp/env-saves")));
    }

    #[test]
    #[serial]
    fn test_env_invalid_attempts_ignored() {
        std::env::set_var("STORYLOOM_MAX_ATTEMPTS", "lots");
        let mut config = Config::default();
        config.apply_env_vars();
        std::env::remove_var("STORYLOOM_MAX_ATTEMPTS");
        assert_eq!(config.engine.retry.max_attempts, 5);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config =
            Config::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config/config.yaml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.endpoints.len(), 2);
        assert_eq!(config.engine.compaction.dilution_max_tokens, 20_480);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.yaml");
        let config = Config::load(path.to_str().unwrap(), &crate::cli::Cli::default()).unwrap();
        assert_eq!(config.engine.retry.max_attempts, Config::default().engine.retry.max_attempts);
    }

    #[test]
    fn test_export_dir_defaults_next_to_saves() {
        let storage = StorageConfig {
            saves_dir: Some(PathBuf::from("/data/storyloom/saves")),
            ..Default::default()
        };
        assert_eq!(
            storage.resolve_export_dir().unwrap(),
            PathBuf::from("/data/storyloom/logs")
        );
    }
}
