//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/research-agent/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/research-agent/` (~/.config/research-agent/)
//! - State/Logs: `$XDG_STATE_HOME/research-agent/` (~/.local/state/research-agent/)
//!
//! Every section is optional; missing values fall back to the defaults the
//! research portal expects (completion gate at 90%, cap at 85%, 1000 stored
//! activities, 2s polls with a 5s error backoff and 5 tolerated failures).

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// LLM collaborator configuration (optional)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Completion gate configuration
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Activity feed configuration
    #[serde(default)]
    pub activities: ActivityConfig,

    /// Follow-up message loop configuration
    #[serde(default)]
    pub message_loop: MessageLoopConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Request timeout; research turns are long
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Maximum tokens the model may produce per turn
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
}

impl LlmConfig {
    /// Build a config for a provider/model pair with default tuning
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            endpoint: None,
            api_key: None,
            timeout_secs: default_llm_timeout(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    600
}

fn default_llm_max_tokens() -> u32 {
    16000
}

fn default_llm_temperature() -> f32 {
    0.7
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }

    /// Returns the model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "llama3.2",
            LlmProvider::Claude => "claude-sonnet-4-5",
            LlmProvider::OpenAI => "gpt-4o-mini",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::Claude => "anthropic",
            LlmProvider::OpenAI => "openai",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "claude" | "anthropic" => Ok(LlmProvider::Claude),
            "openai" => Ok(LlmProvider::OpenAI),
            _ => Err(format!("unsupported provider: {}", s)),
        }
    }
}

/// Completion gate configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProgressConfig {
    /// Requested percentage at which the link scan runs
    #[serde(default = "default_completion_threshold")]
    pub completion_threshold: u8,

    /// Percentage written when the gate blocks completion
    #[serde(default = "default_blocked_percentage")]
    pub blocked_percentage: u8,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            completion_threshold: default_completion_threshold(),
            blocked_percentage: default_blocked_percentage(),
        }
    }
}

fn default_completion_threshold() -> u8 {
    90
}

fn default_blocked_percentage() -> u8 {
    85
}

/// Activity feed configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ActivityConfig {
    /// Maximum number of activities kept in `.activities.json`
    #[serde(default = "default_max_activities")]
    pub max_entries: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_activities(),
        }
    }
}

fn default_max_activities() -> usize {
    1000
}

/// Follow-up message loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MessageLoopConfig {
    /// Sleep between successful polls, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Sleep after a failed iteration, in milliseconds
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    /// Consecutive failed iterations before the loop stops
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Include previously answered messages in continuation prompts
    #[serde(default = "default_include_history")]
    pub include_history: bool,
}

impl Default for MessageLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            error_backoff_ms: default_error_backoff(),
            max_consecutive_errors: default_max_consecutive_errors(),
            include_history: default_include_history(),
        }
    }
}

impl MessageLoopConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_error_backoff() -> u64 {
    5000
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_include_history() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let progress = &self.progress;
        if progress.completion_threshold > 100 {
            return Err(Error::Config(
                "progress.completion_threshold must be at most 100".to_string(),
            ));
        }
        if progress.blocked_percentage >= progress.completion_threshold {
            return Err(Error::Config(
                "progress.blocked_percentage must be below progress.completion_threshold"
                    .to_string(),
            ));
        }
        if self.activities.max_entries == 0 {
            return Err(Error::Config(
                "activities.max_entries must be at least 1".to_string(),
            ));
        }
        if self.message_loop.max_consecutive_errors == 0 {
            return Err(Error::Config(
                "message_loop.max_consecutive_errors must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/research-agent/config.toml` (~/.config/research-agent/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("research-agent").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/research-agent/` (~/.local/state/research-agent/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("research-agent")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/research-agent/research-agent.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("research-agent.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.is_none());
        assert_eq!(config.progress.completion_threshold, 90);
        assert_eq!(config.progress.blocked_percentage, 85);
        assert_eq!(config.activities.max_entries, 1000);
        assert_eq!(config.message_loop.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.message_loop.error_backoff(), Duration::from_secs(5));
        assert_eq!(config.message_loop.max_consecutive_errors, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[llm]
provider = "claude"
model = "claude-sonnet-4-5"
max_tokens = 8000

[message_loop]
poll_interval_ms = 500
include_history = false

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        let llm = config.llm.unwrap();
        assert_eq!(llm.provider, LlmProvider::Claude);
        assert_eq!(llm.max_tokens, 8000);
        assert_eq!(llm.timeout_secs, 600);
        assert_eq!(config.message_loop.poll_interval_ms, 500);
        assert_eq!(config.message_loop.error_backoff_ms, 5000);
        assert!(!config.message_loop.include_history);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_cap_above_threshold() {
        let config = Config {
            progress: ProgressConfig {
                completion_threshold: 80,
                blocked_percentage: 85,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let mut config = Config::default();
        config.activities.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.message_loop.max_consecutive_errors = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("anthropic".parse::<LlmProvider>(), Ok(LlmProvider::Claude));
        assert_eq!("OpenAI".parse::<LlmProvider>(), Ok(LlmProvider::OpenAI));
        assert!("google".parse::<LlmProvider>().is_err());
        assert_eq!(
            LlmProvider::Ollama.default_endpoint(),
            "http://localhost:11434"
        );
    }
}
