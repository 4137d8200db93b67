//! Configuration loading and types for paivoice
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/paivoice/config.toml)
//! 3. ~/.env (does not override variables already in the environment)
//! 4. Environment variables (ELEVENLABS_*, PORT)
//! 5. CLI arguments (highest priority)

use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# paivoice Configuration
#
# Location: ~/.config/paivoice/config.toml
# All settings can be overridden via environment variables or CLI flags

[server]
# Address and port to listen on (PORT overrides the port)
host = "0.0.0.0"
port = 8888

# Directory holding index.html for the web client (optional)
# public_dir = "/home/me/.claude/voice-server/public"

[provider]
# ElevenLabs API key. Prefer ELEVENLABS_API_KEY in ~/.env over storing it here.
# Without a key, notifications are delivered without audio.
# api_key = ""

# Default voice (ELEVENLABS_VOICE_ID)
voice_id = "s3TPKV1kjDlVtZbl4Ksh"

# Model (ELEVENLABS_MODEL). See https://elevenlabs.io/docs/models
model = "eleven_multilingual_v2"

# Request timeout for speech synthesis
timeout_secs = 30

[rate_limit]
# Requests allowed per origin per window
max_requests = 10
window_ms = 60000

[playback]
# Play synthesized audio on this machine (mpg123/ffplay). Off by default since
# the web client plays the audio it receives.
enabled = false

[notifier]
# Show a desktop notification (notify-send) for every dispatch
enabled = true
"#;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory containing `index.html` served at `/`
    #[serde(default)]
    pub public_dir: Option<PathBuf>,

    /// Maximum accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Text-to-speech provider configuration
#[derive(Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// API key; `None` disables synthesis
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

/// Per-origin rate limiting
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Table size above which expired origins are purged
    #[serde(default = "default_max_origins")]
    pub max_origins: usize,
}

/// Local audio playback
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Timeout for each player attempt
    #[serde(default = "default_playback_timeout")]
    pub timeout_secs: u64,
}

/// Desktop notifications
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Timeout for each notifier attempt
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_voice_id() -> String {
    "s3TPKV1kjDlVtZbl4Ksh".to_string()
}

fn default_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_origins() -> usize {
    10_000
}

fn default_playback_timeout() -> u64 {
    60
}

fn default_notifier_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_dir: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            voice_id: default_voice_id(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

// Keep the key out of logs and `paivoice config` output
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("voice_id", &self.voice_id)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Whether a non-empty API key is present
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            max_origins: default_max_origins(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_playback_timeout(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_notifier_timeout(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "paivoice")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Write `DEFAULT_CONFIG` to `path` unless a file is already there.
    /// Returns whether a file was written.
    pub fn write_default(path: &Path) -> Result<bool, RelayError> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_CONFIG)?;
        Ok(true)
    }

    /// Path of the user's ~/.env file
    pub fn dotenv_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".env"))
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ELEVENLABS_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.provider.api_key = Some(key.trim().to_string());
        }
        if let Some(voice) = lookup("ELEVENLABS_VOICE_ID").filter(|v| !v.trim().is_empty()) {
            self.provider.voice_id = voice.trim().to_string();
        }
        if let Some(model) = lookup("ELEVENLABS_MODEL").filter(|m| !m.trim().is_empty()) {
            self.provider.model = model.trim().to_string();
        }
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value {:?}", port),
            }
        }
    }
}

/// Load configuration from file, ~/.env and the environment
pub fn load_config(path: Option<&Path>) -> Result<Config, RelayError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| RelayError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| RelayError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // ~/.env never overrides variables that are already set
    if let Some(dotenv) = Config::dotenv_path().filter(|p| p.exists()) {
        match dotenvy::from_path(&dotenv) {
            Ok(()) => tracing::debug!("Loaded environment from {:?}", dotenv),
            Err(e) => tracing::warn!("Failed to parse {:?}: {}", dotenv, e),
        }
    }

    config.apply_env(|key| std::env::var(key).ok());

    Ok(config)
}
