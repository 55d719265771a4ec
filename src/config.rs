use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ChatError, Result};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/chat";
pub const DEFAULT_WELCOME: &str =
    "Hi! I'm FitBot, your AI gym trainer. Ask me about workouts, exercises, diet plans or proper form.";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Full URL of the backend chat route
    pub endpoint: String,
    /// Conversation key sent with every request, if set
    pub session_id: Option<String>,
    /// Delay between revealed characters
    pub char_delay_ms: u64,
    /// Delay before the welcome message starts revealing
    pub welcome_delay_ms: u64,
    pub welcome_message: String,
    pub request_timeout_secs: u64,
    /// External transcription command used for voice input
    pub voice_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            session_id: None,
            char_delay_ms: 25,
            welcome_delay_ms: 400,
            welcome_message: DEFAULT_WELCOME.to_string(),
            request_timeout_secs: 30,
            voice_command: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| ChatError::Config(format!("{}: {}", config_path.display(), e)))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)
            .map_err(|e| ChatError::Config(e.to_string()))?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// Apply `FITBOT_ENDPOINT` if present
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("FITBOT_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint;
            }
        }
        self
    }

    pub fn char_delay(&self) -> Duration {
        Duration::from_millis(self.char_delay_ms)
    }

    pub fn welcome_delay(&self) -> Duration {
        Duration::from_millis(self.welcome_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ChatError::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("fitbot").join("config.json"))
    }
}
