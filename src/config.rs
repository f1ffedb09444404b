use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::client::RequestSettings;
use crate::prompts::DEFAULT_SYSTEM_INSTRUCTIONS;
use crate::store::{StoreConfig, DEFAULT_WINDOW};

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_MODEL: &str = "OPENAI_MODEL";
pub const ENV_MAX_TOKENS: &str = "OPENAI_MAX_TOKENS";
pub const ENV_TEMPERATURE: &str = "OPENAI_TEMPERATURE";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_TOKENS: u32 = 2000;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the completion provider
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API, without the endpoint path
    pub base_url: String,

    /// Model id sent with every request
    pub model: String,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Messages sent per request, system instruction included
    pub window: usize,

    /// Conversations kept in memory before the least recently used is dropped
    pub max_conversations: Option<NonZeroUsize>,

    /// HTTP request timeout
    pub timeout_secs: u64,

    /// First message of every conversation
    pub system_instructions: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            window: DEFAULT_WINDOW,
            max_conversations: None,
            timeout_secs: 60,
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
        }
    }
}

impl Config {
    /// Load from file (if any) and the environment, then validate.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env is the common case
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Config::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());

        let problems = config.validate();
        if !problems.is_empty() {
            anyhow::bail!("invalid configuration: {}", problems.join("; "));
        }
        Ok(config)
    }

    /// `<config dir>/parlance/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("parlance").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Overlay environment values. Unparsable numbers keep the current value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_BASE_URL).filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
        if let Some(max_tokens) = lookup(ENV_MAX_TOKENS).and_then(|v| v.trim().parse().ok()) {
            self.max_tokens = max_tokens;
        }
        if let Some(temperature) = lookup(ENV_TEMPERATURE).and_then(|v| v.trim().parse().ok()) {
            self.temperature = temperature;
        }
    }

    /// Problems that make the configuration unusable; empty when valid
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            errors.push(format!("{ENV_API_KEY} is required"));
        }
        if !(1..=4000).contains(&self.max_tokens) {
            errors.push(format!("{ENV_MAX_TOKENS} must be between 1 and 4000"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            errors.push(format!("{ENV_TEMPERATURE} must be between 0 and 2"));
        }
        // the system message takes one slot, the user's message needs another
        if self.window < 2 {
            errors.push("window must be at least 2".to_string());
        }

        errors
    }

    pub fn request_settings(&self) -> RequestSettings {
        RequestSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            window: self.window,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            system_instructions: self.system_instructions.clone(),
            max_conversations: self.max_conversations,
        }
    }
}
