use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;

use crate::errors::AppError;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Captioning config
    #[serde(default)]
    pub caption: CaptionConfig,

    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Caption provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptionProviderKind {
    // @provider: Google Gemini
    #[default]
    Gemini,
    // @provider: OpenAI-compatible chat completions endpoint
    OpenAI,
}

impl CaptionProviderKind {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Gemini => "Gemini",
            Self::OpenAI => "OpenAI",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Gemini => "gemini".to_string(),
            Self::OpenAI => "openai".to_string(),
        }
    }

    // @returns: Environment variable consulted when no key is configured
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl std::fmt::Display for CaptionProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for CaptionProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Concurrent requests at the start of a run
    #[serde(default)]
    pub concurrent_requests: Option<usize>,

    // @field: Pause between two dispatches at the start of a run
    #[serde(default)]
    pub dispatch_delay_ms: Option<u64>,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: CaptionProviderKind) -> Self {
        match provider_type {
            CaptionProviderKind::Gemini => Self {
                provider_type: "gemini".to_string(),
                model: default_gemini_model(),
                api_key: String::new(),
                endpoint: default_gemini_endpoint(),
                concurrent_requests: None,
                dispatch_delay_ms: None,
                timeout_secs: default_timeout_secs(),
            },
            CaptionProviderKind::OpenAI => Self {
                provider_type: "openai".to_string(),
                model: default_openai_model(),
                api_key: String::new(),
                endpoint: default_openai_endpoint(),
                concurrent_requests: None,
                dispatch_delay_ms: None,
                timeout_secs: default_timeout_secs(),
            },
        }
    }
}

/// Captioning configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptionConfig {
    /// Caption provider to use
    #[serde(default)]
    pub provider: CaptionProviderKind,

    /// Available caption providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common settings
    #[serde(default)]
    pub common: CaptionCommonConfig,
}

/// Settings shared by all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptionCommonConfig {
    /// Prompt sent along with every image
    #[serde(default = "default_caption_prompt")]
    pub prompt: String,

    /// Instruction used for Chinese to English translation
    #[serde(default = "default_translate_prompt")]
    pub translate_prompt: String,

    /// Retries per item before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Growth factor applied to the backoff on every retry
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Fixed cooldown after a quota error, in milliseconds
    #[serde(default = "default_quota_cooldown_ms")]
    pub quota_cooldown_ms: u64,

    /// Random extra cooldown added after a quota error, in milliseconds
    #[serde(default = "default_quota_jitter_ms")]
    pub quota_jitter_ms: u64,

    /// Dispatch delay enforced once a run has been throttled
    #[serde(default = "default_throttled_dispatch_delay_ms")]
    pub throttled_dispatch_delay_ms: u64,
}

impl Default for CaptionCommonConfig {
    fn default() -> Self {
        Self {
            prompt: default_caption_prompt(),
            translate_prompt: default_translate_prompt(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            quota_cooldown_ms: default_quota_cooldown_ms(),
            quota_jitter_ms: default_quota_jitter_ms(),
            throttled_dispatch_delay_ms: default_throttled_dispatch_delay_ms(),
        }
    }
}

/// Which caption becomes the body of the exported text
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptionLanguage {
    #[default]
    En,
    Zh,
}

impl std::str::FromStr for CaptionLanguage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "en" | "english" => Ok(Self::En),
            "zh" | "chinese" => Ok(Self::Zh),
            _ => Err(anyhow!("Invalid caption language: {}", s)),
        }
    }
}

/// Export settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExportConfig {
    /// Text placed before every caption (trigger words)
    #[serde(default)]
    pub prefix: String,

    /// Text placed after every caption
    #[serde(default)]
    pub suffix: String,

    /// Caption language written to disk
    #[serde(default)]
    pub language: CaptionLanguage,

    /// Extension of the caption files
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            language: CaptionLanguage::default(),
            extension: default_extension(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

/// Highest accepted `max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 50;

fn default_max_retries() -> u32 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    3000
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

fn default_quota_cooldown_ms() -> u64 {
    15_000
}

fn default_quota_jitter_ms() -> u64 {
    5_000
}

fn default_throttled_dispatch_delay_ms() -> u64 {
    8_000
}

fn default_extension() -> String {
    "txt".to_string()
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_caption_prompt() -> String {
    "Describe this image as a training caption for a text-to-image model. \
     Cover the subject, composition, lighting, colors and style in one dense paragraph. \
     Reply with a JSON object with exactly two keys: \"en\" for the English caption and \"zh\" for the same caption in Simplified Chinese."
        .to_string()
}

fn default_translate_prompt() -> String {
    "Translate the following Chinese image caption into natural English. Reply with the translation only.".to_string()
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<(), AppError> {
        let provider = self.caption.provider;
        if self.caption.get_api_key().is_empty() {
            return Err(AppError::Config(format!(
                "API key is required for {} provider (set it in the config or {})",
                provider.display_name(),
                provider.api_key_env_var()
            )));
        }

        if self.caption.get_concurrent_requests() == Some(0) {
            return Err(AppError::Config("concurrent_requests must be at least 1".to_string()));
        }

        let common = &self.caption.common;
        if common.max_retries > MAX_RETRIES_LIMIT {
            return Err(AppError::Config(format!(
                "max_retries must be at most {} (got {})",
                MAX_RETRIES_LIMIT, common.max_retries
            )));
        }
        if !common.backoff_multiplier.is_finite() || common.backoff_multiplier < 1.0 {
            return Err(AppError::Config(format!(
                "backoff_multiplier must be a finite number of at least 1.0 (got {})",
                common.backoff_multiplier
            )));
        }

        let endpoint = self.caption.get_endpoint();
        url::Url::parse(&endpoint)
            .map_err(|e| AppError::Config(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

        if self.export.extension.trim().is_empty() {
            return Err(AppError::Config("Export extension cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            caption: CaptionConfig::default(),
            export: ExportConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl CaptionConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &CaptionProviderKind) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Mutable access to the active provider configuration, created on demand
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        if let Some(index) = self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            return &mut self.available_providers[index];
        }
        self.available_providers.push(ProviderConfig::new(self.provider));
        let last = self.available_providers.len() - 1;
        &mut self.available_providers[last]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        match self.provider {
            CaptionProviderKind::Gemini => default_gemini_model(),
            CaptionProviderKind::OpenAI => default_openai_model(),
        }
    }

    /// Get the API key for the active provider, falling back to the environment
    pub fn get_api_key(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.api_key.is_empty() {
                return provider_config.api_key.clone();
            }
        }

        std::env::var(self.provider.api_key_env_var()).unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        match self.provider {
            CaptionProviderKind::Gemini => default_gemini_endpoint(),
            CaptionProviderKind::OpenAI => default_openai_endpoint(),
        }
    }

    /// Get the request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Concurrency override for the active provider, if any
    pub fn get_concurrent_requests(&self) -> Option<usize> {
        self.get_active_provider_config().and_then(|p| p.concurrent_requests)
    }

    /// Dispatch delay override for the active provider, if any
    pub fn get_dispatch_delay_ms(&self) -> Option<u64> {
        self.get_active_provider_config().and_then(|p| p.dispatch_delay_ms)
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            provider: CaptionProviderKind::default(),
            available_providers: vec![
                ProviderConfig::new(CaptionProviderKind::Gemini),
                ProviderConfig::new(CaptionProviderKind::OpenAI),
            ],
            common: CaptionCommonConfig::default(),
        }
    }
}
