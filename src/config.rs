//! Configuration management with serde integration
//!
//! One `AppConfig` covers the four concerns of the service: which
//! checkpoint to load, how to sample, how to expose the UI and how to
//! log. Configurations load from JSON files and `STONECHAT_*`
//! environment variables, validate before use, and convert into the
//! runtime option structs the engine and server consume.
//!
//! ## Example
//!
//! ```rust
//! use stonechat::config::AppConfig;
//!
//! let mut config = AppConfig::default();
//! config.model.model_id = "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string();
//! config.sampling.temperature = 0.5;
//! assert!(config.validate().is_ok());
//!
//! let json = serde_json::to_string_pretty(&config).unwrap();
//! let loaded: AppConfig = serde_json::from_str(&json).unwrap();
//! assert_eq!(loaded.sampling.temperature, 0.5);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::EngineOptions;
use crate::error::ChatError;
use crate::hub::{HubOptions, ModelRef, DEFAULT_MODEL_ID};
use crate::model::{parse_dtype, DevicePreference};
use crate::sampling::SamplerOptions;
use crate::server::LaunchOptions;

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Checkpoint selection and placement
    #[serde(default)]
    pub model: ModelConfig,
    /// Generation defaults exposed to the UI
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Web UI launch options
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging verbosity
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Checkpoint selection and placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hub repository id of the checkpoint
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Hub revision (branch, tag or commit)
    #[serde(default = "default_revision")]
    pub revision: String,
    /// Device selector: auto, cpu, cuda[:n] or metal[:n]
    #[serde(default = "default_device")]
    pub device: String,
    /// Weight dtype: f16, bf16 or f32 (None = derived from device)
    #[serde(default)]
    pub dtype: Option<String>,
    /// Override for the hub download cache
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            revision: default_revision(),
            device: default_device(),
            dtype: None,
            cache_dir: None,
        }
    }
}

/// Generation defaults. The web UI publishes the first three as
/// sliders; the rest are config and CLI only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Upper bound on generated tokens per reply
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    /// Softmax temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Nucleus sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Optional top-k cutoff (None = disabled)
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Repetition penalty (1.0 = disabled)
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    /// Recent-token window the penalty looks at
    #[serde(default = "default_repeat_last_n")]
    pub repeat_last_n: usize,
    /// Sampler RNG seed
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            top_k: None,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            seed: default_seed(),
        }
    }
}

/// Web UI launch options, passed through to the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Expose the UI beyond loopback by binding all interfaces
    #[serde(default)]
    pub share: bool,
    /// Raise log verbosity to debug
    #[serde(default)]
    pub debug: bool,
    /// Include failure detail in HTTP error responses
    #[serde(default = "default_true")]
    pub show_errors: bool,
    /// Suppress the startup banner
    #[serde(default)]
    pub quiet: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            share: false,
            debug: false,
            show_errors: true,
            quiet: false,
        }
    }
}

/// Logging verbosity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}
fn default_revision() -> String {
    "main".to_string()
}
fn default_device() -> String {
    "auto".to_string()
}
fn default_max_new_tokens() -> usize {
    512
}
fn default_temperature() -> f64 {
    0.7
}
fn default_top_p() -> f64 {
    0.9
}
fn default_repeat_penalty() -> f32 {
    1.1
}
fn default_repeat_last_n() -> usize {
    64
}
fn default_seed() -> u64 {
    299792458
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    7860
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChatError::ConfigError(format!("failed to read config file: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| ChatError::ConfigError(format!("failed to parse config: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), ChatError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ChatError::ConfigError(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| ChatError::ConfigError(format!("failed to write config file: {}", e)))
    }

    /// Load configuration from `STONECHAT_*` environment variables on
    /// top of the defaults.
    ///
    /// ```rust
    /// use stonechat::config::AppConfig;
    ///
    /// std::env::set_var("STONECHAT_SAMPLING_TEMPERATURE", "0.5");
    /// let config = AppConfig::from_env().unwrap();
    /// assert_eq!(config.sampling.temperature, 0.5);
    /// ```
    pub fn from_env() -> Result<Self, ChatError> {
        let mut config = Self::default();

        if let Ok(model_id) = std::env::var("STONECHAT_MODEL_ID") {
            config.model.model_id = model_id;
        }
        if let Ok(revision) = std::env::var("STONECHAT_MODEL_REVISION") {
            config.model.revision = revision;
        }
        if let Ok(device) = std::env::var("STONECHAT_DEVICE") {
            config.model.device = device;
        }
        if let Ok(dtype) = std::env::var("STONECHAT_DTYPE") {
            config.model.dtype = Some(dtype);
        }
        if let Ok(cache_dir) = std::env::var("STONECHAT_CACHE_DIR") {
            config.model.cache_dir = Some(PathBuf::from(cache_dir));
        }

        if let Ok(max_new_tokens) = std::env::var("STONECHAT_SAMPLING_MAX_NEW_TOKENS") {
            config.sampling.max_new_tokens = max_new_tokens
                .parse()
                .map_err(|e| ChatError::ConfigError(format!("invalid max_new_tokens: {}", e)))?;
        }
        if let Ok(temperature) = std::env::var("STONECHAT_SAMPLING_TEMPERATURE") {
            config.sampling.temperature = temperature
                .parse()
                .map_err(|e| ChatError::ConfigError(format!("invalid temperature: {}", e)))?;
        }
        if let Ok(top_p) = std::env::var("STONECHAT_SAMPLING_TOP_P") {
            config.sampling.top_p = top_p
                .parse()
                .map_err(|e| ChatError::ConfigError(format!("invalid top_p: {}", e)))?;
        }

        if let Ok(host) = std::env::var("STONECHAT_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("STONECHAT_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|e| ChatError::ConfigError(format!("invalid port: {}", e)))?;
        }
        if let Ok(share) = std::env::var("STONECHAT_SERVER_SHARE") {
            config.server.share = share
                .parse()
                .map_err(|e| ChatError::ConfigError(format!("invalid share flag: {}", e)))?;
        }

        if let Ok(level) = std::env::var("STONECHAT_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stonechat").join("config.json"))
    }

    /// Validate the configuration before the service boots.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.model.model_id.trim().is_empty() {
            return Err(ChatError::ConfigError(
                "model id cannot be empty".to_string(),
            ));
        }
        self.model.device.parse::<DevicePreference>()?;
        if let Some(dtype) = &self.model.dtype {
            parse_dtype(dtype)?;
        }

        if self.sampling.max_new_tokens == 0 {
            return Err(ChatError::ConfigError(
                "max_new_tokens must be greater than 0".to_string(),
            ));
        }
        if self.sampling.temperature < 0.0 {
            return Err(ChatError::ConfigError(
                "temperature cannot be negative".to_string(),
            ));
        }
        if self.sampling.top_p <= 0.0 || self.sampling.top_p > 1.0 {
            return Err(ChatError::ConfigError(
                "top_p must be between 0 and 1".to_string(),
            ));
        }
        if self.sampling.repeat_penalty <= 0.0 {
            return Err(ChatError::ConfigError(
                "repeat_penalty must be positive".to_string(),
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(ChatError::ConfigError("host cannot be empty".to_string()));
        }
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(ChatError::ConfigError(format!(
                    "unknown log level '{}'",
                    other
                )))
            }
        }

        Ok(())
    }

    /// The configured model as a display-friendly reference.
    pub fn model_ref(&self) -> ModelRef {
        ModelRef {
            model_id: self.model.model_id.clone(),
            revision: self.model.revision.clone(),
        }
    }

    /// Convert to hub fetch options.
    pub fn to_hub_options(&self) -> HubOptions {
        HubOptions {
            model_id: self.model.model_id.clone(),
            revision: self.model.revision.clone(),
            cache_dir: self.model.cache_dir.clone(),
            progress: !self.server.quiet,
        }
    }

    /// Convert to the engine's boot options.
    pub fn to_engine_options(&self) -> Result<EngineOptions, ChatError> {
        let device: DevicePreference = self.model.device.parse()?;
        let dtype = match &self.model.dtype {
            Some(s) => Some(parse_dtype(s)?),
            None => None,
        };
        Ok(EngineOptions {
            hub: self.to_hub_options(),
            device,
            dtype,
        })
    }

    /// Convert to the runtime sampler options.
    pub fn to_sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            max_new_tokens: self.sampling.max_new_tokens,
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            top_k: self.sampling.top_k,
            repeat_penalty: self.sampling.repeat_penalty,
            repeat_last_n: self.sampling.repeat_last_n,
            seed: self.sampling.seed,
        }
    }

    /// Convert to the server launch options.
    pub fn to_launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            host: self.server.host.clone(),
            port: self.server.port,
            share: self.server.share,
            debug: self.server.debug,
            show_errors: self.server.show_errors,
            quiet: self.server.quiet,
        }
    }
}

/// Preset configurations mirroring the parameter tips the UI shows.
pub mod presets {
    use super::*;

    /// Low temperature for factual question answering.
    pub fn factual() -> AppConfig {
        let mut config = AppConfig::default();
        config.sampling.temperature = 0.3;
        config.sampling.top_p = 0.85;
        config
    }

    /// The balanced defaults the UI starts with.
    pub fn balanced() -> AppConfig {
        AppConfig::default()
    }

    /// High temperature for creative writing.
    pub fn creative() -> AppConfig {
        let mut config = AppConfig::default();
        config.sampling.temperature = 1.2;
        config.sampling.top_p = 0.95;
        config.sampling.repeat_penalty = 1.15;
        config
    }
}
