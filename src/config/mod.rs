//! Configuration module for the AuraQ voice relay
//!
//! Configuration comes from .env files, environment variables and an optional
//! YAML file. Priority: YAML > ENV vars > .env values > defaults. The merged
//! result is validated before the server starts.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Configuration validation logic
//! - `utils`: Parsing helpers
//!
//! # Example
//! ```rust,no_run
//! use auraq_voice_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//!
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::core::realtime::{CoachSessionSettings, OPENAI_REALTIME_SESSIONS_URL, OPENAI_REALTIME_URL};
use crate::relay::{Credentials, RelayMode};

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Everything needed to run the relay:
/// - Server settings (host, port, TLS)
/// - The upstream credential and endpoints
/// - Relay mode and link timeouts
/// - The coach session shape (model, voice, prompt, VAD, temperature)
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Realtime API key; only the relay ever holds it
    pub openai_api_key: Option<String>,

    // Relay settings
    pub relay_mode: RelayMode,
    pub upstream_realtime_url: String,
    pub upstream_sessions_url: String,
    pub upstream_connect_timeout_seconds: u64,
    /// Links with no traffic for this long are closed
    pub relay_idle_timeout_seconds: u64,

    // Coach session
    pub coach: CoachSessionSettings,

    // Security configuration
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,

    // Connection limits
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            tls: None,
            openai_api_key: None,
            relay_mode: RelayMode::default(),
            upstream_realtime_url: OPENAI_REALTIME_URL.to_string(),
            upstream_sessions_url: OPENAI_REALTIME_SESSIONS_URL.to_string(),
            upstream_connect_timeout_seconds: 10,
            relay_idle_timeout_seconds: 300,
            coach: CoachSessionSettings::default(),
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::load_from_env()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Loads a YAML file and applies it over the environment.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        // .env is loaded into the environment by main.rs before this runs.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Credential for upstream calls; `None` when unset or blank.
    pub fn credentials(&self) -> Option<Credentials> {
        self.openai_api_key
            .as_deref()
            .and_then(|key| Credentials::new(key).ok())
    }

    /// Rate limiting is effectively off at or above this rate.
    pub fn is_rate_limit_disabled(&self) -> bool {
        self.rate_limit_requests_per_second >= 100_000
    }
}
