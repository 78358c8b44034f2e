use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional so a file can override just a few values; anything
/// missing falls back to the environment and then to defaults.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls:
///     cert_path: "/etc/auraq/cert.pem"
///     key_path: "/etc/auraq/key.pem"
///
/// providers:
///   openai_api_key: "sk-..."
///
/// relay:
///   mode: "websocket"          # or "ephemeral_token"
///   upstream_realtime_url: "wss://api.openai.com/v1/realtime"
///   upstream_sessions_url: "https://api.openai.com/v1/realtime/sessions"
///   connect_timeout_seconds: 10
///   idle_timeout_seconds: 300
///
/// coach:
///   model: "gpt-4o-realtime-preview-2024-10-01"
///   voice: "alloy"
///   temperature: 0.8
///   transcription_model: "whisper-1"
///   greeting: "Hey there! What's on your mind today?"
///   vad:
///     threshold: 0.5
///     prefix_padding_ms: 300
///     silence_duration_ms: 1000
///
/// security:
///   cors_allowed_origins: "https://app.auraq.example"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 500
///   max_connections_per_ip: 20
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct YamlConfig {
    #[serde(default)]
    pub server: Option<ServerYaml>,
    #[serde(default)]
    pub providers: Option<ProvidersYaml>,
    #[serde(default)]
    pub relay: Option<RelayYaml>,
    #[serde(default)]
    pub coach: Option<CoachYaml>,
    #[serde(default)]
    pub security: Option<SecurityYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsYaml {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProvidersYaml {
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RelayYaml {
    pub mode: Option<String>,
    pub upstream_realtime_url: Option<String>,
    pub upstream_sessions_url: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    pub idle_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CoachYaml {
    pub model: Option<String>,
    pub voice: Option<String>,
    /// Replaces the built-in coach prompt
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub transcription_model: Option<String>,
    pub greeting: Option<String>,
    pub vad: Option<VadYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VadYaml {
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(serde_yaml::from_str(&contents)?)
    }
}
