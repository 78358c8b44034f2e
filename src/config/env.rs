use std::path::PathBuf;

use crate::core::realtime::{CoachSessionSettings, CoachVoice};
use crate::relay::RelayMode;

use super::utils::{env_var, parse_env};
use super::{ConfigError, ServerConfig, TlsConfig};

/// Builds a configuration from environment variables over the defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, ConfigError> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    if let Some(port) = parse_env::<u16>("PORT")? {
        config.port = port;
    }

    config.tls = match (env_var("TLS_CERT_PATH"), env_var("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => {
            return Err(ConfigError::Validation(
                "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
            ));
        }
    };

    config.openai_api_key = env_var("OPENAI_API_KEY");

    if let Some(mode) = env_var("RELAY_MODE") {
        config.relay_mode = RelayMode::parse(&mode).ok_or_else(|| ConfigError::InvalidValue {
            key: "RELAY_MODE".to_string(),
            message: format!("{mode:?} is not one of websocket, ephemeral_token"),
        })?;
    }
    if let Some(url) = env_var("UPSTREAM_REALTIME_URL") {
        config.upstream_realtime_url = url;
    }
    if let Some(url) = env_var("UPSTREAM_SESSIONS_URL") {
        config.upstream_sessions_url = url;
    }
    if let Some(secs) = parse_env::<u64>("UPSTREAM_CONNECT_TIMEOUT_SECS")? {
        config.upstream_connect_timeout_seconds = secs;
    }
    if let Some(secs) = parse_env::<u64>("RELAY_IDLE_TIMEOUT_SECS")? {
        config.relay_idle_timeout_seconds = secs;
    }

    load_coach_from_env(&mut config.coach)?;

    config.cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS");
    if let Some(rps) = parse_env::<u32>("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = parse_env::<u32>("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }
    config.max_websocket_connections = parse_env::<usize>("MAX_WEBSOCKET_CONNECTIONS")?;
    if let Some(per_ip) = parse_env::<u32>("MAX_CONNECTIONS_PER_IP")? {
        config.max_connections_per_ip = per_ip;
    }

    Ok(config)
}

fn load_coach_from_env(coach: &mut CoachSessionSettings) -> Result<(), ConfigError> {
    if let Some(model) = env_var("REALTIME_MODEL") {
        coach.model = model;
    }
    if let Some(voice) = env_var("REALTIME_VOICE") {
        coach.voice = CoachVoice::parse(&voice).ok_or_else(|| ConfigError::InvalidValue {
            key: "REALTIME_VOICE".to_string(),
            message: format!("unknown voice {voice:?}"),
        })?;
    }
    if let Some(temperature) = parse_env::<f32>("REALTIME_TEMPERATURE")? {
        coach.temperature = temperature;
    }
    if let Some(threshold) = parse_env::<f32>("VAD_THRESHOLD")? {
        coach.vad.threshold = threshold;
    }
    if let Some(padding) = parse_env::<u32>("VAD_PREFIX_PADDING_MS")? {
        coach.vad.prefix_padding_ms = padding;
    }
    if let Some(silence) = parse_env::<u32>("VAD_SILENCE_DURATION_MS")? {
        coach.vad.silence_duration_ms = silence;
    }
    if let Some(model) = env_var("TRANSCRIPTION_MODEL") {
        coach.transcription_model = model;
    }
    if let Some(greeting) = env_var("COACH_GREETING") {
        coach.greeting = Some(greeting);
    }
    Ok(())
}
