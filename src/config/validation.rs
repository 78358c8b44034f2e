use url::Url;

use super::{ConfigError, ServerConfig};
use crate::relay::MAX_IDLE_TIMEOUT;

/// Checks a merged configuration before the server starts.
///
/// A missing API key is not an error here: the relay starts and answers
/// session requests with a configuration error instead.
pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_url(&config.upstream_realtime_url, &["ws", "wss"], "upstream_realtime_url")?;
    validate_url(&config.upstream_sessions_url, &["http", "https"], "upstream_sessions_url")?;
    validate_coach(config)?;
    validate_tls(config)?;

    if config.upstream_connect_timeout_seconds == 0 {
        return Err(ConfigError::Validation(
            "upstream connect timeout must be at least one second".to_string(),
        ));
    }
    if config.relay_idle_timeout_seconds == 0 {
        return Err(ConfigError::Validation(
            "relay idle timeout must be at least one second".to_string(),
        ));
    }
    if config.relay_idle_timeout_seconds > MAX_IDLE_TIMEOUT.as_secs() {
        return Err(ConfigError::Validation(format!(
            "relay idle timeout must be at most {} seconds",
            MAX_IDLE_TIMEOUT.as_secs()
        )));
    }
    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err(ConfigError::Validation(
            "rate limit and burst size must be positive".to_string(),
        ));
    }
    if config.max_connections_per_ip == 0 {
        return Err(ConfigError::Validation(
            "max_connections_per_ip must be positive".to_string(),
        ));
    }

    Ok(())
}

fn validate_url(raw: &str, schemes: &[&str], key: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("scheme must be one of {}", schemes.join(", ")),
        });
    }
    Ok(())
}

fn validate_coach(config: &ServerConfig) -> Result<(), ConfigError> {
    let coach = &config.coach;

    // Range accepted by the realtime API.
    if !(0.6..=1.2).contains(&coach.temperature) {
        return Err(ConfigError::Validation(format!(
            "temperature {} outside 0.6..=1.2",
            coach.temperature
        )));
    }
    if !(0.0..=1.0).contains(&coach.vad.threshold) {
        return Err(ConfigError::Validation(format!(
            "VAD threshold {} outside 0.0..=1.0",
            coach.vad.threshold
        )));
    }
    if coach.vad.silence_duration_ms == 0 {
        return Err(ConfigError::Validation(
            "VAD silence duration must be positive".to_string(),
        ));
    }
    if coach.model.trim().is_empty() || coach.transcription_model.trim().is_empty() {
        return Err(ConfigError::Validation("model names must not be empty".to_string()));
    }
    if coach.instructions.trim().is_empty() {
        return Err(ConfigError::Validation("coach instructions must not be empty".to_string()));
    }
    Ok(())
}

fn validate_tls(config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(tls) = &config.tls {
        for path in [&tls.cert_path, &tls.key_path] {
            if !path.exists() {
                return Err(ConfigError::Validation(format!(
                    "TLS file not found: {}",
                    path.display()
                )));
            }
        }
    }
    Ok(())
}
